//! Bet to mech request correlation.
//!
//! The marketplace indexer may truncate question titles, so a request
//! matches a bet when either title is a prefix of the other. When several
//! requests match, the latest one sent at or before the bet wins.

use crate::types::{Bet, MechRequest, QUESTION_DATA_SEPARATOR};

/// Human-readable part of a question: everything before the metadata
/// separator, trimmed.
pub fn question_title(question: &str) -> &str {
    question
        .split(QUESTION_DATA_SEPARATOR)
        .next()
        .unwrap_or_default()
        .trim()
}

/// Whether two already-extracted titles refer to the same question.
fn titles_match(bet_title: &str, mech_title: &str) -> bool {
    bet_title.starts_with(mech_title) || mech_title.starts_with(bet_title)
}

/// All candidates whose title matches the bet's, in input order.
pub fn match_requests<'a>(bet: &Bet, candidates: &'a [MechRequest]) -> Vec<&'a MechRequest> {
    let bet_title = question_title(&bet.question);
    if bet_title.is_empty() {
        return Vec::new();
    }

    candidates
        .iter()
        .filter(|req| {
            let mech_title = question_title(req.question_title());
            !mech_title.is_empty() && titles_match(bet_title, mech_title)
        })
        .collect()
}

/// Pick the request most likely to have produced the bet.
///
/// The latest request with `block_timestamp <= bet.timestamp` wins, the
/// earliest listed one among equal timestamps. If every match is later
/// than the bet, the first match is used.
pub fn choose_request<'a>(bet: &Bet, matches: &[&'a MechRequest]) -> Option<&'a MechRequest> {
    let preceding = matches
        .iter()
        .copied()
        .filter(|r| r.block_timestamp <= bet.timestamp)
        .fold(None::<&'a MechRequest>, |best, r| match best {
            Some(b) if b.block_timestamp >= r.block_timestamp => Some(b),
            _ => Some(r),
        });

    preceding.or_else(|| matches.first().copied())
}
