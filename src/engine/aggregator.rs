//! Accuracy aggregation.
//!
//! Whole-window statistics per tool, plus a time-binned view used by the
//! timeline chart. `unknown` rows are kept in the per-tool statistics but
//! never count towards the overall figures.

use chrono::{DateTime, Datelike, Days, NaiveTime};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::info;

use crate::types::{accuracy_pct, EnrichedBet, OverallStats, ToolStats, UNKNOWN_TOOL};

const SECS_PER_DAY: i64 = 86_400;

/// Windows up to this many days are binned daily, longer ones weekly.
const DAILY_MAX_SPAN_DAYS: i64 = 30;

// ---------------------------------------------------------------------------
// Whole-window statistics
// ---------------------------------------------------------------------------

/// Per-tool statistics, sorted by total descending.
///
/// Tools with equal totals keep the order in which they were first seen.
pub fn aggregate(bets: &[EnrichedBet]) -> Vec<ToolStats> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(&str, u64, u64)> = Vec::new();

    for bet in bets {
        let i = *index.entry(bet.tool.as_str()).or_insert_with(|| {
            counts.push((bet.tool.as_str(), 0, 0));
            counts.len() - 1
        });
        counts[i].1 += 1;
        if bet.is_correct() {
            counts[i].2 += 1;
        }
    }

    let mut stats: Vec<ToolStats> = counts
        .into_iter()
        .map(|(tool, total, correct)| ToolStats {
            tool: tool.to_string(),
            total,
            correct,
            accuracy_pct: accuracy_pct(correct, total).unwrap_or(0.0),
        })
        .collect();

    // sort_by is stable
    stats.sort_by(|a, b| b.total.cmp(&a.total));
    stats
}

/// Totals over every known tool, or `None` if no bet was attributed.
pub fn overall_known(stats: &[ToolStats]) -> Option<OverallStats> {
    let (total, correct) = stats
        .iter()
        .filter(|s| s.tool != UNKNOWN_TOOL)
        .fold((0u64, 0u64), |(t, c), s| (t + s.total, c + s.correct));

    accuracy_pct(correct, total).map(|accuracy_pct| OverallStats {
        total,
        correct,
        accuracy_pct,
    })
}

// ---------------------------------------------------------------------------
// Time bins
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
}

impl Granularity {
    /// Daily for spans of at most 30 days, weekly otherwise.
    pub fn for_span(start: i64, end: i64) -> Self {
        if end - start <= DAILY_MAX_SPAN_DAYS * SECS_PER_DAY {
            Granularity::Daily
        } else {
            Granularity::Weekly
        }
    }

    pub fn step_secs(&self) -> i64 {
        match self {
            Granularity::Daily => SECS_PER_DAY,
            Granularity::Weekly => 7 * SECS_PER_DAY,
        }
    }

    /// First edge at or before `start`: UTC midnight, on a Monday for
    /// weekly bins.
    fn anchor(&self, start: i64) -> i64 {
        let Some(dt) = DateTime::from_timestamp(start, 0) else {
            return start;
        };
        let day = dt.date_naive();
        let day = match self {
            Granularity::Daily => day,
            Granularity::Weekly => {
                let since_monday = u64::from(day.weekday().num_days_from_monday());
                day.checked_sub_days(Days::new(since_monday)).unwrap_or(day)
            }
        };
        day.and_time(NaiveTime::MIN).and_utc().timestamp()
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::Daily => write!(f, "daily"),
            Granularity::Weekly => write!(f, "weekly"),
        }
    }
}

/// Sorted bin edges covering `[start, end]`.
///
/// Bin `i` is `[edges[i], edges[i + 1])`.
pub fn bin_edges(start: i64, end: i64, granularity: Granularity) -> Vec<i64> {
    let step = granularity.step_secs();
    let mut edges = Vec::new();
    let mut cursor = granularity.anchor(start);

    while cursor <= end {
        edges.push(cursor);
        cursor += step;
    }
    if edges.last().map_or(true, |&last| last <= end) {
        edges.push(end + 1);
    }
    edges
}

/// Observations within one half-open time interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeBin {
    pub start: i64,
    pub end: i64,
    /// Bets per tool.
    pub totals: BTreeMap<String, u64>,
    /// Correct bets per tool.
    pub corrects: BTreeMap<String, u64>,
}

impl TimeBin {
    fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            ..Default::default()
        }
    }

    fn record(&mut self, bet: &EnrichedBet) {
        *self.totals.entry(bet.tool.clone()).or_default() += 1;
        if bet.is_correct() {
            *self.corrects.entry(bet.tool.clone()).or_default() += 1;
        }
    }

    /// Accuracy of one tool in this bin; `None` when it has no bets here.
    pub fn tool_accuracy(&self, tool: &str) -> Option<f64> {
        let total = self.totals.get(tool).copied().unwrap_or(0);
        let correct = self.corrects.get(tool).copied().unwrap_or(0);
        accuracy_pct(correct, total)
    }

    /// Accuracy over known tools in this bin.
    pub fn overall_accuracy(&self) -> Option<f64> {
        let known = |m: &BTreeMap<String, u64>| -> u64 {
            m.iter()
                .filter(|(tool, _)| tool.as_str() != UNKNOWN_TOOL)
                .map(|(_, n)| n)
                .sum()
        };
        accuracy_pct(known(&self.corrects), known(&self.totals))
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

/// Bets grouped into contiguous time bins.
#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    pub start: i64,
    pub end: i64,
    pub granularity: Granularity,
    pub bins: Vec<TimeBin>,
}

impl Timeline {
    /// Bin `bets` over `[start, end]`. Bets outside the covered range are
    /// ignored.
    pub fn build(bets: &[EnrichedBet], start: i64, end: i64) -> Self {
        let granularity = Granularity::for_span(start, end);
        let edges = bin_edges(start, end, granularity);
        let mut bins: Vec<TimeBin> = edges
            .windows(2)
            .map(|w| TimeBin::new(w[0], w[1]))
            .collect();

        let mut placed = 0usize;
        for bet in bets {
            let idx = edges.partition_point(|&e| e <= bet.bet.timestamp);
            if idx == 0 || idx >= edges.len() {
                continue;
            }
            bins[idx - 1].record(bet);
            placed += 1;
        }

        info!(
            bins = bins.len(),
            granularity = %granularity,
            placed,
            "Bets binned"
        );

        Self {
            start,
            end,
            granularity,
            bins,
        }
    }

    /// Every tool seen in any bin, sorted.
    pub fn tools(&self) -> Vec<String> {
        self.bins
            .iter()
            .flat_map(|b| b.totals.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Accuracy of `tool` per bin.
    pub fn tool_series(&self, tool: &str) -> Vec<Option<f64>> {
        self.bins.iter().map(|b| b.tool_accuracy(tool)).collect()
    }

    /// Known-tool accuracy per bin.
    pub fn overall_series(&self) -> Vec<Option<f64>> {
        self.bins.iter().map(TimeBin::overall_accuracy).collect()
    }

    /// Bin start timestamps.
    pub fn bin_starts(&self) -> Vec<i64> {
        self.bins.iter().map(|b| b.start).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
