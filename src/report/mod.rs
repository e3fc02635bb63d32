//! Terminal output.
//!
//! Renders `ToolStats` rows as a fixed-width table or JSON. The timeline
//! chart lives in [`chart`].

pub mod chart;

use anyhow::{Context, Result};
use chrono::DateTime;

use crate::engine::aggregator::overall_known;
use crate::types::{ToolStats, UNKNOWN_TOOL};

/// Minimum width of the tool column (the header itself).
const MIN_TOOL_COL: usize = 4;

/// Fixed-width table of per-tool statistics followed by the overall and
/// unmatched summary lines. Rows are printed in the given order.
pub fn render_table(title: &str, stats: &[ToolStats]) -> String {
    let col = stats
        .iter()
        .map(|s| s.tool.chars().count())
        .max()
        .unwrap_or(0)
        .max(MIN_TOOL_COL);

    let header = format!(
        "{:<col$} | {:>7} | {:>7} | {:>8}",
        "Tool", "Total", "Correct", "Accuracy"
    );
    let separator = "-".repeat(header.chars().count());

    let mut lines = vec![
        String::new(),
        title.to_string(),
        separator.clone(),
        header,
        separator.clone(),
    ];
    for s in stats {
        lines.push(format!(
            "{:<col$} | {:>7} | {:>7} | {:>7.1}%",
            s.tool, s.total, s.correct, s.accuracy_pct
        ));
    }
    lines.push(separator);

    if let Some(overall) = overall_known(stats) {
        lines.push(String::new());
        lines.push(format!(
            "Overall (known tools): {}/{} correct ({:.1}% accuracy)",
            overall.correct, overall.total, overall.accuracy_pct
        ));
    }

    if let Some(unknown) = stats.iter().find(|s| s.tool == UNKNOWN_TOOL) {
        lines.push(format!(
            "Unmatched bets (no mech request found): {}",
            unknown.total
        ));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Statistics rows as a pretty-printed JSON array.
pub fn render_json(stats: &[ToolStats]) -> Result<String> {
    serde_json::to_string_pretty(stats).context("Failed to serialize tool statistics")
}

/// `YYYY-MM-DD` of a Unix timestamp (UTC).
pub fn format_date(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}
