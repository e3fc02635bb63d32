//! Accuracy-over-time line chart.
//!
//! Drawn with ratatui's `Chart` widget into an off-screen buffer and
//! returned as plain text, so it works in any terminal or log file.
//! Compiled only with the `chart` feature; without it `render` reports
//! [`ChartOutcome::Unavailable`].

use crate::config::ChartConfig;
use crate::engine::aggregator::Timeline;
use crate::types::UNKNOWN_TOOL;

use super::format_date;

/// Label of the overall line.
pub const OVERALL_LABEL: &str = "Overall (known tools)";

/// Chart size and inclusion threshold.
#[derive(Debug, Clone)]
pub struct ChartOptions {
    pub title: String,
    /// Minimum non-empty bins for a tool to get its own line.
    pub min_points: usize,
    pub width: u16,
    pub height: u16,
}

impl ChartOptions {
    pub fn from_config(cfg: &ChartConfig, title: String) -> Self {
        Self {
            title,
            min_points: cfg.min_points,
            width: cfg.width,
            height: cfg.height,
        }
    }

    /// Default title: `Tool Accuracy Over Time | start → end`.
    pub fn title_for(start: i64, end: i64) -> String {
        format!(
            "Tool Accuracy Over Time  |  {} → {}",
            format_date(start),
            format_date(end)
        )
    }
}

/// What happened when asked for a chart.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartOutcome {
    Rendered(String),
    /// Nothing to plot: no tool reaches `min_points` and no bin has known bets.
    NotEnoughData,
    /// Built without charting support.
    Unavailable,
}

/// One plotted line: `(bin index, accuracy)` points, empty bins skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub points: Vec<(f64, f64)>,
}

fn points(series: &[Option<f64>]) -> Vec<(f64, f64)> {
    series
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i as f64, v)))
        .collect()
}

/// Lines to draw: tools (sorted, `unknown` excluded) with at least
/// `min_points` points, then the overall line if it has any point.
pub fn plot_series(timeline: &Timeline, min_points: usize) -> Vec<Series> {
    let mut lines: Vec<Series> = timeline
        .tools()
        .into_iter()
        .filter(|tool| tool != UNKNOWN_TOOL)
        .map(|tool| Series {
            points: points(&timeline.tool_series(&tool)),
            name: tool,
        })
        .filter(|s| s.points.len() >= min_points)
        .collect();

    let overall = points(&timeline.overall_series());
    if !overall.is_empty() {
        lines.push(Series {
            name: OVERALL_LABEL.to_string(),
            points: overall,
        });
    }
    lines
}

/// Render the timeline chart.
pub fn render(timeline: &Timeline, options: &ChartOptions) -> ChartOutcome {
    let lines = plot_series(timeline, options.min_points);
    if lines.is_empty() {
        return ChartOutcome::NotEnoughData;
    }
    draw(timeline, &lines, options)
}

#[cfg(not(feature = "chart"))]
fn draw(_timeline: &Timeline, _lines: &[Series], _options: &ChartOptions) -> ChartOutcome {
    ChartOutcome::Unavailable
}

#[cfg(feature = "chart")]
fn draw(timeline: &Timeline, lines: &[Series], options: &ChartOptions) -> ChartOutcome {
    use ratatui::buffer::Buffer;
    use ratatui::layout::Rect;
    use ratatui::style::{Color, Modifier, Style};
    use ratatui::symbols::Marker;
    use ratatui::widgets::{Axis, Block, Chart, Dataset, GraphType, Widget};

    const PALETTE: [Color; 6] = [
        Color::Cyan,
        Color::Green,
        Color::Yellow,
        Color::Magenta,
        Color::Blue,
        Color::LightRed,
    ];

    let last_x = timeline.bins.len().saturating_sub(1).max(1) as f64;
    let reference = [(0.0, 50.0), (last_x, 50.0)];

    let mut datasets: Vec<Dataset> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let style = if line.name == OVERALL_LABEL {
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(PALETTE[i % PALETTE.len()])
            };
            Dataset::default()
                .name(line.name.clone())
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(style)
                .data(&line.points)
        })
        .collect();
    datasets.push(
        Dataset::default()
            .name("50% (random)")
            .marker(Marker::Dot)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Red))
            .data(&reference),
    );

    let starts = timeline.bin_starts();
    let x_labels: Vec<String> = match (starts.first(), starts.get(starts.len() / 2), starts.last()) {
        (Some(&first), Some(&mid), Some(&last)) if starts.len() > 2 => {
            vec![format_date(first), format_date(mid), format_date(last)]
        }
        (Some(&first), _, Some(&last)) => vec![format_date(first), format_date(last)],
        _ => Vec::new(),
    };

    let chart = Chart::new(datasets)
        .block(Block::bordered().title(options.title.clone()))
        .x_axis(
            Axis::default()
                .title(format!("Date ({})", timeline.granularity))
                .bounds([0.0, last_x])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .title("Accuracy (%)")
                .bounds([0.0, 105.0])
                .labels(["0", "50", "100"]),
        );

    let area = Rect::new(0, 0, options.width.max(20), options.height.max(8));
    let mut buf = Buffer::empty(area);
    chart.render(area, &mut buf);

    ChartOutcome::Rendered(buffer_to_text(&buf))
}

#[cfg(feature = "chart")]
fn buffer_to_text(buf: &ratatui::buffer::Buffer) -> String {
    let area = buf.area;
    let mut out = String::with_capacity(usize::from(area.width + 1) * usize::from(area.height));
    for y in area.top()..area.bottom() {
        let mut row = String::new();
        for x in area.left()..area.right() {
            row.push_str(buf.cell((x, y)).map_or(" ", |c| c.symbol()));
        }
        out.push_str(row.trim_end());
        out.push('\n');
    }
    out
}
