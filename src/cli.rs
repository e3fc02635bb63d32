//! Command-line interface.
//!
//! Argument shapes are checked by clap; the time window is resolved
//! against the current time afterwards, and a window that ends before it
//! starts is reported through the same usage-error path.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta};
use clap::{Args, Parser, Subcommand};

use crate::types::MarketSource;

const SECS_PER_DAY: i64 = 86_400;

/// Default look-back for `timeline` without `--period` or `--start`.
pub const DEFAULT_PERIOD_DAYS: i64 = 30;

#[derive(Parser, Debug)]
#[command(name = "tool-accuracy", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "config.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Per-tool accuracy over the most recent resolved bets
    Last {
        /// Number of resolved bets to analyse
        #[arg(default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
        count: u64,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Per-tool accuracy over a time window, binned and charted
    Timeline(TimelineArgs),
    /// Inspect or clear the local cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Options shared by the reporting commands.
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Prediction market to analyse
    #[arg(long, value_enum, default_value_t = MarketSource::Omen)]
    pub source: MarketSource,

    /// Print statistics as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TimelineArgs {
    /// Look-back period, e.g. 7d, 30d, 90d (default: 30d)
    #[arg(long, value_name = "Nd", value_parser = parse_period, conflicts_with = "start")]
    pub period: Option<i64>,

    /// Start date (UTC)
    #[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date)]
    pub start: Option<NaiveDate>,

    /// End date (UTC, inclusive); defaults to today
    #[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date, requires = "start")]
    pub end: Option<NaiveDate>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// List cache entries with their age
    Show,
    /// Delete the cache file
    Clear,
}

/// Parse a look-back period of the form `<digits>d`.
pub fn parse_period(s: &str) -> Result<i64, String> {
    let digits = s
        .strip_suffix('d')
        .ok_or_else(|| format!("period must end with 'd', e.g. 7d, 30d, 90d (got {s:?})"))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid period value: {s:?}"));
    }
    digits
        .parse::<i64>()
        .map_err(|e| format!("invalid period value {s:?}: {e}"))
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("invalid date {s:?}, expected YYYY-MM-DD"))
}

/// Inclusive `[start, end]` range of Unix timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    /// Whole days covered, rounded down.
    pub fn days(&self) -> i64 {
        (self.end - self.start) / SECS_PER_DAY
    }
}

impl TimelineArgs {
    /// Resolve the requested window relative to `now`.
    ///
    /// `--start` is midnight UTC of that day; `--end` and the default end
    /// are 23:59:59 UTC. A period counts back from `now` exactly.
    pub fn window(&self, now: i64) -> Result<TimeWindow, String> {
        let now = DateTime::from_timestamp(now, 0)
            .ok_or_else(|| format!("current time {now} is out of range"))?;
        let today_end = end_of_day(now.date_naive());

        let window = match self.start {
            Some(start) => TimeWindow {
                start: midnight(start),
                end: self.end.map(end_of_day).unwrap_or(today_end),
            },
            None => {
                if self.end.is_some() {
                    return Err("--end requires --start".to_string());
                }
                let days = self.period.unwrap_or(DEFAULT_PERIOD_DAYS);
                let start = TimeDelta::try_days(days)
                    .and_then(|period| now.checked_sub_signed(period))
                    .ok_or_else(|| format!("period of {days}d is out of range"))?;
                TimeWindow {
                    start: start.timestamp(),
                    end: today_end,
                }
            }
        };

        if window.end <= window.start {
            return Err("end date must be after start date".to_string());
        }
        Ok(window)
    }
}

fn midnight(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Last second (23:59:59 UTC) of `date`.
fn end_of_day(date: NaiveDate) -> i64 {
    midnight(date) + SECS_PER_DAY - 1
}
