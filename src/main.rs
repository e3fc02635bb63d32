//! tool-accuracy: per-tool accuracy of mech-backed trader agents.
//!
//! Entry point. Parses arguments, initialises structured logging, loads
//! configuration and runs the selected command. Logs go to stderr so that
//! stdout carries only the report.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing::{info, warn};
use uuid::Uuid;

use tool_accuracy::cli::{CacheAction, Cli, Commands, OutputArgs, TimeWindow};
use tool_accuracy::config::AppConfig;
use tool_accuracy::engine::enricher::Enricher;
use tool_accuracy::pipeline::{self, AccuracySummary};
use tool_accuracy::report::chart::{self, ChartOptions, ChartOutcome};
use tool_accuracy::report::{format_date, render_json, render_table};
use tool_accuracy::sources::build_sources;
use tool_accuracy::storage::{age_label, CachePayload, CacheStore, DiskCache};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging();

    let run_id = Uuid::new_v4();
    let cfg = AppConfig::load_or_default(&cli.config)?;
    info!(%run_id, config = %cli.config, cache = %cfg.cache.path, "tool-accuracy starting");

    let now = Utc::now().timestamp();

    match cli.command {
        Commands::Last { count, output } => run_last(&cfg, count, &output, now).await,
        Commands::Timeline(args) => {
            let window = match args.window(now) {
                Ok(w) => w,
                Err(msg) => Cli::command().error(ErrorKind::ValueValidation, msg).exit(),
            };
            run_timeline(&cfg, window, &args.output, now).await
        }
        Commands::Cache { action } => run_cache(&cfg, action, now),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn run_last(cfg: &AppConfig, count: u64, output: &OutputArgs, now: i64) -> Result<()> {
    let count = usize::try_from(count).context("Bet count too large")?;
    let (source, mech) = build_sources(
        cfg,
        output.source,
        cfg.http.simple_policy(),
        cfg.cache.ttl_secs,
    )?;
    let enricher = Enricher::new(mech);
    let mut cache = DiskCache::load(&cfg.cache.path);
    let since = now.saturating_sub(cfg.fetch.mech_lookback_secs(output.source));

    let Some(summary) =
        pipeline::run_last(source.as_ref(), &enricher, &mut cache, count, since, now).await?
    else {
        println!("No resolved bets found. Exiting.");
        return Ok(());
    };

    let title = format!("Tool accuracy statistics ({} bets fetched)", summary.bet_count());
    print_summary(&title, &summary, output.json)
}

async fn run_timeline(
    cfg: &AppConfig,
    window: TimeWindow,
    output: &OutputArgs,
    now: i64,
) -> Result<()> {
    info!(
        start = %format_date(window.start),
        end = %format_date(window.end),
        days = window.days(),
        source = %output.source,
        "Tool accuracy timeline"
    );

    let ttl = cfg.cache.timeline_ttl_secs;
    let (source, mech) = build_sources(cfg, output.source, cfg.http.timeline_policy(), ttl)?;
    let enricher = Enricher::new(mech);
    let mut cache = DiskCache::load(&cfg.cache.path);

    let Some(run) =
        pipeline::run_timeline(source.as_ref(), &enricher, &mut cache, window, now, ttl).await?
    else {
        println!("No resolved bets found for the selected time range. Exiting.");
        return Ok(());
    };

    if run.summary.enrichment.failed_agents > 0 {
        warn!(
            failed_agents = run.summary.enrichment.failed_agents,
            "Agents skipped due to fetch errors; their bets are counted as 'unknown'"
        );
    }

    let title = format!(
        "Tool accuracy summary  ({} → {})",
        format_date(window.start),
        format_date(window.end)
    );
    print_summary(&title, &run.summary, output.json)?;
    if output.json {
        return Ok(());
    }

    let options = ChartOptions::from_config(
        &cfg.chart,
        ChartOptions::title_for(window.start, window.end),
    );
    match chart::render(&run.timeline, &options) {
        ChartOutcome::Rendered(text) => println!("\n{text}"),
        ChartOutcome::NotEnoughData => {
            println!("\nNot enough data to plot a chart for the selected time range.")
        }
        ChartOutcome::Unavailable => {
            println!("\nChart support is not compiled in (build with the `chart` feature).");
            println!("Skipping chart; see the summary above.");
        }
    }
    Ok(())
}

fn run_cache(cfg: &AppConfig, action: CacheAction, now: i64) -> Result<()> {
    let mut cache = DiskCache::load(&cfg.cache.path);

    match action {
        CacheAction::Show => {
            if cache.is_empty() {
                println!("Cache is empty ({})", cache.path().display());
                return Ok(());
            }
            println!("Cache file: {} ({} entries)", cache.path().display(), cache.len());
            for key in cache.keys() {
                let Some(entry) = cache.get(&key) else { continue };
                let (kind, records) = match &entry.payload {
                    CachePayload::Requests(r) => ("requests", r.len()),
                    CachePayload::Bets(b) => ("bets", b.len()),
                };
                let from = entry
                    .fetched_from
                    .map(|ts| format!(", from {}", format_date(ts)))
                    .unwrap_or_default();
                println!(
                    "  {key}: {records} {kind}, fetched {} ago{from}",
                    age_label(entry.fetched_at, now)
                );
            }
        }
        CacheAction::Clear => {
            cache.clear()?;
            println!("Cache cleared ({})", cache.path().display());
        }
    }
    Ok(())
}

fn print_summary(title: &str, summary: &AccuracySummary, json: bool) -> Result<()> {
    if json {
        println!("{}", render_json(&summary.stats)?);
    } else {
        print!("{}", render_table(title, &summary.stats));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tool_accuracy=info"));

    let json_logging = std::env::var("TOOL_ACCURACY_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
