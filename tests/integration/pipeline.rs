//! Full pipeline runs: bets source, cached mech lookups, aggregation and
//! reporting, wired exactly as the binary wires them.

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use tool_accuracy::cli::TimeWindow;
    use tool_accuracy::engine::enricher::Enricher;
    use tool_accuracy::pipeline::{run_last, run_timeline};
    use tool_accuracy::report::chart::{self, ChartOptions, ChartOutcome};
    use tool_accuracy::report::render_table;
    use tool_accuracy::sources::mech::{MechRequestSource, MechSubgraph};
    use tool_accuracy::sources::omen::OmenBetSource;
    use tool_accuracy::sources::polymarket::PolymarketBetSource;
    use tool_accuracy::storage::{CacheStore, DiskCache, MemoryCache};
    use tool_accuracy::config::ChartConfig;
    use tool_accuracy::types::UNKNOWN_TOOL;

    use crate::mock_subgraph::{MockBet, MockRequest, MockSubgraph};

    // 2024-01-10 12:00:00 UTC
    const NOW: i64 = 1_704_888_000;
    const DAY: i64 = 86_400;
    const TTL: i64 = 3 * 3600;

    fn bet(id: &str, ts: i64, agent: &str, outcome: u64, answer: Option<u64>, question: &str) -> MockBet {
        MockBet {
            id: id.to_string(),
            timestamp: ts,
            agent: agent.to_string(),
            outcome,
            answer,
            question: question.to_string(),
        }
    }

    fn request(agent: &str, ts: i64, title: &str, tool: &str) -> MockRequest {
        MockRequest {
            agent: agent.to_string(),
            timestamp: ts,
            title: title.to_string(),
            tool: tool.to_string(),
        }
    }

    /// Two bets by 0xa matched to `prediction-online` (one correct), one
    /// unmatched bet by 0xb and one bet on a market still open.
    fn omen_fixture() -> MockSubgraph {
        MockSubgraph::new(
            vec![
                bet("b1", NOW - 2 * DAY, "0xa", 0, Some(0), "Will it rain in Paris?\u{241f}\"Yes\",\"No\"\u{241f}weather"),
                bet("b2", NOW - DAY, "0xa", 1, Some(0), "Will BTC hit 100k?"),
                bet("b3", NOW - DAY + 100, "0xb", 0, Some(0), "Will the match end in a draw?"),
                bet("b4", NOW - 3 * 3600, "0xa", 0, None, "Will it snow?"),
            ],
            vec![
                request("0xa", NOW - 2 * DAY - 600, "Will it rain in Paris?", "prediction-online"),
                request("0xa", NOW - DAY - 600, "Will BTC hit 100k", "prediction-online"),
                // Sent after the bet, so not the one that produced it
                request("0xa", NOW - DAY + 600, "Will BTC hit 100k?", "claude-prediction-offline"),
            ],
        )
    }

    fn omen(mock: &Arc<MockSubgraph>, page_size: usize) -> (OmenBetSource, Enricher) {
        let source = OmenBetSource::new(Box::new(mock.clone()), page_size);
        let mech = MechRequestSource::new(
            "omen",
            Box::new(MechSubgraph::new(Box::new(mock.clone()))),
            page_size,
            TTL,
        );
        (source, Enricher::new(mech))
    }

    fn week_window() -> TimeWindow {
        TimeWindow {
            start: NOW - 7 * DAY,
            end: 1_704_931_199,
        }
    }

    fn temp_cache_path() -> PathBuf {
        std::env::temp_dir().join(format!("tool_accuracy_it_{}.json", uuid::Uuid::new_v4()))
    }

    // -- count-bounded runs --

    #[tokio::test]
    async fn test_omen_last_end_to_end() {
        let mock = Arc::new(omen_fixture());
        let (source, enricher) = omen(&mock, 1000);
        let mut cache = MemoryCache::new();

        let summary = run_last(&source, &enricher, &mut cache, 10, NOW - 14 * DAY, NOW)
            .await
            .unwrap()
            .expect("resolved bets");

        assert_eq!(summary.bet_count(), 3);
        assert_eq!(summary.enrichment.agents, 2);
        assert_eq!(summary.enrichment.matched(), 2);

        assert_eq!(summary.stats.len(), 2);
        assert_eq!(summary.stats[0].tool, "prediction-online");
        assert_eq!((summary.stats[0].total, summary.stats[0].correct), (2, 1));
        assert_eq!(summary.stats[0].accuracy_pct, 50.0);
        assert_eq!(summary.stats[1].tool, UNKNOWN_TOOL);
        assert_eq!(summary.stats[1].total, 1);

        let overall = summary.overall.as_ref().unwrap();
        assert_eq!(overall.accuracy_pct, 50.0);

        let table = render_table("Tool accuracy statistics (3 bets fetched)", &summary.stats);
        assert!(table.contains("Overall (known tools): 1/2 correct (50.0% accuracy)"));
        assert!(table.contains("Unmatched bets (no mech request found): 1"));

        // One mech lookup per distinct agent
        assert_eq!(mock.count_calls("MechSender"), 2);
    }

    #[tokio::test]
    async fn test_omen_latest_paginates() {
        let mock = Arc::new(omen_fixture());
        let (source, enricher) = omen(&mock, 2);
        let mut cache = MemoryCache::new();

        let summary = run_last(&source, &enricher, &mut cache, 3, NOW - 14 * DAY, NOW)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.bet_count(), 3);
        assert_eq!(mock.count_calls("LatestResolvedBets"), 2);
    }

    #[tokio::test]
    async fn test_no_resolved_bets() {
        let mock = Arc::new(MockSubgraph::new(
            vec![bet("b1", NOW - DAY, "0xa", 0, None, "Open market?")],
            vec![],
        ));
        let (source, enricher) = omen(&mock, 1000);
        let mut cache = MemoryCache::new();

        let summary = run_last(&source, &enricher, &mut cache, 10, 0, NOW).await.unwrap();
        assert!(summary.is_none());
        assert_eq!(mock.count_calls("MechSender"), 0);
    }

    #[tokio::test]
    async fn test_failing_agent_counts_as_unknown() {
        let mock = Arc::new(omen_fixture().failing_agent("0xa"));
        let (source, enricher) = omen(&mock, 1000);
        let mut cache = MemoryCache::new();

        let summary = run_last(&source, &enricher, &mut cache, 10, NOW - 14 * DAY, NOW)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.enrichment.failed_agents, 1);
        assert_eq!(summary.stats.len(), 1);
        assert_eq!(summary.stats[0].tool, UNKNOWN_TOOL);
        assert_eq!(summary.stats[0].total, 3);
        assert!(summary.overall.is_none());
    }

    #[test]
    fn test_blocking_run() {
        let mock = Arc::new(omen_fixture());
        let (source, enricher) = omen(&mock, 1000);
        let mut cache = MemoryCache::new();

        let summary = tokio_test::block_on(run_last(&source, &enricher, &mut cache, 1, 0, NOW))
            .unwrap()
            .unwrap();
        assert_eq!(summary.bet_count(), 1);
        // Latest bet first
        assert_eq!(summary.enrichment.bets[0].bet.bet_id, "b3");
    }

    // -- polymarket --

    #[tokio::test]
    async fn test_polymarket_last_skips_unresolved() {
        let mock = Arc::new(MockSubgraph::new(
            vec![
                bet("0x05", NOW - 3600, "0xa", 1, None, "Will ETH reach 5k?"),
                bet("0x04", NOW - 2 * 3600, "0xa", 1, Some(1), "Will ETH flip BTC?"),
                bet("0x03", NOW - 3 * 3600, "0xb", 0, None, "Will it rain?"),
                bet("0x02", NOW - 4 * 3600, "0xa", 0, Some(1), "Will SOL reach 500?"),
                bet("0x01", NOW - 5 * 3600, "0xa", 0, Some(0), "Will DOGE reach 1?"),
            ],
            vec![request("0xa", NOW - 2 * 3600 - 60, "Will ETH flip BTC?", "superforcaster")],
        ));
        let source = PolymarketBetSource::new(Box::new(mock.clone()), 2);
        let mech = MechRequestSource::new(
            "polymarket",
            Box::new(MechSubgraph::new(Box::new(mock.clone()))),
            1000,
            TTL,
        );
        let enricher = Enricher::new(mech);
        let mut cache = MemoryCache::new();

        let summary = run_last(&source, &enricher, &mut cache, 2, NOW - 70 * DAY, NOW)
            .await
            .unwrap()
            .unwrap();

        let ids: Vec<_> = summary.enrichment.bets.iter().map(|b| b.bet.bet_id.as_str()).collect();
        assert_eq!(ids, vec!["0x04", "0x02"]);
        assert_eq!(mock.count_calls("TraderAgentBets"), 2);

        assert_eq!(summary.stats[0].tool, "superforcaster");
        assert_eq!(summary.stats[0].accuracy_pct, 100.0);
        assert_eq!(summary.stats[1].tool, UNKNOWN_TOOL);
        assert_eq!(summary.stats[1].correct, 0);
        assert!(cache.get("mech:polymarket:0xa").is_some());
    }

    // -- timeline runs --

    #[tokio::test]
    async fn test_timeline_second_run_served_from_disk_cache() {
        let path = temp_cache_path();
        let mock = Arc::new(omen_fixture());
        let (source, enricher) = omen(&mock, 1000);
        let window = week_window();

        let mut cache = DiskCache::load(&path);
        let first = run_timeline(&source, &enricher, &mut cache, window, NOW, TTL)
            .await
            .unwrap()
            .unwrap();
        let calls_after_first = mock.calls().len();
        assert_eq!(first.summary.bet_count(), 3);

        // Fresh process: reload from disk
        let mut reloaded = DiskCache::load(&path);
        let key = format!("bets:omen:{}:{}", window.start, window.end);
        assert!(reloaded.keys().contains(&key));
        assert!(reloaded.get("mech:omen:0xa").is_some());

        let second = run_timeline(&source, &enricher, &mut reloaded, window, NOW + 60, TTL)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mock.calls().len(), calls_after_first);
        assert_eq!(second.summary.stats, first.summary.stats);

        reloaded.clear().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_timeline_expired_cache_refetches() {
        let mock = Arc::new(omen_fixture());
        let (source, enricher) = omen(&mock, 1000);
        let window = week_window();
        let mut cache = MemoryCache::new();

        run_timeline(&source, &enricher, &mut cache, window, NOW, TTL).await.unwrap();
        assert_eq!(mock.count_calls("ResolvedBetsInRange"), 1);

        run_timeline(&source, &enricher, &mut cache, window, NOW + TTL, TTL).await.unwrap();
        assert_eq!(mock.count_calls("ResolvedBetsInRange"), 2);
        assert_eq!(mock.count_calls("MechSender"), 4);
    }

    #[tokio::test]
    async fn test_wider_window_refetches_mech_requests() {
        let mock = Arc::new(omen_fixture());
        let (source, enricher) = omen(&mock, 1000);
        let mut cache = MemoryCache::new();

        run_timeline(&source, &enricher, &mut cache, week_window(), NOW, TTL).await.unwrap();
        assert_eq!(mock.count_calls("MechSender"), 2);

        let wider = TimeWindow {
            start: NOW - 10 * DAY,
            ..week_window()
        };
        run_timeline(&source, &enricher, &mut cache, wider, NOW + 60, TTL).await.unwrap();
        assert_eq!(mock.count_calls("MechSender"), 4);
        assert_eq!(
            cache.get("mech:omen:0xa").unwrap().fetched_from,
            Some(NOW - 10 * DAY)
        );
    }

    #[tokio::test]
    async fn test_timeline_bins_and_chart() {
        let mock = Arc::new(omen_fixture());
        let (source, enricher) = omen(&mock, 1000);
        let mut cache = MemoryCache::new();
        let window = week_window();

        let run = run_timeline(&source, &enricher, &mut cache, window, NOW, TTL)
            .await
            .unwrap()
            .unwrap();

        let timeline = &run.timeline;
        assert_eq!(timeline.bins.len(), 8);
        let series = timeline.tool_series("prediction-online");
        assert_eq!(series.iter().flatten().count(), 2);
        assert_eq!(series[5], Some(100.0));
        assert_eq!(series[6], Some(0.0));

        let options = ChartOptions::from_config(
            &ChartConfig::default(),
            ChartOptions::title_for(window.start, window.end),
        );
        match chart::render(timeline, &options) {
            ChartOutcome::Rendered(text) => assert!(text.contains("Tool Accuracy Over Time")),
            ChartOutcome::Unavailable => assert!(!cfg!(feature = "chart")),
            ChartOutcome::NotEnoughData => panic!("expected a chart"),
        }
    }
}
