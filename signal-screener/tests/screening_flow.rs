//! Integration tests for the cached screening flow.
//!
//! Drives `ScreenerState::screen` end to end over an instrumented provider:
//! single-flight coalescing, determinism, trading-date rollover, on-disk
//! snapshots, per-symbol timeouts and ordering.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;
use futures::future::join_all;

use signal_screener::data::Universe;
use signal_screener::screener::{CacheKey, ScreenFilter};
use signal_screener::{ScreenerError, ScreenerState};

use common::*;

fn symbols(result: &signal_screener::screener::ScreenResult) -> Vec<String> {
    result.entries.iter().map(|e| e.symbol.clone()).collect()
}

// ============================================================================
// Single-flight and determinism
// ============================================================================

#[tokio::test]
async fn test_concurrent_screens_run_once() {
    let provider = Arc::new(InstrumentedProvider::new(universe_provider()));
    let state = state(provider.clone());

    let calls = (0..8).map(|_| {
        let state = Arc::clone(&state);
        async move { state.screen(Universe::All, ScreenFilter::default()).await }
    });
    let results: Vec<_> = join_all(calls).await.into_iter().map(Result::unwrap).collect();

    assert_eq!(provider.constituent_calls(), 1);
    let first = symbols(&results[0]);
    assert_eq!(first.len(), 4);
    for result in &results {
        assert_eq!(symbols(result), first);
        assert_eq!(result.scan_id, results[0].scan_id);
    }

    let stats = state.cache_stats().await.screening;
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.coalesced, 7);
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn test_repeat_screen_is_served_from_cache() {
    let provider = Arc::new(InstrumentedProvider::new(universe_provider()));
    let state = state(provider.clone());
    let filter = ScreenFilter {
        min_price: Some(15.0),
        ..Default::default()
    };

    let first = state.screen(Universe::All, filter.clone()).await.unwrap();
    let second = state.screen(Universe::All, filter).await.unwrap();

    assert!(!first.served_from_cache);
    assert!(second.served_from_cache);
    assert_eq!(first.entries, second.entries);
    assert_eq!(first.scan_id, second.scan_id);
    assert_eq!(provider.constituent_calls(), 1);
}

#[tokio::test]
async fn test_different_filters_are_cached_separately() {
    let provider = Arc::new(InstrumentedProvider::new(universe_provider()));
    let state = state(provider.clone());

    let cheap = ScreenFilter {
        max_price: Some(35.0),
        ..Default::default()
    };
    let dear = ScreenFilter {
        min_price: Some(35.0),
        ..Default::default()
    };
    let cheap_result = state.screen(Universe::All, cheap).await.unwrap();
    let dear_result = state.screen(Universe::All, dear).await.unwrap();

    let mut cheap_symbols = symbols(&cheap_result);
    cheap_symbols.sort();
    let mut dear_symbols = symbols(&dear_result);
    dear_symbols.sort();

    assert_eq!(cheap_symbols, vec!["AAA", "CCC"]);
    assert_eq!(dear_symbols, vec!["BBB", "DDD"]);
    assert!(!dear_result.served_from_cache);
    assert_eq!(provider.constituent_calls(), 2);
}

#[tokio::test]
async fn test_invalid_filter_rejected_without_scanning() {
    let provider = Arc::new(InstrumentedProvider::new(universe_provider()));
    let state = state(provider.clone());
    let filter = ScreenFilter {
        min_price: Some(50.0),
        max_price: Some(10.0),
        ..Default::default()
    };

    let err = state.screen(Universe::All, filter).await.unwrap_err();
    assert!(matches!(err, ScreenerError::InvalidFilter(_)));
    assert_eq!(provider.constituent_calls(), 0);
    assert_eq!(state.cache_stats().await.screening.misses, 0);
}

#[tokio::test]
async fn test_unknown_index_is_not_found() {
    let state = state(Arc::new(universe_provider()));
    let err = state
        .screen(Universe::Index("ftse".into()), ScreenFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ScreenerError::NotFound(_)));
}

#[tokio::test]
async fn test_empty_band_yields_empty_result() {
    let state = state(Arc::new(universe_provider()));
    let filter = ScreenFilter {
        min_price: Some(300.0),
        max_price: Some(310.0),
        ..Default::default()
    };

    let result = state.screen(Universe::All, filter).await.unwrap();
    assert!(result.is_empty());
    assert_eq!(result.scanned, 4);
    assert_eq!(result.filtered_out, 4);
}

// ============================================================================
// Rollover and snapshots
// ============================================================================

#[tokio::test]
async fn test_trading_date_rollover_invalidates_cache() {
    let provider = Arc::new(InstrumentedProvider::new(universe_provider()));
    let (state, clock) = state_with(test_config(), provider.clone());

    let before = state.screen(Universe::All, ScreenFilter::default()).await.unwrap();
    clock.advance(ChronoDuration::days(1));
    let after = state.screen(Universe::All, ScreenFilter::default()).await.unwrap();

    assert!(!before.served_from_cache);
    assert!(!after.served_from_cache);
    assert_eq!(provider.constituent_calls(), 2);
    assert_eq!(
        state.cache_stats().await.screening.trading_date,
        Some(trading_day() + ChronoDuration::days(1))
    );
}

#[tokio::test]
async fn test_scan_in_flight_across_rollover_stays_cancellable() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(
        InstrumentedProvider::new(universe_provider()).with_delay("AAA", Duration::from_secs(5)),
    );
    let (state, clock) = state_with(config_with_snapshots(dir.path().to_path_buf()), provider);

    let stale = {
        let state = Arc::clone(&state);
        tokio::spawn(async move { state.screen(Universe::All, ScreenFilter::default()).await })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;

    // The next day's first request rolls the cache over
    clock.advance(ChronoDuration::days(1));
    let cheap = ScreenFilter {
        max_price: Some(35.0),
        ..Default::default()
    };
    let waiter = {
        let state = Arc::clone(&state);
        tokio::spawn(async move { state.screen(Universe::All, cheap).await })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;

    let stats = state.cache_stats().await.screening;
    assert_eq!(stats.in_flight, 1);
    assert_eq!(stats.orphaned, 1);

    assert_eq!(state.cancel_scans().unwrap(), 2);
    assert_eq!(stale.await.unwrap().unwrap_err(), ScreenerError::ScanCancelled);
    assert_eq!(waiter.await.unwrap().unwrap_err(), ScreenerError::ScanCancelled);

    let stats = state.cache_stats().await.screening;
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.orphaned, 0);
    assert!(!dir.path().join(trading_day().to_string()).exists());
}

#[tokio::test]
async fn test_corrupt_snapshot_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let key = CacheKey::new(&Universe::All, &ScreenFilter::default(), trading_day());
    let date_dir = dir.path().join(trading_day().to_string());
    std::fs::create_dir_all(&date_dir).unwrap();
    let snapshot = date_dir.join(format!("{}.json", key.filter_hash));
    std::fs::write(&snapshot, b"{ not a screen result").unwrap();

    let provider = Arc::new(InstrumentedProvider::new(universe_provider()));
    let (state, _) = state_with(config_with_snapshots(dir.path().to_path_buf()), provider.clone());

    let result = state.screen(Universe::All, ScreenFilter::default()).await.unwrap();
    assert!(!result.served_from_cache);
    assert_eq!(result.entries.len(), 4);
    assert_eq!(provider.constituent_calls(), 1);

    // The recomputed result replaced the corrupt file
    let content = std::fs::read_to_string(&snapshot).unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&content).is_ok());
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first_provider = Arc::new(InstrumentedProvider::new(universe_provider()));
    let (first, _) = state_with(
        config_with_snapshots(dir.path().to_path_buf()),
        first_provider.clone(),
    );
    let computed = first.screen(Universe::All, ScreenFilter::default()).await.unwrap();

    let second_provider = Arc::new(InstrumentedProvider::new(universe_provider()));
    let (second, _) = state_with(
        config_with_snapshots(dir.path().to_path_buf()),
        second_provider.clone(),
    );
    let restored = second.screen(Universe::All, ScreenFilter::default()).await.unwrap();

    assert!(restored.served_from_cache);
    assert_eq!(restored.scan_id, computed.scan_id);
    assert_eq!(symbols(&restored), symbols(&computed));
    assert_eq!(second_provider.constituent_calls(), 0);
}

// ============================================================================
// Per-symbol failures and ordering
// ============================================================================

#[tokio::test]
async fn test_slow_symbol_is_skipped_without_stalling_scan() {
    let inner = universe_provider()
        .with_series(ramp("SLOW", 80, 20.0, 30.0, 100_000.0))
        .with_index(
            "NDX",
            vec![
                "AAA".into(),
                "BBB".into(),
                "CCC".into(),
                "DDD".into(),
                "SLOW".into(),
            ],
        );
    let provider = Arc::new(InstrumentedProvider::new(inner).with_delay("SLOW", Duration::from_secs(3)));
    let clock = Arc::new(signal_screener::data::FixedClock::on_date(trading_day()));
    let state = ScreenerState::new(test_config(), provider, clock)
        .with_timeouts(Duration::from_millis(300), Duration::from_secs(30));

    let started = Instant::now();
    let result = state.screen(Universe::All, ScreenFilter::default()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.scanned, 5);
    assert_eq!(result.entries.len(), 4);
    assert_eq!(result.skipped_count, 1);
    assert_eq!(result.skipped[0].symbol, "SLOW");
}

#[tokio::test]
async fn test_transient_failure_recovers_within_scan() {
    let provider = Arc::new(InstrumentedProvider::new(universe_provider()).failing("BBB", 2));
    let state = state(provider.clone());

    let result = state.screen(Universe::All, ScreenFilter::default()).await.unwrap();
    assert!(result.entries.iter().any(|e| e.symbol == "BBB"));
    assert_eq!(result.skipped_count, 0);
    assert_eq!(provider.bar_calls("BBB"), 3);
}

#[tokio::test]
async fn test_ordering_independent_of_completion_order() {
    let fast_first = Arc::new(
        InstrumentedProvider::new(universe_provider())
            .with_delay("AAA", Duration::from_millis(120))
            .with_delay("BBB", Duration::from_millis(60)),
    );
    let slow_first = Arc::new(
        InstrumentedProvider::new(universe_provider())
            .with_delay("DDD", Duration::from_millis(120))
            .with_delay("CCC", Duration::from_millis(60)),
    );

    let a = state(fast_first)
        .screen(Universe::All, ScreenFilter::default())
        .await
        .unwrap();
    let b = state(slow_first)
        .screen(Universe::All, ScreenFilter::default())
        .await
        .unwrap();

    assert_eq!(symbols(&a), symbols(&b));
    for pair in a.entries.windows(2) {
        assert!(pair[0].score.value >= pair[1].score.value);
    }
}

#[tokio::test]
async fn test_cancel_reaches_waiting_callers() {
    let provider = Arc::new(
        InstrumentedProvider::new(universe_provider()).with_delay("AAA", Duration::from_secs(5)),
    );
    let state = state(provider);

    let waiter = {
        let state = Arc::clone(&state);
        tokio::spawn(async move { state.screen(Universe::All, ScreenFilter::default()).await })
    };
    // Let the scan start
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(state.cancel_scans().unwrap(), 1);
    let err = waiter.await.unwrap().unwrap_err();
    assert_eq!(err, ScreenerError::ScanCancelled);
    assert_eq!(state.cache_stats().await.screening.in_flight, 0);
}
