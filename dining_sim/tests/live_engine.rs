//! The engine on a multi-threaded Tokio runtime, checked by the oracle.

use dining_core::{EngineConfig, PhilosopherState, SimulationEngine};
use dining_sim::InvariantOracle;
use std::sync::Arc;
use std::time::Duration;

fn fast_config(n: usize) -> EngineConfig {
    EngineConfig::default()
        .with_philosophers(n)
        .with_thinking(Duration::from_millis(5))
        .with_eating(Duration::from_millis(4))
        .with_retry_backoff(Duration::from_millis(2))
        .with_hand_off(Duration::from_millis(1))
        .with_stagger(Duration::from_millis(1))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn start_stop_reset_cycles_across_workers() {
    let config = fast_config(9);
    let oracle = Arc::new(InvariantOracle::new(&config));
    let engine = SimulationEngine::on_current_runtime(config)
        .unwrap()
        .with_observer(oracle.clone());

    for cycle in 0..20 {
        engine.start();
        assert!(engine.is_running());
        tokio::time::sleep(Duration::from_millis(40)).await;

        if cycle % 2 == 0 {
            engine.stop();
        } else {
            engine.reset();
            assert!(engine.resources().iter().all(|a| *a), "cycle {cycle}");
        }

        assert!(!engine.is_running());
        assert_eq!(engine.pending_timers(), 0, "cycle {cycle}");
        assert!(engine
            .snapshot()
            .states()
            .iter()
            .all(|s| *s == PhilosopherState::Uninitialized));

        // Nothing moves while stopped
        let events = oracle.event_count();
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(oracle.event_count(), events, "cycle {cycle}");
    }

    assert!(oracle.is_clean(), "{:?}", oracle.violations());
    let metrics = oracle.metrics();
    assert!(metrics.meals > 0);
    assert!(metrics.max_concurrent_eaters <= 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_snapshots_stay_consistent() {
    let config = fast_config(6);
    let engine = SimulationEngine::on_current_runtime(config).unwrap();
    engine.start();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let snapshot = engine.snapshot();
                    assert_eq!(snapshot.held_count(), 2 * snapshot.eating_count());
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
        })
        .collect();

    for reader in readers {
        reader.await.unwrap();
    }
    engine.stop();
    assert_eq!(engine.pending_timers(), 0);
}
