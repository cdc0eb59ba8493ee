mod common;
use common::*;

use chrono::Duration;
use std::sync::Arc;

fn window() -> Duration {
    Duration::milliseconds(500)
}

#[test]
fn test_derives_power_from_closest_current() -> Result<()> {
    common_setup();
    let (store, _dir) = Factory::store()?;

    store.append_validated("10.0.0.1", Factory::timestamp(10, 0, 0, 0), 100.0, Unit::Volts);
    store.append_validated("10.0.0.2", Factory::timestamp(10, 0, 0, 200_000), 0.5, Unit::Amps);

    let sample = store.derive_power(window());

    let expected = PowerSample {
        timestamp: Factory::timestamp(10, 0, 0, 0),
        power: 50.0,
    };
    assert_eq!(sample, Some(expected));
    assert_eq!(store.snapshot_power(), vec![expected]);
    assert!(!store.is_dirty());

    let contents = std::fs::read_to_string(store.power_log().path())?;
    assert_eq!(contents, "50.0|2024-03-05 10:00:00.000000\n");

    Ok(())
}

#[test]
fn test_current_outside_window_still_clears_dirty() -> Result<()> {
    common_setup();
    let (store, _dir) = Factory::store()?;

    store.append_validated("10.0.0.1", Factory::timestamp(10, 0, 0, 0), 100.0, Unit::Volts);
    store.append_validated("10.0.0.2", Factory::timestamp(10, 0, 2, 0), 0.5, Unit::Amps);

    assert_eq!(store.derive_power(window()), None);
    assert!(store.snapshot_power().is_empty());
    assert!(!store.is_dirty());
    assert_eq!(std::fs::read_to_string(store.power_log().path())?, "");

    Ok(())
}

#[test]
fn test_window_is_inclusive() -> Result<()> {
    let (store, _dir) = Factory::store()?;

    store.append_validated("10.0.0.1", Factory::timestamp(10, 0, 0, 0), 10.0, Unit::Volts);
    store.append_validated("10.0.0.2", Factory::timestamp(10, 0, 0, 500_000), 1.0, Unit::Amps);

    assert!(store.derive_power(window()).is_some());

    Ok(())
}

#[test]
fn test_second_pass_without_writes_is_noop() -> Result<()> {
    let (store, _dir) = Factory::store()?;

    store.append_validated("10.0.0.1", Factory::timestamp(10, 0, 0, 0), 100.0, Unit::Volts);
    store.append_validated("10.0.0.2", Factory::timestamp(10, 0, 0, 0), 0.5, Unit::Amps);

    assert!(store.derive_power(window()).is_some());
    assert_eq!(store.derive_power(window()), None);
    assert_eq!(store.snapshot_power().len(), 1);
    assert_eq!(store.power_log().samples_written(), 1);

    Ok(())
}

#[test]
fn test_empty_partition_keeps_dirty() -> Result<()> {
    let (store, _dir) = Factory::store()?;

    store.append_validated("10.0.0.1", Factory::timestamp(10, 0, 0, 0), 100.0, Unit::Volts);

    assert_eq!(store.derive_power(window()), None);
    assert!(store.is_dirty());

    // the pending voltage pairs once a current arrives
    store.append_validated("10.0.0.2", Factory::timestamp(10, 0, 0, 100_000), 0.25, Unit::Amps);
    assert_eq!(store.derive_power(window()).map(|s| s.power), Some(25.0));

    Ok(())
}

#[test]
fn test_anchor_is_last_appended_voltage() -> Result<()> {
    let (store, _dir) = Factory::store()?;

    // appended later but carries the older timestamp
    store.append_validated("10.0.0.1", Factory::timestamp(10, 0, 5, 0), 10.0, Unit::Volts);
    store.append_validated("10.0.0.1", Factory::timestamp(10, 0, 1, 0), 20.0, Unit::Volts);
    store.append_validated("10.0.0.2", Factory::timestamp(10, 0, 1, 0), 1.0, Unit::Amps);
    store.append_validated("10.0.0.2", Factory::timestamp(10, 0, 5, 0), 0.5, Unit::Amps);

    let sample = store.derive_power(window()).unwrap();
    assert_eq!(sample.timestamp, Factory::timestamp(10, 0, 1, 0));
    assert_eq!(sample.power, 20.0);

    Ok(())
}

#[test]
fn test_closest_current_wins_and_ties_go_to_newest() -> Result<()> {
    let (store, _dir) = Factory::store()?;

    store.append_validated("10.0.0.1", Factory::timestamp(10, 0, 0, 500_000), 100.0, Unit::Volts);
    // 100ms before and 100ms after the anchor, then one 300ms away
    store.append_validated("10.0.0.2", Factory::timestamp(10, 0, 0, 400_000), 0.1, Unit::Amps);
    store.append_validated("10.0.0.2", Factory::timestamp(10, 0, 0, 600_000), 0.2, Unit::Amps);
    store.append_validated("10.0.0.2", Factory::timestamp(10, 0, 0, 800_000), 0.3, Unit::Amps);

    let sample = store.derive_power(window()).unwrap();
    assert!((sample.power - 20.0).abs() < 1e-9);

    Ok(())
}

#[test]
fn test_current_entries_are_reused_across_passes() -> Result<()> {
    let (store, _dir) = Factory::store()?;

    store.append_validated("10.0.0.2", Factory::timestamp(10, 0, 0, 0), 0.5, Unit::Amps);
    store.append_validated("10.0.0.1", Factory::timestamp(10, 0, 0, 0), 100.0, Unit::Volts);
    assert!(store.derive_power(window()).is_some());

    store.append_validated("10.0.0.1", Factory::timestamp(10, 0, 0, 100_000), 200.0, Unit::Volts);
    assert_eq!(store.derive_power(window()).map(|s| s.power), Some(100.0));

    assert_eq!(store.current_count(), 1);
    assert_eq!(store.snapshot_power().len(), 2);

    Ok(())
}

#[test]
fn test_history_is_capped_oldest_first() -> Result<()> {
    let (store, _dir) = Factory::store()?;
    let base = Factory::timestamp(10, 0, 0, 0);

    store.append_validated("10.0.0.2", base, 1.0, Unit::Amps);
    for i in 0..1000 {
        store.append_validated("10.0.0.1", base, i as f64, Unit::Volts);
        assert!(store.derive_power(window()).is_some());
    }
    assert_eq!(store.snapshot_power().len(), 1000);
    assert_eq!(store.snapshot_power()[0].power, 0.0);

    store.append_validated("10.0.0.1", base, 1000.0, Unit::Volts);
    assert!(store.derive_power(window()).is_some());

    let history = store.snapshot_power();
    assert_eq!(history.len(), 1000);
    assert_eq!(history[0].power, 1.0);
    assert_eq!(history[999].power, 1000.0);
    assert_eq!(store.power_log().samples_written(), 1001);

    Ok(())
}

#[test]
fn test_configured_history_limit() -> Result<()> {
    let (store, _dir) = Factory::store_with_history_limit(3)?;
    let base = Factory::timestamp(10, 0, 0, 0);

    store.append_validated("10.0.0.2", base, 1.0, Unit::Amps);
    for i in 0..5 {
        store.append_validated("10.0.0.1", base, i as f64, Unit::Volts);
        store.derive_power(window());
    }

    let powers: Vec<f64> = store.snapshot_power().iter().map(|s| s.power).collect();
    assert_eq!(powers, vec![2.0, 3.0, 4.0]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_lose_nothing() -> Result<()> {
    let (store, _dir) = Factory::store()?;
    let store = Arc::new(store);
    let base = Factory::timestamp(10, 0, 0, 0);

    let mut handles = Vec::new();
    for task in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..250 {
                let unit = if task % 2 == 0 { Unit::Volts } else { Unit::Amps };
                store.append_validated("10.0.0.1", base, 1.0, unit);
                tokio::task::yield_now().await;
            }
        }));
    }

    // a concurrent reader must not disturb the writers
    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..100 {
                store.derive_power(Duration::milliseconds(500));
                tokio::task::yield_now().await;
            }
        })
    };

    for handle in handles {
        handle.await?;
    }
    reader.await?;

    assert_eq!(store.voltage_count(), 1000);
    assert_eq!(store.current_count(), 1000);

    Ok(())
}

#[test]
fn test_concurrent_appends_from_threads() -> Result<()> {
    let (store, _dir) = Factory::store()?;
    let base = Factory::timestamp(10, 0, 0, 0);

    std::thread::scope(|scope| {
        for _ in 0..10 {
            scope.spawn(|| {
                for _ in 0..100 {
                    store.append_validated("10.0.0.2", base, 0.5, Unit::Amps);
                }
            });
        }
    });

    assert_eq!(store.current_count(), 1000);
    assert_eq!(store.voltage_count(), 0);

    Ok(())
}
