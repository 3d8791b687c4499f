//! End-to-end scenarios through the `App` operations.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use taxishift::app::App;
use taxishift::config::CoreConfig;
use taxishift::error::CoreError;
use taxishift::model::{Coordinates, DriverId, NewRide, SignalKind, SweepReport};
use taxishift::scoring::{DisabledScorer, FixedScorer, TripScorer};
use taxishift::storage::Storage;

fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes)
}

async fn app_with(scorer: Arc<dyn TripScorer>) -> App {
    let storage = Storage::in_memory().await.unwrap();
    App::new(storage, &CoreConfig::default(), scorer)
}

async fn app() -> App {
    app_with(Arc::new(DisabledScorer)).await
}

/// An app over a WAL file database with a real connection pool, so
/// concurrent requests actually overlap.
async fn file_backed_app(dir: &TempDir) -> App {
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("taxishift.db").display());
    let storage = Storage::new(&url).await.unwrap();
    App::new(storage, &CoreConfig::default(), Arc::new(DisabledScorer))
}

fn city_ride() -> NewRide {
    NewRide {
        start_lat: 53.3498,
        start_lng: -6.2603,
        dest_lat: 53.3382,
        dest_lng: -6.2591,
        address: Some("St Stephen's Green".to_string()),
        predicted_score: Some(3),
    }
}

#[tokio::test]
async fn test_shift_with_one_break() {
    let app = app().await;
    let driver = DriverId::new("driver-7");

    assert_ok!(app.start_shift(&driver, t(0), Some(8 * 3_600_000)).await);
    assert_ok!(app.pause_shift(&driver, t(120), None).await);
    let pause = assert_ok!(app.continue_shift(&driver, t(150)).await);
    assert_eq!(pause.duration_ms, 30 * 60_000);

    let summary = assert_ok!(app.stop_shift(&driver, t(480)).await);
    let stats = summary.statistics;
    assert_eq!(stats.total_duration_ms, 480 * 60_000);
    assert_eq!(stats.break_time_ms, 30 * 60_000);
    assert_eq!(stats.work_time_ms, 450 * 60_000);
    assert_eq!(stats.num_breaks, 1);
    assert_eq!(stats.average_break_ms, 30 * 60_000);

    let status = assert_ok!(app.get_shift_status(&driver, t(481)).await);
    assert!(!status.is_on_shift);
}

#[tokio::test]
async fn test_illegal_signals_are_rejected() {
    let app = app().await;
    let driver = DriverId::new("driver-7");

    let err = assert_err!(app.pause_shift(&driver, t(0), None).await);
    assert!(matches!(err, CoreError::InvalidTransition { .. }));

    assert_ok!(app.start_shift(&driver, t(0), None).await);

    let err = assert_err!(app.start_shift(&driver, t(1), None).await);
    assert!(err.to_string().contains("active shift already exists"));

    let err = assert_err!(app.continue_shift(&driver, t(2)).await);
    assert!(matches!(
        err,
        CoreError::InvalidTransition {
            from: Some(SignalKind::Start),
            to: SignalKind::Continue,
            ..
        }
    ));

    assert_ok!(app.pause_shift(&driver, t(3), None).await);
    let err = assert_err!(app.pause_shift(&driver, t(4), None).await);
    assert!(matches!(err, CoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_ride_requires_running_shift() {
    let app = app().await;
    let driver = DriverId::new("driver-7");

    let err = assert_err!(app.start_ride(&driver, &city_ride(), t(0)).await);
    assert_eq!(err.to_string(), "Cannot start ride: No active shift found");

    assert_ok!(app.start_shift(&driver, t(0), None).await);
    let ride = assert_ok!(app.start_ride(&driver, &city_ride(), t(5)).await);

    let err = assert_err!(app.start_ride(&driver, &city_ride(), t(6)).await);
    assert!(err.to_string().starts_with("Cannot start ride"));

    // No signal while the ride is open.
    assert_err!(app.pause_shift(&driver, t(7), None).await);

    let summary = assert_ok!(app.end_ride(ride.id, t(20), Some(1_240), Some(1.3)).await);
    assert_eq!(summary.duration_ms, 15 * 60_000);

    assert_ok!(app.pause_shift(&driver, t(21), None).await);
    let eligibility = assert_ok!(app.can_start_ride(&driver).await);
    assert!(!eligibility.can_start);

    assert_ok!(app.continue_shift(&driver, t(31)).await);
    let stopped = assert_ok!(app.stop_shift(&driver, t(60)).await);
    assert_eq!(stopped.statistics.total_earnings_cents, 1_240);
    assert_eq!(stopped.statistics.break_time_ms, 10 * 60_000);
}

#[tokio::test]
async fn test_concurrent_shift_starts_admit_one() {
    let app = app().await;
    let driver = DriverId::new("driver-7");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let app = app.clone();
            let driver = driver.clone();
            tokio::spawn(async move { app.start_shift(&driver, t(i), None).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert!(matches!(e, CoreError::InvalidTransition { .. }), "{e}"),
        }
    }
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_concurrent_ride_starts_admit_one() {
    let app = app().await;
    let driver = DriverId::new("driver-7");
    assert_ok!(app.start_shift(&driver, t(0), None).await);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let app = app.clone();
            let driver = driver.clone();
            tokio::spawn(async move { app.start_ride(&driver, &city_ride(), t(10 + i)).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert!(matches!(e, CoreError::CannotStartRide(_)), "{e}"),
        }
    }
    assert_eq!(successes, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_file_database_races_fail_with_domain_errors() {
    let dir = TempDir::new().unwrap();
    let app = file_backed_app(&dir).await;

    for round in 0..10 {
        let driver = DriverId::new(format!("driver-{round}"));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let app = app.clone();
                let driver = driver.clone();
                tokio::spawn(async move { app.start_shift(&driver, t(i), None).await })
            })
            .collect();
        let mut started = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => started += 1,
                Err(e) => assert_eq!(e.kind(), "invalid_transition", "{e}"),
            }
        }
        assert_eq!(started, 1, "round {round}");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let app = app.clone();
                let driver = driver.clone();
                tokio::spawn(async move { app.start_ride(&driver, &city_ride(), t(10 + i)).await })
            })
            .collect();
        let mut rides = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => rides += 1,
                Err(e) => assert_eq!(e.kind(), "cannot_start_ride", "{e}"),
            }
        }
        assert_eq!(rides, 1, "round {round}");
    }
}

#[tokio::test]
async fn test_evaluate_ride_names_bad_axis() {
    let app = app_with(Arc::new(FixedScorer(Some(4.0)))).await;

    let err = assert_err!(
        app.evaluate_ride(Coordinates::new(91.0, -6.0), Coordinates::new(53.0, -6.0), t(0))
            .await
    );
    assert!(err.to_string().contains("latitude"));

    let err = assert_err!(
        app.evaluate_ride(Coordinates::new(53.0, 181.0), Coordinates::new(53.0, -6.0), t(0))
            .await
    );
    assert!(err.to_string().contains("longitude"));

    let score = assert_ok!(
        app.evaluate_ride(Coordinates::new(53.35, -6.26), Coordinates::new(53.43, -6.25), t(0))
            .await
    );
    assert_eq!(score, Some(4));
}

#[tokio::test]
async fn test_sweep_deletes_empty_shift_and_finalizes_busy_one() {
    let app = app().await;
    let idle = DriverId::new("idle");
    let busy = DriverId::new("busy");

    let empty_shift = assert_ok!(app.start_shift(&idle, t(0), None).await);

    let busy_shift = assert_ok!(app.start_shift(&busy, t(0), None).await);
    let ride = assert_ok!(app.start_ride(&busy, &city_ride(), t(10)).await);
    assert_ok!(app.end_ride(ride.id, t(25), None, None).await);

    let later = t(2 * 24 * 60);

    let report = app.sweep_expired(&idle, later).await;
    assert_eq!(report.shift_deleted, Some(empty_shift.id));
    assert!(report.shift_finalized.is_none());

    let report = app.sweep_expired(&busy, later).await;
    assert_eq!(report.shift_finalized, Some(busy_shift.id));
    assert!(report.shift_deleted.is_none());

    let rides = assert_ok!(app.list_rides(busy_shift.id, false).await);
    assert_eq!(rides.len(), 1);

    // Nothing left to do.
    assert_eq!(app.sweep_expired(&idle, later).await, SweepReport::default());
    assert_eq!(app.sweep_expired(&busy, later).await, SweepReport::default());
}

#[tokio::test]
async fn test_sweep_closes_abandoned_ride_unpaid() {
    let app = app().await;
    let driver = DriverId::new("driver-7");
    let shift = assert_ok!(app.start_shift(&driver, t(0), None).await);
    assert_ok!(app.start_ride(&driver, &city_ride(), t(5)).await);

    let report = app.sweep_expired(&driver, t(5 * 60)).await;
    assert_eq!(report.rides_closed, 1);

    let err = assert_err!(app.get_ride_status(&driver, t(5 * 60), None).await);
    assert!(matches!(err, CoreError::NoActiveRide));

    let stopped = assert_ok!(app.stop_shift(&driver, t(6 * 60)).await);
    assert_eq!(stopped.shift_id, shift.id);
    assert_eq!(stopped.statistics.total_earnings_cents, 0);
}
