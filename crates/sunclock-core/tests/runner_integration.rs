//! Integration tests for the tokio schedule and window runners.
//!
//! Time is paused, so the runtime jumps straight to the next timer and a
//! whole day passes instantly.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use tokio::sync::mpsc;

use sunclock_core::ephemeris::names;
use sunclock_core::events::ScheduleEvent;
use sunclock_core::scheduler::RearmReason;
use sunclock_core::testing::SyntheticEphemeris;
use sunclock_core::{
    CompareOp, Coordinates, Engine, OutputSettings, PropertySource, Schedule, ScheduleHandle,
    ScheduleSpec, SchedulerConfig, Selector, Side, TimeQuery, TokioClock, WindowEvent,
    WindowHandle, WindowSpec, WindowSwitch,
};

fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap()
}

fn engine(start: DateTime<Utc>) -> Arc<Engine> {
    let coords = Coordinates::new(48.1, 11.6).unwrap();
    let engine = Engine::new(coords, Arc::new(SyntheticEphemeris::new()))
        .unwrap()
        .with_clock(Arc::new(TokioClock::anchored_at(start)))
        .with_output(OutputSettings {
            utc_offset_minutes: Some(0),
            ..OutputSettings::default()
        });
    Arc::new(engine)
}

fn sunset_schedule() -> Schedule {
    Schedule::new(
        ScheduleSpec::new("porch", TimeQuery::sun(names::SUNSET)),
        SchedulerConfig::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_schedule_fires_and_rearms_for_tomorrow() {
    let engine = engine(at(4, 17, 0));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = ScheduleHandle::spawn(engine.clone(), sunset_schedule(), tx);

    match rx.recv().await.unwrap() {
        ScheduleEvent::Armed {
            wake_at, safety, ..
        } => {
            assert_eq!(wake_at, at(4, 18, 0));
            assert!(!safety);
        }
        other => panic!("expected Armed, got {other:?}"),
    }

    match rx.recv().await.unwrap() {
        ScheduleEvent::Fired {
            instant, side, payload, ..
        } => {
            assert_eq!(instant, at(4, 18, 0));
            assert_eq!(side, Side::Primary);
            assert!(payload.is_string());
        }
        other => panic!("expected Fired, got {other:?}"),
    }
    assert_eq!(engine.now(), at(4, 18, 0));

    match rx.recv().await.unwrap() {
        ScheduleEvent::Armed { wake_at, .. } => assert_eq!(wake_at, at(5, 18, 0)),
        other => panic!("expected Armed, got {other:?}"),
    }

    handle.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_close_emits_closed_and_stops() {
    let engine = engine(at(4, 12, 0));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = ScheduleHandle::spawn(engine, sunset_schedule(), tx);

    assert!(matches!(rx.recv().await, Some(ScheduleEvent::Armed { .. })));
    handle.close().await;

    assert!(matches!(rx.recv().await, Some(ScheduleEvent::Closed { .. })));
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_selector_switches_to_alternate_after_context_change() {
    let engine = engine(at(4, 12, 0));
    let spec = ScheduleSpec::new("porch", TimeQuery::sun(names::SUNSET)).with_alternate(
        TimeQuery::clock("21:00"),
        Selector::new(
            PropertySource::Message {
                path: "payload".into(),
            },
            CompareOp::Equal,
            Some(PropertySource::String {
                value: "late".into(),
            }),
        ),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = ScheduleHandle::spawn(engine, Schedule::new(spec, SchedulerConfig::default()), tx);

    assert!(matches!(
        rx.recv().await,
        Some(ScheduleEvent::Armed { side: Side::Primary, .. })
    ));

    assert!(handle.set_context(json!({ "payload": "late" })));
    assert!(matches!(
        rx.recv().await,
        Some(ScheduleEvent::Recalculated {
            reason: RearmReason::Context,
            ..
        })
    ));
    assert!(matches!(
        rx.recv().await,
        Some(ScheduleEvent::Armed { side: Side::Primary, wake_at, .. }) if wake_at == at(4, 18, 0)
    ));

    // At sunset the selector disagrees with the armed side.
    assert!(matches!(
        rx.recv().await,
        Some(ScheduleEvent::Recalculated {
            reason: RearmReason::SelectorChanged,
            ..
        })
    ));
    assert!(matches!(
        rx.recv().await,
        Some(ScheduleEvent::Armed { side: Side::Alternate, wake_at, .. }) if wake_at == at(4, 21, 0)
    ));
    assert!(matches!(
        rx.recv().await,
        Some(ScheduleEvent::Fired { side: Side::Alternate, instant, .. }) if instant == at(4, 21, 0)
    ));

    handle.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_window_resends_when_it_closes() {
    let engine = engine(at(4, 12, 0));
    let mut spec = WindowSpec::new("office", TimeQuery::clock("08:00"), TimeQuery::clock("17:00"));
    spec.resend_on_end = true;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = WindowHandle::spawn(engine.clone(), WindowSwitch::new(spec), tx);

    assert!(handle.input(json!({ "payload": 1 })));
    match rx.recv().await.unwrap() {
        WindowEvent::Output { output, .. } => {
            assert!(output.inside);
            assert!(!output.resent);
        }
        other => panic!("expected Output, got {other:?}"),
    }

    match rx.recv().await.unwrap() {
        WindowEvent::Output { output, .. } => {
            assert!(!output.inside);
            assert!(output.resent);
            assert_eq!(output.message, json!({ "payload": 1 }));
        }
        other => panic!("expected Output, got {other:?}"),
    }
    assert_eq!(engine.now(), at(4, 17, 0) + Duration::milliseconds(10));

    handle.close().await;
    assert!(matches!(rx.recv().await, Some(WindowEvent::Closed { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_window_closes_cleanly_after_receiver_is_dropped() {
    let engine = engine(at(4, 12, 0));
    let spec = WindowSpec::new("office", TimeQuery::clock("08:00"), TimeQuery::clock("17:00"));
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = WindowHandle::spawn(engine, WindowSwitch::new(spec), tx);
    drop(rx);

    // The task keeps running without a listener; close still completes.
    assert!(handle.input(json!({ "payload": 1 })));
    tokio::task::yield_now().await;
    handle.close().await;
}
