//! Poll supervisor behaviour on tokio's paused clock
//!
//! Time only advances when every task is idle, so intervals and the lifetime
//! ceiling are exact.

mod helpers;

use docdesk_admin::{AnalysisStore, PollExit, PollSettings, PollSupervisor};
use docdesk_common::events::{DocdeskEvent, EventBus};
use docdesk_common::{AnalysisStatus, DocumentId};
use helpers::{completed, network_error, record, ScriptedAnalysisGateway};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct Fixture {
    gateway: Arc<ScriptedAnalysisGateway>,
    store: Arc<AnalysisStore>,
    events: EventBus,
    supervisor: PollSupervisor,
}

fn fixture() -> Fixture {
    let gateway = Arc::new(ScriptedAnalysisGateway::new());
    let store = Arc::new(AnalysisStore::new());
    let events = EventBus::new(100);
    let supervisor = PollSupervisor::new(
        gateway.clone(),
        store.clone(),
        events.clone(),
        PollSettings::default(),
    );
    Fixture {
        gateway,
        store,
        events,
        supervisor,
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<DocdeskEvent>) -> Vec<DocdeskEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Single poller per document
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_start_shares_one_poller() {
    let f = fixture();
    f.store.set(record(1, AnalysisStatus::Pending));
    f.gateway.script(
        1,
        vec![
            Ok(Some(record(1, AnalysisStatus::Processing))),
            Ok(Some(record(1, AnalysisStatus::Processing))),
            Ok(Some(completed(1, "ok"))),
        ],
    );

    let first = f.supervisor.start_polling(DocumentId(1));
    let second = f.supervisor.start_polling(DocumentId(1));

    assert_eq!(first, second);
    assert_eq!(f.supervisor.live_count(), 1);

    first.finished().await;

    assert_eq!(f.gateway.fetch_count(1), 3);
    assert_eq!(f.store.status(DocumentId(1)), AnalysisStatus::Completed);
    assert_eq!(first.exit_reason(), Some(PollExit::Completed));
    assert!(!f.supervisor.is_polling(DocumentId(1)));
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_finish_creates_new_poller() {
    let f = fixture();
    f.store.set(record(2, AnalysisStatus::Pending));
    f.gateway.script_statuses(2, &[AnalysisStatus::Failed]);

    let first = f.supervisor.start_polling(DocumentId(2));
    first.finished().await;
    assert_eq!(first.exit_reason(), Some(PollExit::Failed));

    f.store.set(record(2, AnalysisStatus::Pending));
    let second = f.supervisor.start_polling(DocumentId(2));
    assert_ne!(first, second);
    assert!(second.generation() > first.generation());
    second.cancel();
}

// ============================================================================
// Terminal states and NotFound
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_analysis_reaches_completed() {
    // Given: an analysis just requested for document 7
    let f = fixture();
    let mut rx = f.events.subscribe();
    f.store.set(record(7, AnalysisStatus::Pending));
    f.gateway.script(
        7,
        vec![
            Ok(Some(record(7, AnalysisStatus::Processing))),
            Ok(Some(completed(7, "ok"))),
        ],
    );

    let started = Instant::now();
    let handle = f.supervisor.start_polling(DocumentId(7));

    // When: the first poll fires after one interval
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(f.gateway.fetch_count(7), 1);
    assert_eq!(f.store.status(DocumentId(7)), AnalysisStatus::Processing);
    assert!(handle.is_live());

    // Then: the second poll settles it
    handle.finished().await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
    let stored = f.store.get(DocumentId(7)).unwrap();
    assert_eq!(stored.status, AnalysisStatus::Completed);
    assert_eq!(stored.summary.as_deref(), Some("ok"));

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type(), "AnalysisCompleted");

    // No fetch after a terminal state
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(f.gateway.fetch_count(7), 2);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_clears_entry_and_stops() {
    let f = fixture();
    f.store.set(record(9, AnalysisStatus::Processing));
    f.gateway.script(9, vec![Ok(None)]);

    let handle = f.supervisor.start_polling(DocumentId(9));
    handle.finished().await;

    assert_eq!(handle.exit_reason(), Some(PollExit::NotFound));
    assert!(f.store.get(DocumentId(9)).is_none());
    assert_eq!(f.store.status(DocumentId(9)), AnalysisStatus::None);
}

#[tokio::test(start_paused = true)]
async fn test_stale_read_does_not_regress_status() {
    let f = fixture();
    f.store.set(record(4, AnalysisStatus::Processing));
    f.gateway.script_statuses(
        4,
        &[
            AnalysisStatus::Pending,
            AnalysisStatus::Processing,
            AnalysisStatus::Completed,
        ],
    );

    let handle = f.supervisor.start_polling(DocumentId(4));

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(f.store.status(DocumentId(4)), AnalysisStatus::Processing);

    handle.finished().await;
    assert_eq!(f.gateway.fetch_count(4), 3);
    assert_eq!(f.store.status(DocumentId(4)), AnalysisStatus::Completed);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_discards_in_flight_fetch() {
    let f = fixture();
    f.store.set(record(5, AnalysisStatus::Pending));
    f.gateway.script(5, vec![Ok(Some(completed(5, "late")))]);
    f.gateway.set_fetch_delay(5, Duration::from_secs(2));

    let handle = f.supervisor.start_polling(DocumentId(5));

    // fetch starts at 3s and would answer at 5s
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(f.gateway.fetch_count(5), 1);

    assert!(f.supervisor.cancel(DocumentId(5)));
    assert!(!handle.is_live());
    handle.finished().await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(handle.exit_reason(), Some(PollExit::Cancelled));
    assert_eq!(f.store.status(DocumentId(5)), AnalysisStatus::Pending);
    assert_eq!(f.gateway.fetch_count(5), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_idempotent() {
    let f = fixture();
    assert!(!f.supervisor.cancel(DocumentId(1)));

    f.store.set(record(1, AnalysisStatus::Pending));
    f.gateway.script_statuses(1, &[AnalysisStatus::Processing]);
    let handle = f.supervisor.start_polling(DocumentId(1));

    handle.cancel();
    handle.cancel();
    assert!(!f.supervisor.cancel(DocumentId(1)));
    handle.finished().await;
    assert_eq!(f.gateway.fetch_count(1), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_stops_every_poller() {
    let f = fixture();
    for id in 1..=3 {
        f.store.set(record(id, AnalysisStatus::Processing));
        f.gateway.script_statuses(id, &[AnalysisStatus::Processing]);
    }
    let handles: Vec<_> = (1..=3)
        .map(|id| f.supervisor.start_polling(DocumentId(id)))
        .collect();

    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(f.supervisor.cancel_all(), 3);
    assert_eq!(f.supervisor.live_count(), 0);

    for handle in &handles {
        handle.finished().await;
    }
    tokio::time::sleep(Duration::from_secs(30)).await;
    for id in 1..=3 {
        assert_eq!(f.gateway.fetch_count(id), 2);
    }
}

#[tokio::test(start_paused = true)]
async fn test_dropping_supervisor_cancels_polling() {
    let f = fixture();
    f.store.set(record(1, AnalysisStatus::Processing));
    f.gateway.script_statuses(1, &[AnalysisStatus::Processing]);

    let handle = f.supervisor.start_polling(DocumentId(1));
    let Fixture {
        gateway, supervisor, ..
    } = f;
    drop(supervisor);

    handle.finished().await;
    assert_eq!(handle.exit_reason(), Some(PollExit::Cancelled));
    assert_eq!(gateway.fetch_count(1), 0);
}

// ============================================================================
// Lifetime ceiling and failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_polling_retires_after_five_minutes() {
    let f = fixture();
    let mut rx = f.events.subscribe();
    f.store.set(record(3, AnalysisStatus::Pending));
    f.gateway.script_statuses(3, &[AnalysisStatus::Processing]);

    let started = Instant::now();
    let handle = f.supervisor.start_polling(DocumentId(3));
    handle.finished().await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(300), "retired early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(301), "retired late: {:?}", elapsed);
    assert_eq!(
        handle.exit_reason(),
        Some(PollExit::TimedOut {
            last_status: AnalysisStatus::Processing
        })
    );

    // last applied record survives retirement
    assert_eq!(f.store.status(DocumentId(3)), AnalysisStatus::Processing);
    let fetches = f.gateway.fetch_count(3);
    assert!((98..=100).contains(&fetches), "unexpected fetch count {}", fetches);

    let events = drain(&mut rx);
    assert!(matches!(
        events.last(),
        Some(DocdeskEvent::AnalysisPollTimedOut { document_id, last_status: AnalysisStatus::Processing, .. })
            if *document_id == DocumentId(3)
    ));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(f.gateway.fetch_count(3), fetches);
}

#[tokio::test(start_paused = true)]
async fn test_ceiling_fires_during_slow_fetch() {
    let f = fixture();
    f.store.set(record(3, AnalysisStatus::Processing));
    f.gateway.script_statuses(3, &[AnalysisStatus::Processing]);
    f.gateway.set_fetch_delay(3, Duration::from_secs(400));

    let started = Instant::now();
    let handle = f.supervisor.start_polling(DocumentId(3));
    handle.finished().await;

    assert!(started.elapsed() < Duration::from_secs(301));
    assert_eq!(f.gateway.fetch_count(3), 1);
    assert!(matches!(handle.exit_reason(), Some(PollExit::TimedOut { .. })));
    assert_eq!(f.store.status(DocumentId(3)), AnalysisStatus::Processing);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_retires_without_retry() {
    let f = fixture();
    let mut rx = f.events.subscribe();
    f.store.set(record(6, AnalysisStatus::Pending));
    f.gateway.script(
        6,
        vec![
            Ok(Some(record(6, AnalysisStatus::Processing))),
            Err(network_error()),
        ],
    );

    let handle = f.supervisor.start_polling(DocumentId(6));
    handle.finished().await;

    assert_eq!(handle.exit_reason(), Some(PollExit::FetchFailed(network_error())));
    assert_eq!(f.store.status(DocumentId(6)), AnalysisStatus::Processing);
    assert!(!f.supervisor.is_polling(DocumentId(6)));

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| e.event_type() == "AnalysisPollFailed" && e.document_id() == Some(DocumentId(6))));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(f.gateway.fetch_count(6), 2);
}

#[tokio::test(start_paused = true)]
async fn test_custom_interval_is_honoured() {
    let gateway = Arc::new(ScriptedAnalysisGateway::new());
    let store = Arc::new(AnalysisStore::new());
    let supervisor = PollSupervisor::new(
        gateway.clone(),
        store.clone(),
        EventBus::new(10),
        PollSettings {
            interval: Duration::from_secs(10),
            max_duration: Duration::from_secs(25),
        },
    );
    store.set(record(1, AnalysisStatus::Pending));
    gateway.script_statuses(1, &[AnalysisStatus::Pending]);

    let handle = supervisor.start_polling(DocumentId(1));
    handle.finished().await;

    assert_eq!(gateway.fetch_count(1), 2);
    assert!(matches!(handle.exit_reason(), Some(PollExit::TimedOut { .. })));
}
