#![allow(clippy::unwrap_used)]

// Scenario tests for SyncCoordinator driven by a scripted source.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crema_api::PushRegistration;
use crema_core::{
    MachineCommand, MachineConfig, MachineModel, MachineSource, MachineSwitch, PushDelta,
    StatusMap, StatusSnapshot, StatusValue, SyncCoordinator, SyncError, SyncState,
};

// ── Fake source ─────────────────────────────────────────────────────

#[derive(Default)]
struct FakeSource {
    script: Mutex<VecDeque<Result<StatusMap, crema_api::Error>>>,
    latency: Duration,
    pulls: AtomicUsize,
    commands: Mutex<Vec<MachineCommand>>,
    push_opens: AtomicUsize,
    push_tx: Mutex<Option<mpsc::Sender<PushDelta>>>,
    refuse_push: AtomicBool,
}

impl FakeSource {
    fn with_pulls(pulls: Vec<Result<StatusMap, crema_api::Error>>) -> Self {
        Self {
            script: Mutex::new(pulls.into()),
            ..Self::default()
        }
    }

    fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    fn push_opens(&self) -> usize {
        self.push_opens.load(Ordering::SeqCst)
    }

    fn commands(&self) -> Vec<MachineCommand> {
        self.commands.lock().unwrap().clone()
    }

    fn push_sender(&self) -> mpsc::Sender<PushDelta> {
        self.push_tx.lock().unwrap().clone().unwrap()
    }
}

impl MachineSource for FakeSource {
    fn fetch_status(&self) -> impl Future<Output = Result<StatusMap, crema_api::Error>> + Send {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(StatusMap::new()));
        let latency = self.latency;
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            next
        }
    }

    fn send_command(
        &self,
        command: &MachineCommand,
    ) -> impl Future<Output = Result<(), crema_api::Error>> + Send {
        self.commands.lock().unwrap().push(command.clone());
        async { Ok(()) }
    }

    fn open_push(
        &self,
        deltas: mpsc::Sender<PushDelta>,
        cancel: CancellationToken,
    ) -> Result<PushRegistration, crema_api::Error> {
        self.push_opens.fetch_add(1, Ordering::SeqCst);
        if self.refuse_push.load(Ordering::SeqCst) {
            return Err(crema_api::Error::WebSocketConnect("refused".into()));
        }
        *self.push_tx.lock().unwrap() = Some(deltas);
        Ok(PushRegistration::detached(cancel))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    calls: AtomicUsize,
    last: Mutex<Option<Arc<StatusSnapshot>>>,
}

impl crema_core::StatusObserver for Recorder {
    fn on_status_update(&self, snapshot: &Arc<StatusSnapshot>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(Arc::clone(snapshot));
    }
}

impl Recorder {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last(&self) -> Arc<StatusSnapshot> {
        self.last.lock().unwrap().clone().unwrap()
    }
}

fn status(pairs: &[(&str, StatusValue)]) -> StatusMap {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn machine_config(model: MachineModel, push: bool) -> MachineConfig {
    let mut config = MachineConfig::new(
        "http://127.0.0.1:8081".parse().unwrap(),
        "GS012345",
        model,
    );
    config.sync.use_push_channel = push;
    config
}

fn coordinator(source: FakeSource) -> SyncCoordinator<FakeSource> {
    SyncCoordinator::new(machine_config(MachineModel::Gs3Av, false), source)
}

fn push_coordinator(source: FakeSource) -> SyncCoordinator<FakeSource> {
    SyncCoordinator::new(machine_config(MachineModel::Gs3Av, true), source)
}

fn transient() -> crema_api::Error {
    crema_api::Error::Api {
        status: 503,
        message: "gateway busy".into(),
    }
}

async fn next_change(stream: &mut crema_core::StatusStream) -> Arc<StatusSnapshot> {
    tokio::time::timeout(Duration::from_secs(5), stream.changed())
        .await
        .unwrap()
        .unwrap()
}

// ── Initialization ──────────────────────────────────────────────────

#[tokio::test]
async fn initialize_then_read_returns_exactly_pulled_keys() {
    let coord = coordinator(FakeSource::with_pulls(vec![Ok(status(&[
        ("power", StatusValue::Int(1)),
        ("coffee_set_temp", StatusValue::Float(96.2)),
    ]))]));

    coord.initialize().await.unwrap();

    let snap = coord.read();
    assert_eq!(snap.keys(), vec!["coffee_set_temp", "power"]);
    assert_eq!(coord.state(), SyncState::Polling);
    assert!(coord.health().last_update_success);
}

#[tokio::test]
async fn initialize_auth_failure_is_fatal_and_leaves_store_empty() {
    let coord = coordinator(FakeSource::with_pulls(vec![Err(
        crema_api::Error::Authentication {
            message: "token expired".into(),
        },
    )]));

    let err = coord.initialize().await.unwrap_err();

    assert!(matches!(err, SyncError::Auth { .. }));
    assert!(coord.read().is_empty());
    assert_eq!(coord.state(), SyncState::Uninitialized);
    assert!(coord.health().reauth_required);
}

#[tokio::test]
async fn push_before_initialize_is_ignored() {
    let coord = coordinator(FakeSource::default());
    let recorder = Arc::new(Recorder::default());
    coord.subscribe(&recorder);

    coord.on_push_message("brew_active", StatusValue::Bool(true));

    assert!(coord.read().is_empty());
    assert_eq!(coord.read().revision(), 0);
    assert_eq!(recorder.calls(), 0);
}

// ── Push deltas ─────────────────────────────────────────────────────

#[tokio::test]
async fn brew_active_delta_notifies_each_observer_once() {
    let coord = coordinator(FakeSource::with_pulls(vec![Ok(status(&[(
        "power",
        StatusValue::Int(1),
    )]))]));
    coord.initialize().await.unwrap();

    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    coord.subscribe(&first);
    coord.subscribe(&second);

    coord.on_push_message("brew_active", StatusValue::Bool(true));

    assert_eq!(coord.read().get("brew_active"), Some(StatusValue::Bool(true)));
    for recorder in [&first, &second] {
        assert_eq!(recorder.calls(), 1);
        assert_eq!(recorder.last().brew_active(), Some(true));
    }
}

#[tokio::test]
async fn empty_key_delta_is_ignored() {
    let coord = coordinator(FakeSource::default());
    coord.initialize().await.unwrap();
    let before = coord.read();

    coord.on_push_message("", StatusValue::Int(1));

    assert_eq!(coord.read(), before);
}

#[tokio::test]
async fn push_delta_overrides_pulled_value() {
    let coord = coordinator(FakeSource::with_pulls(vec![Ok(status(&[
        ("power", StatusValue::Int(1)),
        ("coffee_set_temp", StatusValue::Float(96.2)),
    ]))]));
    coord.initialize().await.unwrap();

    coord.on_push_message("power", StatusValue::Int(0));

    assert_eq!(
        coord.read().to_map(),
        status(&[
            ("power", StatusValue::Int(0)),
            ("coffee_set_temp", StatusValue::Float(96.2)),
        ])
    );
}

#[tokio::test]
async fn full_pull_keeps_pushed_keys_it_does_not_mention() {
    let coord = coordinator(FakeSource::with_pulls(vec![
        Ok(status(&[("power", StatusValue::Int(1))])),
        Ok(status(&[("coffee_set_temp", StatusValue::Float(93.0))])),
    ]));
    coord.initialize().await.unwrap();
    coord.on_push_message("power", StatusValue::Int(0));

    coord.refresh().await.unwrap();

    let snap = coord.read();
    assert_eq!(snap.get("power"), Some(StatusValue::Int(0)));
    assert_eq!(snap.get("coffee_set_temp"), Some(StatusValue::Float(93.0)));
}

// ── Refresh failures ────────────────────────────────────────────────

#[tokio::test]
async fn transient_failure_leaves_store_unchanged() {
    let coord = coordinator(FakeSource::with_pulls(vec![
        Ok(status(&[("power", StatusValue::Int(1))])),
        Err(transient()),
        Ok(status(&[("power", StatusValue::Int(1))])),
    ]));
    coord.refresh().await.unwrap();
    let before = coord.read();

    let err = coord.refresh().await.unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(coord.read(), before);
    let health = coord.health();
    assert!(!health.last_update_success);
    assert_eq!(health.consecutive_failures, 1);
    assert!(health.last_error.unwrap().contains("503"));

    coord.refresh().await.unwrap();
    let health = coord.health();
    assert!(health.last_update_success);
    assert_eq!(health.consecutive_failures, 0);
    assert!(health.last_error.is_none());
}

#[tokio::test]
async fn malformed_pull_is_a_retryable_protocol_error() {
    let coord = coordinator(FakeSource::with_pulls(vec![
        Ok(StatusMap::new()),
        Err(crema_api::Error::Deserialization {
            message: "expected object".into(),
            body: "[]".into(),
        }),
    ]));
    coord.refresh().await.unwrap();

    let err = coord.refresh().await.unwrap_err();

    assert!(matches!(err, SyncError::Protocol { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn auth_failure_on_refresh_requires_reauth() {
    let coord = coordinator(FakeSource::with_pulls(vec![
        Ok(status(&[("power", StatusValue::Int(1))])),
        Err(crema_api::Error::Authentication {
            message: "revoked".into(),
        }),
    ]));
    coord.refresh().await.unwrap();

    let err = coord.refresh().await.unwrap_err();

    assert!(err.is_fatal());
    assert!(coord.health().reauth_required);
    assert_eq!(coord.read().get("power"), Some(StatusValue::Int(1)));
}

// ── Push activation ─────────────────────────────────────────────────

#[tokio::test]
async fn push_channel_opens_once_after_first_pull() {
    let coord = push_coordinator(FakeSource::default());

    coord.refresh().await.unwrap();
    assert_eq!(coord.state(), SyncState::PollingAndPushing);
    assert_eq!(coord.source().pulls(), 1);

    coord.refresh().await.unwrap();
    coord.refresh().await.unwrap();

    assert_eq!(coord.source().push_opens(), 1);
    assert_eq!(coord.source().pulls(), 3);
    coord.teardown().await;
}

#[tokio::test]
async fn push_deltas_flow_through_the_queue() {
    let coord = push_coordinator(FakeSource::with_pulls(vec![Ok(status(&[
        ("power", StatusValue::Int(1)),
        ("coffee_set_temp", StatusValue::Float(96.2)),
    ]))]));
    coord.refresh().await.unwrap();
    let mut stream = coord.watch();

    coord
        .source()
        .push_sender()
        .send(PushDelta {
            key: "power".into(),
            value: StatusValue::Int(0),
        })
        .await
        .unwrap();

    let snap = next_change(&mut stream).await;
    assert_eq!(snap.get("power"), Some(StatusValue::Int(0)));
    assert_eq!(snap.get("coffee_set_temp"), Some(StatusValue::Float(96.2)));
    coord.teardown().await;
}

#[tokio::test]
async fn push_not_opened_when_disabled() {
    let coord = coordinator(FakeSource::default());

    coord.refresh().await.unwrap();
    coord.refresh().await.unwrap();

    assert_eq!(coord.source().push_opens(), 0);
    assert_eq!(coord.state(), SyncState::Polling);
}

#[tokio::test]
async fn refused_push_is_retried_on_next_tick() {
    let source = FakeSource::default();
    source.refuse_push.store(true, Ordering::SeqCst);
    let coord = push_coordinator(source);

    coord.refresh().await.unwrap();
    assert_eq!(coord.state(), SyncState::Polling);

    coord.source().refuse_push.store(false, Ordering::SeqCst);
    coord.refresh().await.unwrap();

    assert_eq!(coord.source().push_opens(), 2);
    assert_eq!(coord.state(), SyncState::PollingAndPushing);
    coord.teardown().await;
}

// ── Observers ───────────────────────────────────────────────────────

#[tokio::test]
async fn unsubscribed_and_dropped_observers_are_not_called() {
    let coord = coordinator(FakeSource::default());
    coord.initialize().await.unwrap();

    let kept = Arc::new(Recorder::default());
    let removed = Arc::new(Recorder::default());
    let dropped = Arc::new(Recorder::default());
    coord.subscribe(&kept);
    let handle = coord.subscribe(&removed);
    coord.subscribe(&dropped);

    assert!(coord.unsubscribe(handle));
    drop(dropped);
    coord.on_push_message("power", StatusValue::Int(1));

    assert_eq!(kept.calls(), 1);
    assert_eq!(removed.calls(), 0);
    assert_eq!(coord.observer_count(), 1);
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn set_switch_sends_command_and_reflects_it() {
    let coord = coordinator(FakeSource::with_pulls(vec![Ok(status(&[(
        "power",
        StatusValue::Int(0),
    )]))]));
    coord.initialize().await.unwrap();
    let recorder = Arc::new(Recorder::default());
    coord.subscribe(&recorder);

    coord.set_switch(MachineSwitch::Main, true).await.unwrap();

    assert_eq!(
        coord.source().commands(),
        vec![MachineCommand::new("power", 1_i64)]
    );
    assert_eq!(coord.read().get("power"), Some(StatusValue::Int(1)));
    assert_eq!(recorder.calls(), 1);
    coord.teardown().await;
}

#[tokio::test]
async fn unsupported_switch_sends_nothing() {
    let coord = SyncCoordinator::new(
        machine_config(MachineModel::Gs3Mp, false),
        FakeSource::default(),
    );
    coord.initialize().await.unwrap();

    let err = coord
        .set_switch(MachineSwitch::Prebrew, true)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Unsupported { .. }));
    assert!(coord.source().commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn set_switch_refreshes_after_update_delay() {
    let coord = coordinator(FakeSource::default());
    coord.initialize().await.unwrap();

    coord.set_switch(MachineSwitch::SteamBoiler, false).await.unwrap();
    assert_eq!(coord.source().pulls(), 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(coord.source().pulls(), 2);
    coord.teardown().await;
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn teardown_twice_is_a_no_op() {
    let coord = coordinator(FakeSource::default());
    coord.initialize().await.unwrap();

    coord.teardown().await;
    assert_eq!(coord.state(), SyncState::Stopped);
    coord.teardown().await;
    assert_eq!(coord.state(), SyncState::Stopped);
}

#[tokio::test]
async fn operations_after_teardown_report_stopped() {
    let coord = coordinator(FakeSource::default());
    coord.initialize().await.unwrap();
    coord.teardown().await;
    let before = coord.read();

    assert!(matches!(coord.refresh().await, Err(SyncError::Stopped)));
    assert!(matches!(coord.initialize().await, Err(SyncError::Stopped)));
    coord.on_push_message("power", StatusValue::Int(0));

    assert_eq!(coord.read(), before);
    assert_eq!(coord.source().pulls(), 1);
}

#[tokio::test(start_paused = true)]
async fn in_flight_pull_is_discarded_after_teardown() {
    let source = FakeSource {
        latency: Duration::from_secs(5),
        ..FakeSource::with_pulls(vec![
            Ok(status(&[("power", StatusValue::Int(1))])),
            Ok(status(&[("power", StatusValue::Int(0))])),
        ])
    };
    let coord = coordinator(source);
    coord.initialize().await.unwrap();

    let pending = tokio::spawn({
        let coord = coord.clone();
        async move { coord.refresh().await }
    });
    tokio::task::yield_now().await;
    assert_eq!(coord.source().pulls(), 2);

    coord.teardown().await;
    let result = pending.await.unwrap();

    assert!(matches!(result, Err(SyncError::Stopped)));
    assert_eq!(coord.read().get("power"), Some(StatusValue::Int(1)));
}

#[tokio::test(start_paused = true)]
async fn start_refreshes_on_the_poll_interval() {
    let coord = coordinator(FakeSource::default());

    coord.start().await.unwrap();
    assert_eq!(coord.source().pulls(), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(coord.source().pulls(), 2);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(coord.source().pulls(), 3);

    coord.teardown().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(coord.source().pulls(), 3);
}

#[tokio::test(start_paused = true)]
async fn periodic_refresh_stops_on_auth_failure() {
    let coord = coordinator(FakeSource::with_pulls(vec![
        Ok(StatusMap::new()),
        Err(crema_api::Error::Authentication {
            message: "revoked".into(),
        }),
    ]));

    coord.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(coord.source().pulls(), 2);
    assert!(coord.health().reauth_required);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(coord.source().pulls(), 2);
    coord.teardown().await;
}

#[tokio::test]
async fn start_propagates_first_failure() {
    let coord = coordinator(FakeSource::with_pulls(vec![Err(transient())]));

    let err = coord.start().await.unwrap_err();

    assert!(matches!(err, SyncError::Transient { .. }));
    assert_eq!(coord.state(), SyncState::Uninitialized);
}

// ── Concurrent updates ──────────────────────────────────────────────

/// Records every revision it is handed and blocks through the first one.
#[derive(Default)]
struct SlowRecorder {
    revisions: Mutex<Vec<u64>>,
    brew_active: Mutex<Option<bool>>,
}

impl crema_core::StatusObserver for SlowRecorder {
    fn on_status_update(&self, snapshot: &Arc<StatusSnapshot>) {
        let first = {
            let mut revisions = self.revisions.lock().unwrap();
            revisions.push(snapshot.revision());
            revisions.len() == 1
        };
        if first {
            std::thread::sleep(Duration::from_millis(300));
        }
        *self.brew_active.lock().unwrap() = snapshot.brew_active();
    }
}

impl SlowRecorder {
    fn has_been_called(&self) -> bool {
        !self.revisions.lock().unwrap().is_empty()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn push_during_pull_fan_out_leaves_observers_on_the_latest_view() {
    let coord = coordinator(FakeSource::with_pulls(vec![Ok(status(&[(
        "brew_active",
        StatusValue::Bool(false),
    )]))]));
    let a = Arc::new(SlowRecorder::default());
    let b = Arc::new(SlowRecorder::default());
    coord.subscribe(&a);
    coord.subscribe(&b);

    let pusher = tokio::task::spawn_blocking({
        let coord = coord.clone();
        let (a, b) = (Arc::clone(&a), Arc::clone(&b));
        move || {
            while !a.has_been_called() && !b.has_been_called() {
                std::thread::sleep(Duration::from_millis(5));
            }
            std::thread::sleep(Duration::from_millis(50));
            coord.on_push_message("brew_active", StatusValue::Bool(true));
        }
    });

    coord.initialize().await.unwrap();
    pusher.await.unwrap();

    let store = coord.read();
    assert_eq!(store.brew_active(), Some(true));
    for observer in [&a, &b] {
        assert_eq!(*observer.brew_active.lock().unwrap(), Some(true));
        let revisions = observer.revisions.lock().unwrap().clone();
        assert_eq!(revisions.last().copied(), Some(store.revision()));
        assert!(
            revisions.windows(2).all(|pair| pair[0] < pair[1]),
            "out of order: {revisions:?}"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pull_racing_teardown_never_publishes_after_stop() {
    for _ in 0..50 {
        let coord = coordinator(FakeSource::with_pulls(vec![Ok(status(&[(
            "power",
            StatusValue::Int(1),
        )]))]));
        let after_stop = Arc::new(AtomicUsize::new(0));
        let observer = Arc::new({
            let coord = coord.clone();
            let after_stop = Arc::clone(&after_stop);
            move |_snap: &Arc<StatusSnapshot>| {
                if coord.state() == SyncState::Stopped {
                    after_stop.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        coord.subscribe(&observer);

        let pull = tokio::spawn({
            let coord = coord.clone();
            async move { coord.initialize().await }
        });
        let stop = tokio::spawn({
            let coord = coord.clone();
            async move { coord.teardown().await }
        });
        let result = pull.await.unwrap();
        stop.await.unwrap();

        assert_eq!(after_stop.load(Ordering::SeqCst), 0);
        match result {
            Ok(()) => assert_eq!(coord.read().get("power"), Some(StatusValue::Int(1))),
            Err(SyncError::Stopped) => assert!(coord.read().is_empty()),
            Err(e) => panic!("unexpected error: {e}"),
        }
        assert_eq!(coord.state(), SyncState::Stopped);
    }
}
