// ── Sync coordinator ──
//
// Owns the status store and keeps it current from two sources: periodic
// full pulls and (optionally) a websocket delta stream. Every successful
// merge fans out to registered observers.

use std::sync::{Arc, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crema_api::{PushDelta, PushRegistration, StatusValue};

use crate::capability::{MachineSwitch, Toggleable};
use crate::config::MachineConfig;
use crate::error::SyncError;
use crate::observer::{ObserverRegistry, StatusObserver, SubscriptionHandle};
use crate::source::{GatewaySource, MachineSource};
use crate::store::{StatusSnapshot, StatusStore};
use crate::stream::StatusStream;

// ── SyncState ────────────────────────────────────────────────────

/// Lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No successful pull yet; push deltas are ignored.
    Uninitialized,
    Polling,
    PollingAndPushing,
    /// Terminal.
    Stopped,
}

impl SyncState {
    pub fn is_initialized(self) -> bool {
        matches!(self, Self::Polling | Self::PollingAndPushing)
    }
}

// ── UpdateHealth ─────────────────────────────────────────────────

/// Outcome of the most recent update attempts.
///
/// The store keeps the last-good snapshot on failure; this is how readers
/// tell that it may be stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateHealth {
    pub last_update_success: bool,
    pub last_error: Option<String>,
    /// Credentials were rejected. Cleared by the next successful pull.
    pub reauth_required: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

// ── SyncCoordinator ──────────────────────────────────────────────

/// The main entry point for hosts.
///
/// Cheaply cloneable via `Arc`. Nothing touches the network until
/// [`initialize`](Self::initialize), [`refresh`](Self::refresh) or
/// [`start`](Self::start) is called.
pub struct SyncCoordinator<S = GatewaySource> {
    inner: Arc<CoordinatorInner<S>>,
}

impl<S> Clone for SyncCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CoordinatorInner<S> {
    config: MachineConfig,
    source: S,
    store: StatusStore,
    observers: ObserverRegistry,
    state: watch::Sender<SyncState>,
    health: watch::Sender<UpdateHealth>,
    /// Serializes full pulls.
    pull_guard: Mutex<()>,
    /// Held across merge and fan-out, and across the move to `Stopped`.
    /// Observers see snapshots in merge order and nothing after teardown.
    notify_gate: std::sync::Mutex<()>,
    push_tx: mpsc::Sender<PushDelta>,
    push_rx: Mutex<Option<mpsc::Receiver<PushDelta>>>,
    push: Mutex<Option<PushRegistration>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    periodic_started: AtomicBool,
}

impl SyncCoordinator<GatewaySource> {
    /// Coordinator talking to the machine gateway described by `config`.
    pub fn from_config(config: MachineConfig) -> Result<Self, SyncError> {
        let source = GatewaySource::from_config(&config)?;
        Ok(Self::new(config, source))
    }
}

impl<S: MachineSource> SyncCoordinator<S> {
    pub fn new(config: MachineConfig, source: S) -> Self {
        let (state, _) = watch::channel(SyncState::Uninitialized);
        let (health, _) = watch::channel(UpdateHealth::default());
        let (push_tx, push_rx) = mpsc::channel(config.sync.push_queue_capacity.max(1));

        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                source,
                store: StatusStore::new(),
                observers: ObserverRegistry::default(),
                state,
                health,
                pull_guard: Mutex::new(()),
                notify_gate: std::sync::Mutex::new(()),
                push_tx,
                push_rx: Mutex::new(Some(push_rx)),
                push: Mutex::new(None),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
                periodic_started: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.inner.config
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    pub fn state(&self) -> SyncState {
        *self.inner.state.borrow()
    }

    /// Subscribe to lifecycle state changes.
    pub fn state_changes(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    pub fn health(&self) -> UpdateHealth {
        self.inner.health.borrow().clone()
    }

    /// The current status snapshot.
    pub fn read(&self) -> Arc<StatusSnapshot> {
        self.inner.store.read()
    }

    /// Stream of snapshots, starting from the current one.
    pub fn watch(&self) -> StatusStream {
        StatusStream::new(self.inner.store.subscribe())
    }

    // ── Observers ────────────────────────────────────────────────

    /// Register an observer. Only a weak reference is kept: dropping the
    /// last `Arc` unsubscribes implicitly.
    pub fn subscribe<O: StatusObserver + 'static>(&self, observer: &Arc<O>) -> SubscriptionHandle {
        self.inner.observers.subscribe(observer)
    }

    /// Returns `false` if the handle was unknown (or already removed).
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.inner.observers.unsubscribe(handle)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    // ── Update sources ───────────────────────────────────────────

    /// Perform the first full pull.
    ///
    /// Errors are returned as-is; there is no internal retry.
    pub async fn initialize(&self) -> Result<(), SyncError> {
        self.ensure_running()?;
        self.pull().await?;
        info!(
            machine = self.inner.config.display_name(),
            model = %self.inner.config.model,
            "machine status initialized"
        );
        Ok(())
    }

    /// One scheduled tick.
    ///
    /// Initializes on the first call. Once initialized, activates the push
    /// channel if configured and not yet active, then pulls (unless this
    /// tick just initialized).
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let just_initialized = match self.state() {
            SyncState::Stopped => return Err(SyncError::Stopped),
            SyncState::Uninitialized => {
                self.initialize().await?;
                true
            }
            SyncState::Polling | SyncState::PollingAndPushing => false,
        };

        if let Err(e) = self.activate_push().await {
            warn!(error = %e, "push channel activation failed; retrying next tick");
        }

        if !just_initialized {
            self.pull().await?;
        }
        Ok(())
    }

    /// Apply one push delta.
    ///
    /// Ignored before initialization, after teardown, and for empty keys.
    pub fn on_push_message(&self, key: &str, value: StatusValue) {
        if key.is_empty() {
            debug!("ignoring push delta with empty key");
            return;
        }

        let _gate = self.notify_gate();
        if !self.state().is_initialized() {
            debug!(key, "ignoring push delta outside active sync");
            return;
        }
        if let Some(snapshot) = self.inner.store.merge_one(key, value) {
            self.inner.observers.notify(&snapshot);
        }
    }

    // ── Commands ─────────────────────────────────────────────────

    pub async fn set_switch(&self, switch: MachineSwitch, on: bool) -> Result<(), SyncError> {
        self.set_toggle(&switch, on).await
    }

    /// Send a toggle command, reflect it locally, and re-pull once the
    /// machine has had `update_delay` to settle.
    pub async fn set_toggle<T>(&self, toggle: &T, on: bool) -> Result<(), SyncError>
    where
        T: Toggleable + Sync + ?Sized,
    {
        self.ensure_running()?;
        let model = self.inner.config.model;
        if !toggle.supports(model) {
            return Err(SyncError::Unsupported {
                operation: format!("set {}", toggle.property()),
                model: model.to_string(),
            });
        }

        let command = toggle.command(on);
        debug!(property = %command.property, value = %command.value, "sending command");
        if let Err(e) = self.inner.source.send_command(&command).await {
            let err = SyncError::from(e);
            if err.is_fatal() {
                self.record_failure(&err);
            }
            return Err(err);
        }

        {
            let _gate = self.notify_gate();
            if self.state().is_initialized() {
                if let Some(snapshot) = self.inner.store.merge_one(&command.property, command.value)
                {
                    self.inner.observers.notify(&snapshot);
                }
            }
        }

        self.spawn_tracked(delayed_refresh(
            self.clone(),
            self.inner.config.sync.update_delay,
            self.inner.cancel.clone(),
        ))
        .await;
        Ok(())
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Refresh once, then keep refreshing every `poll_interval` in the
    /// background.
    ///
    /// The first refresh's error is returned (the host is not ready). Later
    /// transient failures are logged and recorded in [`health`](Self::health);
    /// an authentication failure stops the periodic task.
    pub async fn start(&self) -> Result<(), SyncError> {
        self.refresh().await?;

        let period = self.inner.config.sync.poll_interval;
        if period.is_zero() || self.inner.periodic_started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.spawn_tracked(refresh_task(self.clone(), period, self.inner.cancel.clone()))
            .await;
        debug!(interval_secs = period.as_secs(), "periodic refresh started");
        Ok(())
    }

    /// Stop everything: background tasks, the push channel, observers.
    ///
    /// Idempotent. A pull in flight completes but its result is discarded.
    pub async fn teardown(&self) {
        let previous = {
            let _gate = self.notify_gate();
            self.inner.state.send_replace(SyncState::Stopped)
        };
        if previous == SyncState::Stopped {
            return;
        }
        self.inner.cancel.cancel();

        let registration = self.inner.push.lock().await.take();
        if let Some(registration) = registration {
            registration.close().await;
        }

        let handles = std::mem::take(&mut *self.inner.task_handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                debug!(error = %e, "background task ended abnormally");
            }
        }

        self.inner.observers.clear();
        info!(machine = self.inner.config.display_name(), "sync stopped");
    }

    // ── Internals ────────────────────────────────────────────────

    /// The gate guards no data, so a panicked observer does not poison it.
    fn notify_gate(&self) -> MutexGuard<'_, ()> {
        self.inner
            .notify_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_running(&self) -> Result<(), SyncError> {
        if self.state() == SyncState::Stopped {
            return Err(SyncError::Stopped);
        }
        Ok(())
    }

    /// Full pull and merge. Failures never touch the store.
    async fn pull(&self) -> Result<Arc<StatusSnapshot>, SyncError> {
        let _guard = self.inner.pull_guard.lock().await;
        self.ensure_running()?;

        let result = self.inner.source.fetch_status().await;
        if self.state() == SyncState::Stopped {
            debug!("discarding pull that finished after teardown");
            return Err(SyncError::Stopped);
        }

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                let err = SyncError::from(e);
                self.record_failure(&err);
                if err.is_fatal() {
                    error!(error = %err, "machine rejected credentials");
                } else {
                    warn!(error = %err, "status pull failed");
                }
                return Err(err);
            }
        };

        let snapshot = {
            let _gate = self.notify_gate();
            // teardown may have landed while the result was being matched
            if self.state() == SyncState::Stopped {
                debug!("discarding pull that finished after teardown");
                return Err(SyncError::Stopped);
            }
            let snapshot = self.inner.store.merge_full(status);
            self.inner.state.send_if_modified(|state| {
                if *state == SyncState::Uninitialized {
                    *state = SyncState::Polling;
                    true
                } else {
                    false
                }
            });
            self.record_success();
            self.inner.observers.notify(&snapshot);
            snapshot
        };

        debug!(
            keys = snapshot.len(),
            revision = snapshot.revision(),
            "status pulled"
        );
        Ok(snapshot)
    }

    /// Open the push channel at most once, after initialization.
    async fn activate_push(&self) -> Result<(), SyncError> {
        if !self.inner.config.sync.use_push_channel {
            return Ok(());
        }

        let mut push = self.inner.push.lock().await;
        if push.is_some() || self.state() != SyncState::Polling {
            return Ok(());
        }

        let registration = self
            .inner
            .source
            .open_push(self.inner.push_tx.clone(), self.inner.cancel.child_token())?;
        *push = Some(registration);

        if let Some(rx) = self.inner.push_rx.lock().await.take() {
            self.spawn_tracked(push_task(self.clone(), rx, self.inner.cancel.clone()))
                .await;
        }

        self.inner.state.send_if_modified(|state| {
            if *state == SyncState::Polling {
                *state = SyncState::PollingAndPushing;
                true
            } else {
                false
            }
        });
        info!("push channel active");
        Ok(())
    }

    /// Spawn a background task that teardown will join.
    async fn spawn_tracked<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut handles = self.inner.task_handles.lock().await;
        if self.state() == SyncState::Stopped {
            return;
        }
        handles.retain(|h| !h.is_finished());
        handles.push(tokio::spawn(task));
    }

    fn record_success(&self) {
        self.inner.health.send_modify(|health| {
            health.last_update_success = true;
            health.last_error = None;
            health.reauth_required = false;
            health.last_success_at = Some(Utc::now());
            health.consecutive_failures = 0;
        });
    }

    fn record_failure(&self, err: &SyncError) {
        self.inner.health.send_modify(|health| {
            health.last_update_success = false;
            health.last_error = Some(err.to_string());
            health.reauth_required |= err.is_fatal();
            health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        });
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Periodically refresh until cancelled or credentials are rejected.
async fn refresh_task<S: MachineSource>(
    coordinator: SyncCoordinator<S>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                match coordinator.refresh().await {
                    Ok(()) => {}
                    Err(SyncError::Stopped) => break,
                    Err(e) if e.is_fatal() => {
                        error!(error = %e, "stopping periodic refresh until re-authentication");
                        break;
                    }
                    Err(e) => warn!(error = %e, "periodic refresh failed"),
                }
            }
        }
    }
}

/// Drain push deltas into the store in arrival order.
async fn push_task<S: MachineSource>(
    coordinator: SyncCoordinator<S>,
    mut rx: mpsc::Receiver<PushDelta>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            delta = rx.recv() => {
                let Some(delta) = delta else { break };
                coordinator.on_push_message(&delta.key, delta.value);
            }
        }
    }
}

/// Re-pull after a command, once the machine has settled.
async fn delayed_refresh<S: MachineSource>(
    coordinator: SyncCoordinator<S>,
    delay: Duration,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => {}
        () = tokio::time::sleep(delay) => {
            if let Err(e) = coordinator.refresh().await {
                warn!(error = %e, "refresh after command failed");
            }
        }
    }
}
