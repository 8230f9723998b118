use crate::client::config::ControllerConfig;
use crate::client::pairing;
use crate::client::poller;
use crate::client::remote::SessionApi;
use crate::client::store::{ACTIVE_CONNECTION_KEY, ACTIVE_PROFILE_KEY, KeyValueStore};
use crate::client::timers::TimerRegistry;
use crate::client::types::{
    ConnectError, ConnectionError, ConnectionSnapshot, ConnectionStatus, DisconnectError,
};

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

/// The connection that currently owns the timers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ActiveConnection {
    pub(crate) name: String,
    pub(crate) profile_id: String,
}

/// Where the pairing-code loop stands for the current `awaiting_pairing` spell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum PairingPhase {
    /// Not started; the next `awaiting_pairing` observation starts it
    #[default]
    Idle,
    /// An attempt is in flight or a retry is scheduled
    Running,
    /// Artifact stored; nothing to do until the status changes
    Dormant,
    /// Last attempt got a 404; restart on the next scheduled status tick
    Deferred,
    /// Attempt cap reached after this many attempts; nothing to do until
    /// the status changes
    Exhausted(u32),
}

/// Everything the controller mutates, guarded by one mutex.
#[derive(Default)]
pub(crate) struct ControllerState {
    pub(crate) active: Option<ActiveConnection>,
    /// Bumped whenever the active connection is replaced or torn down.
    /// Tasks compare it against the value they were started with.
    pub(crate) generation: u64,
    pub(crate) status: ConnectionStatus,
    pub(crate) pairing_artifact: Option<String>,
    pub(crate) last_error: Option<ConnectionError>,
    pub(crate) pairing: PairingPhase,
    pub(crate) timers: TimerRegistry,
    pub(crate) published: ConnectionSnapshot,
}

impl ControllerState {
    pub(crate) fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            status: self.status,
            pairing_artifact: self.pairing_artifact.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// True while `generation` still names the live connection.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.active.is_some()
    }

    /// Cancel timers and invalidate in-flight work.
    fn invalidate(&mut self) {
        self.timers.clear();
        self.generation = self.generation.wrapping_add(1);
        self.pairing = PairingPhase::Idle;
    }
}

/// State shared between the controller and its background tasks.
pub(crate) struct Shared<A: SessionApi> {
    pub(crate) api: A,
    pub(crate) config: ControllerConfig,
    pub(crate) state: Mutex<ControllerState>,
    store: Arc<dyn KeyValueStore>,
    runtime: tokio::runtime::Handle,
    events: async_channel::Sender<ConnectionSnapshot>,
}

impl<A: SessionApi> Shared<A> {
    /// Send the current snapshot to the subscriber if it changed.
    pub(crate) fn publish(&self, state: &mut ControllerState) {
        let snapshot = state.snapshot();
        if snapshot == state.published {
            return;
        }
        state.published = snapshot.clone();
        if let Err(e) = self.events.try_send(snapshot) {
            log::debug!("Connection update not delivered: {}", e);
        }
    }

    /// Local teardown after a remote-confirmed terminal status.
    ///
    /// Status and error stay visible; timers, active name and artifact go.
    /// The caller forgets the persisted name once the guard is released.
    pub(crate) fn teardown(
        &self,
        state: &mut ControllerState,
        status: ConnectionStatus,
        error: ConnectionError,
    ) {
        let name = state.active.take().map(|a| a.name).unwrap_or_default();
        log::warn!("Connection {} ended with status {}: {}", name, status, error);
        state.invalidate();
        state.status = status;
        state.pairing_artifact = None;
        state.last_error = Some(error);
        self.publish(state);
    }

    /// Spawn the status poller for the active connection.
    pub(crate) fn start_poller(self: &Arc<Self>, state: &mut ControllerState, generation: u64) {
        let Some(ref active) = state.active else {
            return;
        };
        let poll_now = Arc::new(Notify::new());
        let task = self.runtime.spawn(poller::run_status_poller(
            self.clone(),
            active.name.clone(),
            generation,
            poll_now.clone(),
        ));
        state.timers.arm_poll(task.abort_handle(), poll_now);
    }

    /// Spawn the pairing-code loop for the active connection.
    pub(crate) fn start_pairing(self: &Arc<Self>, state: &mut ControllerState, generation: u64) {
        let Some(ref active) = state.active else {
            return;
        };
        state.pairing = PairingPhase::Running;
        let task = self.runtime.spawn(pairing::run_pairing_loop(
            self.clone(),
            active.name.clone(),
            generation,
        ));
        state.timers.arm_pairing(task.abort_handle());
    }

    /// Store writes may hit the disk; never call these with the state locked.
    fn persist(&self, active: &ActiveConnection) {
        let result = self
            .store
            .set(ACTIVE_CONNECTION_KEY, &active.name)
            .and_then(|()| self.store.set(ACTIVE_PROFILE_KEY, &active.profile_id));
        if let Err(e) = result {
            log::warn!("Failed to persist active connection {}: {}", active.name, e);
        }
    }

    pub(crate) fn forget_persisted(&self) {
        let result = self
            .store
            .clear(ACTIVE_CONNECTION_KEY)
            .and_then(|()| self.store.clear(ACTIVE_PROFILE_KEY));
        if let Err(e) = result {
            log::warn!("Failed to clear persisted connection: {}", e);
        }
    }
}

/// Pairs one messaging account at a time with the remote connection service.
///
/// `connect` creates the connection remotely and starts the status poller;
/// the poller drives the status and starts the pairing-code loop whenever the
/// remote waits for a code to be scanned. Every change of
/// `(status, pairing_artifact, last_error)` is sent to the subscriber given to
/// [`ConnectionController::new`]. Use an unbounded channel (or a generous
/// bound): updates that do not fit are dropped.
pub struct ConnectionController<A: SessionApi> {
    shared: Arc<Shared<A>>,
    /// Serializes `connect`, `disconnect` and `resume`.
    operation: tokio::sync::Mutex<()>,
}

impl<A: SessionApi> ConnectionController<A> {
    pub fn new(
        api: A,
        store: Arc<dyn KeyValueStore>,
        config: ControllerConfig,
        runtime: tokio::runtime::Handle,
        events: async_channel::Sender<ConnectionSnapshot>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                api,
                config,
                state: Mutex::new(ControllerState::default()),
                store,
                runtime,
                events,
            }),
            operation: tokio::sync::Mutex::new(()),
        }
    }

    pub fn api(&self) -> &A {
        &self.shared.api
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.shared.state.lock().snapshot()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.state.lock().status
    }

    /// Name of the connection that currently owns the timers.
    pub fn active_name(&self) -> Option<String> {
        self.shared
            .state
            .lock()
            .active
            .as_ref()
            .map(|a| a.name.clone())
    }

    pub fn is_paired(&self) -> bool {
        self.status().is_paired()
    }

    /// Create `name` on the remote service bound to `profile_id` and start
    /// tracking it. An already active connection is silently disconnected
    /// first; concurrent calls run one after another, the last one wins.
    pub async fn connect(&self, name: &str, profile_id: &str) -> Result<(), ConnectError> {
        let name = name.trim();
        let profile_id = profile_id.trim();
        if name.is_empty() {
            return Err(ConnectError::MissingName);
        }
        if profile_id.is_empty() {
            return Err(ConnectError::MissingProfile);
        }

        let _operation = self.operation.lock().await;

        let previous = self.active_name();
        if let Some(previous) = previous {
            log::info!("Replacing active connection {} with {}", previous, name);
            if let Err(e) = self.disconnect_locked(true).await {
                log::warn!("Silent disconnect of {} failed: {}", previous, e);
            }
        }

        let generation = {
            let mut state = self.shared.state.lock();
            state.invalidate();
            state.generation
        };

        log::info!("Creating connection {} (profile {})", name, profile_id);
        let result = self.shared.api.create(name, profile_id).await;

        match result {
            Ok(()) => {
                let active = ActiveConnection {
                    name: name.to_string(),
                    profile_id: profile_id.to_string(),
                };
                // Persist before the poller exists
                self.shared.persist(&active);

                let mut state = self.shared.state.lock();
                state.active = Some(active);
                state.status = ConnectionStatus::Initializing;
                state.pairing_artifact = None;
                state.last_error = None;
                self.shared.publish(&mut state);
                self.shared.start_poller(&mut state, generation);
                Ok(())
            }
            Err(e) => {
                log::warn!("Failed to create connection {}: {}", name, e);
                let message = e.user_message();
                {
                    let mut state = self.shared.state.lock();
                    state.active = None;
                    state.status = ConnectionStatus::FailedToInitialize;
                    state.pairing_artifact = None;
                    state.last_error = Some(ConnectionError::Initialization(message.clone()));
                    self.shared.publish(&mut state);
                }
                self.shared.forget_persisted();
                Err(ConnectError::Create(message))
            }
        }
    }

    /// Stop tracking the active connection and terminate it remotely.
    ///
    /// Timers are cancelled before anything else. A failed terminate request
    /// is reported after local cleanup has happened. With `silent`, the
    /// caller-facing state is left in place for a following `connect` to
    /// overwrite.
    pub async fn disconnect(&self, silent: bool) -> Result<(), DisconnectError> {
        let _operation = self.operation.lock().await;
        self.disconnect_locked(silent).await
    }

    async fn disconnect_locked(&self, silent: bool) -> Result<(), DisconnectError> {
        let name = {
            let mut state = self.shared.state.lock();
            let Some(name) = state.active.as_ref().map(|a| a.name.clone()) else {
                log::debug!("No active connection to disconnect");
                return Ok(());
            };
            state.invalidate();
            name
        };

        log::info!("Disconnecting {}", name);
        let result = self.shared.api.terminate(&name).await;
        if let Err(ref e) = result {
            log::warn!("Failed to terminate connection {}: {}", name, e);
        }

        if !silent {
            {
                let mut state = self.shared.state.lock();
                state.active = None;
                state.status = ConnectionStatus::Idle;
                state.pairing_artifact = None;
                state.last_error = None;
                self.shared.publish(&mut state);
            }
            self.shared.forget_persisted();
        }

        result.map_err(|e| DisconnectError::Terminate(e.user_message()))
    }

    /// Pick up the connection persisted by a previous process, if any.
    ///
    /// Starts polling without a create request. Returns `false` when nothing
    /// was persisted or a connection is already active.
    pub async fn resume(&self) -> bool {
        let _operation = self.operation.lock().await;

        let (Some(name), Some(profile_id)) = (
            self.shared.store.get(ACTIVE_CONNECTION_KEY),
            self.shared.store.get(ACTIVE_PROFILE_KEY),
        ) else {
            return false;
        };

        let mut state = self.shared.state.lock();
        if state.active.is_some() {
            return false;
        }

        log::info!("Resuming connection {} (profile {})", name, profile_id);
        state.invalidate();
        let generation = state.generation;
        state.active = Some(ActiveConnection { name, profile_id });
        state.status = ConnectionStatus::Initializing;
        state.pairing_artifact = None;
        state.last_error = None;
        self.shared.publish(&mut state);
        self.shared.start_poller(&mut state, generation);
        true
    }

    /// Clear the visible error without touching anything else.
    pub fn dismiss_error(&self) {
        let mut state = self.shared.state.lock();
        state.last_error = None;
        self.shared.publish(&mut state);
    }
}

impl<A: SessionApi> Drop for ConnectionController<A> {
    fn drop(&mut self) {
        self.shared.state.lock().invalidate();
    }
}
