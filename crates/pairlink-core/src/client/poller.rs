use crate::client::controller::{ControllerState, PairingPhase, Shared};
use crate::client::remote::{ApiError, SessionApi};
use crate::client::types::{ConnectionError, ConnectionStatus};

use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};

/// What one status query told us.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Observation {
    Status(ConnectionStatus),
    /// 404, or the remote reported `not_found` itself
    NotFound,
    /// Anything else that went wrong; retried on the next tick
    Transient(String),
}

impl Observation {
    pub(crate) fn from_result(result: Result<ConnectionStatus, ApiError>) -> Self {
        match result {
            Ok(ConnectionStatus::NotFound) | Err(ApiError::NotFound) => Self::NotFound,
            Ok(status) => Self::Status(status),
            Err(e) => Self::Transient(e.to_string()),
        }
    }
}

/// Why this query ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Trigger {
    /// Initial query or interval tick
    Scheduled,
    /// Requested by the pairing loop after a 404
    OutOfCycle,
}

/// What the poller does after applying an observation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PollStep {
    /// Publish and keep polling
    Continue,
    /// Keep polling and start the pairing loop; its first attempt publishes
    StartPairing,
    /// Remote-confirmed end: tear down and stop
    Teardown(ConnectionStatus, ConnectionError),
}

/// Transition table for one status observation.
pub(crate) fn apply_observation(
    state: &mut ControllerState,
    name: &str,
    observation: Observation,
    trigger: Trigger,
) -> PollStep {
    let status = match observation {
        Observation::NotFound => {
            return PollStep::Teardown(
                ConnectionStatus::NotFound,
                ConnectionError::NotFound(name.to_string()),
            );
        }
        Observation::Transient(message) => {
            log::warn!("Status check for {} failed: {}", name, message);
            state.last_error = Some(ConnectionError::StatusCheck(message));
            return PollStep::Continue;
        }
        Observation::Status(status) => status,
    };

    match status {
        ConnectionStatus::Disconnected => {
            return PollStep::Teardown(status, ConnectionError::Disconnected);
        }
        ConnectionStatus::AuthFailed => {
            return PollStep::Teardown(status, ConnectionError::AuthFailed);
        }
        ConnectionStatus::NotFound => {
            return PollStep::Teardown(status, ConnectionError::NotFound(name.to_string()));
        }
        ConnectionStatus::Idle | ConnectionStatus::FailedToInitialize => {
            // Local-only states; the remote cannot report them
            log::warn!("Ignoring local-only status {} for {}", status, name);
            return PollStep::Continue;
        }
        ConnectionStatus::Initializing
        | ConnectionStatus::AwaitingPairing
        | ConnectionStatus::Authenticated
        | ConnectionStatus::Connected => {}
    }

    if state.status != status {
        log::info!("Connection {} status: {} -> {}", name, state.status, status);
        state.status = status;
        state.last_error = None;
        if status != ConnectionStatus::AwaitingPairing {
            state.pairing_artifact = None;
            state.timers.cancel_pairing();
            state.pairing = PairingPhase::Idle;
        }
    } else if matches!(state.last_error, Some(ConnectionError::StatusCheck(_))) {
        // Exhaustion outlives a status-check blip
        state.last_error = match state.pairing {
            PairingPhase::Exhausted(attempts) => Some(ConnectionError::PairingExhausted(attempts)),
            _ => None,
        };
    }

    if status != ConnectionStatus::AwaitingPairing {
        return PollStep::Continue;
    }

    match (state.pairing, trigger) {
        (PairingPhase::Idle, _) | (PairingPhase::Deferred, Trigger::Scheduled) => {
            PollStep::StartPairing
        }
        _ => PollStep::Continue,
    }
}

/// Run one status query and apply it. Returns `false` once polling must stop.
async fn poll_once<A: SessionApi>(
    shared: &Arc<Shared<A>>,
    name: &str,
    generation: u64,
    trigger: Trigger,
) -> bool {
    let result = shared.api.status(name).await;

    let mut state = shared.state.lock();
    if !state.is_current(generation) {
        log::debug!("Discarding stale status response for {}", name);
        return false;
    }

    match apply_observation(&mut state, name, Observation::from_result(result), trigger) {
        PollStep::Continue => {
            shared.publish(&mut state);
            true
        }
        PollStep::StartPairing => {
            shared.start_pairing(&mut state, generation);
            true
        }
        PollStep::Teardown(status, error) => {
            shared.teardown(&mut state, status, error);
            drop(state);
            shared.forget_persisted();
            false
        }
    }
}

/// Status poller for one connection generation.
///
/// The first query goes out immediately; the interval is armed only after it
/// has been applied. `poll_now` wakes the loop for an out-of-cycle query.
pub(crate) async fn run_status_poller<A: SessionApi>(
    shared: Arc<Shared<A>>,
    name: String,
    generation: u64,
    poll_now: Arc<Notify>,
) {
    log::info!("Starting status polling for {}", name);

    if !poll_once(&shared, &name, generation, Trigger::Scheduled).await {
        return;
    }

    let period = shared.config.status_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let trigger = tokio::select! {
            _ = ticker.tick() => Trigger::Scheduled,
            _ = poll_now.notified() => Trigger::OutOfCycle,
        };
        if !poll_once(&shared, &name, generation, trigger).await {
            break;
        }
    }

    log::debug!("Status polling for {} stopped", name);
}
