use crate::client::controller::{ControllerState, PairingPhase, Shared};
use crate::client::remote::{ApiError, SessionApi};
use crate::client::types::{ConnectionError, ConnectionStatus};

use std::sync::Arc;

/// Outcome of one pairing-code request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Attempt {
    /// Well-formed artifact
    Artifact(String),
    /// Request succeeded but carried no usable artifact yet
    Missing,
    /// 404: the connection itself may be gone
    NotFound,
    /// Any other failure
    Failed(String),
}

impl Attempt {
    pub(crate) fn from_result(result: Result<Option<String>, ApiError>, prefix: &str) -> Self {
        match result {
            Ok(Some(artifact)) if is_well_formed(&artifact, prefix) => Self::Artifact(artifact),
            Ok(_) => Self::Missing,
            Err(ApiError::NotFound) => Self::NotFound,
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

/// An artifact must carry the expected encoding prefix and a non-empty payload.
pub fn is_well_formed(artifact: &str, prefix: &str) -> bool {
    artifact
        .strip_prefix(prefix)
        .is_some_and(|payload| !payload.trim().is_empty())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PairingStep {
    RetryAfterDelay,
    Stop,
}

/// Apply one attempt to the controller state.
pub(crate) fn apply_attempt(
    state: &mut ControllerState,
    name: &str,
    attempt: Attempt,
    max_attempts: u32,
) -> PairingStep {
    match attempt {
        Attempt::Artifact(artifact) => {
            log::info!("Pairing code received for {}", name);
            state.pairing_artifact = Some(artifact);
            state.last_error = None;
            state.pairing = PairingPhase::Dormant;
            state.timers.release_pairing();
            state.timers.reset_attempts();
            PairingStep::Stop
        }
        Attempt::NotFound => {
            // Not counted: the poller decides whether the connection is gone
            log::info!("Pairing code for {} not found, checking status", name);
            state.pairing = PairingPhase::Deferred;
            state.timers.release_pairing();
            state.timers.request_poll();
            PairingStep::Stop
        }
        Attempt::Missing | Attempt::Failed(_) => {
            if let Attempt::Failed(message) = attempt {
                log::warn!("Failed to fetch pairing code for {}: {}", name, message);
                state.last_error = Some(ConnectionError::PairingFetch(message));
            } else {
                log::debug!("No pairing code yet for {}", name);
            }

            let attempts = state.timers.record_attempt();
            if attempts >= max_attempts {
                log::warn!(
                    "Giving up on pairing code for {} after {} attempts",
                    name,
                    attempts
                );
                state.pairing = PairingPhase::Exhausted(attempts);
                state.last_error = Some(ConnectionError::PairingExhausted(attempts));
                state.timers.release_pairing();
                PairingStep::Stop
            } else {
                log::debug!(
                    "Retrying pairing code for {} (attempt {}/{})",
                    name,
                    attempts + 1,
                    max_attempts
                );
                PairingStep::RetryAfterDelay
            }
        }
    }
}

/// Pairing-code loop for one connection generation.
///
/// Runs only while the status is `awaiting_pairing`; any other status, or a
/// newer generation, ends it without touching state.
pub(crate) async fn run_pairing_loop<A: SessionApi>(
    shared: Arc<Shared<A>>,
    name: String,
    generation: u64,
) {
    let delay = shared.config.pairing_retry_delay();
    let max_attempts = shared.config.max_pairing_attempts();

    loop {
        let result = shared.api.pairing_code(&name).await;

        let step = {
            let mut state = shared.state.lock();
            if !state.is_current(generation) || state.status != ConnectionStatus::AwaitingPairing {
                log::debug!("Discarding stale pairing code response for {}", name);
                return;
            }
            let attempt = Attempt::from_result(result, &shared.config.artifact_prefix);
            let step = apply_attempt(&mut state, &name, attempt, max_attempts);
            shared.publish(&mut state);
            step
        };

        match step {
            PairingStep::RetryAfterDelay => tokio::time::sleep(delay).await,
            PairingStep::Stop => return,
        }
    }
}
