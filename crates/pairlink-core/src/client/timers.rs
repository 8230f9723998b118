use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::AbortHandle;

/// Owns every scheduled task of the active connection.
///
/// One status-poll task, at most one pairing-code task (immediate attempt or
/// delayed retry), the pairing attempt counter, and the trigger used to ask
/// the poller for an out-of-cycle query. `clear()` must run before any
/// teardown so a stale task cannot touch a superseded connection.
#[derive(Default)]
pub struct TimerRegistry {
    poll: Option<AbortHandle>,
    pairing: Option<AbortHandle>,
    attempts: u32,
    poll_now: Option<Arc<Notify>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the poll task and the trigger it listens on.
    /// Any previous poll task is aborted.
    pub fn arm_poll(&mut self, handle: AbortHandle, poll_now: Arc<Notify>) {
        if let Some(old) = self.poll.replace(handle) {
            old.abort();
        }
        self.poll_now = Some(poll_now);
    }

    /// Register the pairing task, aborting any previous one.
    pub fn arm_pairing(&mut self, handle: AbortHandle) {
        if let Some(old) = self.pairing.replace(handle) {
            old.abort();
        }
    }

    /// Abort the pairing task and reset the attempt counter.
    pub fn cancel_pairing(&mut self) {
        if let Some(handle) = self.pairing.take() {
            handle.abort();
        }
        self.attempts = 0;
    }

    /// Forget the pairing handle without aborting it. Used by the pairing
    /// task itself when it finishes.
    pub fn release_pairing(&mut self) {
        self.pairing = None;
    }

    /// Count a failed pairing attempt and return the new total.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    pub fn reset_attempts(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn pairing_pending(&self) -> bool {
        self.pairing.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wake the poll task for an immediate status query.
    pub fn request_poll(&self) -> bool {
        match self.poll_now {
            Some(ref notify) => {
                notify.notify_one();
                true
            }
            None => false,
        }
    }

    /// Cancel everything. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if let Some(handle) = self.poll.take() {
            handle.abort();
        }
        if let Some(handle) = self.pairing.take() {
            handle.abort();
        }
        self.poll_now = None;
        self.attempts = 0;
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
