//! Coordination state for coalesced credential refreshes.
//!
//! One refresh runs at a time. Everyone who needs a fresh credential while it
//! is running queues a continuation and is released, in arrival order, with
//! the shared outcome.

use std::collections::VecDeque;

use thiserror::Error;
use tokio::sync::oneshot;

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// A request was rejected with 401. A failed refresh ends the session.
    Request,
    /// Session-level renewal (restore, proactive timer, explicit refresh).
    /// The caller decides what a failure means.
    Session,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    #[error("refresh rejected with status {0}")]
    Rejected(u16),

    #[error("refresh request timed out")]
    Timeout,

    #[error("network error during refresh: {0}")]
    Network(String),

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("session was cleared while refreshing")]
    Superseded,

    #[error("refresh task ended before reporting")]
    Abandoned,
}

pub(crate) type RefreshOutcome = Result<String, RefreshFailure>;

#[derive(Default)]
pub(crate) struct RefreshState {
    in_flight: bool,
    escalate: bool,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

impl RefreshState {
    /// Queue a continuation. The bool is true when the caller must start the
    /// refresh because none is running.
    pub fn join(&mut self, trigger: RefreshTrigger) -> (oneshot::Receiver<RefreshOutcome>, bool) {
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(tx);
        if trigger == RefreshTrigger::Request {
            self.escalate = true;
        }
        let start = !self.in_flight;
        self.in_flight = true;
        (rx, start)
    }

    /// End the running cycle, handing back its waiters (FIFO) and whether
    /// any of them asked for escalation.
    pub fn finish(&mut self) -> (VecDeque<oneshot::Sender<RefreshOutcome>>, bool) {
        self.in_flight = false;
        (
            std::mem::take(&mut self.waiters),
            std::mem::take(&mut self.escalate),
        )
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    #[cfg(test)]
    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }
}

/// Release waiters in registration order.
pub(crate) fn release(waiters: VecDeque<oneshot::Sender<RefreshOutcome>>, outcome: &RefreshOutcome) {
    for waiter in waiters {
        // A waiter whose caller was cancelled has dropped its receiver
        let _ = waiter.send(outcome.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_joiner_starts_refresh() {
        let mut state = RefreshState::default();
        let (_a, start_a) = state.join(RefreshTrigger::Session);
        let (_b, start_b) = state.join(RefreshTrigger::Request);
        let (_c, start_c) = state.join(RefreshTrigger::Session);

        assert!(start_a);
        assert!(!start_b);
        assert!(!start_c);
        assert!(state.in_flight());
        assert_eq!(state.waiting(), 3);
    }

    #[test]
    fn test_escalation_only_from_request_trigger() {
        let mut state = RefreshState::default();
        let (_a, _) = state.join(RefreshTrigger::Session);
        let (_, escalate) = state.finish();
        assert!(!escalate);

        let (_a, _) = state.join(RefreshTrigger::Session);
        let (_b, _) = state.join(RefreshTrigger::Request);
        let (waiters, escalate) = state.finish();
        assert!(escalate);
        assert_eq!(waiters.len(), 2);
        assert!(!state.in_flight());

        let (_c, start) = state.join(RefreshTrigger::Session);
        assert!(start);
        let (_, escalate) = state.finish();
        assert!(!escalate);
    }

    #[tokio::test]
    async fn test_release_is_fifo() {
        let mut state = RefreshState::default();
        let (first, _) = state.join(RefreshTrigger::Request);
        let (second, _) = state.join(RefreshTrigger::Request);
        let (dropped, _) = state.join(RefreshTrigger::Request);
        drop(dropped);

        let (waiters, _) = state.finish();
        release(waiters, &Ok("fresh".to_string()));

        assert_eq!(first.await.unwrap(), Ok("fresh".to_string()));
        assert_eq!(second.await.unwrap(), Ok("fresh".to_string()));
    }
}
