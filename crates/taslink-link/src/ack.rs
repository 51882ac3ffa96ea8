//! Guaranteed-send acknowledgement tracking.
//!
//! At most one confirmation may be outstanding per channel direction;
//! the protocol is not designed for pipelined acknowledgements. The
//! worker owns the [`PendingAck`]; the calling thread parks on an
//! [`AckWaiter`] until the worker reports the outcome.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use taslink_frame::MessageKind;

/// Why a guaranteed send did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckFailure {
    /// No confirmation before the deadline; the channel resets.
    TimedOut,
    /// The channel reset for another reason while the send was pending.
    Reset,
    /// The channel worker stopped.
    Closed,
    /// The send queue had no room for the frame.
    QueueFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckState {
    Pending,
    Confirmed,
    Failed(AckFailure),
}

/// Where a blocked `send_guaranteed` caller waits for its outcome.
#[derive(Debug)]
pub struct AckWaiter {
    state: Mutex<AckState>,
    cond: Condvar,
}

impl AckWaiter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AckState::Pending),
            cond: Condvar::new(),
        }
    }

    /// Worker side: the matching confirmation arrived.
    pub fn confirm(&self) {
        self.finish(AckState::Confirmed);
    }

    /// Worker side: the send failed.
    pub fn fail(&self, failure: AckFailure) {
        self.finish(AckState::Failed(failure));
    }

    fn finish(&self, outcome: AckState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == AckState::Pending {
            *state = outcome;
            self.cond.notify_all();
        }
    }

    /// Caller side: block until the worker reports an outcome.
    ///
    /// `cap` bounds the wait as a backstop; the worker's own ack deadline
    /// fires first in any healthy channel.
    pub fn wait(&self, cap: Duration) -> Result<(), AckFailure> {
        let deadline = Instant::now() + cap;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match *state {
                AckState::Confirmed => return Ok(()),
                AckState::Failed(failure) => return Err(failure),
                AckState::Pending => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(AckFailure::TimedOut);
            }
            let (guard, _timeout) = self
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }
}

impl Default for AckWaiter {
    fn default() -> Self {
        Self::new()
    }
}

/// The worker's record of the one in-flight guaranteed send.
#[derive(Debug)]
pub(crate) struct PendingAck {
    pub kind: MessageKind,
    pub deadline: Instant,
    /// Whether the guaranteed frame itself has been written yet.
    pub frame_sent: bool,
    pub waiter: std::sync::Arc<AckWaiter>,
}
