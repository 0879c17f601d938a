//! Request/response correlator.
//!
//! Responses on one connection arrive in the order the requests were
//! written, so pairing is a FIFO queue of waiters. Only the state
//! machine's terminal emissions pop a waiter; progress and profile
//! frames never reach this stage. When the channel dies every waiter
//! still queued is failed with the same transport error, none may be
//! left pending.
use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::errors::{DriverError, Result};
use crate::protocol::state::Emission;

pub(crate) type Waiter = oneshot::Sender<Result<Emission>>;

#[derive(Default)]
pub(crate) struct Correlator {
    pending: VecDeque<Waiter>,
}

impl Correlator {
    pub(crate) fn new() -> Correlator {
        Correlator::default()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Queue the waiter of a request just written to the socket
    pub(crate) fn push(&mut self, waiter: Waiter) {
        self.pending.push_back(waiter);
    }

    /// Complete the oldest waiter with a terminal outcome.
    /// Returns false when no request was outstanding.
    pub(crate) fn complete(&mut self, outcome: Result<Emission>) -> bool {
        match self.pending.pop_front() {
            Some(waiter) => {
                // the caller may have given up on the future already
                let _ = waiter.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding waiter, oldest first
    pub(crate) fn fail_all(&mut self, err: DriverError) {
        while let Some(waiter) = self.pending.pop_front() {
            let _ = waiter.send(Err(err.clone().into()));
        }
    }
}
