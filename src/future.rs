//! Single-shot read result: a condvar-backed slot that starts pending, is
//! finished exactly once by a worker thread, and blocks its destructor
//! (here, `Drop`) until that happens so background work can always
//! complete safely.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::h5::dataset::MAX_NDIMS;
use crate::ValueType;

/// Outcome of a completed or timed-out wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Complete,
    Timeout,
    Invalid,
}

/// The coerced or native result buffer a [`Future`] carries once complete.
#[derive(Debug, Clone)]
pub enum FutureData {
    Bytes(Vec<u8>),
    Integer(Vec<i64>),
    Real(Vec<f64>),
}

pub struct FutureInfo {
    pub data: FutureData,
    pub elements: usize,
    pub shape: [u64; MAX_NDIMS],
    pub value_type: ValueType,
}

enum State {
    Pending,
    Valid(FutureInfo),
    Invalid,
}

struct Inner {
    state: State,
}

/// A single-shot result slot shared between a worker thread and the caller
/// that submitted a [`crate::api::readp`] request.
pub struct Future {
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl Default for Future {
    fn default() -> Self {
        Self::new()
    }
}

impl Future {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Pending,
            }),
            cond: Condvar::new(),
        }
    }

    /// Mark the future complete with a materialized result. Idempotent:
    /// a second call is a no-op.
    pub fn finish_valid(&self, info: FutureInfo) {
        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.state, State::Pending) {
            inner.state = State::Valid(info);
            self.cond.notify_all();
        }
    }

    /// Mark the future complete with no result (a parse/IO error occurred).
    pub fn finish_invalid(&self) {
        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.state, State::Pending) {
            inner.state = State::Invalid;
            self.cond.notify_all();
        }
    }

    /// Block up to `timeout`, returning the terminal status. On
    /// [`WaitStatus::Complete`] the result can be taken with
    /// [`Future::take`].
    pub fn wait(&self, timeout: Duration) -> WaitStatus {
        let mut inner = self.inner.lock().unwrap();
        loop {
            match &inner.state {
                State::Pending => {
                    let (guard, result) = self.cond.wait_timeout(inner, timeout).unwrap();
                    inner = guard;
                    if result.timed_out() && matches!(inner.state, State::Pending) {
                        return WaitStatus::Timeout;
                    }
                }
                State::Valid(_) => return WaitStatus::Complete,
                State::Invalid => return WaitStatus::Invalid,
            }
        }
    }

    /// Take the completed result, leaving the slot empty. Only meaningful
    /// after `wait` returned [`WaitStatus::Complete`].
    pub fn take(&self) -> Option<FutureInfo> {
        let mut inner = self.inner.lock().unwrap();
        match std::mem::replace(&mut inner.state, State::Invalid) {
            State::Valid(info) => Some(info),
            other => {
                inner.state = other;
                None
            }
        }
    }
}

impl Drop for Future {
    fn drop(&mut self) {
        // Wait indefinitely for any in-flight worker to finish us so it
        // never writes into memory that has gone away.
        let mut inner = self.inner.lock().unwrap();
        while matches!(inner.state, State::Pending) {
            inner = self.cond.wait(inner).unwrap();
        }
    }
}
