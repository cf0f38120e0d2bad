use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::PgMiddlewareError;

/// Where a middleware handle is in its `Open -> Ready -> Stopped` lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Pool created; no connection has been established yet.
    Open,
    /// At least one connection has been checked out successfully.
    Ready,
    /// `stop()` was called; no further checkouts are allowed.
    Stopped,
}

const OPEN: u8 = 0;
const READY: u8 = 1;
const STOPPED: u8 = 2;

/// Shared lifecycle flag; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub(crate) struct Lifecycle(Arc<AtomicU8>);

impl Lifecycle {
    pub(crate) fn state(&self) -> PoolState {
        match self.0.load(Ordering::Acquire) {
            OPEN => PoolState::Open,
            READY => PoolState::Ready,
            _ => PoolState::Stopped,
        }
    }

    pub(crate) fn ensure_running(&self) -> Result<(), PgMiddlewareError> {
        if self.state() == PoolState::Stopped {
            Err(PgMiddlewareError::PoolStopped)
        } else {
            Ok(())
        }
    }

    pub(crate) fn mark_ready(&self) {
        // A concurrent stop() wins over a late checkout.
        let _ = self
            .0
            .compare_exchange(OPEN, READY, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Move to `Stopped`; returns false if it was already stopped.
    pub(crate) fn stop(&self) -> bool {
        self.0.swap(STOPPED, Ordering::AcqRel) != STOPPED
    }
}
