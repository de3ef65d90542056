//! `SchemaGate` — readiness signal for schema setup.
//!
//! Data operations must not issue statements before table and index
//! creation has completed. The gate is a one-shot condvar signal; waiters
//! wake in 100 ms slices so a wedged initializer cannot park a flush
//! forever.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

const WAIT_SLICE: Duration = Duration::from_millis(100);

/// One-shot readiness flag, flipped once by the migration path.
pub struct SchemaGate {
    ready: Mutex<bool>,
    cond: Condvar,
}

impl SchemaGate {
    pub fn new() -> Self {
        Self {
            ready: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Mark schema setup complete and wake all waiters.
    pub fn mark_ready(&self) {
        if let Ok(mut ready) = self.ready.lock() {
            *ready = true;
            self.cond.notify_all();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.lock().map(|r| *r).unwrap_or(false)
    }

    /// Block until ready or until `timeout` elapses. Returns whether the
    /// gate became ready.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let Ok(mut ready) = self.ready.lock() else {
            return false;
        };
        while !*ready {
            if Instant::now() >= deadline {
                return false;
            }
            match self.cond.wait_timeout(ready, WAIT_SLICE) {
                Ok((guard, _)) => ready = guard,
                Err(_) => return false,
            }
        }
        true
    }
}

impl Default for SchemaGate {
    fn default() -> Self {
        Self::new()
    }
}
