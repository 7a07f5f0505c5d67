use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cooperative cancellation shared by the transport and its worker threads.
///
/// Workers check it at their wait points; a cancelled token wakes every
/// thread sleeping in [`ShutdownToken::wait_until`] immediately.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep until `deadline` or cancellation. Returns `true` if cancelled.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            cancelled = cvar
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *cancelled
    }

    /// Sleep for `timeout` or until cancellation. Returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }
}
