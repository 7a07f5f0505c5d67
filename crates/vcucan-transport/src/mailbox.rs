use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Result, TransportError};

#[derive(Debug)]
struct State {
    available: usize,
    in_flight: usize,
    peak: usize,
    abandoned: bool,
    written_off: u64,
}

/// Counting semaphore over the peripheral's hardware transmit mailboxes.
///
/// A slot is taken before a frame is handed to the peripheral and given back
/// when the peripheral reports the transmission complete. After
/// [`Mailboxes::abandon`] every waiter fails with `Shutdown` and late
/// completions are ignored.
#[derive(Debug)]
pub struct Mailboxes {
    capacity: usize,
    state: Mutex<State>,
    freed: Condvar,
}

impl Mailboxes {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State {
                available: capacity,
                in_flight: 0,
                peak: 0,
                abandoned: false,
                written_off: 0,
            }),
            freed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take one slot, blocking until one frees, `timeout` elapses, or the
    /// mailboxes are abandoned.
    pub fn acquire(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        loop {
            if state.abandoned {
                return Err(TransportError::Shutdown);
            }
            if state.available > 0 {
                break;
            }
            state = match deadline {
                None => self
                    .freed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TransportError::MailboxTimeout(timeout.unwrap_or_default()));
                    }
                    self.freed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        state.available -= 1;
        state.in_flight += 1;
        state.peak = state.peak.max(state.in_flight);
        Ok(())
    }

    /// Give one slot back. Returns `false` if the release was ignored.
    pub fn release(&self) -> bool {
        let mut state = self.lock();
        if state.abandoned {
            debug!("late transmit completion ignored after abandon");
            return false;
        }
        if state.in_flight == 0 {
            warn!("transmit completion without a frame in flight");
            return false;
        }
        state.in_flight -= 1;
        state.available += 1;
        drop(state);
        self.freed.notify_one();
        true
    }

    /// Stop all mailbox accounting. In-flight slots are written off and every
    /// blocked or future `acquire` fails. Returns the number written off.
    pub fn abandon(&self) -> usize {
        let mut state = self.lock();
        let in_flight = state.in_flight;
        if !state.abandoned {
            state.abandoned = true;
            state.written_off += in_flight as u64;
            state.in_flight = 0;
            state.available = 0;
        }
        drop(state);
        self.freed.notify_all();
        in_flight
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Highest number of slots held at once.
    pub fn peak(&self) -> usize {
        self.lock().peak
    }

    /// Slots written off by [`Mailboxes::abandon`].
    pub fn written_off(&self) -> u64 {
        self.lock().written_off
    }

    pub fn is_abandoned(&self) -> bool {
        self.lock().abandoned
    }
}
