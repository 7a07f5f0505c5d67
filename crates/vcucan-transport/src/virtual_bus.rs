use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;
use vcucan_frame::Frame;

use crate::error::PeripheralError;
use crate::peripheral::Peripheral;
use crate::transport::InterruptHandle;

/// Hardware mailbox count of the VCU's CAN controller.
pub const DEFAULT_MAILBOXES: usize = 3;

#[derive(Debug, Default)]
struct BusState {
    irq: Option<InterruptHandle>,
    rx: VecDeque<Frame>,
    sent: Vec<Frame>,
    pending_completions: usize,
    failing_sends: usize,
}

/// In-memory CAN peripheral.
///
/// Records every transmitted frame and loops injected frames back through the
/// receive interrupt path. Transmit completion is immediate by default; with
/// [`VirtualBus::manual_completion`] each frame holds its mailbox until
/// [`VirtualBus::complete_next`] is called.
#[derive(Debug)]
pub struct VirtualBus {
    mailboxes: usize,
    auto_complete: bool,
    fail_start: bool,
    state: Mutex<BusState>,
}

impl VirtualBus {
    pub fn new() -> Self {
        Self::with_mailboxes(DEFAULT_MAILBOXES)
    }

    pub fn with_mailboxes(mailboxes: usize) -> Self {
        Self {
            mailboxes,
            auto_complete: true,
            fail_start: false,
            state: Mutex::new(BusState::default()),
        }
    }

    /// Hold each transmitted frame's mailbox until [`VirtualBus::complete_next`].
    pub fn manual_completion(mut self) -> Self {
        self.auto_complete = false;
        self
    }

    /// Make [`Peripheral::start`] fail.
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse the next `count` sends.
    pub fn fail_next_sends(&self, count: usize) {
        self.lock().failing_sends = count;
    }

    /// Deliver a frame as if it arrived on the bus.
    ///
    /// Runs the receive interrupt synchronously. Returns `false` if the bus
    /// has not been started, in which case the frame stays in the FIFO.
    pub fn inject(&self, frame: Frame) -> bool {
        let irq = {
            let mut state = self.lock();
            state.rx.push_back(frame);
            state.irq.clone()
        };
        match irq {
            Some(irq) => {
                irq.receive_pending();
                true
            }
            None => false,
        }
    }

    /// Signal completion of the oldest pending transmission.
    pub fn complete_next(&self) -> bool {
        let irq = {
            let mut state = self.lock();
            if state.pending_completions == 0 {
                return false;
            }
            state.pending_completions -= 1;
            state.irq.clone()
        };
        if let Some(irq) = irq {
            irq.transmit_complete();
        }
        true
    }

    /// Complete every pending transmission. Returns how many were completed.
    pub fn complete_all(&self) -> usize {
        let mut completed = 0;
        while self.complete_next() {
            completed += 1;
        }
        completed
    }

    /// Transmissions still holding a mailbox.
    pub fn pending_completions(&self) -> usize {
        self.lock().pending_completions
    }

    /// Every frame transmitted so far.
    pub fn sent(&self) -> Vec<Frame> {
        self.lock().sent.clone()
    }

    /// Drain the transmit log.
    pub fn take_sent(&self) -> Vec<Frame> {
        std::mem::take(&mut self.lock().sent)
    }

    pub fn is_started(&self) -> bool {
        self.lock().irq.is_some()
    }
}

impl Default for VirtualBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripheral for VirtualBus {
    fn start(&self, irq: InterruptHandle) -> Result<(), PeripheralError> {
        if self.fail_start {
            return Err(PeripheralError::new("virtual bus configured to fail start"));
        }
        self.lock().irq = Some(irq);
        Ok(())
    }

    fn mailbox_count(&self) -> usize {
        self.mailboxes
    }

    fn send(&self, frame: &Frame) -> Result<(), PeripheralError> {
        let irq = {
            let mut state = self.lock();
            if state.failing_sends > 0 {
                state.failing_sends -= 1;
                return Err(PeripheralError::new("virtual bus send refused"));
            }
            state.sent.push(frame.clone());
            trace!(id = %frame.id(), "virtual bus send");
            if !self.auto_complete {
                state.pending_completions += 1;
                return Ok(());
            }
            state.irq.clone()
        };
        if let Some(irq) = irq {
            irq.transmit_complete();
        }
        Ok(())
    }

    fn poll_receive(&self) -> Option<Frame> {
        self.lock().rx.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_before_start_stays_queued() {
        let bus = VirtualBus::new();
        assert!(!bus.inject(Frame::standard(0x10, &[1]).unwrap()));
        assert_eq!(bus.poll_receive(), Some(Frame::standard(0x10, &[1]).unwrap()));
        assert_eq!(bus.poll_receive(), None);
    }

    #[test]
    fn send_failure_injection_is_counted_down() {
        let bus = VirtualBus::new();
        bus.fail_next_sends(1);
        let frame = Frame::standard(0x10, &[1]).unwrap();
        assert!(bus.send(&frame).is_err());
        assert!(bus.send(&frame).is_ok());
        assert_eq!(bus.take_sent(), vec![frame]);
        assert!(bus.sent().is_empty());
    }

    #[test]
    fn manual_completion_tracks_pending() {
        let bus = VirtualBus::with_mailboxes(2).manual_completion();
        let frame = Frame::standard(0x10, &[1]).unwrap();
        bus.send(&frame).unwrap();
        bus.send(&frame).unwrap();
        assert_eq!(bus.pending_completions(), 2);
        assert_eq!(bus.complete_all(), 2);
        assert!(!bus.complete_next());
    }
}
