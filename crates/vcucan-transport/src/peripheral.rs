use vcucan_frame::Frame;

use crate::error::PeripheralError;
use crate::transport::InterruptHandle;

/// Boundary to the CAN controller driver.
///
/// The driver reports events back through the [`InterruptHandle`] it receives
/// in [`Peripheral::start`]:
/// - `transmit_complete` once per frame that left a mailbox
/// - `receive_pending` whenever its receive FIFO holds frames
pub trait Peripheral: Send + Sync {
    /// Enable the controller and its interrupts.
    fn start(&self, irq: InterruptHandle) -> Result<(), PeripheralError>;

    /// Number of hardware transmit mailboxes.
    fn mailbox_count(&self) -> usize;

    /// Place a frame in a free mailbox.
    fn send(&self, frame: &Frame) -> Result<(), PeripheralError>;

    /// Pop the next received frame, if any.
    fn poll_receive(&self) -> Option<Frame>;
}
