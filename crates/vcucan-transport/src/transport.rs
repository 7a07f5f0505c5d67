use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, trace, warn};
use vcucan_frame::Frame;
use vcucan_state::{ModuleError, ModuleErrors};

use crate::error::{Result, TransportError};
use crate::mailbox::Mailboxes;
use crate::peripheral::Peripheral;
use crate::pool::{BlockPool, Handle};
use crate::shutdown::ShutdownToken;

/// Default number of receive blocks.
pub const DEFAULT_RX_POOL_CAPACITY: usize = 32;

/// How often the dispatch thread re-checks for shutdown while idle.
const DISPATCH_POLL: Duration = Duration::from_millis(20);

/// Configuration for a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Transmit mailboxes to use. `None` uses every hardware mailbox.
    pub mailbox_count: Option<usize>,
    /// Longest a transmit waits for a mailbox. `None` waits forever.
    pub transmit_timeout: Option<Duration>,
    /// Received frames that can wait for dispatch at once. Default: 32.
    pub rx_pool_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mailbox_count: None,
            transmit_timeout: Some(Duration::from_millis(10)),
            rx_pool_capacity: DEFAULT_RX_POOL_CAPACITY,
        }
    }
}

/// Transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub transmitted: u64,
    pub transmit_failed: u64,
    pub received: u64,
    pub rx_dropped: u64,
    pub peak_in_flight: usize,
    pub in_flight: usize,
    pub written_off: u64,
}

#[derive(Debug, Default)]
struct Counters {
    transmitted: AtomicU64,
    transmit_failed: AtomicU64,
    received: AtomicU64,
    rx_dropped: AtomicU64,
}

#[derive(Debug)]
struct Shared {
    mailboxes: Mailboxes,
    rx_pool: Mutex<BlockPool<Frame>>,
    rx_queue: SyncSender<Handle>,
    counters: Counters,
    shutdown: ShutdownToken,
}

impl Shared {
    fn pool(&self) -> MutexGuard<'_, BlockPool<Frame>> {
        self.rx_pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drop_rx(&self, id: impl std::fmt::Display, reason: &'static str) {
        self.counters.rx_dropped.fetch_add(1, Ordering::Relaxed);
        warn!(%id, reason, "received frame dropped");
    }

    // Interrupt path: copy into the pool and queue the handle. Never blocks.
    fn enqueue(&self, frame: Frame) -> bool {
        if self.shutdown.is_cancelled() {
            self.drop_rx(frame.id(), "shut down");
            return false;
        }
        let id = frame.id();
        let handle = match self.pool().insert(frame) {
            Ok(handle) => handle,
            Err(_) => {
                self.drop_rx(id, "receive pool exhausted");
                return false;
            }
        };
        match self.rx_queue.try_send(handle) {
            Ok(()) => {
                self.counters.received.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(handle) | TrySendError::Disconnected(handle)) => {
                self.pool().remove(handle);
                self.drop_rx(id, "dispatch queue unavailable");
                false
            }
        }
    }
}

/// Entry points for the peripheral's interrupt handlers.
///
/// Cheap to clone. Both methods are safe to call from any thread and never
/// block on anything but short internal locks.
#[derive(Clone)]
pub struct InterruptHandle {
    shared: Arc<Shared>,
    peripheral: Weak<dyn Peripheral>,
}

impl InterruptHandle {
    /// A frame left its mailbox; release the slot.
    pub fn transmit_complete(&self) {
        self.shared.mailboxes.release();
    }

    /// Drain the peripheral's receive FIFO into the dispatch queue.
    ///
    /// Returns the number of frames queued. Frames that do not fit in the
    /// receive pool are dropped and counted.
    pub fn receive_pending(&self) -> usize {
        let Some(peripheral) = self.peripheral.upgrade() else {
            return 0;
        };
        let mut queued = 0;
        while let Some(frame) = peripheral.poll_receive() {
            if self.shared.enqueue(frame) {
                queued += 1;
            }
        }
        queued
    }
}

impl std::fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptHandle").finish_non_exhaustive()
    }
}

/// Consumer of frames taken off the dispatch queue.
pub trait FrameHandler: Send {
    fn handle(&mut self, frame: &Frame);
}

impl<F> FrameHandler for F
where
    F: FnMut(&Frame) + Send,
{
    fn handle(&mut self, frame: &Frame) {
        self(frame)
    }
}

/// Join handle of the receive dispatch thread.
#[derive(Debug)]
pub struct ReceiverHandle {
    thread: JoinHandle<()>,
}

impl ReceiverHandle {
    /// Wait for the dispatch thread to exit. It exits once the transport shuts down.
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("receive dispatch thread panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Mailbox-bounded transmit and deferred receive over one peripheral.
pub struct Transport<P: Peripheral + 'static> {
    peripheral: Arc<P>,
    shared: Arc<Shared>,
    rx_queue: Mutex<Option<Receiver<Handle>>>,
    config: TransportConfig,
    module_errors: Arc<ModuleErrors>,
}

impl<P: Peripheral + 'static> Transport<P> {
    /// Validate `config` against the peripheral, then start it.
    pub fn init(peripheral: P, config: TransportConfig) -> Result<Self> {
        let hardware = peripheral.mailbox_count();
        let mailbox_count = config.mailbox_count.unwrap_or(hardware);
        if mailbox_count == 0 {
            return Err(TransportError::InvalidConfig(
                "mailbox count must be at least 1".into(),
            ));
        }
        if mailbox_count > hardware {
            return Err(TransportError::InvalidConfig(format!(
                "mailbox count {mailbox_count} exceeds the {hardware} hardware mailboxes"
            )));
        }
        if config.rx_pool_capacity == 0 {
            return Err(TransportError::InvalidConfig(
                "receive pool capacity must be at least 1".into(),
            ));
        }

        let (tx, rx) = mpsc::sync_channel(config.rx_pool_capacity);
        let shared = Arc::new(Shared {
            mailboxes: Mailboxes::new(mailbox_count),
            rx_pool: Mutex::new(BlockPool::with_capacity(config.rx_pool_capacity)),
            rx_queue: tx,
            counters: Counters::default(),
            shutdown: ShutdownToken::new(),
        });

        let peripheral = Arc::new(peripheral);
        let as_dyn: Arc<dyn Peripheral> = peripheral.clone();
        let irq = InterruptHandle {
            shared: Arc::clone(&shared),
            peripheral: Arc::downgrade(&as_dyn),
        };
        peripheral.start(irq).map_err(TransportError::Start)?;

        debug!(
            mailboxes = mailbox_count,
            rx_pool = config.rx_pool_capacity,
            "transport started"
        );

        Ok(Self {
            peripheral,
            shared,
            rx_queue: Mutex::new(Some(rx)),
            config,
            module_errors: Arc::new(ModuleErrors::new()),
        })
    }

    /// Report sticky failures into a shared flag set instead of a private one.
    pub fn with_module_errors(mut self, errors: Arc<ModuleErrors>) -> Self {
        self.module_errors = errors;
        self
    }

    /// Send one frame.
    ///
    /// Blocks for a free mailbox (bounded by the configured timeout). A timeout
    /// or peripheral failure raises the sticky `TRANSPORT` flag.
    pub fn transmit(&self, frame: &Frame) -> Result<()> {
        if frame.is_empty() {
            return Err(TransportError::EmptyFrame);
        }
        if self.shared.shutdown.is_cancelled() {
            return Err(TransportError::Shutdown);
        }

        if let Err(err) = self.shared.mailboxes.acquire(self.config.transmit_timeout) {
            if matches!(err, TransportError::MailboxTimeout(_)) {
                self.transmit_failed(frame, &err);
            }
            return Err(err);
        }

        match self.peripheral.send(frame) {
            Ok(()) => {
                self.shared
                    .counters
                    .transmitted
                    .fetch_add(1, Ordering::Relaxed);
                trace!(id = %frame.id(), len = frame.len(), "frame transmitted");
                Ok(())
            }
            Err(source) => {
                self.shared.mailboxes.release();
                let err = TransportError::Peripheral(source);
                self.transmit_failed(frame, &err);
                Err(err)
            }
        }
    }

    fn transmit_failed(&self, frame: &Frame, err: &TransportError) {
        self.shared
            .counters
            .transmit_failed
            .fetch_add(1, Ordering::Relaxed);
        if self.module_errors.raise(ModuleError::Transport) {
            error!(id = %frame.id(), %err, "transmit failed");
        } else {
            debug!(id = %frame.id(), %err, "transmit failed");
        }
    }

    /// Start the single receive dispatch thread.
    ///
    /// Each queued frame is taken out of the receive pool, handed to `handler`,
    /// and its block released. Can only be called once per transport.
    pub fn spawn_receiver<H>(&self, mut handler: H) -> Result<ReceiverHandle>
    where
        H: FrameHandler + 'static,
    {
        let rx = self
            .rx_queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::ReceiverTaken)?;
        let shared = Arc::clone(&self.shared);

        let thread = thread::Builder::new()
            .name("vcucan-rx".into())
            .spawn(move || {
                debug!("receive dispatch started");
                while !shared.shutdown.is_cancelled() {
                    let handle = match rx.recv_timeout(DISPATCH_POLL) {
                        Ok(handle) => handle,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    let frame = shared.pool().remove(handle);
                    match frame {
                        Some(frame) => handler.handle(&frame),
                        None => warn!(index = handle.index(), "stale receive handle skipped"),
                    }
                }
                let mut released = 0usize;
                while let Ok(handle) = rx.try_recv() {
                    if shared.pool().remove(handle).is_some() {
                        released += 1;
                    }
                }
                debug!(released, "receive dispatch stopped");
            })
            .map_err(|source| TransportError::Spawn {
                name: "receive dispatch",
                source,
            })?;

        Ok(ReceiverHandle { thread })
    }

    /// Stop immediately after a fault.
    ///
    /// Cancels every worker, fails blocked transmitters with `Shutdown`, writes
    /// off in-flight mailbox slots, and raises `EMERGENCY_STOP`.
    pub fn emergency_stop(&self) {
        self.shared.shutdown.cancel();
        let written_off = self.shared.mailboxes.abandon();
        self.module_errors.raise(ModuleError::EmergencyStop);
        error!(written_off, "transport emergency stop");
    }

    /// Orderly stop: workers exit at their next wait point.
    pub fn shutdown(&self) {
        if !self.shared.shutdown.is_cancelled() {
            debug!("transport shutting down");
        }
        self.shared.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Token cancelled when this transport stops.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shared.shutdown.clone()
    }

    pub fn stats(&self) -> TransportStats {
        let counters = &self.shared.counters;
        let mailboxes = &self.shared.mailboxes;
        TransportStats {
            transmitted: counters.transmitted.load(Ordering::Relaxed),
            transmit_failed: counters.transmit_failed.load(Ordering::Relaxed),
            received: counters.received.load(Ordering::Relaxed),
            rx_dropped: counters.rx_dropped.load(Ordering::Relaxed),
            peak_in_flight: mailboxes.peak(),
            in_flight: mailboxes.in_flight(),
            written_off: mailboxes.written_off(),
        }
    }

    pub fn mailbox_count(&self) -> usize {
        self.shared.mailboxes.capacity()
    }

    pub fn module_errors(&self) -> &Arc<ModuleErrors> {
        &self.module_errors
    }

    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl<P: Peripheral + 'static> Drop for Transport<P> {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl<P: Peripheral + 'static> std::fmt::Debug for Transport<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("mailboxes", &self.shared.mailboxes.capacity())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::channel;
    use std::time::Instant;

    use vcucan_frame::Frame;

    use super::*;
    use crate::error::PeripheralError;
    use crate::virtual_bus::VirtualBus;

    fn frame(id: u32, data: &[u8]) -> Frame {
        Frame::standard(id, data).unwrap()
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn init_defaults_to_hardware_mailboxes() {
        let transport = Transport::init(VirtualBus::new(), TransportConfig::default()).unwrap();
        assert_eq!(transport.mailbox_count(), 3);
        assert!(transport.peripheral().is_started());
    }

    #[test]
    fn init_rejects_more_mailboxes_than_hardware() {
        let config = TransportConfig {
            mailbox_count: Some(4),
            ..TransportConfig::default()
        };
        let err = Transport::init(VirtualBus::new(), config).unwrap_err();
        assert!(matches!(err, TransportError::InvalidConfig(_)));
    }

    #[test]
    fn init_surfaces_start_failure() {
        let err = Transport::init(VirtualBus::new().failing_start(), TransportConfig::default())
            .unwrap_err();
        assert!(matches!(err, TransportError::Start(_)));
    }

    #[test]
    fn empty_frame_is_rejected() {
        let transport = Transport::init(VirtualBus::new(), TransportConfig::default()).unwrap();
        let err = transport.transmit(&frame(0x100, &[])).unwrap_err();
        assert!(matches!(err, TransportError::EmptyFrame));
        assert!(transport.peripheral().sent().is_empty());
        assert!(transport.module_errors().is_clear());
    }

    #[test]
    fn transmit_reaches_peripheral() {
        let transport = Transport::init(VirtualBus::new(), TransportConfig::default()).unwrap();
        transport.transmit(&frame(0x100, &[1, 2, 3])).unwrap();
        assert_eq!(transport.peripheral().sent(), vec![frame(0x100, &[1, 2, 3])]);
        let stats = transport.stats();
        assert_eq!(stats.transmitted, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[test]
    fn mailbox_timeout_sets_sticky_flag() {
        let config = TransportConfig {
            transmit_timeout: Some(Duration::from_millis(10)),
            ..TransportConfig::default()
        };
        let bus = VirtualBus::with_mailboxes(1).manual_completion();
        let transport = Transport::init(bus, config).unwrap();

        transport.transmit(&frame(0x100, &[1])).unwrap();
        let err = transport.transmit(&frame(0x100, &[2])).unwrap_err();

        assert!(matches!(err, TransportError::MailboxTimeout(_)));
        assert!(transport.module_errors().contains(ModuleError::Transport));
        assert_eq!(transport.stats().transmit_failed, 1);

        transport.peripheral().complete_next();
        transport.transmit(&frame(0x100, &[3])).unwrap();
        assert!(transport.module_errors().contains(ModuleError::Transport));
    }

    #[test]
    fn failed_send_releases_its_slot() {
        let bus = VirtualBus::with_mailboxes(1).manual_completion();
        bus.fail_next_sends(1);
        let transport = Transport::init(bus, TransportConfig::default()).unwrap();

        let err = transport.transmit(&frame(0x100, &[1])).unwrap_err();
        assert!(matches!(err, TransportError::Peripheral(PeripheralError { .. })));
        assert_eq!(transport.stats().in_flight, 0);
        assert!(transport.module_errors().contains(ModuleError::Transport));

        transport.transmit(&frame(0x100, &[2])).unwrap();
        assert_eq!(transport.stats().in_flight, 1);
    }

    #[test]
    fn concurrent_transmitters_never_exceed_mailbox_count() {
        let config = TransportConfig {
            transmit_timeout: None,
            ..TransportConfig::default()
        };
        let bus = VirtualBus::with_mailboxes(3).manual_completion();
        let transport = Arc::new(Transport::init(bus, config).unwrap());

        let senders: Vec<_> = (0..8u8)
            .map(|i| {
                let transport = Arc::clone(&transport);
                thread::spawn(move || transport.transmit(&frame(0x100, &[i])))
            })
            .collect();

        assert!(wait_for(|| transport.peripheral().sent().len() == 3));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(transport.peripheral().sent().len(), 3);
        assert_eq!(transport.stats().in_flight, 3);

        let mut completed = 0;
        while completed < 8 {
            if transport.peripheral().complete_next() {
                completed += 1;
            } else {
                thread::sleep(Duration::from_millis(1));
            }
            assert!(transport.stats().in_flight <= 3);
        }
        for sender in senders {
            sender.join().unwrap().unwrap();
        }

        let stats = transport.stats();
        assert_eq!(stats.transmitted, 8);
        assert_eq!(stats.peak_in_flight, 3);
        assert_eq!(stats.in_flight, 0);
    }

    #[test]
    fn received_frames_reach_handler() {
        let transport = Transport::init(VirtualBus::new(), TransportConfig::default()).unwrap();
        let (tx, rx) = channel();
        let receiver = transport
            .spawn_receiver(move |frame: &Frame| {
                let _ = tx.send(frame.clone());
            })
            .unwrap();

        transport.peripheral().inject(frame(0x0A0, &[1, 2]));
        transport.peripheral().inject(frame(0x0A1, &[3]));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), frame(0x0A0, &[1, 2]));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), frame(0x0A1, &[3]));
        assert_eq!(transport.stats().received, 2);

        transport.shutdown();
        receiver.join();
    }

    #[test]
    fn receiver_can_only_start_once() {
        let transport = Transport::init(VirtualBus::new(), TransportConfig::default()).unwrap();
        let first = transport.spawn_receiver(|_: &Frame| {}).unwrap();
        assert!(matches!(
            transport.spawn_receiver(|_: &Frame| {}),
            Err(TransportError::ReceiverTaken)
        ));
        transport.shutdown();
        first.join();
    }

    #[test]
    fn pool_exhaustion_drops_and_counts() {
        let config = TransportConfig {
            rx_pool_capacity: 2,
            ..TransportConfig::default()
        };
        let transport = Transport::init(VirtualBus::new(), config).unwrap();

        for i in 0..5u8 {
            transport.peripheral().inject(frame(0x0A0, &[i]));
        }
        let stats = transport.stats();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.rx_dropped, 3);

        let (tx, rx) = channel();
        let receiver = transport
            .spawn_receiver(move |frame: &Frame| {
                let _ = tx.send(frame.data()[0]);
            })
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);

        // Blocks are free again once dispatched.
        transport.peripheral().inject(frame(0x0A0, &[9]));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 9);

        transport.shutdown();
        receiver.join();
    }

    #[test]
    fn emergency_stop_wakes_blocked_transmitters() {
        let config = TransportConfig {
            transmit_timeout: None,
            ..TransportConfig::default()
        };
        let bus = VirtualBus::with_mailboxes(1).manual_completion();
        let transport = Arc::new(Transport::init(bus, config).unwrap());
        transport.transmit(&frame(0x100, &[1])).unwrap();

        let blocked = {
            let transport = Arc::clone(&transport);
            thread::spawn(move || transport.transmit(&frame(0x100, &[2])))
        };
        thread::sleep(Duration::from_millis(30));

        transport.emergency_stop();

        assert!(matches!(
            blocked.join().unwrap(),
            Err(TransportError::Shutdown)
        ));
        let stats = transport.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.written_off, 1);
        assert!(transport.module_errors().contains(ModuleError::EmergencyStop));

        // A completion arriving after the stop changes nothing.
        assert!(transport.peripheral().complete_next());
        assert_eq!(transport.stats().in_flight, 0);
        assert!(matches!(
            transport.transmit(&frame(0x100, &[3])),
            Err(TransportError::Shutdown)
        ));
    }

    #[test]
    fn dispatch_thread_exits_on_shutdown() {
        let transport = Transport::init(VirtualBus::new(), TransportConfig::default()).unwrap();
        let receiver = transport.spawn_receiver(|_: &Frame| {}).unwrap();
        transport.emergency_stop();
        assert!(wait_for(|| receiver.is_finished()));
        receiver.join();

        transport.peripheral().inject(frame(0x0A0, &[1]));
        assert_eq!(transport.stats().received, 0);
        assert_eq!(transport.stats().rx_dropped, 1);
    }

    #[test]
    fn shared_module_errors_are_used() {
        let errors = Arc::new(ModuleErrors::new());
        let bus = VirtualBus::new();
        bus.fail_next_sends(1);
        let transport = Transport::init(bus, TransportConfig::default())
            .unwrap()
            .with_module_errors(Arc::clone(&errors));
        let _ = transport.transmit(&frame(0x100, &[1]));
        assert!(errors.contains(ModuleError::Transport));
    }
}
