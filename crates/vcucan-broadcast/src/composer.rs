use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};
use vcucan_frame::{Frame, FrameId, MAX_DATA_LEN};
use vcucan_state::{ModuleError, ModuleErrors};
use vcucan_transport::{BlockPool, Handle, Peripheral, ShutdownToken, Transport};

use crate::error::{BroadcastError, Result};
use crate::source::{ChannelSource, RollingCounterSource};

/// Configuration for a [`Composer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerConfig {
    /// Time between broadcast cycles. Default: 100 ms.
    pub period: Duration,
    /// Segments that can be registered. Default: 4.
    pub segment_capacity: usize,
    /// Channels across all segments. Default: 10.
    pub channel_capacity: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            segment_capacity: 4,
            channel_capacity: 10,
        }
    }
}

/// Lock shared by a segment and whoever writes its sources.
///
/// Holding it while updating several sources makes the assembled frame see
/// all of the update or none of it.
#[derive(Debug, Clone, Default)]
pub struct SegmentGuard(Arc<Mutex<()>>);

impl SegmentGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentHandle(Handle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(Handle);

struct Segment {
    id: FrameId,
    guard: Option<SegmentGuard>,
    first_channel: Option<Handle>,
    last_channel: Option<Handle>,
    bytes_used: usize,
    next: Option<Handle>,
}

struct Channel {
    source: Box<dyn ChannelSource>,
    offset: usize,
    len: usize,
    next: Option<Handle>,
}

/// Outcome of one broadcast cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Rolling counter value carried by this cycle's frames.
    pub counter: u16,
    pub sent: usize,
    pub failed: usize,
    /// Segments with no channels, not transmitted.
    pub skipped: usize,
}

/// Totals across every cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposerStats {
    pub cycles: u64,
    pub segments_sent: u64,
    pub segments_failed: u64,
    pub overruns: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cycles: AtomicU64,
    segments_sent: AtomicU64,
    segments_failed: AtomicU64,
    overruns: AtomicU64,
}

/// Registry of outgoing segments and the channels that fill them.
///
/// Segments and channels come from fixed pools sized by [`ComposerConfig`];
/// registration order is broadcast order.
pub struct Composer {
    config: ComposerConfig,
    segments: BlockPool<Segment>,
    channels: BlockPool<Channel>,
    first_segment: Option<Handle>,
    last_segment: Option<Handle>,
    counter: Arc<AtomicU16>,
    counters: Counters,
    module_errors: Arc<ModuleErrors>,
}

impl Composer {
    pub fn new(config: ComposerConfig) -> Result<Self> {
        if config.period.is_zero() {
            return Err(BroadcastError::InvalidPeriod);
        }
        Ok(Self {
            segments: BlockPool::with_capacity(config.segment_capacity),
            channels: BlockPool::with_capacity(config.channel_capacity),
            config,
            first_segment: None,
            last_segment: None,
            counter: Arc::new(AtomicU16::new(0)),
            counters: Counters::default(),
            module_errors: Arc::new(ModuleErrors::new()),
        })
    }

    /// Report pool exhaustion and failed cycles into a shared flag set.
    pub fn with_module_errors(mut self, errors: Arc<ModuleErrors>) -> Self {
        self.module_errors = errors;
        self
    }

    fn exhausted(&self, pool: &'static str, capacity: usize) -> BroadcastError {
        self.module_errors.raise(ModuleError::Broadcast);
        warn!(pool, capacity, "broadcast pool exhausted");
        BroadcastError::MemoryExhausted { pool, capacity }
    }

    /// Register an outgoing frame. It is broadcast after every segment registered before it.
    pub fn create_segment(
        &mut self,
        id: FrameId,
        guard: Option<SegmentGuard>,
    ) -> Result<SegmentHandle> {
        let segment = Segment {
            id,
            guard,
            first_channel: None,
            last_channel: None,
            bytes_used: 0,
            next: None,
        };
        let handle = self
            .segments
            .insert(segment)
            .map_err(|e| self.exhausted("segment", e.capacity))?;

        match self.last_segment.and_then(|last| self.segments.get_mut(last)) {
            Some(last) => last.next = Some(handle),
            None => self.first_segment = Some(handle),
        }
        self.last_segment = Some(handle);
        debug!(%id, "broadcast segment registered");
        Ok(SegmentHandle(handle))
    }

    /// Append a channel right after the bytes already claimed in `segment`.
    pub fn create_channel<S>(&mut self, segment: SegmentHandle, source: S) -> Result<ChannelHandle>
    where
        S: ChannelSource + 'static,
    {
        let offset = self
            .segments
            .get(segment.0)
            .ok_or(BroadcastError::UnknownSegment)?
            .bytes_used;
        self.create_channel_at(segment, offset, source)
    }

    /// Place a channel at an explicit byte offset of `segment`.
    ///
    /// Fails if the channel would run past byte 8 or share a byte with another
    /// channel of the segment; nothing is truncated.
    pub fn create_channel_at<S>(
        &mut self,
        segment: SegmentHandle,
        offset: usize,
        source: S,
    ) -> Result<ChannelHandle>
    where
        S: ChannelSource + 'static,
    {
        let len = source.len();
        let seg = self
            .segments
            .get(segment.0)
            .ok_or(BroadcastError::UnknownSegment)?;
        if len == 0 {
            return Err(BroadcastError::ZeroLengthChannel);
        }
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= MAX_DATA_LEN)
            .ok_or(BroadcastError::ChannelOverflow { offset, len })?;
        let mut cursor = seg.first_channel;
        while let Some(handle) = cursor {
            let Some(existing) = self.channels.get(handle) else {
                break;
            };
            if offset < existing.offset + existing.len && existing.offset < end {
                return Err(BroadcastError::OverlappingChannel { offset, len });
            }
            cursor = existing.next;
        }

        let channel = Channel {
            source: Box::new(source),
            offset,
            len,
            next: None,
        };
        let handle = self
            .channels
            .insert(channel)
            .map_err(|e| self.exhausted("channel", e.capacity))?;

        let last_channel = self.segments.get(segment.0).and_then(|s| s.last_channel);
        if let Some(last) = last_channel.and_then(|last| self.channels.get_mut(last)) {
            last.next = Some(handle);
        }
        if let Some(seg) = self.segments.get_mut(segment.0) {
            if seg.first_channel.is_none() {
                seg.first_channel = Some(handle);
            }
            seg.last_channel = Some(handle);
            seg.bytes_used += len;
        }
        trace!(offset, len, "broadcast channel registered");
        Ok(ChannelHandle(handle))
    }

    /// Segment carrying the rolling counter (bytes 0..2) and the module error
    /// bitmask (bytes 2..6), both little-endian.
    pub fn create_status_segment(&mut self, id: FrameId) -> Result<SegmentHandle> {
        let segment = self.create_segment(id, None)?;
        self.create_channel_at(segment, 0, RollingCounterSource::new(Arc::clone(&self.counter)))?;
        self.create_channel_at(segment, 2, Arc::clone(&self.module_errors))?;
        Ok(segment)
    }

    /// Build `segment`'s frame from the current source bytes.
    ///
    /// The frame is as long as the highest channel end. Returns `None` for a
    /// segment with no channels.
    pub fn assemble(&self, segment: SegmentHandle) -> Result<Option<Frame>> {
        let seg = self
            .segments
            .get(segment.0)
            .ok_or(BroadcastError::UnknownSegment)?;
        self.assemble_segment(seg)
    }

    fn assemble_segment(&self, seg: &Segment) -> Result<Option<Frame>> {
        let mut data = [0u8; MAX_DATA_LEN];
        let mut end = 0;
        {
            let _guard = seg.guard.as_ref().map(SegmentGuard::lock);
            let mut cursor = seg.first_channel;
            while let Some(handle) = cursor {
                let Some(channel) = self.channels.get(handle) else {
                    break;
                };
                channel
                    .source
                    .copy_to(&mut data[channel.offset..channel.offset + channel.len]);
                end = end.max(channel.offset + channel.len);
                cursor = channel.next;
            }
        }
        if end == 0 {
            return Ok(None);
        }
        Ok(Some(Frame::new(seg.id, &data[..end])?))
    }

    /// Assemble and transmit every segment once, then advance the rolling counter.
    ///
    /// Transmit failures are counted, not returned; they raise `BROADCAST`.
    pub fn broadcast_once<P: Peripheral + 'static>(&self, transport: &Transport<P>) -> CycleReport {
        let mut report = CycleReport {
            counter: self.counter.load(Ordering::Acquire),
            ..CycleReport::default()
        };

        let mut cursor = self.first_segment;
        while let Some(handle) = cursor {
            let Some(seg) = self.segments.get(handle) else {
                break;
            };
            cursor = seg.next;

            let result = self
                .assemble_segment(seg)
                .and_then(|frame| match frame {
                    Some(frame) => transport.transmit(&frame).map(|()| true).map_err(Into::into),
                    None => Ok(false),
                });
            match result {
                Ok(true) => report.sent += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    debug!(id = %seg.id, %err, "broadcast segment not sent");
                }
            }
        }

        self.counter.fetch_add(1, Ordering::AcqRel);
        self.counters.cycles.fetch_add(1, Ordering::Relaxed);
        self.counters
            .segments_sent
            .fetch_add(report.sent as u64, Ordering::Relaxed);
        self.counters
            .segments_failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        if report.failed > 0 && self.module_errors.raise(ModuleError::Broadcast) {
            error!(failed = report.failed, "broadcast cycle failed");
        }
        report
    }

    /// Current rolling counter value, the one the next cycle will carry.
    pub fn counter(&self) -> u16 {
        self.counter.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> ComposerStats {
        ComposerStats {
            cycles: self.counters.cycles.load(Ordering::Relaxed),
            segments_sent: self.counters.segments_sent.load(Ordering::Relaxed),
            segments_failed: self.counters.segments_failed.load(Ordering::Relaxed),
            overruns: self.counters.overruns.load(Ordering::Relaxed),
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    pub fn module_errors(&self) -> &Arc<ModuleErrors> {
        &self.module_errors
    }

    /// Start the periodic broadcast thread.
    ///
    /// Each cycle starts one period after the previous one started. A cycle
    /// that overruns its period is followed immediately by the next one and
    /// the schedule restarts from there, so missed cycles are never replayed.
    /// The thread exits when the returned handle is stopped or the transport
    /// shuts down.
    pub fn start<P: Peripheral + 'static>(
        self,
        transport: Arc<Transport<P>>,
    ) -> Result<BroadcastHandle> {
        let composer = Arc::new(self);
        let stop = ShutdownToken::new();
        let period = composer.config.period;

        let thread = {
            let composer = Arc::clone(&composer);
            let stop = stop.clone();
            thread::Builder::new()
                .name("vcucan-broadcast".into())
                .spawn(move || {
                    debug!(?period, segments = composer.segment_count(), "broadcast started");
                    let mut next = Instant::now();
                    while !stop.is_cancelled() && !transport.is_shut_down() {
                        let report = composer.broadcast_once(&transport);
                        trace!(
                            counter = report.counter,
                            sent = report.sent,
                            failed = report.failed,
                            "broadcast cycle"
                        );

                        next += period;
                        let now = Instant::now();
                        if next < now {
                            composer.counters.overruns.fetch_add(1, Ordering::Relaxed);
                            warn!(behind = ?(now - next), "broadcast cycle overran its period");
                            next = now;
                        }
                        if stop.wait_until(next) {
                            break;
                        }
                    }
                    debug!("broadcast stopped");
                })
                .map_err(BroadcastError::Spawn)?
        };

        Ok(BroadcastHandle {
            composer,
            stop,
            thread: Some(thread),
        })
    }
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("config", &self.config)
            .field("segments", &self.segments.len())
            .field("channels", &self.channels.len())
            .field("counter", &self.counter())
            .finish()
    }
}

/// Running broadcast thread. Stops the thread when dropped.
#[derive(Debug)]
pub struct BroadcastHandle {
    composer: Arc<Composer>,
    stop: ShutdownToken,
    thread: Option<JoinHandle<()>>,
}

impl BroadcastHandle {
    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn stats(&self) -> ComposerStats {
        self.composer.stats()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("broadcast thread panicked");
            }
        }
    }
}

impl Drop for BroadcastHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
