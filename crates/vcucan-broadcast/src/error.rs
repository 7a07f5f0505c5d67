use vcucan_frame::FrameError;
use vcucan_transport::TransportError;

/// Errors that can occur while registering or broadcasting segments.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    /// A fixed block pool has no free block left.
    #[error("{pool} pool exhausted ({capacity} blocks)")]
    MemoryExhausted {
        pool: &'static str,
        capacity: usize,
    },

    /// The segment handle does not refer to a registered segment.
    #[error("unknown segment")]
    UnknownSegment,

    /// A channel source reported zero bytes.
    #[error("channel source has no bytes")]
    ZeroLengthChannel,

    /// A channel would run past the eighth data byte.
    #[error("channel at offset {offset} with {len} bytes overflows the frame")]
    ChannelOverflow { offset: usize, len: usize },

    /// A channel would share bytes with an existing channel of its segment.
    #[error("channel at offset {offset} with {len} bytes overlaps an existing channel")]
    OverlappingChannel { offset: usize, len: usize },

    /// A shared buffer was written with the wrong number of bytes.
    #[error("source expects {expected} bytes, got {actual}")]
    SourceLength { expected: usize, actual: usize },

    /// The broadcast period is zero.
    #[error("broadcast period must be non-zero")]
    InvalidPeriod,

    /// An assembled frame was rejected.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The transport refused a segment.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The broadcast thread could not be spawned.
    #[error("failed to spawn broadcast thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, BroadcastError>;
