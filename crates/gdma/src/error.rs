//! Error taxonomy shared by the DMA driver and the streaming controllers.

use platform::{CacheError, InterruptError};

/// Driver error.
///
/// Configuration and allocation problems are returned synchronously and
/// never retried. Once a channel is running, hardware errors are reported
/// through [`ChannelHandler::on_invalid_block`](crate::ChannelHandler::on_invalid_block)
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Out-of-range or inconsistent configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Operation not allowed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// No free channel slot or interrupt vector.
    #[error("not found: {0}")]
    NotFound(&'static str),
    /// A fixed-size table or counter is full.
    #[error("no memory: {0}")]
    NoMemory(&'static str),
    /// Interrupt priority mismatch, or a peripheral already claimed.
    #[error("conflict: {0}")]
    Conflict(&'static str),
    /// Bounded queue still full when the deadline elapsed.
    #[error("timed out")]
    Timeout,
    /// Unrecoverable condition; the pipeline has been halted.
    #[error("fatal: {0}")]
    Fatal(&'static str),
}

/// Coarse error class, for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// See [`Error::InvalidArgument`].
    InvalidArgument,
    /// See [`Error::InvalidState`].
    InvalidState,
    /// [`Error::NotFound`] or [`Error::NoMemory`].
    ResourceExhausted,
    /// See [`Error::Conflict`].
    Conflict,
    /// See [`Error::Timeout`].
    Timeout,
    /// See [`Error::Fatal`].
    Fatal,
}

impl Error {
    /// Classify the error.
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::NotFound(_) | Self::NoMemory(_) => ErrorKind::ResourceExhausted,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Timeout => ErrorKind::Timeout,
            Self::Fatal(_) => ErrorKind::Fatal,
        }
    }
}

impl From<CacheError> for Error {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Misaligned => Self::InvalidArgument("buffer not cache-line aligned"),
            CacheError::InvalidRegion => Self::InvalidArgument("buffer not in cacheable memory"),
        }
    }
}

impl From<InterruptError> for Error {
    fn from(e: InterruptError) -> Self {
        match e {
            InterruptError::NoFreeVector => Self::NotFound("no free interrupt vector"),
            InterruptError::PriorityUnavailable => Self::Conflict("interrupt priority unavailable"),
        }
    }
}

/// Driver result.
pub type Result<T, E = Error> = core::result::Result<T, E>;
