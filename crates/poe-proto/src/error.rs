//! Error taxonomy for the PoE agent (spec.md §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoeError {
    /// Bus I/O, short reads, retries exhausted.
    #[error("transport error: {0}")]
    Transport(String),

    /// Checksum, echo, key or length mismatch. Retried by the engine;
    /// exhaustion is reported to the caller as `Transport`.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Port out of range, power_limit too large, malformed port list.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not available in the chip's current dialect.
    #[error("unsupported in this dialect: {0}")]
    Unsupported(String),

    /// JSON parse failure or invariant violation on a config document.
    #[error("config corrupt: {0}")]
    ConfigCorrupt(String),

    /// The process-wide exclusive lock could not be obtained.
    #[error("busy: chip access lock unavailable")]
    Busy,

    /// A prior instance of the daemon still holds the PID file and is
    /// alive; starting a second instance would violate the process
    /// singleton invariant.
    #[error("another poed instance (pid {0}) is still running")]
    AlreadyRunning(i32),

    /// Anything else unexpected.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PoeError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        PoeError::InvalidArgument(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        PoeError::Transport(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        PoeError::Unsupported(msg.into())
    }
}

pub type PoeResult<T> = Result<T, PoeError>;
