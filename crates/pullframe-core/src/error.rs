// crates/pullframe-core/src/error.rs
//
// ABI-facing error taxonomy. Internal plumbing keeps using anyhow::Result
// (ffmpeg-the-third errors, io errors, ...); call sites that cross the
// facade boundary collapse into one of these closed variants so no
// strings leak into the public surface.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("generic failure")]
    Generic,
    #[error("out of memory")]
    OutOfMemory,
    #[error("end of stream")]
    Eos,
    #[error("exit requested")]
    Exit,
    #[error("decoder not found")]
    DecoderNotFound,
    #[error("invalid data")]
    InvalidData,
    #[error("operation not supported")]
    NotSupported,
    /// Internal-only: wraps an I/O or libav* failure with context for
    /// logging. Never returned across the facade boundary — callers only
    /// ever observe the variants above.
    #[error("internal: {0}")]
    Internal(&'static str),
}

impl MediaError {
    /// Coalesce an arbitrary internal error into an ABI variant. Used at the
    /// one or two places (control worker, facade) where an `anyhow::Error`
    /// must be turned into something a C-ish caller can switch on.
    pub fn from_anyhow(e: &anyhow::Error) -> Self {
        let msg = e.to_string();
        if msg.contains("decoder not found") || msg.contains("Decoder not found") {
            MediaError::DecoderNotFound
        } else if msg.contains("invalid data") {
            MediaError::InvalidData
        } else {
            MediaError::Generic
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
