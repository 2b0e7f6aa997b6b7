use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the arena builder, the in-memory search engine, and the
/// FPS streaming search path.
#[derive(Error, Debug)]
pub enum Error {
    #[error("size mismatch: query uses {query_bytes} bytes ({query_bits} bits), target uses {target_bytes} bytes ({target_bits} bits)")]
    SizeMismatch {
        query_bits: u32,
        query_bytes: u32,
        target_bits: u32,
        target_bytes: u32,
    },

    #[error("{what} must be in [0, 1], got {value}")]
    RangeError { what: &'static str, value: f64 },

    #[error("invalid fingerprint: {reason}")]
    InvalidFingerprint { reason: String },

    #[error("invalid FPS header: {reason}")]
    InvalidHeader { reason: String },

    #[error("corrupt arena: {reason}")]
    CorruptArena { reason: String },

    #[error("{path}:{line}: {reason}")]
    FpsParse {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn size_mismatch(query_bits: u32, query_bytes: u32, target_bits: u32, target_bytes: u32) -> Self {
        Error::SizeMismatch {
            query_bits,
            query_bytes,
            target_bits,
            target_bytes,
        }
    }

    pub fn threshold_range(value: f64) -> Self {
        Error::RangeError {
            what: "threshold",
            value,
        }
    }
}
