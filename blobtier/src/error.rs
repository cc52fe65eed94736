//! Errors surfaced by containers, tier lookup and configuration

use std::fmt;
use std::io;

use crate::io::BackendKind;

/// Errors that can occur in container operations
#[derive(Debug)]
pub enum BlobError {
    /// No configured tier has a ceiling large enough for the size.
    /// Signals a configuration gap (no catch-all tier); never retried.
    NoTierForSize { size: u64, tiers: String },
    /// Materializing the payload as one byte vector would exceed the limit
    ExceedsArrayLimit { size: u64, max: u64 },
    /// `offset..offset + length` does not fit in the source slice
    InvalidRange {
        offset: usize,
        length: usize,
        available: usize,
    },
    /// A backend of the given kind could not be created
    Construction { kind: BackendKind, source: io::Error },
    /// Configuration could not be read or is invalid
    Config(String),
    /// I/O failure in the active backend
    Io(io::Error),
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTierForSize { size, tiers } => {
                write!(f, "No available backend tier for size {size}. Tiers: {tiers}")
            }
            Self::ExceedsArrayLimit { size, max } => write!(
                f,
                "Data exceeds the maximum size configured for array usage, size={size} max={max}"
            ),
            Self::InvalidRange {
                offset,
                length,
                available,
            } => write!(
                f,
                "Range {offset}+{length} is out of bounds for {available} bytes"
            ),
            Self::Construction { kind, source } => {
                write!(f, "Unable to instantiate {kind} backend: {source}")
            }
            Self::Config(msg) => write!(f, "Config error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for BlobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Construction { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BlobError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Channel methods speak `io::Result`, so container errors are tunnelled
/// through `io::Error` and can be recovered with `get_ref().downcast_ref()`.
impl From<BlobError> for io::Error {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::Io(inner) => inner,
            BlobError::InvalidRange { .. } => io::Error::new(io::ErrorKind::InvalidInput, e),
            other => io::Error::other(other),
        }
    }
}
