//! Errors raised while encoding or parsing ISO 7816-4 APDUs

use thiserror::Error;

/// APDU encoding and parsing error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Command does not fit a short APDU or is malformed
    #[error("Invalid command length: {0}")]
    InvalidCommandLength(usize),

    /// Response shorter than its two status bytes
    #[error("Incomplete response: {0} bytes")]
    IncompleteResponse(usize),
}
