//! APDU response definitions
//!
//! ISO/IEC 7816-4 responses: an optional payload followed by SW1 SW2.

pub mod status;

use bytes::Bytes;
use tracing::trace;

use crate::Error;
use status::StatusWord;

/// Basic APDU response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response payload data
    payload: Option<Bytes>,
    /// Status word
    status: StatusWord,
}

impl Response {
    /// Parse response from raw bytes (including status word)
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        let Some((payload, &[sw1, sw2])) = data.split_last_chunk::<2>() else {
            return Err(Error::IncompleteResponse(data.len()));
        };
        let status = StatusWord::new(sw1, sw2);

        trace!(
            sw1 = format_args!("{:#04x}", sw1),
            sw2 = format_args!("{:#04x}", sw2),
            payload_len = payload.len(),
            "Parsed APDU response"
        );

        let payload = (!payload.is_empty()).then(|| Bytes::copy_from_slice(payload));
        Ok(Self { payload, status })
    }

    /// Get the response payload data
    pub const fn payload(&self) -> &Option<Bytes> {
        &self.payload
    }

    /// Get the status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }
}
