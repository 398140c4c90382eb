//! Command and response codecs for EV2 secure messaging
//!
//! [`command`] turns a [`CommandEnvelope`] into wire bytes under the plain, MAC or full
//! communication mode. [`response`] checks status bytes, drains `0xAF` continuations and
//! verifies/decrypts what the card sent back.

pub mod command;
pub mod response;

use std::fmt;

use derive_more::Display;
use zeroize::Zeroizing;

pub use command::{build, command_iv, mac_command};
pub use response::{
    ResponseEnvelope, decode, drain, mac_response, response_iv, verify_status,
};

/// Communication mode of a command
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq)]
pub enum CommMode {
    /// No protection
    #[default]
    Plain,
    /// Command and response carry a truncated CMAC
    #[display("MAC")]
    Mac,
    /// Payload encrypted, command and response carry a truncated CMAC
    Full,
}

impl CommMode {
    /// Whether this mode involves the session keys
    pub const fn is_secured(self) -> bool {
        !matches!(self, Self::Plain)
    }

    /// Decode the communication settings bits of a file (`00` plain, `01` MAC, `11` full)
    pub const fn from_file_settings(bits: u8) -> Self {
        match bits & 0x03 {
            0x01 => Self::Mac,
            0x03 => Self::Full,
            _ => Self::Plain,
        }
    }
}

/// A native command before secure messaging is applied
///
/// The header is sent in clear in every mode; in full mode only the payload is
/// encrypted. Full-mode payloads must already be padded to the cipher block size.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    cmd: u8,
    header: Vec<u8>,
    payload: Zeroizing<Vec<u8>>,
    mode: CommMode,
}

impl CommandEnvelope {
    /// Create an envelope for a command code without header or payload
    pub fn new(cmd: u8, mode: CommMode) -> Self {
        Self {
            cmd,
            header: Vec::new(),
            payload: Zeroizing::new(Vec::new()),
            mode,
        }
    }

    /// Set the header bytes
    pub fn with_header(mut self, header: impl Into<Vec<u8>>) -> Self {
        self.header = header.into();
        self
    }

    /// Set the payload bytes
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Zeroizing::new(payload.into());
        self
    }

    /// Command code
    pub const fn cmd(&self) -> u8 {
        self.cmd
    }

    /// Header bytes
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Plaintext payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Communication mode
    pub const fn mode(&self) -> CommMode {
        self.mode
    }

    /// `cmd ‖ header ‖ payload` without any protection
    pub fn plain_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(1 + self.header.len() + self.payload.len());
        frame.push(self.cmd);
        frame.extend_from_slice(&self.header);
        frame.extend_from_slice(&self.payload);
        frame
    }
}

impl fmt::Debug for CommandEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEnvelope")
            .field("cmd", &format_args!("{:#04x}", self.cmd))
            .field("header", &hex::encode(&self.header))
            .field("payload_len", &self.payload.len())
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_frame() {
        let envelope = CommandEnvelope::new(0xAD, CommMode::Plain)
            .with_header([0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00])
            .with_payload(vec![0xAA]);
        assert_eq!(
            envelope.plain_frame(),
            vec![0xAD, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0xAA]
        );
    }

    #[test]
    fn test_debug_hides_payload() {
        let envelope = CommandEnvelope::new(0xC4, CommMode::Full).with_payload(vec![0x5A; 32]);
        let debug = format!("{envelope:?}");
        assert!(debug.contains("payload_len: 32"));
        assert!(!debug.contains("5a5a"));
    }

    #[test]
    fn test_comm_mode() {
        assert!(!CommMode::Plain.is_secured());
        assert!(CommMode::Mac.is_secured());
        assert_eq!(CommMode::from_file_settings(0x03), CommMode::Full);
        assert_eq!(CommMode::from_file_settings(0x01), CommMode::Mac);
        assert_eq!(CommMode::from_file_settings(0x02), CommMode::Plain);
        assert_eq!(CommMode::Mac.to_string(), "MAC");
    }
}
