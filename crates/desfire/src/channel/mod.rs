//! Secure messaging channels
//!
//! The handshake decides once which channel protects a session: [`Ev2Channel`] for
//! AuthenticateEV2First/NonFirst and [`IsoChannel`] for the legacy 3DES fallback.
//! Command code paths only talk to the [`SecureMessaging`] interface.

mod ev2;
mod iso;

pub use ev2::Ev2Channel;
pub use iso::IsoChannel;

use crate::Result;
use crate::codec::{CommMode, CommandEnvelope, ResponseEnvelope};
use crate::session::AuthMode;

/// Protection applied to commands and responses of an authenticated session
pub trait SecureMessaging {
    /// Secure messaging generation
    fn mode(&self) -> AuthMode;

    /// Produce the wire frame for a command
    ///
    /// Fails before any I/O when the envelope cannot be protected.
    fn wrap_command(&self, envelope: &CommandEnvelope) -> Result<Vec<u8>>;

    /// Verify and decrypt a complete response received for a command sent in `mode`
    fn unwrap_response(&self, mode: CommMode, response: &ResponseEnvelope) -> Result<Vec<u8>>;

    /// Account for one completed secured exchange
    fn advance(&mut self) -> Result<()>;
}

/// The channel negotiated for a session
#[derive(Debug)]
pub enum Channel {
    /// EV2 AES secure messaging
    Ev2(Ev2Channel),
    /// Legacy ISO 3DES secure messaging
    Iso(IsoChannel),
}

impl SecureMessaging for Channel {
    fn mode(&self) -> AuthMode {
        match self {
            Self::Ev2(channel) => channel.mode(),
            Self::Iso(channel) => channel.mode(),
        }
    }

    fn wrap_command(&self, envelope: &CommandEnvelope) -> Result<Vec<u8>> {
        match self {
            Self::Ev2(channel) => channel.wrap_command(envelope),
            Self::Iso(channel) => channel.wrap_command(envelope),
        }
    }

    fn unwrap_response(&self, mode: CommMode, response: &ResponseEnvelope) -> Result<Vec<u8>> {
        match self {
            Self::Ev2(channel) => channel.unwrap_response(mode, response),
            Self::Iso(channel) => channel.unwrap_response(mode, response),
        }
    }

    fn advance(&mut self) -> Result<()> {
        match self {
            Self::Ev2(channel) => channel.advance(),
            Self::Iso(channel) => channel.advance(),
        }
    }
}
