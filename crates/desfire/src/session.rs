//! Authenticated session state
//!
//! A [`Session`] is only created by a successful handshake. It owns the secure messaging
//! channel selected at that point and is invalidated, wiping its keys, on the first
//! failure that leaves host and card out of sync.

use std::fmt;

use derive_more::{Deref, Display};
use tracing::warn;

use crate::channel::{Channel, SecureMessaging};
use crate::constants::{CAPABILITIES_LENGTH, PICC_AID, TI_LENGTH};
use crate::counter::CommandCounter;
use crate::{Error, Result};

/// Transaction identifier assigned by the card in AuthenticateEV2First
#[derive(Clone, Copy, PartialEq, Eq, Hash, Deref)]
pub struct TransactionId([u8; TI_LENGTH]);

impl TransactionId {
    /// Wrap raw TI bytes
    pub const fn new(bytes: [u8; TI_LENGTH]) -> Self {
        Self(bytes)
    }

    /// TI bytes
    pub const fn as_bytes(&self) -> &[u8; TI_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", hex::encode(self.0))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

/// Secure messaging generation negotiated by the handshake
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Legacy ISO 3DES authentication, encryption only
    #[display("EV1")]
    Ev1,
    /// AES AuthenticateEV2First/NonFirst with CMAC and command counter
    #[display("EV2")]
    Ev2,
}

/// Observable state of the secure channel on a card handle
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No usable session
    Unauthenticated,
    /// First handshake message sent, waiting for completion
    HandshakePending,
    /// EV2 secure messaging active
    Ev2Active,
    /// Legacy ISO secure messaging active
    Ev1Active,
}

/// An authenticated session
pub struct Session {
    channel: Option<Channel>,
    key_no: u8,
    pd_capabilities: [u8; CAPABILITIES_LENGTH],
    pcd_capabilities: [u8; CAPABILITIES_LENGTH],
    application: [u8; 3],
}

impl Session {
    pub(crate) const fn new(channel: Channel, key_no: u8) -> Self {
        Self {
            channel: Some(channel),
            key_no,
            pd_capabilities: [0; CAPABILITIES_LENGTH],
            pcd_capabilities: [0; CAPABILITIES_LENGTH],
            application: PICC_AID,
        }
    }

    pub(crate) const fn with_capabilities(
        mut self,
        pd_capabilities: [u8; CAPABILITIES_LENGTH],
        pcd_capabilities: [u8; CAPABILITIES_LENGTH],
    ) -> Self {
        self.pd_capabilities = pd_capabilities;
        self.pcd_capabilities = pcd_capabilities;
        self
    }

    /// Record the application the session was established in
    pub const fn with_application(mut self, aid: [u8; 3]) -> Self {
        self.application = aid;
        self
    }

    /// Whether the session can still be used
    pub const fn is_valid(&self) -> bool {
        self.channel.is_some()
    }

    /// Drop the channel and wipe its keys; every further use fails
    pub fn invalidate(&mut self) {
        if self.channel.take().is_some() {
            warn!(key_no = self.key_no, "Secure messaging session invalidated");
        }
    }

    /// Negotiated mode, `None` once invalidated
    pub fn mode(&self) -> Option<AuthMode> {
        self.channel.as_ref().map(|channel| channel.mode())
    }

    /// Key slot the session was authenticated with
    pub const fn key_no(&self) -> u8 {
        self.key_no
    }

    /// Application the session belongs to
    pub const fn application(&self) -> [u8; 3] {
        self.application
    }

    /// PDcap2 bytes returned by the card
    pub const fn pd_capabilities(&self) -> &[u8; CAPABILITIES_LENGTH] {
        &self.pd_capabilities
    }

    /// PCDcap2 bytes echoed by the card
    pub const fn pcd_capabilities(&self) -> &[u8; CAPABILITIES_LENGTH] {
        &self.pcd_capabilities
    }

    /// Transaction identifier (EV2 only)
    pub fn transaction_id(&self) -> Option<TransactionId> {
        match &self.channel {
            Some(Channel::Ev2(channel)) => Some(channel.ti()),
            _ => None,
        }
    }

    /// Current command counter (EV2 only)
    pub fn counter(&self) -> Option<CommandCounter> {
        match &self.channel {
            Some(Channel::Ev2(channel)) => Some(channel.counter()),
            _ => None,
        }
    }

    /// Channel state as seen by the card handle
    pub fn state(&self) -> ChannelState {
        match self.mode() {
            Some(AuthMode::Ev2) => ChannelState::Ev2Active,
            Some(AuthMode::Ev1) => ChannelState::Ev1Active,
            None => ChannelState::Unauthenticated,
        }
    }

    pub(crate) const fn set_key_no(&mut self, key_no: u8) {
        self.key_no = key_no;
    }

    pub(crate) fn channel(&self) -> Result<&Channel> {
        self.channel.as_ref().ok_or(Error::SessionInvalidated)
    }

    pub(crate) fn channel_mut(&mut self) -> Result<&mut Channel> {
        self.channel.as_mut().ok_or(Error::SessionInvalidated)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode())
            .field("key_no", &self.key_no)
            .field("ti", &self.transaction_id())
            .field("counter", &self.counter())
            .field("application", &hex::encode(self.application))
            .finish()
    }
}
