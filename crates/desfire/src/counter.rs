use derive_more::Display;

use crate::{Error, Result};

/// 16-bit command counter (CmdCtr) of an EV2 session
///
/// Starts at zero after AuthenticateEV2First and is carried over by
/// AuthenticateEV2NonFirst. It is serialized little endian into IVs and MAC inputs.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CommandCounter(u16);

impl CommandCounter {
    /// Counter at session start
    pub const fn new() -> Self {
        Self(0)
    }

    /// Counter with an explicit value
    pub const fn from_value(value: u16) -> Self {
        Self(value)
    }

    /// Current value
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Value the card uses for the response to the current command
    pub fn next(&self) -> Result<Self> {
        self.0.checked_add(1).map(Self).ok_or(Error::CounterExhausted)
    }

    /// Advance by one after a completed secured exchange
    pub fn increment(&mut self) -> Result<()> {
        *self = self.next()?;
        Ok(())
    }

    /// Little-endian serialization
    pub const fn to_le_bytes(&self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}
