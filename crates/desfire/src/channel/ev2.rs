use std::fmt;

use tracing::trace;

use super::SecureMessaging;
use crate::Result;
use crate::codec::{self, CommMode, CommandEnvelope, ResponseEnvelope};
use crate::counter::CommandCounter;
use crate::key::SessionKeys;
use crate::session::{AuthMode, TransactionId};

/// EV2 secure messaging: AES-CBC confidentiality, truncated CMAC integrity and a
/// command counter bound to the transaction identifier
pub struct Ev2Channel {
    keys: SessionKeys,
    ti: TransactionId,
    counter: CommandCounter,
}

impl Ev2Channel {
    /// Channel right after AuthenticateEV2First, counter at zero
    pub const fn new(keys: SessionKeys, ti: TransactionId) -> Self {
        Self::with_counter(keys, ti, CommandCounter::new())
    }

    /// Channel with an explicit counter value
    pub const fn with_counter(keys: SessionKeys, ti: TransactionId, counter: CommandCounter) -> Self {
        Self { keys, ti, counter }
    }

    /// Session keys
    pub const fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// Transaction identifier
    pub const fn ti(&self) -> TransactionId {
        self.ti
    }

    /// Current command counter
    pub const fn counter(&self) -> CommandCounter {
        self.counter
    }

    /// Install keys from AuthenticateEV2NonFirst; TI and counter carry over
    pub(crate) fn rekey(&mut self, keys: SessionKeys) {
        self.keys = keys;
    }
}

impl SecureMessaging for Ev2Channel {
    fn mode(&self) -> AuthMode {
        AuthMode::Ev2
    }

    fn wrap_command(&self, envelope: &CommandEnvelope) -> Result<Vec<u8>> {
        if envelope.mode().is_secured() {
            // the response will be authenticated under counter + 1
            self.counter.next()?;
        }
        codec::build(envelope, self)
    }

    fn unwrap_response(&self, mode: CommMode, response: &ResponseEnvelope) -> Result<Vec<u8>> {
        codec::decode(response, mode, self)
    }

    fn advance(&mut self) -> Result<()> {
        self.counter.increment()?;
        trace!(counter = %self.counter, "Command counter advanced");
        Ok(())
    }
}

impl fmt::Debug for Ev2Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ev2Channel")
            .field("ti", &self.ti)
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}
