use desfire_apdu_core::CardTransport;

use crate::card::Desfire;
use crate::codec::{CommMode, CommandEnvelope};
use crate::constants::cmd;
use crate::crypto::pad;
use crate::key_change::{self, KeyChange};
use crate::types::KeySettings;
use crate::{Error, Result};

impl<T: CardTransport> Desfire<T> {
    /// Read the key settings of the selected application or PICC
    pub fn get_key_settings(&mut self) -> Result<KeySettings> {
        let mode = self.mode_for(CommMode::Mac);
        let data = self.send(&CommandEnvelope::new(cmd::GET_KEY_SETTINGS, mode))?;
        KeySettings::try_from(data.as_slice())
    }

    /// Replace the key settings byte
    pub fn change_key_settings(&mut self, settings: u8) -> Result<()> {
        let envelope =
            CommandEnvelope::new(cmd::CHANGE_KEY_SETTINGS, CommMode::Full).with_payload(pad(&[settings]));
        self.send(&envelope)?;
        Ok(())
    }

    /// Read the version byte stored with a key
    pub fn get_key_version(&mut self, key_no: u8) -> Result<u8> {
        let mode = self.mode_for(CommMode::Mac);
        let data =
            self.send(&CommandEnvelope::new(cmd::GET_KEY_VERSION, mode).with_header([key_no]))?;
        match data.as_slice() {
            [version] => Ok(*version),
            _ => Err(Error::invalid_length("GetKeyVersion answer", 1, data.len())),
        }
    }

    /// Change a key with ChangeKey
    ///
    /// Changing the key the session was authenticated with ends the session.
    pub fn change_key(&mut self, change: &KeyChange<'_>) -> Result<()> {
        self.with_session(|transport, session, config| {
            key_change::change_key(transport, session, change, None, config)
        })
    }

    /// Change a key in one of the application's key sets with ChangeKeyEV2
    pub fn change_key_ev2(&mut self, key_set: u8, change: &KeyChange<'_>) -> Result<()> {
        self.with_session(|transport, session, config| {
            key_change::change_key(transport, session, change, Some(key_set), config)
        })
    }
}
