use desfire_apdu_core::CardTransport;

use crate::card::Desfire;
use crate::codec::{CommMode, CommandEnvelope};
use crate::constants::cmd;
use crate::crypto::strip_padding;
use crate::session::AuthMode;
use crate::types::Version;
use crate::{Error, Result};

const UID_LENGTH: usize = 7;

impl<T: CardTransport> Desfire<T> {
    /// Read hardware, software and production information
    pub fn get_version(&mut self) -> Result<Version> {
        let mode = self.mode_for(CommMode::Mac);
        let data = self.send(&CommandEnvelope::new(cmd::GET_VERSION, mode))?;
        Version::try_from(data.as_slice())
    }

    /// Read the real UID, which stays hidden behind a random ID until authentication
    pub fn get_card_uid(&mut self) -> Result<[u8; UID_LENGTH]> {
        let mode = self.auth_mode();
        let data = self.send(&CommandEnvelope::new(cmd::GET_CARD_UID, CommMode::Full))?;

        let uid = match mode {
            Some(AuthMode::Ev2) => strip_padding(&data)?,
            _ => data.get(..UID_LENGTH).unwrap_or(&data),
        };
        uid.try_into()
            .map_err(|_| Error::invalid_length("card UID", UID_LENGTH, uid.len()))
    }
}
