use desfire_apdu_core::CardTransport;
use tracing::warn;

use crate::card::Desfire;
use crate::codec::{CommMode, CommandEnvelope};
use crate::constants::{PICC_AID, cmd};
use crate::crypto::pad;
use crate::{Error, Result};

impl<T: CardTransport> Desfire<T> {
    /// Delete all applications and files; needs a PICC master key session
    pub fn format_picc(&mut self) -> Result<()> {
        if self.selected_application() != PICC_AID {
            return Err(Error::Format("FormatPICC needs the PICC level selected"));
        }
        if self.session().is_none() {
            return Err(Error::NotAuthenticated);
        }
        self.send(&CommandEnvelope::new(cmd::FORMAT_PICC, CommMode::Mac))?;
        warn!("PICC formatted");
        Ok(())
    }

    /// Write a PICC configuration option
    pub fn set_configuration(&mut self, option: u8, data: &[u8]) -> Result<()> {
        let envelope = CommandEnvelope::new(cmd::SET_CONFIGURATION, CommMode::Full)
            .with_header([option])
            .with_payload(pad(data));
        self.send(&envelope)?;
        Ok(())
    }
}
