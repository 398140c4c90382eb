use desfire_apdu_core::CardTransport;
use tracing::debug;

use crate::card::Desfire;
use crate::codec::{CommMode, CommandEnvelope};
use crate::constants::cmd;
use crate::{Error, Result};

impl<T: CardTransport> Desfire<T> {
    /// Select an application by AID, `000000` selecting the PICC level
    ///
    /// Selection ends any session, even when the card rejects the AID.
    pub fn select_application(&mut self, aid: [u8; 3]) -> Result<()> {
        self.end_session();
        self.send(&CommandEnvelope::new(cmd::SELECT_APPLICATION, CommMode::Plain).with_header(aid))?;
        self.set_application(aid);
        debug!(aid = %hex::encode(aid), "Application selected");
        Ok(())
    }

    /// List the AIDs of all applications on the card
    pub fn get_application_ids(&mut self) -> Result<Vec<[u8; 3]>> {
        let mode = self.mode_for(CommMode::Mac);
        let data = self.send(&CommandEnvelope::new(cmd::GET_APPLICATION_IDS, mode))?;

        if data.len() % 3 != 0 {
            return Err(Error::Format("application ID list is not a multiple of 3 bytes"));
        }
        Ok(data
            .chunks_exact(3)
            .map(|aid| [aid[0], aid[1], aid[2]])
            .collect())
    }
}
