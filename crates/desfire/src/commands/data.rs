use desfire_apdu_core::CardTransport;
use tracing::trace;

use super::le24;
use crate::card::Desfire;
use crate::codec::{CommMode, CommandEnvelope};
use crate::constants::cmd;
use crate::crypto::{pad, strip_padding};
use crate::session::AuthMode;
use crate::{Error, Result};

impl<T: CardTransport> Desfire<T> {
    /// Read `length` bytes from a standard or backup data file, `0` reading to the end
    ///
    /// `mode` must match the file's communication settings.
    pub fn read_data(
        &mut self,
        file_no: u8,
        offset: u32,
        length: u32,
        mode: CommMode,
    ) -> Result<Vec<u8>> {
        let mut header = Vec::with_capacity(7);
        header.push(file_no);
        header.extend_from_slice(&le24(offset)?);
        header.extend_from_slice(&le24(length)?);

        let data = self.send(&CommandEnvelope::new(cmd::READ_DATA, mode).with_header(header))?;
        trace!(file_no, offset, len = data.len(), "ReadData");

        if mode != CommMode::Full {
            return Ok(data);
        }

        match self.auth_mode() {
            Some(AuthMode::Ev2) => Ok(strip_padding(&data)?.to_vec()),
            // EV1 answers carry a CRC before the padding; only a known length can be cut
            _ if length > 0 => Ok(data
                .get(..length as usize)
                .ok_or(Error::invalid_length("ReadData answer", length as usize, data.len()))?
                .to_vec()),
            _ => Ok(data),
        }
    }

    /// Write to a standard or backup data file
    pub fn write_data(&mut self, file_no: u8, offset: u32, data: &[u8], mode: CommMode) -> Result<()> {
        let length = u32::try_from(data.len()).map_err(|_| Error::Format("data too long"))?;
        let mut header = Vec::with_capacity(7);
        header.push(file_no);
        header.extend_from_slice(&le24(offset)?);
        header.extend_from_slice(&le24(length)?);

        let payload = match mode {
            CommMode::Full => pad(data),
            _ => data.to_vec(),
        };
        let envelope = CommandEnvelope::new(cmd::WRITE_DATA, mode)
            .with_header(header)
            .with_payload(payload);
        self.send(&envelope)?;
        trace!(file_no, offset, len = data.len(), "WriteData");
        Ok(())
    }

    /// Commit pending writes to backup, value and record files
    pub fn commit_transaction(&mut self) -> Result<()> {
        let mode = self.mode_for(CommMode::Mac);
        self.send(&CommandEnvelope::new(cmd::COMMIT_TRANSACTION, mode))?;
        Ok(())
    }
}
