//! APDU command definitions
//!
//! ISO/IEC 7816-4 short APDUs. Card protocols with their own native framing use this
//! type when the reader in between only speaks ISO 7816.

use bytes::{BufMut, Bytes, BytesMut};

use crate::Error;

/// Expected length type for APDU commands
pub type ExpectedLength = u8;

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected length (optional)
    pub le: Option<ExpectedLength>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data.into()),
            le: None,
        }
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: ExpectedLength) -> Self {
        self.le = Some(le);
        self
    }

    /// Command payload data, if any
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Calculate length of serialized command
    pub fn command_length(&self) -> usize {
        4 + self.data.as_ref().map_or(0, |d| 1 + d.len()) + usize::from(self.le.is_some())
    }

    /// Convert to raw APDU bytes
    ///
    /// Fails when the data field does not fit a short APDU.
    pub fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut buffer = BytesMut::with_capacity(self.command_length());

        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        if let Some(data) = &self.data {
            let lc = u8::try_from(data.len())
                .map_err(|_| Error::InvalidCommandLength(data.len()))?;
            buffer.put_u8(lc);
            buffer.put_slice(data);
        }

        if let Some(le) = self.le {
            buffer.put_u8(le);
        }

        Ok(buffer.freeze())
    }

    /// Parse a command from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < 4 {
            return Err(Error::InvalidCommandLength(data.len()));
        }

        let mut command = Self::new(data[0], data[1], data[2], data[3]);

        if data.len() > 4 {
            let lc = data[4] as usize;

            if data.len() == 5 {
                // Only Le present, no data
                command.le = Some(data[4]);
            } else if data.len() >= 5 + lc {
                if lc > 0 {
                    command.data = Some(Bytes::copy_from_slice(&data[5..5 + lc]));
                }

                if data.len() > 5 + lc {
                    if data.len() == 5 + lc + 1 {
                        command.le = Some(data[5 + lc]);
                    } else {
                        return Err(Error::InvalidCommandLength(data.len()));
                    }
                }
            } else {
                return Err(Error::InvalidCommandLength(data.len()));
            }
        }

        Ok(command)
    }
}
