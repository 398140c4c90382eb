use derive_more::Display;

use crate::Error;

const VERSION_INFO_LENGTH: usize = 7;
const VERSION_LENGTH: usize = 2 * VERSION_INFO_LENGTH + 14;

/// Hardware or software block of a GetVersion answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display("{major}.{minor}")]
pub struct VersionInfo {
    /// Vendor ID, `0x04` for NXP
    pub vendor_id: u8,
    /// Product type
    pub kind: u8,
    /// Product subtype
    pub subtype: u8,
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
    /// Encoded storage size: `2^(n >> 1)` bytes, larger when bit 0 is set
    pub storage_size: u8,
    /// Communication protocol type
    pub protocol: u8,
}

impl VersionInfo {
    fn from_block(block: &[u8]) -> Self {
        Self {
            vendor_id: block[0],
            kind: block[1],
            subtype: block[2],
            major: block[3],
            minor: block[4],
            storage_size: block[5],
            protocol: block[6],
        }
    }

    /// Lower bound of the storage size in bytes, `None` when the code exceeds `u32`
    pub const fn storage_bytes(&self) -> Option<u32> {
        1u32.checked_shl((self.storage_size >> 1) as u32)
    }
}

/// Answer to GetVersion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    /// Hardware information
    pub hardware: VersionInfo,
    /// Software information
    pub software: VersionInfo,
    /// 7-byte UID; zero when random ID is enabled
    pub uid: [u8; 7],
    /// Production batch number
    pub batch: [u8; 5],
    /// Calendar week of production
    pub production_week: u8,
    /// Year of production
    pub production_year: u8,
}

impl TryFrom<&[u8]> for Version {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        if data.len() < VERSION_LENGTH {
            return Err(Error::invalid_length("GetVersion answer", VERSION_LENGTH, data.len()));
        }

        let (hardware, rest) = data.split_at(VERSION_INFO_LENGTH);
        let (software, production) = rest.split_at(VERSION_INFO_LENGTH);

        let mut uid = [0u8; 7];
        uid.copy_from_slice(&production[..7]);
        let mut batch = [0u8; 5];
        batch.copy_from_slice(&production[7..12]);

        Ok(Self {
            hardware: VersionInfo::from_block(hardware),
            software: VersionInfo::from_block(software),
            uid,
            batch,
            production_week: production[12],
            production_year: production[13],
        })
    }
}
