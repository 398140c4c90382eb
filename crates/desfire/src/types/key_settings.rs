use crate::key::KeyType;
use crate::Error;

/// Answer to GetKeySettings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySettings {
    /// Key settings byte (master key access rights and configuration flags)
    pub settings: u8,
    /// Number of keys in the selected application
    pub max_keys: u8,
    /// Crypto method of the application keys
    pub key_type: KeyType,
}

impl KeySettings {
    /// Whether the master key may be changed
    pub const fn master_key_changeable(&self) -> bool {
        self.settings & 0x01 != 0
    }

    /// Whether the key settings may be changed
    pub const fn settings_changeable(&self) -> bool {
        self.settings & 0x08 != 0
    }
}

impl TryFrom<&[u8]> for KeySettings {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        let [settings, keys] = data else {
            return Err(Error::invalid_length("GetKeySettings answer", 2, data.len()));
        };

        Ok(Self {
            settings: *settings,
            max_keys: keys & 0x0F,
            key_type: KeyType::from_key_settings(*keys)?,
        })
    }
}
