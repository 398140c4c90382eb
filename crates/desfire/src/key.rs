//! Key material
//!
//! All key types wipe themselves on drop. `Debug` output never shows key bytes.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, Result};

/// AES-128 key
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AesKey([u8; 16]);

impl AesKey {
    /// Wrap raw key bytes
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Key bytes
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// All-zero key, the factory default of every key slot
    pub const fn factory_default() -> Self {
        Self([0u8; 16])
    }
}

impl TryFrom<&[u8]> for AesKey {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let key: [u8; 16] = bytes
            .try_into()
            .map_err(|_| Error::invalid_length("AES key", 16, bytes.len()))?;
        Ok(Self(key))
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(..)")
    }
}

/// Key for the legacy ISO 3DES handshake
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub enum LegacyKey {
    /// Two-key 3DES (also single DES when both halves are equal)
    TwoKey([u8; 16]),
    /// Three-key 3DES
    ThreeKey([u8; 24]),
}

impl LegacyKey {
    /// Key bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::TwoKey(key) => key,
            Self::ThreeKey(key) => key,
        }
    }

    /// Length of the handshake nonces for this key kind
    pub const fn nonce_length(&self) -> usize {
        match self {
            Self::TwoKey(_) => 8,
            Self::ThreeKey(_) => 16,
        }
    }

    /// Whether both halves of a two-key 3DES key are equal, i.e. it behaves as single DES
    pub fn is_single_des(&self) -> bool {
        match self {
            Self::TwoKey(key) => key[..8] == key[8..],
            Self::ThreeKey(_) => false,
        }
    }
}

impl TryFrom<&[u8]> for LegacyKey {
    type Error = Error;

    /// Accepts 8-byte single DES (expanded to two equal halves), 16-byte and 24-byte keys.
    fn try_from(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            8 => {
                let mut key = [0u8; 16];
                key[..8].copy_from_slice(bytes);
                key[8..].copy_from_slice(bytes);
                Ok(Self::TwoKey(key))
            }
            16 => {
                let mut key = [0u8; 16];
                key.copy_from_slice(bytes);
                Ok(Self::TwoKey(key))
            }
            24 => {
                let mut key = [0u8; 24];
                key.copy_from_slice(bytes);
                Ok(Self::ThreeKey(key))
            }
            _ => Err(Error::Format("3DES key must be 8, 16 or 24 bytes")),
        }
    }
}

impl fmt::Debug for LegacyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TwoKey(_) => f.write_str("LegacyKey::TwoKey(..)"),
            Self::ThreeKey(_) => f.write_str("LegacyKey::ThreeKey(..)"),
        }
    }
}

/// Crypto method of a key slot, as encoded in key settings and PICC-level key numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// DES or two-key 3DES
    TwoKeyTripleDes = 0x00,
    /// Three-key 3DES
    ThreeKeyTripleDes = 0x01,
    /// AES-128
    Aes = 0x02,
}

impl KeyType {
    /// Bits to OR into a PICC-level key number
    pub const fn picc_key_bits(self) -> u8 {
        (self as u8) << 6
    }

    /// Decode bits 6-7 of the key count byte returned by GetKeySettings
    pub const fn from_key_settings(max_keys: u8) -> Result<Self> {
        match max_keys >> 6 {
            0x00 => Ok(Self::TwoKeyTripleDes),
            0x01 => Ok(Self::ThreeKeyTripleDes),
            0x02 => Ok(Self::Aes),
            _ => Err(Error::Format("unknown key type in key settings")),
        }
    }
}

/// EV2 session keys: ksesAuthEnc and ksesAuthMac
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    enc: [u8; 16],
    mac: [u8; 16],
}

impl SessionKeys {
    pub(crate) const fn new(enc: [u8; 16], mac: [u8; 16]) -> Self {
        Self { enc, mac }
    }

    /// Session encryption key (ksesAuthEnc)
    pub const fn enc(&self) -> &[u8; 16] {
        &self.enc
    }

    /// Session MAC key (ksesAuthMac)
    pub const fn mac(&self) -> &[u8; 16] {
        &self.mac
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}
