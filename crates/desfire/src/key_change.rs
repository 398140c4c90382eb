//! ChangeKey / ChangeKeyEV2 cryptograms
//!
//! The cryptogram is sent in full mode. When the target slot is the one the session was
//! authenticated with, the card ends the session on success and answers without a MAC.

use std::fmt;

use desfire_apdu_core::CardTransport;
use tracing::debug;
use zeroize::Zeroizing;

use crate::codec::{CommMode, CommandEnvelope};
use crate::config::DesfireConfig;
use crate::constants::{MAX_KEY_NUMBER, PICC_AID, cmd};
use crate::crypto::{crc32, pad};
use crate::exchange::{send_protected, transact};
use crate::key::{AesKey, KeyType, LegacyKey};
use crate::session::{AuthMode, Session};
use crate::{Error, Result};

/// A request to replace the key in one slot
#[derive(Clone, PartialEq, Eq)]
pub struct KeyChange<'a> {
    key_no: u8,
    key_type: KeyType,
    new_key: &'a [u8],
    old_key: Option<&'a [u8]>,
    version: u8,
    second_application: bool,
}

impl<'a> KeyChange<'a> {
    /// Install an AES key
    pub fn aes(key_no: u8, new_key: &'a AesKey) -> Self {
        Self::new(key_no, KeyType::Aes, new_key.as_bytes())
    }

    /// Install a 3DES key
    pub fn legacy(key_no: u8, new_key: &'a LegacyKey) -> Self {
        let key_type = match new_key {
            LegacyKey::TwoKey(_) => KeyType::TwoKeyTripleDes,
            LegacyKey::ThreeKey(_) => KeyType::ThreeKeyTripleDes,
        };
        Self::new(key_no, key_type, new_key.as_bytes())
    }

    const fn new(key_no: u8, key_type: KeyType, new_key: &'a [u8]) -> Self {
        Self {
            key_no,
            key_type,
            new_key,
            old_key: None,
            version: 0,
            second_application: false,
        }
    }

    /// Current key of the slot, required when it is not the authenticated key
    pub const fn with_old_key(mut self, old_key: &'a [u8]) -> Self {
        self.old_key = Some(old_key);
        self
    }

    /// Key version stored with the new key
    pub const fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Address the key set of the secondary application
    pub const fn for_second_application(mut self) -> Self {
        self.second_application = true;
        self
    }

    /// Target key slot
    pub const fn key_no(&self) -> u8 {
        self.key_no
    }
}

impl fmt::Debug for KeyChange<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyChange")
            .field("key_no", &self.key_no)
            .field("key_type", &self.key_type)
            .field("version", &self.version)
            .field("second_application", &self.second_application)
            .finish_non_exhaustive()
    }
}

/// Key number byte sent with ChangeKey
///
/// At PICC level the key type is encoded in bits 6-7; inside an application bit 7
/// selects the secondary application.
pub fn key_reference(
    key_no: u8,
    at_picc_level: bool,
    key_type: KeyType,
    second_application: bool,
) -> Result<u8> {
    if key_no > MAX_KEY_NUMBER {
        return Err(Error::Format("key number out of range"));
    }
    if at_picc_level {
        Ok(key_no | key_type.picc_key_bits())
    } else {
        Ok(key_no | (u8::from(second_application) << 7))
    }
}

/// Plaintext cryptogram, padded to the AES block size
///
/// `newKey ‖ version` for the authenticated slot,
/// `(newKey ^ oldKey) ‖ version ‖ CRC32(newKey)` for any other slot.
pub fn cryptogram(change: &KeyChange<'_>, same_key: bool) -> Result<Zeroizing<Vec<u8>>> {
    let mut plaintext = Zeroizing::new(Vec::with_capacity(change.new_key.len() + 5));

    if same_key {
        plaintext.extend_from_slice(change.new_key);
        plaintext.push(change.version);
    } else {
        let old_key = change
            .old_key
            .ok_or(Error::Format("old key required to change another key slot"))?;
        if old_key.len() != change.new_key.len() {
            return Err(Error::invalid_length(
                "old key",
                change.new_key.len(),
                old_key.len(),
            ));
        }
        plaintext.extend(change.new_key.iter().zip(old_key).map(|(n, o)| n ^ o));
        plaintext.push(change.version);
        plaintext.extend_from_slice(&crc32(change.new_key));
    }

    Ok(Zeroizing::new(pad(&plaintext)))
}

/// Change a key with ChangeKey (`0xC4`) or, with a key set number, ChangeKeyEV2 (`0xC6`)
pub fn change_key<T: CardTransport + ?Sized>(
    transport: &mut T,
    session: &mut Session,
    change: &KeyChange<'_>,
    key_set: Option<u8>,
    config: &DesfireConfig,
) -> Result<()> {
    match session.mode() {
        Some(AuthMode::Ev2) => {}
        Some(AuthMode::Ev1) => {
            return Err(Error::UnsupportedMode("key change needs an EV2 session"));
        }
        None => return Err(Error::SessionInvalidated),
    }

    let key_ref = key_reference(
        change.key_no,
        session.application() == PICC_AID,
        change.key_type,
        change.second_application,
    )?;
    let same_key = change.key_no == session.key_no() && !change.second_application;
    let payload = cryptogram(change, same_key)?;

    let envelope = match key_set {
        Some(set) => {
            CommandEnvelope::new(cmd::CHANGE_KEY_EV2, CommMode::Full).with_header([set, key_ref])
        }
        None => CommandEnvelope::new(cmd::CHANGE_KEY, CommMode::Full).with_header([key_ref]),
    }
    .with_payload(payload.as_slice());

    if !same_key {
        transact(transport, session, &envelope, config)?;
        debug!(key_no = change.key_no, "Key changed");
        return Ok(());
    }

    // the card drops the authentication and answers without MAC
    send_protected(transport, session, &envelope, config)?;
    session.invalidate();
    debug!(
        key_no = change.key_no,
        "Authenticated key changed, session closed"
    );
    Ok(())
}
