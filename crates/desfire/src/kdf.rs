//! Session key derivation
//!
//! EV2 keys come from AES-CMAC over the 32-byte session vectors SV1/SV2. Legacy ISO
//! session keys are assembled from nonce halves.

use crate::constants::{EV2_NONCE_LENGTH, SV_FIXED, SV1_LABEL, SV2_LABEL};
use crate::crypto::cmac;
use crate::key::{AesKey, LegacyKey, SessionKeys};
use crate::{Error, Result};

/// Session vector length
pub const SESSION_VECTOR_LENGTH: usize = 32;

type Nonce = [u8; EV2_NONCE_LENGTH];

/// Build a session vector: `label ‖ 00 01 00 80 ‖ context`
///
/// The 26-byte context mixes both nonces:
/// `RndA[0..2] ‖ (RndA[2..8] ^ RndB[0..6]) ‖ RndB[6..16] ‖ RndA[8..16]`.
pub fn session_vector(label: [u8; 2], rnd_a: &Nonce, rnd_b: &Nonce) -> [u8; SESSION_VECTOR_LENGTH] {
    let mut sv = [0u8; SESSION_VECTOR_LENGTH];
    sv[..2].copy_from_slice(&label);
    sv[2..6].copy_from_slice(&SV_FIXED);
    sv[6..8].copy_from_slice(&rnd_a[..2]);
    for i in 0..6 {
        sv[8 + i] = rnd_a[2 + i] ^ rnd_b[i];
    }
    sv[14..24].copy_from_slice(&rnd_b[6..]);
    sv[24..].copy_from_slice(&rnd_a[8..]);
    sv
}

/// Derive the EV2 session keys from the authentication key and both nonces
pub fn derive_ev2(key: &AesKey, rnd_a: &Nonce, rnd_b: &Nonce) -> SessionKeys {
    let enc = cmac(key.as_bytes(), &session_vector(SV1_LABEL, rnd_a, rnd_b));
    let mac = cmac(key.as_bytes(), &session_vector(SV2_LABEL, rnd_a, rnd_b));
    SessionKeys::new(enc, mac)
}

/// Derive the legacy ISO session key from the handshake nonces
///
/// Two-key 3DES uses 8-byte nonces, three-key 3DES 16-byte nonces. A single DES
/// authentication key yields a single DES session key.
pub fn derive_iso(key: &LegacyKey, rnd_a: &[u8], rnd_b: &[u8]) -> Result<LegacyKey> {
    let expected = key.nonce_length();
    if rnd_a.len() != expected || rnd_b.len() != expected {
        return Err(Error::invalid_length(
            "ISO nonce",
            expected,
            rnd_a.len().max(rnd_b.len()),
        ));
    }

    match key {
        LegacyKey::TwoKey(_) => {
            let mut session = [0u8; 16];
            session[..4].copy_from_slice(&rnd_a[..4]);
            session[4..8].copy_from_slice(&rnd_b[..4]);
            if key.is_single_des() {
                let (first, second) = session.split_at_mut(8);
                second.copy_from_slice(first);
            } else {
                session[8..12].copy_from_slice(&rnd_a[4..8]);
                session[12..].copy_from_slice(&rnd_b[4..8]);
            }
            Ok(LegacyKey::TwoKey(session))
        }
        LegacyKey::ThreeKey(_) => {
            let mut session = [0u8; 24];
            for (i, offset) in [0usize, 6, 12].into_iter().enumerate() {
                session[i * 8..i * 8 + 4].copy_from_slice(&rnd_a[offset..offset + 4]);
                session[i * 8 + 4..i * 8 + 8].copy_from_slice(&rnd_b[offset..offset + 4]);
            }
            Ok(LegacyKey::ThreeKey(session))
        }
    }
}
