use std::fmt;

use tracing::trace;

use super::SecureMessaging;
use crate::codec::{CommMode, CommandEnvelope, ResponseEnvelope, verify_status};
use crate::constants::DES_BLOCK_SIZE;
use crate::crypto::{tdes_cbc_decrypt, tdes_cbc_encrypt};
use crate::key::LegacyKey;
use crate::session::AuthMode;
use crate::{Error, Result};

const ZERO_IV: [u8; DES_BLOCK_SIZE] = [0; DES_BLOCK_SIZE];

/// Legacy secure messaging after AuthenticateISO
///
/// Confidentiality only: full mode encrypts the payload with 3DES-CBC under a zero IV,
/// MAC mode degrades to plain and there is no command counter.
pub struct IsoChannel {
    session_key: LegacyKey,
}

impl IsoChannel {
    /// Channel protected by a 3DES session key
    pub const fn new(session_key: LegacyKey) -> Self {
        Self { session_key }
    }

    /// Session key
    pub const fn session_key(&self) -> &LegacyKey {
        &self.session_key
    }
}

fn check_des_aligned(what: &'static str, len: usize) -> Result<()> {
    if len % DES_BLOCK_SIZE == 0 {
        Ok(())
    } else {
        Err(Error::invalid_length(
            what,
            len.next_multiple_of(DES_BLOCK_SIZE),
            len,
        ))
    }
}

impl SecureMessaging for IsoChannel {
    fn mode(&self) -> AuthMode {
        AuthMode::Ev1
    }

    fn wrap_command(&self, envelope: &CommandEnvelope) -> Result<Vec<u8>> {
        if envelope.mode() != CommMode::Full || envelope.payload().is_empty() {
            return Ok(envelope.plain_frame());
        }

        check_des_aligned("full mode payload (8-byte multiple)", envelope.payload().len())?;
        let mut ciphertext = envelope.payload().to_vec();
        tdes_cbc_encrypt(&self.session_key, &ZERO_IV, &mut ciphertext)?;

        let mut frame = Vec::with_capacity(1 + envelope.header().len() + ciphertext.len());
        frame.push(envelope.cmd());
        frame.extend_from_slice(envelope.header());
        frame.extend_from_slice(&ciphertext);
        trace!(
            cmd = format_args!("{:#04x}", envelope.cmd()),
            frame_len = frame.len(),
            "Built 3DES protected command"
        );
        Ok(frame)
    }

    fn unwrap_response(&self, mode: CommMode, response: &ResponseEnvelope) -> Result<Vec<u8>> {
        verify_status(response.status())?;
        let mut data = response.data().to_vec();
        if mode == CommMode::Full && !data.is_empty() {
            check_des_aligned("full mode response (8-byte multiple)", data.len())?;
            tdes_cbc_decrypt(&self.session_key, &ZERO_IV, &mut data)?;
        }
        Ok(data)
    }

    fn advance(&mut self) -> Result<()> {
        Ok(())
    }
}

impl fmt::Debug for IsoChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsoChannel")
            .field("session_key", &self.session_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> IsoChannel {
        IsoChannel::new(LegacyKey::TwoKey([
            0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF, 0xFE, 0xDC, 0xBA, 0x98, 0x76, 0x54,
            0x32, 0x10,
        ]))
    }

    #[test]
    fn test_full_mode_roundtrip() {
        let channel = channel();
        let envelope = CommandEnvelope::new(0x8D, CommMode::Full)
            .with_header([0x01, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00])
            .with_payload([0x10u8, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17]);
        let frame = channel.wrap_command(&envelope).unwrap();
        assert_eq!(frame.len(), 1 + 7 + 8);
        assert_ne!(&frame[8..], envelope.payload());

        // the card answers with data encrypted the same way
        let response = ResponseEnvelope::new(0x00, frame[8..].to_vec());
        let plaintext = channel.unwrap_response(CommMode::Full, &response).unwrap();
        assert_eq!(plaintext, envelope.payload());
    }

    #[test]
    fn test_mac_mode_is_plain() {
        let channel = channel();
        let envelope = CommandEnvelope::new(0x45, CommMode::Mac);
        assert_eq!(channel.wrap_command(&envelope).unwrap(), vec![0x45]);

        let response = ResponseEnvelope::new(0x00, vec![0x0F, 0x81]);
        assert_eq!(
            channel.unwrap_response(CommMode::Mac, &response).unwrap(),
            vec![0x0F, 0x81]
        );
    }

    #[test]
    fn test_rejects_misaligned_payload() {
        let envelope = CommandEnvelope::new(0x8D, CommMode::Full).with_payload([0u8; 5]);
        assert!(channel().wrap_command(&envelope).unwrap_err().is_format());
    }

    #[test]
    fn test_card_error_is_reported() {
        let response = ResponseEnvelope::new(0xAE, Vec::new());
        let err = channel().unwrap_response(CommMode::Plain, &response).unwrap_err();
        assert_eq!(err.card_status().map(|s| s.code()), Some(0xAE));
    }
}
