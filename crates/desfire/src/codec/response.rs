//! Incoming frame handling: status checks, continuation and verification

use desfire_apdu_core::CardTransport;
use tracing::{debug, trace};

use super::CommMode;
use super::command::iv_block;
use crate::channel::Ev2Channel;
use crate::constants::{AES_BLOCK_SIZE, MAC_LENGTH, RESPONSE_IV_LABEL, TI_LENGTH, cmd, status};
use crate::counter::CommandCounter;
use crate::crypto::{
    AesBlock, TruncatedMac, aes_cbc_decrypt, aes_encrypt_block, cmac_truncated, constant_time_eq,
};
use crate::error::CardStatus;
use crate::session::TransactionId;
use crate::{Error, Result};

/// A native response: status byte followed by data (including any trailing MAC)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    status: u8,
    data: Vec<u8>,
}

impl ResponseEnvelope {
    /// Create a response envelope
    pub const fn new(status: u8, data: Vec<u8>) -> Self {
        Self { status, data }
    }

    /// Split a raw frame into status and data
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let (&status, data) = frame
            .split_first()
            .ok_or(Error::Format("empty response frame"))?;
        Ok(Self::new(status, data.to_vec()))
    }

    /// Status byte
    pub const fn status(&self) -> u8 {
        self.status
    }

    /// Data following the status byte
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume into the data bytes
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Split the data into payload and trailing MAC
    pub fn split_mac(&self) -> Result<(&[u8], &[u8])> {
        if self.data.len() < MAC_LENGTH {
            return Err(Error::invalid_length(
                "secured response",
                MAC_LENGTH,
                self.data.len(),
            ));
        }
        Ok(self.data.split_at(self.data.len() - MAC_LENGTH))
    }
}

/// Accept `0x00` and `0xAF`, map every other status to [`Error::Protocol`]
pub const fn verify_status(code: u8) -> Result<()> {
    match code {
        status::OPERATION_OK | status::ADDITIONAL_FRAME => Ok(()),
        other => Err(Error::Protocol(CardStatus(other))),
    }
}

/// Collect a complete response, requesting further frames while the card answers `0xAF`
///
/// `first` is the frame returned for the command itself. Each continuation frame is
/// parsed into its own buffer and appended in arrival order. At most `max_frames` frames,
/// the first included, are accepted.
pub fn drain<T: CardTransport + ?Sized>(
    transport: &mut T,
    first: &[u8],
    max_frames: usize,
) -> Result<ResponseEnvelope> {
    let first = ResponseEnvelope::parse(first)?;
    verify_status(first.status())?;

    let mut code = first.status();
    let mut data = first.into_data();
    let mut frames = 1;

    while code == status::ADDITIONAL_FRAME {
        if frames >= max_frames {
            debug!(frames, "Response chain exceeds frame limit");
            return Err(Error::ChainLimitExceeded(max_frames));
        }

        let raw = transport.transmit_raw(&[cmd::ADDITIONAL_FRAME])?;
        let next = ResponseEnvelope::parse(&raw)?;
        verify_status(next.status())?;

        code = next.status();
        data.extend_from_slice(next.data());
        frames += 1;
    }

    if frames > 1 {
        trace!(frames, data_len = data.len(), "Reassembled chained response");
    }

    Ok(ResponseEnvelope::new(code, data))
}

/// IV for decrypting a response payload; `counter` is the already incremented value
pub fn response_iv(key: &[u8; 16], ti: &TransactionId, counter: CommandCounter) -> AesBlock {
    aes_encrypt_block(key, &iv_block(RESPONSE_IV_LABEL, ti, counter))
}

/// Truncated CMAC over `status ‖ ctrLE16 ‖ TI ‖ data`; `counter` is the already incremented value
pub fn mac_response(
    key: &[u8; 16],
    ti: &TransactionId,
    code: u8,
    counter: CommandCounter,
    data: &[u8],
) -> TruncatedMac {
    let mut input = Vec::with_capacity(1 + 2 + TI_LENGTH + data.len());
    input.push(code);
    input.extend_from_slice(&counter.to_le_bytes());
    input.extend_from_slice(ti.as_bytes());
    input.extend_from_slice(data);
    cmac_truncated(key, &input)
}

/// Verify and, in full mode, decrypt a complete response
///
/// The MAC is checked over the data exactly as received before anything is
/// decrypted. Full-mode plaintext is returned with its padding; the channel counter is
/// not advanced here.
pub fn decode(response: &ResponseEnvelope, mode: CommMode, channel: &Ev2Channel) -> Result<Vec<u8>> {
    verify_status(response.status())?;
    if mode == CommMode::Plain {
        return Ok(response.data().to_vec());
    }

    let keys = channel.keys();
    let ti = channel.ti();
    let next = channel.counter().next()?;

    let (payload, mac) = response.split_mac()?;
    let expected = mac_response(keys.mac(), &ti, response.status(), next, payload);
    if !constant_time_eq(mac, &expected) {
        debug!(
            counter = %channel.counter(),
            "Response MAC mismatch"
        );
        return Err(Error::MacVerification);
    }

    match mode {
        CommMode::Full if !payload.is_empty() => {
            if payload.len() % AES_BLOCK_SIZE != 0 {
                return Err(Error::invalid_length(
                    "full mode response (16-byte multiple)",
                    payload.len().next_multiple_of(AES_BLOCK_SIZE),
                    payload.len(),
                ));
            }
            let mut plaintext = payload.to_vec();
            aes_cbc_decrypt(keys.enc(), &response_iv(keys.enc(), &ti, next), &mut plaintext)?;
            Ok(plaintext)
        }
        _ => Ok(payload.to_vec()),
    }
}
