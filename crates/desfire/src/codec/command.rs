//! Outgoing frame construction

use tracing::trace;

use super::{CommMode, CommandEnvelope};
use crate::channel::Ev2Channel;
use crate::constants::{AES_BLOCK_SIZE, COMMAND_IV_LABEL, TI_LENGTH};
use crate::counter::CommandCounter;
use crate::crypto::{AesBlock, TruncatedMac, aes_cbc_encrypt, aes_encrypt_block, cmac_truncated};
use crate::session::TransactionId;
use crate::{Error, Result};

/// IV input block: `label ‖ TI ‖ ctrLE16 ‖ 00 * 8`
pub(crate) fn iv_block(label: [u8; 2], ti: &TransactionId, counter: CommandCounter) -> AesBlock {
    let mut block = [0u8; AES_BLOCK_SIZE];
    block[..2].copy_from_slice(&label);
    block[2..2 + TI_LENGTH].copy_from_slice(ti.as_bytes());
    block[2 + TI_LENGTH..4 + TI_LENGTH].copy_from_slice(&counter.to_le_bytes());
    block
}

/// IV for encrypting a command payload
pub fn command_iv(key: &[u8; 16], ti: &TransactionId, counter: CommandCounter) -> AesBlock {
    aes_encrypt_block(key, &iv_block(COMMAND_IV_LABEL, ti, counter))
}

/// Truncated CMAC over `cmd ‖ ctrLE16 ‖ TI ‖ header ‖ data`
pub fn mac_command(
    key: &[u8; 16],
    ti: &TransactionId,
    cmd: u8,
    counter: CommandCounter,
    header: &[u8],
    data: &[u8],
) -> TruncatedMac {
    let mut input = Vec::with_capacity(1 + 2 + TI_LENGTH + header.len() + data.len());
    input.push(cmd);
    input.extend_from_slice(&counter.to_le_bytes());
    input.extend_from_slice(ti.as_bytes());
    input.extend_from_slice(header);
    input.extend_from_slice(data);
    cmac_truncated(key, &input)
}

/// Build the wire frame for `envelope` under the channel's current counter
///
/// Pure: the counter is not advanced here.
pub fn build(envelope: &CommandEnvelope, channel: &Ev2Channel) -> Result<Vec<u8>> {
    let keys = channel.keys();
    let ti = channel.ti();
    let counter = channel.counter();

    let frame = match envelope.mode() {
        CommMode::Plain => envelope.plain_frame(),
        CommMode::Mac => {
            let mac = mac_command(
                keys.mac(),
                &ti,
                envelope.cmd(),
                counter,
                envelope.header(),
                envelope.payload(),
            );
            let mut frame = envelope.plain_frame();
            frame.extend_from_slice(&mac);
            frame
        }
        CommMode::Full => {
            let payload = envelope.payload();
            if payload.len() % AES_BLOCK_SIZE != 0 {
                return Err(Error::invalid_length(
                    "full mode payload (16-byte multiple)",
                    payload.len().next_multiple_of(AES_BLOCK_SIZE),
                    payload.len(),
                ));
            }

            let mut ciphertext = payload.to_vec();
            if !ciphertext.is_empty() {
                aes_cbc_encrypt(keys.enc(), &command_iv(keys.enc(), &ti, counter), &mut ciphertext)?;
            }
            let mac = mac_command(
                keys.mac(),
                &ti,
                envelope.cmd(),
                counter,
                envelope.header(),
                &ciphertext,
            );

            let mut frame =
                Vec::with_capacity(1 + envelope.header().len() + ciphertext.len() + mac.len());
            frame.push(envelope.cmd());
            frame.extend_from_slice(envelope.header());
            frame.extend_from_slice(&ciphertext);
            frame.extend_from_slice(&mac);
            frame
        }
    };

    trace!(
        cmd = format_args!("{:#04x}", envelope.cmd()),
        mode = %envelope.mode(),
        counter = %counter,
        frame_len = frame.len(),
        "Built secured command"
    );

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::SessionKeys;
    use hex_literal::hex;

    const KEY: [u8; 16] = hex!("0102030405060708090a0b0c0d0e0f10");
    const TI: TransactionId = TransactionId::new(hex!("0a0b0c0d"));

    fn channel(counter: u16) -> Ev2Channel {
        Ev2Channel::with_counter(
            SessionKeys::new(KEY, KEY),
            TI,
            CommandCounter::from_value(counter),
        )
    }

    #[test]
    fn test_command_iv_vector() {
        assert_eq!(
            command_iv(&KEY, &TI, CommandCounter::from_value(3)),
            hex!("528283b1f572a77b44bffca4d1f89a49")
        );
    }

    #[test]
    fn test_mac_command_vector() {
        let mac = mac_command(&KEY, &TI, 0xCA, CommandCounter::from_value(3), &hex!("0001"), &[]);
        assert_eq!(mac, hex!("9da19bef7abb8a6c"));
    }

    #[test]
    fn test_build_mac_mode() {
        let envelope = CommandEnvelope::new(0xCA, CommMode::Mac).with_header(hex!("0001"));
        let frame = build(&envelope, &channel(3)).unwrap();
        assert_eq!(frame, hex!("ca00019da19bef7abb8a6c"));
    }

    #[test]
    fn test_build_is_deterministic_and_counter_bound() {
        let envelope = CommandEnvelope::new(0x8D, CommMode::Full)
            .with_header(hex!("01000000100000"))
            .with_payload([0x42u8; 16]);
        let first = build(&envelope, &channel(5)).unwrap();
        let second = build(&envelope, &channel(5)).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, build(&envelope, &channel(6)).unwrap());

        // cmd, header, one ciphertext block, MAC
        assert_eq!(first.len(), 1 + 7 + 16 + 8);
        assert_eq!(first[..8], hex!("8d01000000100000"));
        assert_ne!(first[8..24], [0x42u8; 16]);
    }

    #[test]
    fn test_build_full_rejects_unpadded_payload() {
        let envelope = CommandEnvelope::new(0x8D, CommMode::Full).with_payload([0u8; 15]);
        let err = build(&envelope, &channel(0)).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_build_plain_is_untouched() {
        let envelope = CommandEnvelope::new(0x60, CommMode::Plain);
        assert_eq!(build(&envelope, &channel(9)).unwrap(), vec![0x60]);
    }
}
