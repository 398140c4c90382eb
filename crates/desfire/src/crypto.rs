//! Cryptographic primitives for DESFire secure messaging
//!
//! Thin wrappers over the RustCrypto block ciphers: AES-128 single-block encryption,
//! raw CBC without implicit padding, AES-CMAC with the DESFire truncation, and the
//! nonce helpers used by the handshakes.

use aes::Aes128;
use cipher::{
    BlockCipher, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, BlockSizeUser, KeyInit,
    KeyIvInit, generic_array::GenericArray,
};
use cmac::{Cmac, Mac};
use des::{TdesEde2, TdesEde3};

use crate::constants::{AES_BLOCK_SIZE, MAC_LENGTH};
use crate::key::LegacyKey;
use crate::{Error, Result};

/// One AES block
pub type AesBlock = [u8; AES_BLOCK_SIZE];
/// Truncated CMAC as carried on the wire
pub type TruncatedMac = [u8; MAC_LENGTH];

/// Full 16-byte AES-CMAC
pub fn cmac(key: &[u8; 16], data: &[u8]) -> AesBlock {
    let mut mac = <Cmac<Aes128> as Mac>::new(GenericArray::from_slice(key));
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Keep the odd-indexed bytes (1, 3, .., 15) of a full CMAC
pub fn truncate_mac(full: &AesBlock) -> TruncatedMac {
    let mut truncated = [0u8; MAC_LENGTH];
    for (out, byte) in truncated.iter_mut().zip(full.iter().skip(1).step_by(2)) {
        *out = *byte;
    }
    truncated
}

/// AES-CMAC truncated to the 8 bytes sent on the wire
pub fn cmac_truncated(key: &[u8; 16], data: &[u8]) -> TruncatedMac {
    truncate_mac(&cmac(key, data))
}

/// Compare two MACs without an early exit on the first differing byte
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Encrypt a single block with AES-128 (ECB, zero IV)
pub fn aes_encrypt_block(key: &[u8; 16], block: &AesBlock) -> AesBlock {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut out);
    out.into()
}

/// AES-128-CBC encrypt in place; `data` must already be block aligned
pub fn aes_cbc_encrypt(key: &[u8; 16], iv: &AesBlock, data: &mut [u8]) -> Result<()> {
    cbc_encrypt::<Aes128>(key, iv, data)
}

/// AES-128-CBC decrypt in place; `data` must be block aligned
pub fn aes_cbc_decrypt(key: &[u8; 16], iv: &AesBlock, data: &mut [u8]) -> Result<()> {
    cbc_decrypt::<Aes128>(key, iv, data)
}

/// 3DES-CBC encrypt in place with a two- or three-key key
pub fn tdes_cbc_encrypt(key: &LegacyKey, iv: &[u8; 8], data: &mut [u8]) -> Result<()> {
    match key {
        LegacyKey::TwoKey(k) => cbc_encrypt::<TdesEde2>(k, iv, data),
        LegacyKey::ThreeKey(k) => cbc_encrypt::<TdesEde3>(k, iv, data),
    }
}

/// 3DES-CBC decrypt in place with a two- or three-key key
pub fn tdes_cbc_decrypt(key: &LegacyKey, iv: &[u8; 8], data: &mut [u8]) -> Result<()> {
    match key {
        LegacyKey::TwoKey(k) => cbc_decrypt::<TdesEde2>(k, iv, data),
        LegacyKey::ThreeKey(k) => cbc_decrypt::<TdesEde3>(k, iv, data),
    }
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let block_size = C::block_size();
    check_block_aligned(data.len(), block_size)?;
    let mut encryptor = cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| Error::Format("cipher key or IV has the wrong length"))?;
    for chunk in data.chunks_exact_mut(block_size) {
        encryptor.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
    Ok(())
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let block_size = C::block_size();
    check_block_aligned(data.len(), block_size)?;
    let mut decryptor = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| Error::Format("cipher key or IV has the wrong length"))?;
    for chunk in data.chunks_exact_mut(block_size) {
        decryptor.decrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
    Ok(())
}

const fn check_block_aligned(len: usize, block_size: usize) -> Result<()> {
    if len % block_size == 0 {
        Ok(())
    } else {
        Err(Error::InvalidLength {
            what: "cipher input (block multiple)",
            expected: len.next_multiple_of(block_size),
            actual: len,
        })
    }
}

/// Rotate left by one byte: `RndB -> RndB'`
pub fn rotate_left<const N: usize>(nonce: &[u8; N]) -> [u8; N] {
    let mut rotated = *nonce;
    rotated.rotate_left(1);
    rotated
}

/// Rotate right by one byte, undoing [`rotate_left`]
pub fn rotate_right<const N: usize>(nonce: &[u8; N]) -> [u8; N] {
    let mut rotated = *nonce;
    rotated.rotate_right(1);
    rotated
}

/// XOR two equally sized arrays
pub fn xor<const N: usize>(a: &[u8; N], b: &[u8; N]) -> [u8; N] {
    let mut out = [0u8; N];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b)) {
        *o = x ^ y;
    }
    out
}

/// Pad with `80 00 ..` up to the next multiple of 16 (ISO/IEC 9797-1 method 2)
///
/// Block-aligned input still receives a full padding block.
pub fn pad(data: &[u8]) -> Vec<u8> {
    let mut padded = Vec::with_capacity((data.len() + 1).next_multiple_of(AES_BLOCK_SIZE));
    padded.extend_from_slice(data);
    padded.push(0x80);
    padded.resize(padded.len().next_multiple_of(AES_BLOCK_SIZE), 0x00);
    padded
}

/// Strip `80 00 ..` padding added by [`pad`]
pub fn strip_padding(data: &[u8]) -> Result<&[u8]> {
    let end = data
        .iter()
        .rposition(|&b| b != 0x00)
        .ok_or(Error::Format("padding marker missing"))?;
    if data[end] != 0x80 || data.len() - end > AES_BLOCK_SIZE {
        return Err(Error::Format("invalid padding"));
    }
    Ok(&data[..end])
}

/// CRC32 as used by DESFire (IEEE polynomial, no final inversion), little endian
pub fn crc32(data: &[u8]) -> [u8; 4] {
    (!crc32fast::hash(data)).to_le_bytes()
}
