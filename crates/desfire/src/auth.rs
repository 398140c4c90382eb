//! Mutual authentication handshakes
//!
//! Every handshake takes two round trips. The first message asks the card for its
//! encrypted challenge and yields a [`PendingHandshake`]; completing it proves knowledge
//! of the key, checks the card's proof of RndA and produces session keys.
//!
//! - AuthenticateEV2First (`0x71`) starts a fresh EV2 session: new TI, counter at zero
//! - AuthenticateEV2NonFirst (`0x77`) re-keys an EV2 session, keeping TI and counter
//! - AuthenticateISO (`0x1A`) is the legacy 3DES fallback producing an EV1 session

use std::fmt;

use desfire_apdu_core::CardTransport;
use rand::RngCore;
use tracing::debug;
use zeroize::Zeroizing;

use crate::channel::{Channel, Ev2Channel, IsoChannel};
use crate::constants::{
    AES_BLOCK_SIZE, CAPABILITIES_LENGTH, DES_BLOCK_SIZE, EV2_FIRST_ANSWER_LENGTH,
    EV2_NONCE_LENGTH, TI_LENGTH, cmd, status,
};
use crate::crypto::{
    aes_cbc_decrypt, aes_cbc_encrypt, constant_time_eq, rotate_left, tdes_cbc_decrypt,
    tdes_cbc_encrypt,
};
use crate::error::CardStatus;
use crate::kdf::{derive_ev2, derive_iso};
use crate::key::{AesKey, LegacyKey};
use crate::session::{AuthMode, Session, TransactionId};
use crate::{Error, Result};

/// Highest key number accepted by the authentication commands
pub const MAX_AUTH_KEY_NUMBER: u8 = 0x0F;

const ZERO_IV: [u8; AES_BLOCK_SIZE] = [0; AES_BLOCK_SIZE];

type Nonce = [u8; EV2_NONCE_LENGTH];

/// Which handshake a pending context belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeKind {
    /// AuthenticateEV2First
    Ev2First,
    /// AuthenticateEV2NonFirst
    Ev2NonFirst,
    /// AuthenticateISO
    Iso,
}

/// State carried between the two handshake messages
///
/// Consumed by the matching `complete_*` call; dropping it abandons the handshake.
pub struct PendingHandshake {
    kind: HandshakeKind,
    key_no: u8,
    encrypted_nonce: Vec<u8>,
}

impl PendingHandshake {
    /// Handshake kind
    pub const fn kind(&self) -> HandshakeKind {
        self.kind
    }

    /// Key slot being authenticated
    pub const fn key_no(&self) -> u8 {
        self.key_no
    }

    fn ensure_kind(&self, kind: HandshakeKind) -> Result<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(Error::AuthenticationFailed("pending handshake is of another kind"))
        }
    }
}

impl fmt::Debug for PendingHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingHandshake")
            .field("kind", &self.kind)
            .field("key_no", &self.key_no)
            .field("encrypted_nonce", &hex::encode(&self.encrypted_nonce))
            .finish()
    }
}

pub(crate) const fn check_key_no(key_no: u8) -> Result<()> {
    if key_no > MAX_AUTH_KEY_NUMBER {
        Err(Error::Format("key number out of range"))
    } else {
        Ok(())
    }
}

/// Validate the caller input of AuthenticateEV2First
pub(crate) fn check_first_request(key_no: u8, capabilities: &[u8]) -> Result<()> {
    check_key_no(key_no)?;
    if capabilities.len() > CAPABILITIES_LENGTH {
        return Err(Error::invalid_length(
            "PCDcap2",
            CAPABILITIES_LENGTH,
            capabilities.len(),
        ));
    }
    Ok(())
}

/// Split a handshake answer into its body, checking the status byte
///
/// A lone error code is the card refusing the step. A lone success or continuation code
/// is a truncated answer.
fn split_status(response: &[u8], expected: u8) -> Result<&[u8]> {
    let (&code, body) = response
        .split_first()
        .ok_or(Error::Format("authentication response too short"))?;
    if body.is_empty() && matches!(code, status::OPERATION_OK | status::ADDITIONAL_FRAME) {
        return Err(Error::Format("authentication response too short"));
    }
    if code != expected {
        return Err(Error::Protocol(CardStatus(code)));
    }
    Ok(body)
}

/// Check a `0xAF ‖ E(RndB)` answer and return the encrypted nonce
fn expect_challenge(response: &[u8], nonce_lengths: &[usize]) -> Result<Vec<u8>> {
    let nonce = split_status(response, status::ADDITIONAL_FRAME)?;
    if !nonce_lengths.contains(&nonce.len()) {
        return Err(Error::invalid_length(
            "encrypted card nonce",
            nonce_lengths[0],
            nonce.len(),
        ));
    }
    Ok(nonce.to_vec())
}

/// Check a `0x00 ‖ data` final answer of the expected length and return the data
fn expect_final(response: &[u8], length: usize) -> Result<Vec<u8>> {
    let data = split_status(response, status::OPERATION_OK)?;
    if data.len() != length {
        return Err(Error::invalid_length("authentication answer", length, data.len()));
    }
    Ok(data.to_vec())
}

fn verify_rnd_a(rnd_a: &[u8], echoed: &[u8]) -> Result<()> {
    let mut expected = rnd_a.to_vec();
    expected.rotate_left(1);
    if constant_time_eq(&expected, echoed) {
        Ok(())
    } else {
        debug!("Card answered with a wrong RndA'");
        Err(Error::AuthenticationFailed("card did not prove knowledge of RndA"))
    }
}

/// Decrypt the card challenge and build `E(RndA ‖ RndB')` for an EV2 handshake
fn ev2_second_pass<R: RngCore + ?Sized>(
    key: &AesKey,
    encrypted_nonce: &[u8],
    rng: &mut R,
) -> Result<(Zeroizing<Nonce>, Zeroizing<Nonce>, Vec<u8>)> {
    let mut rnd_b = Zeroizing::new(Nonce::default());
    if encrypted_nonce.len() != EV2_NONCE_LENGTH {
        return Err(Error::invalid_length(
            "encrypted card nonce",
            EV2_NONCE_LENGTH,
            encrypted_nonce.len(),
        ));
    }
    rnd_b.copy_from_slice(encrypted_nonce);
    aes_cbc_decrypt(key.as_bytes(), &ZERO_IV, rnd_b.as_mut_slice())?;

    let mut rnd_a = Zeroizing::new(Nonce::default());
    rng.fill_bytes(rnd_a.as_mut_slice());

    let mut token = Zeroizing::new([0u8; 2 * EV2_NONCE_LENGTH]);
    token[..EV2_NONCE_LENGTH].copy_from_slice(rnd_a.as_slice());
    token[EV2_NONCE_LENGTH..].copy_from_slice(&rotate_left(&*rnd_b));
    aes_cbc_encrypt(key.as_bytes(), &ZERO_IV, token.as_mut_slice())?;

    let mut frame = Vec::with_capacity(1 + token.len());
    frame.push(cmd::ADDITIONAL_FRAME);
    frame.extend_from_slice(token.as_slice());

    Ok((rnd_a, rnd_b, frame))
}

/// Send AuthenticateEV2First and receive the card challenge
///
/// `capabilities` are the PCDcap2 bytes, at most six.
pub fn begin_first<T: CardTransport + ?Sized>(
    transport: &mut T,
    key_no: u8,
    target_app: bool,
    capabilities: &[u8],
) -> Result<PendingHandshake> {
    check_first_request(key_no, capabilities)?;

    let mut frame = Vec::with_capacity(3 + capabilities.len());
    frame.push(cmd::AUTHENTICATE_EV2_FIRST);
    frame.push(key_no | (u8::from(target_app) << 7));
    frame.push(capabilities.len() as u8);
    frame.extend_from_slice(capabilities);

    let response = transport.transmit_raw(&frame)?;
    let encrypted_nonce = expect_challenge(&response, &[EV2_NONCE_LENGTH])?;
    debug!(key_no, target_app, "AuthenticateEV2First: card challenge received");

    Ok(PendingHandshake {
        kind: HandshakeKind::Ev2First,
        key_no,
        encrypted_nonce,
    })
}

/// Finish AuthenticateEV2First with a thread-local RNG
pub fn complete_first<T: CardTransport + ?Sized>(
    transport: &mut T,
    key: &AesKey,
    pending: PendingHandshake,
) -> Result<Session> {
    complete_first_with_rng(transport, key, pending, &mut rand::rng())
}

/// Finish AuthenticateEV2First, drawing RndA from `rng`
pub fn complete_first_with_rng<T, R>(
    transport: &mut T,
    key: &AesKey,
    pending: PendingHandshake,
    rng: &mut R,
) -> Result<Session>
where
    T: CardTransport + ?Sized,
    R: RngCore + ?Sized,
{
    pending.ensure_kind(HandshakeKind::Ev2First)?;
    let (rnd_a, rnd_b, frame) = ev2_second_pass(key, &pending.encrypted_nonce, rng)?;

    let response = transport.transmit_raw(&frame)?;
    let mut answer = Zeroizing::new(expect_final(&response, EV2_FIRST_ANSWER_LENGTH)?);
    aes_cbc_decrypt(key.as_bytes(), &ZERO_IV, answer.as_mut_slice())?;

    let (ti, rest) = answer.split_at(TI_LENGTH);
    let (echoed, capabilities) = rest.split_at(EV2_NONCE_LENGTH);
    verify_rnd_a(rnd_a.as_slice(), echoed)?;

    let mut ti_bytes = [0u8; TI_LENGTH];
    ti_bytes.copy_from_slice(ti);
    let ti = TransactionId::new(ti_bytes);
    let mut pd_capabilities = [0u8; CAPABILITIES_LENGTH];
    pd_capabilities.copy_from_slice(&capabilities[..CAPABILITIES_LENGTH]);
    let mut pcd_capabilities = [0u8; CAPABILITIES_LENGTH];
    pcd_capabilities.copy_from_slice(&capabilities[CAPABILITIES_LENGTH..]);

    let keys = derive_ev2(key, &rnd_a, &rnd_b);
    debug!(key_no = pending.key_no, ti = %ti, "AuthenticateEV2First complete");

    Ok(
        Session::new(Channel::Ev2(Ev2Channel::new(keys, ti)), pending.key_no)
            .with_capabilities(pd_capabilities, pcd_capabilities),
    )
}

/// Run both passes of AuthenticateEV2First
pub fn authenticate_ev2_first<T: CardTransport + ?Sized>(
    transport: &mut T,
    key_no: u8,
    key: &AesKey,
    capabilities: &[u8],
) -> Result<Session> {
    let pending = begin_first(transport, key_no, false, capabilities)?;
    complete_first(transport, key, pending)
}

/// Send AuthenticateEV2NonFirst inside an active EV2 session
pub fn begin_non_first<T: CardTransport + ?Sized>(
    transport: &mut T,
    session: &Session,
    key_no: u8,
) -> Result<PendingHandshake> {
    check_key_no(key_no)?;
    match session.mode() {
        Some(AuthMode::Ev2) => {}
        Some(AuthMode::Ev1) => {
            return Err(Error::UnsupportedMode(
                "AuthenticateEV2NonFirst needs an EV2 session",
            ));
        }
        None => return Err(Error::SessionInvalidated),
    }

    let response = transport.transmit_raw(&[cmd::AUTHENTICATE_EV2_NON_FIRST, key_no])?;
    let encrypted_nonce = expect_challenge(&response, &[EV2_NONCE_LENGTH])?;
    debug!(key_no, "AuthenticateEV2NonFirst: card challenge received");

    Ok(PendingHandshake {
        kind: HandshakeKind::Ev2NonFirst,
        key_no,
        encrypted_nonce,
    })
}

/// Finish AuthenticateEV2NonFirst with a thread-local RNG
pub fn complete_non_first<T: CardTransport + ?Sized>(
    transport: &mut T,
    session: &mut Session,
    key: &AesKey,
    pending: PendingHandshake,
) -> Result<()> {
    complete_non_first_with_rng(transport, session, key, pending, &mut rand::rng())
}

/// Finish AuthenticateEV2NonFirst, drawing RndA from `rng`
///
/// Re-derives the session keys in place; TI and command counter are kept.
pub fn complete_non_first_with_rng<T, R>(
    transport: &mut T,
    session: &mut Session,
    key: &AesKey,
    pending: PendingHandshake,
    rng: &mut R,
) -> Result<()>
where
    T: CardTransport + ?Sized,
    R: RngCore + ?Sized,
{
    pending.ensure_kind(HandshakeKind::Ev2NonFirst)?;
    let (rnd_a, rnd_b, frame) = ev2_second_pass(key, &pending.encrypted_nonce, rng)?;

    let response = transport.transmit_raw(&frame)?;
    let mut answer = Zeroizing::new(expect_final(&response, EV2_NONCE_LENGTH)?);
    aes_cbc_decrypt(key.as_bytes(), &ZERO_IV, answer.as_mut_slice())?;
    verify_rnd_a(rnd_a.as_slice(), &answer)?;

    let keys = derive_ev2(key, &rnd_a, &rnd_b);
    match session.channel_mut()? {
        Channel::Ev2(channel) => channel.rekey(keys),
        Channel::Iso(_) => {
            return Err(Error::UnsupportedMode(
                "AuthenticateEV2NonFirst needs an EV2 session",
            ));
        }
    }
    session.set_key_no(pending.key_no);
    debug!(key_no = pending.key_no, "AuthenticateEV2NonFirst complete");
    Ok(())
}

/// Send AuthenticateISO and receive the 3DES card challenge
pub fn begin_iso<T: CardTransport + ?Sized>(
    transport: &mut T,
    key_no: u8,
) -> Result<PendingHandshake> {
    check_key_no(key_no)?;

    let response = transport.transmit_raw(&[cmd::AUTHENTICATE_ISO, key_no])?;
    let encrypted_nonce = expect_challenge(&response, &[DES_BLOCK_SIZE, 2 * DES_BLOCK_SIZE])?;
    debug!(
        key_no,
        nonce_len = encrypted_nonce.len(),
        "AuthenticateISO: card challenge received"
    );

    Ok(PendingHandshake {
        kind: HandshakeKind::Iso,
        key_no,
        encrypted_nonce,
    })
}

/// Finish AuthenticateISO with a thread-local RNG
pub fn complete_iso<T: CardTransport + ?Sized>(
    transport: &mut T,
    key: &LegacyKey,
    pending: PendingHandshake,
) -> Result<Session> {
    complete_iso_with_rng(transport, key, pending, &mut rand::rng())
}

/// Finish AuthenticateISO, drawing RndA from `rng`
///
/// CBC chaining runs across the handshake: the host token is encrypted with the card's
/// last ciphertext block as IV, and the card's answer is decrypted with the host's last
/// ciphertext block as IV.
pub fn complete_iso_with_rng<T, R>(
    transport: &mut T,
    key: &LegacyKey,
    pending: PendingHandshake,
    rng: &mut R,
) -> Result<Session>
where
    T: CardTransport + ?Sized,
    R: RngCore + ?Sized,
{
    pending.ensure_kind(HandshakeKind::Iso)?;
    let nonce_len = key.nonce_length();
    let encrypted_nonce = &pending.encrypted_nonce;
    if encrypted_nonce.len() != nonce_len {
        return Err(Error::invalid_length(
            "encrypted card nonce",
            nonce_len,
            encrypted_nonce.len(),
        ));
    }

    let mut rnd_b = Zeroizing::new(encrypted_nonce.clone());
    tdes_cbc_decrypt(key, &[0; DES_BLOCK_SIZE], rnd_b.as_mut_slice())?;

    let mut rnd_a = Zeroizing::new(vec![0u8; nonce_len]);
    rng.fill_bytes(rnd_a.as_mut_slice());

    let mut token = Zeroizing::new(Vec::with_capacity(2 * nonce_len));
    token.extend_from_slice(&rnd_a);
    token.extend_from_slice(&rnd_b[1..]);
    token.push(rnd_b[0]);
    tdes_cbc_encrypt(key, &last_block(encrypted_nonce), token.as_mut_slice())?;

    let mut frame = Vec::with_capacity(1 + token.len());
    frame.push(cmd::ADDITIONAL_FRAME);
    frame.extend_from_slice(&token);

    let response = transport.transmit_raw(&frame)?;
    let mut answer = Zeroizing::new(expect_final(&response, nonce_len)?);
    tdes_cbc_decrypt(key, &last_block(&token), answer.as_mut_slice())?;
    verify_rnd_a(&rnd_a, &answer)?;

    let session_key = derive_iso(key, &rnd_a, &rnd_b)?;
    debug!(key_no = pending.key_no, "AuthenticateISO complete");

    Ok(Session::new(
        Channel::Iso(IsoChannel::new(session_key)),
        pending.key_no,
    ))
}

/// Run both passes of AuthenticateISO
pub fn authenticate_iso<T: CardTransport + ?Sized>(
    transport: &mut T,
    key_no: u8,
    key: &LegacyKey,
) -> Result<Session> {
    let pending = begin_iso(transport, key_no)?;
    complete_iso(transport, key, pending)
}

fn last_block(data: &[u8]) -> [u8; DES_BLOCK_SIZE] {
    let mut block = [0u8; DES_BLOCK_SIZE];
    block.copy_from_slice(&data[data.len() - DES_BLOCK_SIZE..]);
    block
}
