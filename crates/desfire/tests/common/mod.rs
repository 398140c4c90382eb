//! Simulated DESFire EV2 card
//!
//! Plays the card side of the handshakes and of EV2 secure messaging for a small fixed
//! command set, using the crate's own primitives for the card computations.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use desfire_apdu_core::{CardTransport, Command, TransportError};
use desfire_ev2::codec::{command_iv, mac_command, mac_response, response_iv};
use desfire_ev2::crypto::{
    aes_cbc_decrypt, aes_cbc_encrypt, crc32, pad, rotate_left, strip_padding, tdes_cbc_decrypt,
    tdes_cbc_encrypt,
};
use desfire_ev2::kdf::{derive_ev2, derive_iso};
use desfire_ev2::{AesKey, CommandCounter, LegacyKey, SessionKeys, TransactionId};
use hex_literal::hex;
use rand::RngCore;

pub const TI: [u8; 4] = hex!("9d00c4df");
pub const RND_A: [u8; 16] = hex!("13c5db8a5930439fc3def9a4c675360f");
pub const RND_B: [u8; 16] = hex!("b9e2fc789b64bf237cccaa20ec7e6e48");
pub const UID: [u8; 7] = hex!("04c23a4a2a6380");
pub const PD_CAPABILITIES: [u8; 6] = hex!("000000000000");
pub const APPLICATION: [u8; 3] = hex!("010203");
pub const VERSION: [u8; 28] = hex!(
    "04010112001605"
    "04010102011605"
    "04c23a4a2a6380ba5492b1803919"
);
pub const LEGACY_KEY: [u8; 16] = hex!("00112233445566778899aabbccddeeff");

/// Standard data file protected in full mode
pub const FULL_FILE: u8 = 0x01;
/// Standard data file protected with MACs
pub const MAC_FILE: u8 = 0x02;
/// Standard data file readable without authentication
pub const PLAIN_FILE: u8 = 0x03;

const OK: u8 = 0x00;
const AF: u8 = 0xAF;
const ILLEGAL_COMMAND: u8 = 0x1C;
const INTEGRITY_ERROR: u8 = 0x1E;
const NO_SUCH_KEY: u8 = 0x40;
const LENGTH_ERROR: u8 = 0x7E;
const PERMISSION_DENIED: u8 = 0x9D;
const APPLICATION_NOT_FOUND: u8 = 0xA0;
const AUTHENTICATION_ERROR: u8 = 0xAE;
const BOUNDARY_ERROR: u8 = 0xBE;

const ZERO_IV: [u8; 16] = [0; 16];
const MAC_LENGTH: usize = 8;

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// RNG repeating a fixed pattern, so handshakes use a known RndA
#[derive(Debug)]
pub struct FixedRng(pub [u8; 16]);

impl RngCore for FixedRng {
    fn next_u32(&mut self) -> u32 {
        u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    fn next_u64(&mut self) -> u64 {
        u64::from(self.next_u32())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for (byte, value) in dest.iter_mut().zip(self.0.iter().cycle()) {
            *byte = *value;
        }
    }
}

#[derive(Debug)]
enum Handshake {
    Idle,
    Ev2 { key_no: u8, first: bool },
    Iso { encrypted_nonce: Vec<u8>, rnd_b: Vec<u8> },
}

#[derive(Debug)]
enum CardSession {
    Ev2 {
        keys: SessionKeys,
        counter: u16,
        key_no: u8,
    },
    Iso {
        session_key: LegacyKey,
    },
}

enum Reply {
    Mac(Vec<u8>),
    Full(Vec<u8>),
    Status(u8),
    /// Authenticated key changed: plain OK and the session ends
    SessionClosed,
}

/// Card side of the protocol
#[derive(Debug)]
pub struct SimulatedCard {
    keys: HashMap<u8, [u8; 16]>,
    key_versions: HashMap<u8, u8>,
    handshake: Handshake,
    session: Option<CardSession>,
    files: HashMap<u8, Vec<u8>>,
    queued: VecDeque<Vec<u8>>,
    pcd_capabilities: [u8; 6],
    pub key_settings: u8,
    pub application: [u8; 3],
    /// Every frame received, in order
    pub received: Vec<Vec<u8>>,
    /// Maximum data bytes per response frame
    pub frame_size: usize,
    /// Answer AuthenticateEV2First with a corrupted RndA'
    pub wrong_rnd_a: bool,
    /// XOR `mask` into the byte at `index` of the next response
    pub tamper_next: Option<(usize, u8)>,
    /// Fail the next exchange before the card sees it
    pub fail_next: Option<TransportError>,
}

impl Default for SimulatedCard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCard {
    /// Card with factory default AES keys in slots 0..4
    pub fn new() -> Self {
        let keys = (0..5).map(|key_no| (key_no, [0u8; 16])).collect();
        let files = [
            (FULL_FILE, (0u8..32).collect()),
            (MAC_FILE, (0x40u8..0x60).collect()),
            (PLAIN_FILE, b"plain file".to_vec()),
        ]
        .into_iter()
        .collect();

        Self {
            keys,
            key_versions: HashMap::new(),
            handshake: Handshake::Idle,
            session: None,
            files,
            queued: VecDeque::new(),
            pcd_capabilities: [0; 6],
            key_settings: 0x0F,
            application: [0; 3],
            received: Vec::new(),
            frame_size: 59,
            wrong_rnd_a: false,
            tamper_next: None,
            fail_next: None,
        }
    }

    /// Current AES key of a slot
    pub fn key(&self, key_no: u8) -> [u8; 16] {
        self.keys[&key_no]
    }

    /// Stored key version of a slot
    pub fn key_version(&self, key_no: u8) -> u8 {
        self.key_versions.get(&key_no).copied().unwrap_or(0)
    }

    /// Contents of a data file
    pub fn file(&self, file_no: u8) -> &[u8] {
        &self.files[&file_no]
    }

    /// Whether the card considers a session active
    pub fn authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Card-side command counter of the EV2 session
    pub fn counter(&self) -> Option<u16> {
        match &self.session {
            Some(CardSession::Ev2 { counter, .. }) => Some(*counter),
            _ => None,
        }
    }

    /// Card-side EV2 session keys
    pub fn session_keys(&self) -> Option<&SessionKeys> {
        match &self.session {
            Some(CardSession::Ev2 { keys, .. }) => Some(keys),
            _ => None,
        }
    }

    fn process(&mut self, frame: &[u8]) -> Vec<u8> {
        let Some((&cmd, body)) = frame.split_first() else {
            return vec![LENGTH_ERROR];
        };

        match cmd {
            0x71 => self.begin_ev2(body, true),
            0x77 => self.begin_ev2(body, false),
            0x1A => self.begin_iso(body),
            AF => self.additional_frame(body),
            0x5A => self.select(body),
            _ => {
                self.handshake = Handshake::Idle;
                self.queued.clear();
                match self.session {
                    None => self.unauthenticated(cmd, body),
                    Some(CardSession::Ev2 { .. }) => self.ev2_command(cmd, frame),
                    Some(CardSession::Iso { .. }) => self.iso_command(cmd, body),
                }
            }
        }
    }

    fn begin_ev2(&mut self, body: &[u8], first: bool) -> Vec<u8> {
        let Some(&key_ref) = body.first() else {
            return vec![LENGTH_ERROR];
        };
        if !first && !matches!(self.session, Some(CardSession::Ev2 { .. })) {
            return vec![PERMISSION_DENIED];
        }
        let key_no = key_ref & 0x7F;
        let Some(key) = self.keys.get(&key_no).copied() else {
            self.session = None;
            return vec![NO_SUCH_KEY];
        };

        if first {
            self.session = None;
            let caps = body.get(2..).unwrap_or_default();
            self.pcd_capabilities = [0; 6];
            self.pcd_capabilities[..caps.len().min(6)].copy_from_slice(&caps[..caps.len().min(6)]);
        }

        let mut challenge = RND_B;
        aes_cbc_encrypt(&key, &ZERO_IV, &mut challenge).expect("block aligned");
        self.handshake = Handshake::Ev2 { key_no, first };
        frame(AF, &challenge)
    }

    fn begin_iso(&mut self, body: &[u8]) -> Vec<u8> {
        self.session = None;
        if body.first() != Some(&0) {
            return vec![NO_SUCH_KEY];
        }
        let key = LegacyKey::TwoKey(LEGACY_KEY);
        let rnd_b = RND_B[..8].to_vec();
        let mut encrypted_nonce = rnd_b.clone();
        tdes_cbc_encrypt(&key, &[0; 8], &mut encrypted_nonce).expect("block aligned");
        let answer = frame(AF, &encrypted_nonce);
        self.handshake = Handshake::Iso {
            encrypted_nonce,
            rnd_b,
        };
        answer
    }

    fn additional_frame(&mut self, body: &[u8]) -> Vec<u8> {
        if let Some(next) = self.queued.pop_front() {
            return next;
        }
        match std::mem::replace(&mut self.handshake, Handshake::Idle) {
            Handshake::Ev2 { key_no, first } => self.finish_ev2(key_no, first, body),
            Handshake::Iso {
                encrypted_nonce,
                rnd_b,
            } => self.finish_iso(&encrypted_nonce, &rnd_b, body),
            Handshake::Idle => vec![ILLEGAL_COMMAND],
        }
    }

    fn finish_ev2(&mut self, key_no: u8, first: bool, body: &[u8]) -> Vec<u8> {
        if body.len() != 32 {
            self.session = None;
            return vec![LENGTH_ERROR];
        }
        let key = self.keys[&key_no];
        let mut token = body.to_vec();
        aes_cbc_decrypt(&key, &ZERO_IV, &mut token).expect("block aligned");

        let mut rnd_a = [0u8; 16];
        rnd_a.copy_from_slice(&token[..16]);
        if token[16..] != rotate_left(&RND_B) {
            self.session = None;
            return vec![AUTHENTICATION_ERROR];
        }

        let mut echoed = rotate_left(&rnd_a);
        if self.wrong_rnd_a {
            echoed[0] ^= 0xFF;
        }

        let mut answer = Vec::with_capacity(32);
        if first {
            answer.extend_from_slice(&TI);
            answer.extend_from_slice(&echoed);
            answer.extend_from_slice(&PD_CAPABILITIES);
            answer.extend_from_slice(&self.pcd_capabilities);
        } else {
            answer.extend_from_slice(&echoed);
        }
        aes_cbc_encrypt(&key, &ZERO_IV, &mut answer).expect("block aligned");

        let counter = match (&self.session, first) {
            (Some(CardSession::Ev2 { counter, .. }), false) => *counter,
            _ => 0,
        };
        self.session = Some(CardSession::Ev2 {
            keys: derive_ev2(&AesKey::new(key), &rnd_a, &RND_B),
            counter,
            key_no,
        });
        frame(OK, &answer)
    }

    fn finish_iso(&mut self, encrypted_nonce: &[u8], rnd_b: &[u8], body: &[u8]) -> Vec<u8> {
        if body.len() != 16 {
            return vec![LENGTH_ERROR];
        }
        let key = LegacyKey::TwoKey(LEGACY_KEY);
        let mut token = body.to_vec();
        tdes_cbc_decrypt(&key, &last_block(encrypted_nonce), &mut token).expect("block aligned");

        let mut rotated_b = rnd_b.to_vec();
        rotated_b.rotate_left(1);
        if token[8..] != rotated_b[..] {
            return vec![AUTHENTICATION_ERROR];
        }

        let rnd_a = token[..8].to_vec();
        let mut answer = rnd_a.clone();
        answer.rotate_left(1);
        tdes_cbc_encrypt(&key, &last_block(body), &mut answer).expect("block aligned");

        self.session = Some(CardSession::Iso {
            session_key: derive_iso(&key, &rnd_a, rnd_b).expect("nonce lengths"),
        });
        frame(OK, &answer)
    }

    fn select(&mut self, body: &[u8]) -> Vec<u8> {
        self.session = None;
        self.handshake = Handshake::Idle;
        let Ok(aid) = <[u8; 3]>::try_from(body) else {
            return vec![LENGTH_ERROR];
        };
        if aid != [0; 3] && aid != APPLICATION {
            return vec![APPLICATION_NOT_FOUND];
        }
        self.application = aid;
        vec![OK]
    }

    fn unauthenticated(&mut self, cmd: u8, body: &[u8]) -> Vec<u8> {
        match cmd {
            0x60 => self.respond(cmd, OK, VERSION.to_vec()),
            0x6A => self.respond(cmd, OK, APPLICATION.to_vec()),
            0x45 => vec![OK, self.key_settings, 0x85],
            0xAD if body.first() == Some(&PLAIN_FILE) => match self.read(body) {
                Ok(data) => self.respond(cmd, OK, data),
                Err(code) => vec![code],
            },
            _ => vec![AUTHENTICATION_ERROR],
        }
    }

    fn ev2_command(&mut self, cmd: u8, frame: &[u8]) -> Vec<u8> {
        let Some(CardSession::Ev2 {
            keys,
            counter,
            key_no,
        }) = &self.session
        else {
            return vec![AUTHENTICATION_ERROR];
        };
        let (keys, counter, key_no) = (keys.clone(), *counter, *key_no);
        let ti = TransactionId::new(TI);
        let ctr = CommandCounter::from_value(counter);

        if frame.len() < 1 + MAC_LENGTH {
            self.session = None;
            return vec![LENGTH_ERROR];
        }
        let (body, mac) = frame.split_at(frame.len() - MAC_LENGTH);
        if mac != mac_command(keys.mac(), &ti, cmd, ctr, &body[1..], &[]) {
            self.session = None;
            return vec![INTEGRITY_ERROR];
        }

        let header_len = match cmd {
            0x64 | 0x5C | 0xC4 => 1,
            0xC6 => 2,
            0xAD | 0x8D => 7,
            _ => 0,
        };
        let Some((header, data)) = body[1..].split_at_checked(header_len) else {
            return vec![LENGTH_ERROR];
        };
        let encrypted = matches!(cmd, 0x54 | 0x5C | 0xC4 | 0xC6)
            || (cmd == 0x8D && header[0] == FULL_FILE);
        let mut plaintext = data.to_vec();
        if encrypted && !plaintext.is_empty() {
            aes_cbc_decrypt(keys.enc(), &command_iv(keys.enc(), &ti, ctr), &mut plaintext)
                .expect("block aligned");
        }

        let reply = self.execute(cmd, header, &plaintext, key_no);
        let next = CommandCounter::from_value(counter + 1);
        let body = match reply {
            Reply::Status(code) => return vec![code],
            Reply::SessionClosed => {
                self.session = None;
                return vec![OK];
            }
            Reply::Mac(mut data) => {
                let mac = mac_response(keys.mac(), &ti, OK, next, &data);
                data.extend_from_slice(&mac);
                data
            }
            Reply::Full(data) => {
                let mut ciphertext = pad(&data);
                aes_cbc_encrypt(keys.enc(), &response_iv(keys.enc(), &ti, next), &mut ciphertext)
                    .expect("block aligned");
                let mac = mac_response(keys.mac(), &ti, OK, next, &ciphertext);
                ciphertext.extend_from_slice(&mac);
                ciphertext
            }
        };

        if let Some(CardSession::Ev2 { counter, .. }) = &mut self.session {
            *counter += 1;
        }
        self.respond(cmd, OK, body)
    }

    fn iso_command(&mut self, cmd: u8, body: &[u8]) -> Vec<u8> {
        let Some(CardSession::Iso { session_key }) = &self.session else {
            return vec![AUTHENTICATION_ERROR];
        };
        let session_key = session_key.clone();
        match cmd {
            0xAD => match self.read(body) {
                Ok(data) if body[0] == FULL_FILE => {
                    let mut ciphertext = pad(&data);
                    tdes_cbc_encrypt(&session_key, &[0; 8], &mut ciphertext).expect("block aligned");
                    self.respond(cmd, OK, ciphertext)
                }
                Ok(data) => self.respond(cmd, OK, data),
                Err(code) => vec![code],
            },
            0x45 => vec![OK, self.key_settings, 0x85],
            _ => vec![ILLEGAL_COMMAND],
        }
    }

    fn execute(&mut self, cmd: u8, header: &[u8], data: &[u8], auth_key: u8) -> Reply {
        match cmd {
            0x45 => Reply::Mac(vec![self.key_settings, 0x85]),
            0x54 => {
                self.key_settings = data[0];
                Reply::Mac(Vec::new())
            }
            0x64 => Reply::Mac(vec![self.key_version(header[0])]),
            0x60 => Reply::Mac(VERSION.to_vec()),
            0x6A => Reply::Mac(APPLICATION.to_vec()),
            0x51 => Reply::Full(UID.to_vec()),
            0xAD => match (self.read(header), header[0]) {
                (Ok(data), FULL_FILE) => Reply::Full(data),
                (Ok(data), _) => Reply::Mac(data),
                (Err(code), _) => Reply::Status(code),
            },
            0x8D => self.write(header, data),
            0xC7 | 0x5C => Reply::Mac(Vec::new()),
            0xFC => {
                self.files.clear();
                Reply::Mac(Vec::new())
            }
            0xC4 | 0xC6 => self.change_key(header[header.len() - 1] & 0x0F, data, auth_key),
            _ => Reply::Status(ILLEGAL_COMMAND),
        }
    }

    fn read(&self, header: &[u8]) -> Result<Vec<u8>, u8> {
        if header.len() != 7 {
            return Err(LENGTH_ERROR);
        }
        let file = self.files.get(&header[0]).ok_or(0xF0)?;
        let offset = le24(&header[1..4]);
        let length = match le24(&header[4..7]) {
            0 => file.len().saturating_sub(offset),
            n => n,
        };
        file.get(offset..offset + length)
            .map(<[u8]>::to_vec)
            .ok_or(BOUNDARY_ERROR)
    }

    fn write(&mut self, header: &[u8], data: &[u8]) -> Reply {
        let file_no = header[0];
        let offset = le24(&header[1..4]);
        let length = le24(&header[4..7]);
        let data = if file_no == FULL_FILE {
            match strip_padding(data) {
                Ok(data) => data,
                Err(_) => return Reply::Status(INTEGRITY_ERROR),
            }
        } else {
            data
        };
        if data.len() != length {
            return Reply::Status(LENGTH_ERROR);
        }
        let Some(file) = self.files.get_mut(&file_no) else {
            return Reply::Status(0xF0);
        };
        let Some(target) = file.get_mut(offset..offset + length) else {
            return Reply::Status(BOUNDARY_ERROR);
        };
        target.copy_from_slice(data);
        Reply::Mac(Vec::new())
    }

    fn change_key(&mut self, key_no: u8, data: &[u8], auth_key: u8) -> Reply {
        let Some(old) = self.keys.get(&key_no).copied() else {
            return Reply::Status(NO_SUCH_KEY);
        };
        if data.len() < 17 {
            return Reply::Status(LENGTH_ERROR);
        }

        let mut new_key = [0u8; 16];
        new_key.copy_from_slice(&data[..16]);
        if key_no == auth_key {
            self.keys.insert(key_no, new_key);
            self.key_versions.insert(key_no, data[16]);
            return Reply::SessionClosed;
        }

        for (byte, old) in new_key.iter_mut().zip(old) {
            *byte ^= old;
        }
        if data.get(17..21) != Some(&crc32(&new_key)[..]) {
            return Reply::Status(INTEGRITY_ERROR);
        }
        self.keys.insert(key_no, new_key);
        self.key_versions.insert(key_no, data[16]);
        Reply::Mac(Vec::new())
    }

    /// Split a response body into frames, queueing all but the first
    fn respond(&mut self, cmd: u8, status: u8, body: Vec<u8>) -> Vec<u8> {
        let mut chunks: Vec<Vec<u8>> = if cmd == 0x60 && body.len() > 14 {
            vec![body[..7].to_vec(), body[7..14].to_vec(), body[14..].to_vec()]
        } else {
            body.chunks(self.frame_size).map(<[u8]>::to_vec).collect()
        };
        if chunks.is_empty() {
            chunks.push(Vec::new());
        }

        let last = chunks.len() - 1;
        for (index, chunk) in chunks.into_iter().enumerate() {
            let code = if index == last { status } else { AF };
            self.queued.push_back(frame(code, &chunk));
        }
        self.queued.pop_front().unwrap_or_else(|| vec![status])
    }
}

impl CardTransport for SimulatedCard {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        if let Some(err) = self.fail_next.take() {
            return Err(err);
        }
        self.received.push(command.to_vec());

        let mut response = self.process(command);
        if let Some((index, mask)) = self.tamper_next.take() {
            let index = index.min(response.len() - 1);
            response[index] ^= mask;
        }
        Ok(Bytes::from(response))
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.session = None;
        self.handshake = Handshake::Idle;
        self.queued.clear();
        Ok(())
    }
}

/// ISO 7816 front end for the simulated card, as a PC/SC reader would present it
#[derive(Debug, Default)]
pub struct IsoReader {
    pub card: SimulatedCard,
    /// Every APDU received, in order
    pub apdus: Vec<Vec<u8>>,
}

impl CardTransport for IsoReader {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.apdus.push(command.to_vec());
        let apdu = Command::from_bytes(command).map_err(|e| TransportError::other(e.to_string()))?;
        if apdu.cla != 0x90 {
            return Ok(Bytes::from_static(&[0x6E, 0x00]));
        }

        let mut native = vec![apdu.ins];
        native.extend_from_slice(apdu.data().unwrap_or_default());
        let response = self.card.transmit_raw(&native)?;

        let (&status, data) = response.split_first().expect("native status byte");
        let mut wrapped = data.to_vec();
        wrapped.extend_from_slice(&[0x91, status]);
        Ok(Bytes::from(wrapped))
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.card.reset()
    }
}

fn frame(status: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + data.len());
    frame.push(status);
    frame.extend_from_slice(data);
    frame
}

fn le24(bytes: &[u8]) -> usize {
    usize::from(bytes[0]) | usize::from(bytes[1]) << 8 | usize::from(bytes[2]) << 16
}

fn last_block(data: &[u8]) -> [u8; 8] {
    let mut block = [0u8; 8];
    block.copy_from_slice(&data[data.len() - 8..]);
    block
}
