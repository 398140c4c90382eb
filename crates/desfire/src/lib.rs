//! MIFARE DESFire EV2 secure messaging
//!
//! Host side of the DESFire EV2 secure channel over any [`CardTransport`]:
//!
//! - mutual authentication ([`auth`]): AuthenticateEV2First/NonFirst and legacy
//!   AuthenticateISO
//! - session key derivation from the exchanged nonces ([`kdf`])
//! - command protection and response verification with truncated AES-CMAC, AES-CBC
//!   encryption and a command counter bound to the transaction identifier ([`codec`])
//! - key change cryptograms ([`key_change`])
//! - a card handle with the common DESFire commands ([`Desfire`])
//!
//! PC/SC readers need native frames wrapped in ISO 7816 APDUs; see [`IsoWrapped`].
//!
//! [`CardTransport`]: desfire_apdu_core::CardTransport
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod auth;
mod card;
pub mod channel;
pub mod codec;
mod commands;
pub mod config;
pub mod constants;
pub mod counter;
pub mod crypto;
mod error;
pub mod exchange;
pub mod framing;
pub mod kdf;
pub mod key;
pub mod key_change;
pub mod session;
pub mod types;

pub use card::Desfire;
pub use channel::{Channel, Ev2Channel, IsoChannel, SecureMessaging};
pub use codec::{CommMode, CommandEnvelope, ResponseEnvelope};
pub use config::DesfireConfig;
pub use counter::CommandCounter;
pub use error::{CardStatus, Error, Result};
pub use framing::IsoWrapped;
pub use key::{AesKey, KeyType, LegacyKey, SessionKeys};
pub use key_change::KeyChange;
pub use session::{AuthMode, ChannelState, Session, TransactionId};
pub use types::{KeySettings, Version, VersionInfo};
