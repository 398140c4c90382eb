//! Core traits and types for talking to contactless cards
//!
//! This crate provides the foundational types shared by card protocol crates:
//!
//! - the [`CardTransport`] trait, the only thing a reader driver has to implement
//! - ISO/IEC 7816-4 [`Command`] and [`Response`] types used when native card frames
//!   have to be wrapped for a PC/SC reader
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod command;
pub mod error;
pub mod response;
pub mod transport;

pub use command::{Command, ExpectedLength};
pub use error::Error;
pub use response::Response;
pub use response::status::StatusWord;
pub use transport::{CardTransport, TransportError};
