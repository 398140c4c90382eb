//! Transport traits for communication with cards
//!
//! A transport moves opaque frames between the host and the card. Reader drivers
//! (PC/SC, serial readers, SPI front ends) implement [`CardTransport`]; everything above
//! it is transport-agnostic.

pub mod error;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

/// Trait for basic card transports
///
/// A transport is responsible for sending and receiving raw bytes.
/// It has no knowledge of command structure, secure channels, or protocol details.
/// Calls are blocking and only one exchange may be in flight at a time.
pub trait CardTransport: Send + Sync + fmt::Debug {
    /// Send raw bytes to the card and return the response bytes
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of transmit_raw
    /// This is the method that concrete implementations should override
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// Check if the transport is connected to a physical card
    fn is_connected(&self) -> bool;

    /// Reset the transport connection
    fn reset(&mut self) -> Result<(), TransportError>;
}

impl<T: CardTransport + ?Sized> CardTransport for Box<T> {
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).transmit_raw(command)
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).do_transmit_raw(command)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        (**self).reset()
    }
}

#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct MockTransport {
    /// Mock responses to return
    pub(crate) responses: Vec<Bytes>,
    /// Commands that were sent
    pub(crate) commands: Vec<Bytes>,
    /// Whether the transport is connected
    pub(crate) connected: bool,
}

#[cfg(test)]
impl MockTransport {
    pub(crate) fn new(responses: Vec<Bytes>) -> Self {
        Self {
            responses,
            commands: Vec::new(),
            connected: true,
        }
    }
}

#[cfg(test)]
impl CardTransport for MockTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        if !self.connected {
            return Err(TransportError::Connection);
        }

        self.commands.push(Bytes::copy_from_slice(command));

        if self.responses.is_empty() {
            return Err(TransportError::Transmission);
        }

        Ok(self.responses.remove(0))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        self.commands.clear();
        Ok(())
    }
}
