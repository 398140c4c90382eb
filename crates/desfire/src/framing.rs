//! ISO 7816-4 wrapping of native frames
//!
//! PC/SC readers only pass ISO APDUs. Native DESFire frames travel as
//! `90 ‖ cmd ‖ 00 00 ‖ [Lc ‖ data] ‖ 00` and come back with the native status in SW2
//! under `SW1 = 0x91`.

use bytes::{BufMut, Bytes, BytesMut};
use desfire_apdu_core::{CardTransport, Command, Response, TransportError};
use tracing::trace;

/// CLA byte of wrapped native commands
pub const WRAPPED_CLA: u8 = 0x90;

/// Transport adapter that speaks native frames over an ISO 7816 transport
#[derive(Debug)]
pub struct IsoWrapped<T> {
    inner: T,
}

impl<T: CardTransport> IsoWrapped<T> {
    /// Wrap an ISO 7816 transport
    pub const fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Underlying transport
    pub const fn inner(&self) -> &T {
        &self.inner
    }

    /// Consume the adapter, returning the underlying transport
    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// Build the ISO APDU carrying a native frame
pub fn wrap_native(frame: &[u8]) -> Result<Bytes, TransportError> {
    let (&ins, data) = frame
        .split_first()
        .ok_or_else(|| TransportError::other("empty native frame"))?;

    let command = if data.is_empty() {
        Command::new(WRAPPED_CLA, ins, 0x00, 0x00)
    } else {
        Command::new_with_data(WRAPPED_CLA, ins, 0x00, 0x00, Bytes::copy_from_slice(data))
    };

    command
        .with_le(0)
        .to_bytes()
        .map_err(|e| TransportError::other(e.to_string()))
}

/// Turn an ISO response back into `status ‖ data`
pub fn unwrap_native(raw: &[u8]) -> Result<Bytes, TransportError> {
    let response = Response::from_bytes(raw).map_err(|e| TransportError::other(e.to_string()))?;
    let status = response.status();
    let code = status.native_status().ok_or_else(|| {
        TransportError::other(format!("unexpected ISO status word {:04X}", status.to_u16()))
    })?;

    let payload = response.payload().as_deref().unwrap_or_default();
    let mut frame = BytesMut::with_capacity(1 + payload.len());
    frame.put_u8(code);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

impl<T: CardTransport> CardTransport for IsoWrapped<T> {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        let apdu = wrap_native(command)?;
        trace!(apdu = %hex::encode(&apdu), "Wrapped native command");
        let raw = self.inner.transmit_raw(&apdu)?;
        unwrap_native(&raw)
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.inner.reset()
    }
}
