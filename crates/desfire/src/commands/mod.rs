//! DESFire commands on the card handle
//!
//! Each command picks its communication mode and builds a [`CommandEnvelope`]; the secure
//! messaging in [`Desfire::send`] does the rest.
//!
//! [`CommandEnvelope`]: crate::codec::CommandEnvelope
//! [`Desfire::send`]: crate::Desfire::send

mod application;
mod data;
mod info;
mod keys;
mod picc;

/// Encode a file offset or length as the 3-byte little-endian field used by data commands
pub(crate) fn le24(value: u32) -> crate::Result<[u8; 3]> {
    if value > 0x00FF_FFFF {
        return Err(crate::Error::Format("value does not fit 24 bits"));
    }
    let [b0, b1, b2, _] = value.to_le_bytes();
    Ok([b0, b1, b2])
}
