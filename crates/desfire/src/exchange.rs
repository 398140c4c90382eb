//! Moving protected frames through a transport
//!
//! Splits long commands into `0xAF` continuation frames, drains chained responses and
//! applies the session failure rules: anything that may have desynchronised host and
//! card invalidates the session.

use bytes::Bytes;
use desfire_apdu_core::CardTransport;
use tracing::debug;

use crate::channel::SecureMessaging;
use crate::codec::{CommandEnvelope, ResponseEnvelope, drain, verify_status};
use crate::config::DesfireConfig;
use crate::constants::{cmd, status};
use crate::session::Session;
use crate::{Error, Result};

/// Send one command frame, chaining it when it exceeds `max_frame_len`
///
/// Returns the card's answer to the last chunk. A threshold below 2 leaves no room for
/// data behind the continuation code and is rejected before any I/O.
pub fn send_frame<T: CardTransport + ?Sized>(
    transport: &mut T,
    frame: &[u8],
    max_frame_len: usize,
) -> Result<Bytes> {
    check_chaining_threshold(max_frame_len)?;
    if frame.len() <= max_frame_len {
        return Ok(transport.transmit_raw(frame)?);
    }

    let (first, rest) = frame.split_at(max_frame_len);
    debug!(
        frame_len = frame.len(),
        max_frame_len, "Chaining outgoing command"
    );

    let mut response = transport.transmit_raw(first)?;
    for chunk in rest.chunks(max_frame_len - 1) {
        let code = *response
            .first()
            .ok_or(Error::Format("empty response frame"))?;
        if code != status::ADDITIONAL_FRAME {
            verify_status(code)?;
            return Err(Error::Format("card completed a chained command early"));
        }

        let mut next = Vec::with_capacity(chunk.len() + 1);
        next.push(cmd::ADDITIONAL_FRAME);
        next.extend_from_slice(chunk);
        response = transport.transmit_raw(&next)?;
    }

    Ok(response)
}

/// Send a frame and collect the complete response
pub fn exchange<T: CardTransport + ?Sized>(
    transport: &mut T,
    frame: &[u8],
    config: &DesfireConfig,
) -> Result<ResponseEnvelope> {
    let first = send_frame(transport, frame, config.max_frame_len)?;
    drain(transport, &first, config.max_response_frames)
}

/// Run one command through the session's secure messaging
///
/// The counter advances only after a secured response verified. Transport failures
/// after bytes left the reader, malformed or unverifiable responses and counter
/// exhaustion invalidate the session; card status errors do not.
pub fn transact<T: CardTransport + ?Sized>(
    transport: &mut T,
    session: &mut Session,
    envelope: &CommandEnvelope,
    config: &DesfireConfig,
) -> Result<Vec<u8>> {
    let response = send_protected(transport, session, envelope, config)?;

    let unwrapped = session.channel()?.unwrap_response(envelope.mode(), &response);
    let data = unwrapped.map_err(|err| fail_closed(session, err))?;

    if envelope.mode().is_secured() {
        let advanced = session.channel_mut()?.advance();
        advanced.map_err(|err| fail_closed(session, err))?;
    }

    Ok(data)
}

/// Wrap and send a command, returning the raw verified-status response
///
/// Used directly for the few exchanges whose response carries no MAC.
pub(crate) fn send_protected<T: CardTransport + ?Sized>(
    transport: &mut T,
    session: &mut Session,
    envelope: &CommandEnvelope,
    config: &DesfireConfig,
) -> Result<ResponseEnvelope> {
    check_chaining_threshold(config.max_frame_len)?;
    let wrapped = session.channel()?.wrap_command(envelope);
    let frame = match wrapped {
        Ok(frame) => frame,
        Err(Error::CounterExhausted) => {
            session.invalidate();
            return Err(Error::CounterExhausted);
        }
        Err(err) => return Err(err),
    };

    exchange(transport, &frame, config).map_err(|err| fail_closed(session, err))
}

const fn check_chaining_threshold(max_frame_len: usize) -> Result<()> {
    if max_frame_len < 2 {
        Err(Error::Format("chaining threshold below 2 bytes"))
    } else {
        Ok(())
    }
}

fn fail_closed(session: &mut Session, err: Error) -> Error {
    if !err.leaves_session_intact() {
        debug!(error = %err, "Exchange failed with unknown card state");
        session.invalidate();
    }
    err
}
