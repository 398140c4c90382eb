//! Card handle
//!
//! [`Desfire`] owns a transport and the session established over it. Commands are
//! implemented in [`crate::commands`] on top of [`Desfire::send`].

use std::fmt;

use desfire_apdu_core::CardTransport;
use tracing::debug;

use crate::auth::{self, PendingHandshake};
use crate::codec::{CommMode, CommandEnvelope};
use crate::config::DesfireConfig;
use crate::constants::PICC_AID;
use crate::exchange::{exchange, transact};
use crate::key::{AesKey, LegacyKey};
use crate::session::{AuthMode, ChannelState, Session};
use crate::{Error, Result};

/// A DESFire card reached through a transport
pub struct Desfire<T: CardTransport> {
    transport: T,
    config: DesfireConfig,
    session: Option<Session>,
    pending: Option<PendingHandshake>,
    application: [u8; 3],
}

impl<T: CardTransport> Desfire<T> {
    /// Create a handle with the default configuration
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, DesfireConfig::default())
    }

    /// Create a handle with an explicit configuration
    pub const fn with_config(transport: T, config: DesfireConfig) -> Self {
        Self {
            transport,
            config,
            session: None,
            pending: None,
            application: PICC_AID,
        }
    }

    /// Underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the underlying transport
    ///
    /// Frames sent directly bypass secure messaging and may desynchronise the session.
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the handle, returning the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Active configuration
    pub const fn config(&self) -> &DesfireConfig {
        &self.config
    }

    /// Current session, if a handshake completed since the last selection
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// AID of the selected application, `000000` for the PICC level
    pub const fn selected_application(&self) -> [u8; 3] {
        self.application
    }

    /// State of the secure channel
    pub fn state(&self) -> ChannelState {
        if self.pending.is_some() {
            return ChannelState::HandshakePending;
        }
        self.session
            .as_ref()
            .map_or(ChannelState::Unauthenticated, Session::state)
    }

    /// Negotiated mode of a still valid session
    pub fn auth_mode(&self) -> Option<AuthMode> {
        self.session.as_ref().and_then(Session::mode)
    }

    /// Send the first AuthenticateEV2First message
    ///
    /// Any existing session ends once the command may have reached the card, which drops
    /// it on receipt. Invalid input is rejected first and leaves the session alone.
    pub fn begin_authenticate_ev2_first(&mut self, key_no: u8) -> Result<()> {
        let capabilities = self.config.pcd_capabilities_bytes();
        auth::check_first_request(key_no, capabilities)?;
        self.pending = None;

        match auth::begin_first(&mut self.transport, key_no, false, capabilities) {
            Ok(pending) => {
                self.end_session();
                self.pending = Some(pending);
                Ok(())
            }
            Err(err) => {
                if handshake_reached_card(&err) {
                    self.end_session();
                }
                Err(err)
            }
        }
    }

    /// Finish a handshake started with [`Self::begin_authenticate_ev2_first`]
    pub fn complete_authenticate_ev2_first(&mut self, key: &AesKey) -> Result<()> {
        let pending = self
            .pending
            .take()
            .ok_or(Error::AuthenticationFailed("no handshake in progress"))?;
        let session = auth::complete_first(&mut self.transport, key, pending)?;
        self.session = Some(session.with_application(self.application));
        Ok(())
    }

    /// Authenticate with AuthenticateEV2First, starting a fresh EV2 session
    pub fn authenticate_ev2_first(&mut self, key_no: u8, key: &AesKey) -> Result<()> {
        self.begin_authenticate_ev2_first(key_no)?;
        self.complete_authenticate_ev2_first(key)
    }

    /// Re-authenticate inside the EV2 session with AuthenticateEV2NonFirst
    ///
    /// The card resets its authentication state on a failed attempt, so any failure after
    /// the command was sent ends the session.
    pub fn authenticate_ev2_non_first(&mut self, key_no: u8, key: &AesKey) -> Result<()> {
        self.pending = None;
        auth::check_key_no(key_no)?;
        let session = self.session.as_mut().ok_or(Error::NotAuthenticated)?;

        let result = match auth::begin_non_first(&mut self.transport, session, key_no) {
            Ok(pending) => auth::complete_non_first(&mut self.transport, session, key, pending),
            Err(err) => Err(err),
        };

        if let Err(err) = &result
            && handshake_reached_card(err)
        {
            session.invalidate();
        }
        result
    }

    /// Authenticate with the legacy AuthenticateISO handshake
    pub fn authenticate_iso(&mut self, key_no: u8, key: &LegacyKey) -> Result<()> {
        auth::check_key_no(key_no)?;
        self.pending = None;

        match auth::authenticate_iso(&mut self.transport, key_no, key) {
            Ok(session) => {
                self.end_session();
                self.session = Some(session.with_application(self.application));
                Ok(())
            }
            Err(err) => {
                if handshake_reached_card(&err) {
                    self.end_session();
                }
                Err(err)
            }
        }
    }

    /// Send a command through the session's secure messaging
    ///
    /// Plain commands go out unprotected when no session exists. Secured commands need a
    /// valid session.
    pub fn send(&mut self, envelope: &CommandEnvelope) -> Result<Vec<u8>> {
        self.pending = None;
        let secured = envelope.mode().is_secured();

        match self.session.as_mut() {
            Some(session) if session.is_valid() => {
                transact(&mut self.transport, session, envelope, &self.config)
            }
            Some(_) if secured => Err(Error::SessionInvalidated),
            None if secured => Err(Error::NotAuthenticated),
            _ => {
                let response = exchange(&mut self.transport, &envelope.plain_frame(), &self.config)?;
                Ok(response.into_data())
            }
        }
    }

    /// Mode for commands the card protects only inside a session
    ///
    /// Falls back to plain when no handshake happened. An invalidated session keeps the
    /// requested mode so the command fails instead of silently going out unprotected.
    pub(crate) const fn mode_for(&self, preferred: CommMode) -> CommMode {
        if self.session.is_some() {
            preferred
        } else {
            CommMode::Plain
        }
    }

    /// Run `f` with the transport and the valid session
    pub(crate) fn with_session<R>(
        &mut self,
        f: impl FnOnce(&mut T, &mut Session, &DesfireConfig) -> Result<R>,
    ) -> Result<R> {
        self.pending = None;
        let session = self.session.as_mut().ok_or(Error::NotAuthenticated)?;
        if !session.is_valid() {
            return Err(Error::SessionInvalidated);
        }
        f(&mut self.transport, session, &self.config)
    }

    pub(crate) const fn set_application(&mut self, aid: [u8; 3]) {
        self.application = aid;
    }

    /// Forget the session and any pending handshake
    pub(crate) fn end_session(&mut self) {
        self.pending = None;
        if let Some(mut session) = self.session.take() {
            session.invalidate();
            debug!("Session closed");
        }
    }
}

/// Whether a failed handshake step may have reset the card's authentication state
fn handshake_reached_card(err: &Error) -> bool {
    match err {
        Error::UnsupportedMode(_) | Error::SessionInvalidated => false,
        Error::Transport(err) => err.may_have_reached_card(),
        _ => true,
    }
}

impl<T: CardTransport> fmt::Debug for Desfire<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Desfire")
            .field("transport", &self.transport)
            .field("state", &self.state())
            .field("application", &hex::encode(self.application))
            .finish_non_exhaustive()
    }
}
