use std::fmt;

use desfire_apdu_core::TransportError;

use crate::constants::status;

/// Result type for DESFire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for DESFire operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The card rejected the command with a native status code
    #[error("Card returned error status: {0}")]
    Protocol(CardStatus),

    /// Response MAC does not match; the session is no longer trusted
    #[error("Response MAC verification failed")]
    MacVerification,

    /// Malformed input or frame
    #[error("Invalid format: {0}")]
    Format(&'static str),

    /// Wrong data length
    #[error("Invalid length for {what}: expected {expected}, got {actual}")]
    InvalidLength {
        /// What was measured
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Mutual authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(&'static str),

    /// A secured command was requested without an authenticated session
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The session was invalidated and must be re-established
    #[error("Session invalidated, re-authentication required")]
    SessionInvalidated,

    /// Command counter would wrap
    #[error("Command counter exhausted, re-authentication required")]
    CounterExhausted,

    /// Too many continuation frames
    #[error("Chain limit of {0} frames exceeded")]
    ChainLimitExceeded(usize),

    /// Operation is not available in the negotiated secure messaging mode
    #[error("Unsupported in current mode: {0}")]
    UnsupportedMode(&'static str),
}

impl Error {
    /// Create a length error
    pub const fn invalid_length(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::InvalidLength {
            what,
            expected,
            actual,
        }
    }

    /// Native status code if the card rejected the command
    pub const fn card_status(&self) -> Option<CardStatus> {
        match self {
            Self::Protocol(status) => Some(*status),
            _ => None,
        }
    }

    /// Whether host and card are still in sync after this error
    ///
    /// A card status leaves the session usable, and so does a transport failure that
    /// happened before anything was sent. Everything else means the card may have
    /// advanced its state without the host noticing.
    pub const fn leaves_session_intact(&self) -> bool {
        match self {
            Self::Protocol(_) => true,
            Self::Transport(err) => !err.may_have_reached_card(),
            _ => false,
        }
    }

    /// Whether the error was raised for bad input or a malformed frame
    pub const fn is_format(&self) -> bool {
        matches!(self, Self::Format(_) | Self::InvalidLength { .. })
    }
}

/// Native status byte returned by the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CardStatus(pub u8);

impl CardStatus {
    /// Raw status code
    pub const fn code(&self) -> u8 {
        self.0
    }

    /// Symbolic name of well-known codes
    pub const fn name(&self) -> &'static str {
        match self.0 {
            status::OPERATION_OK => "OPERATION_OK",
            status::NO_CHANGES => "NO_CHANGES",
            status::OUT_OF_EEPROM => "OUT_OF_EEPROM_ERROR",
            status::ILLEGAL_COMMAND => "ILLEGAL_COMMAND_CODE",
            status::INTEGRITY_ERROR => "INTEGRITY_ERROR",
            status::NO_SUCH_KEY => "NO_SUCH_KEY",
            status::LENGTH_ERROR => "LENGTH_ERROR",
            status::PERMISSION_DENIED => "PERMISSION_DENIED",
            status::PARAMETER_ERROR => "PARAMETER_ERROR",
            status::APPLICATION_NOT_FOUND => "APPLICATION_NOT_FOUND",
            status::APPLICATION_INTEGRITY_ERROR => "APPL_INTEGRITY_ERROR",
            status::AUTHENTICATION_ERROR => "AUTHENTICATION_ERROR",
            status::ADDITIONAL_FRAME => "ADDITIONAL_FRAME",
            status::BOUNDARY_ERROR => "BOUNDARY_ERROR",
            status::PICC_INTEGRITY_ERROR => "PICC_INTEGRITY_ERROR",
            status::COMMAND_ABORTED => "COMMAND_ABORTED",
            status::PICC_DISABLED => "PICC_DISABLED_ERROR",
            status::COUNT_ERROR => "COUNT_ERROR",
            status::DUPLICATE_ERROR => "DUPLICATE_ERROR",
            status::EEPROM_ERROR => "EEPROM_ERROR",
            status::FILE_NOT_FOUND => "FILE_NOT_FOUND",
            status::FILE_INTEGRITY_ERROR => "FILE_INTEGRITY_ERROR",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x} ({})", self.0, self.name())
    }
}
