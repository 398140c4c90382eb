//! Error types specific to card transport

use thiserror::Error;

/// Transport error type
#[derive(Debug, Error)]
pub enum TransportError {
    /// No card connection; nothing was sent
    #[error("Failed to connect to device")]
    Connection,

    /// Transmission error
    #[error("Failed to transmit data")]
    Transmission,

    /// Device error
    #[error("Device error")]
    Device,

    /// Buffer too small
    #[error("Buffer too small")]
    BufferTooSmall,

    /// Driver error (with code)
    #[error("Driver error code: {0}")]
    Driver(i32),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a new driver error
    pub const fn driver(code: i32) -> Self {
        Self::Driver(code)
    }

    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }

    /// Whether the command may have reached the card before the failure
    ///
    /// Only a missing connection guarantees that nothing left the reader.
    pub const fn may_have_reached_card(&self) -> bool {
        !matches!(self, Self::Connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_may_have_reached_card() {
        assert!(!TransportError::Connection.may_have_reached_card());
        assert!(TransportError::Transmission.may_have_reached_card());
        assert!(TransportError::Timeout.may_have_reached_card());
        assert!(TransportError::driver(-3).may_have_reached_card());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            TransportError::driver(0x10).to_string(),
            "Driver error code: 16"
        );
        assert_eq!(TransportError::other("reader gone").to_string(), "reader gone");
    }
}
