//! Configuration options for a DESFire card handle

use crate::constants::CAPABILITIES_LENGTH;

/// Default size above which outgoing frames are chained with `0xAF`
pub const DEFAULT_MAX_FRAME_LEN: usize = 60;
/// Default bound on the number of response frames drained for one command
pub const DEFAULT_MAX_RESPONSE_FRAMES: usize = 64;

/// Configuration options for [`Desfire`](crate::Desfire)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesfireConfig {
    /// Largest frame sent in one transport call; longer frames are chained
    pub max_frame_len: usize,

    /// Maximum number of response frames accepted for one command
    pub max_response_frames: usize,

    /// PCDcap2 bytes sent in AuthenticateEV2First, none by default
    pub pcd_capabilities: Option<[u8; CAPABILITIES_LENGTH]>,
}

impl Default for DesfireConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            max_response_frames: DEFAULT_MAX_RESPONSE_FRAMES,
            pcd_capabilities: None,
        }
    }
}

impl DesfireConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the outgoing chaining threshold
    ///
    /// Values below 2 are raised to 2 so every continuation frame carries data.
    pub const fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = if max_frame_len < 2 { 2 } else { max_frame_len };
        self
    }

    /// Set the continuation limit
    pub const fn with_max_response_frames(mut self, max_response_frames: usize) -> Self {
        self.max_response_frames = max_response_frames;
        self
    }

    /// Set the PCDcap2 capability bytes
    pub const fn with_pcd_capabilities(mut self, capabilities: [u8; CAPABILITIES_LENGTH]) -> Self {
        self.pcd_capabilities = Some(capabilities);
        self
    }

    /// Capability bytes as sent on the wire
    pub fn pcd_capabilities_bytes(&self) -> &[u8] {
        self.pcd_capabilities.as_ref().map_or(&[], |caps| caps.as_slice())
    }
}
