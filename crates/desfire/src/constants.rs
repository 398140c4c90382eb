//! Protocol constants for the DESFire native command set and EV2 secure messaging

/// Native command codes
pub mod cmd {
    /// AuthenticateEV2First
    pub const AUTHENTICATE_EV2_FIRST: u8 = 0x71;
    /// AuthenticateEV2NonFirst
    pub const AUTHENTICATE_EV2_NON_FIRST: u8 = 0x77;
    /// AuthenticateISO (legacy 3DES)
    pub const AUTHENTICATE_ISO: u8 = 0x1A;
    /// Second handshake pass and continuation of any chained frame
    pub const ADDITIONAL_FRAME: u8 = 0xAF;
    /// ChangeKey
    pub const CHANGE_KEY: u8 = 0xC4;
    /// ChangeKeyEV2
    pub const CHANGE_KEY_EV2: u8 = 0xC6;
    /// CommitTransaction
    pub const COMMIT_TRANSACTION: u8 = 0xC7;
    /// ReadData
    pub const READ_DATA: u8 = 0xAD;
    /// WriteData
    pub const WRITE_DATA: u8 = 0x8D;
    /// SelectApplication
    pub const SELECT_APPLICATION: u8 = 0x5A;
    /// GetApplicationIDs
    pub const GET_APPLICATION_IDS: u8 = 0x6A;
    /// GetVersion
    pub const GET_VERSION: u8 = 0x60;
    /// GetCardUID
    pub const GET_CARD_UID: u8 = 0x51;
    /// GetKeySettings
    pub const GET_KEY_SETTINGS: u8 = 0x45;
    /// ChangeKeySettings
    pub const CHANGE_KEY_SETTINGS: u8 = 0x54;
    /// GetKeyVersion
    pub const GET_KEY_VERSION: u8 = 0x64;
    /// FormatPICC
    pub const FORMAT_PICC: u8 = 0xFC;
    /// SetConfiguration
    pub const SET_CONFIGURATION: u8 = 0x5C;
}

/// Native status codes (first byte of every response frame)
pub mod status {
    /// Successful operation
    pub const OPERATION_OK: u8 = 0x00;
    /// No changes done to backup files
    pub const NO_CHANGES: u8 = 0x0C;
    /// Insufficient NV memory
    pub const OUT_OF_EEPROM: u8 = 0x0E;
    /// Command code not supported
    pub const ILLEGAL_COMMAND: u8 = 0x1C;
    /// CRC or MAC does not match, or invalid padding
    pub const INTEGRITY_ERROR: u8 = 0x1E;
    /// Invalid key number
    pub const NO_SUCH_KEY: u8 = 0x40;
    /// Length of command string invalid
    pub const LENGTH_ERROR: u8 = 0x7E;
    /// Current configuration or status does not allow the command
    pub const PERMISSION_DENIED: u8 = 0x9D;
    /// Value of a parameter is invalid
    pub const PARAMETER_ERROR: u8 = 0x9E;
    /// Requested application not present
    pub const APPLICATION_NOT_FOUND: u8 = 0xA0;
    /// Unrecoverable error within the application
    pub const APPLICATION_INTEGRITY_ERROR: u8 = 0xA1;
    /// Current authentication status does not allow the command
    pub const AUTHENTICATION_ERROR: u8 = 0xAE;
    /// Additional data frame is expected to be sent
    pub const ADDITIONAL_FRAME: u8 = 0xAF;
    /// Attempt to read or write beyond the file limits
    pub const BOUNDARY_ERROR: u8 = 0xBE;
    /// Unrecoverable error within the PICC
    pub const PICC_INTEGRITY_ERROR: u8 = 0xC1;
    /// Previous command was not fully completed
    pub const COMMAND_ABORTED: u8 = 0xCA;
    /// PICC was disabled by an unrecoverable error
    pub const PICC_DISABLED: u8 = 0xCD;
    /// Number of applications limited to 28
    pub const COUNT_ERROR: u8 = 0xCE;
    /// Application or file with that identifier already exists
    pub const DUPLICATE_ERROR: u8 = 0xDE;
    /// Could not complete NV-write operation
    pub const EEPROM_ERROR: u8 = 0xEE;
    /// Specified file number does not exist
    pub const FILE_NOT_FOUND: u8 = 0xF0;
    /// Unrecoverable error within the file
    pub const FILE_INTEGRITY_ERROR: u8 = 0xF1;
}

/// Session vector label for the encryption key (SV1)
pub const SV1_LABEL: [u8; 2] = [0xA5, 0x5A];
/// Session vector label for the MAC key (SV2)
pub const SV2_LABEL: [u8; 2] = [0x5A, 0xA5];
/// Fixed counter/length bytes following the session vector label
pub const SV_FIXED: [u8; 4] = [0x00, 0x01, 0x00, 0x80];

/// IV label for command encryption
pub const COMMAND_IV_LABEL: [u8; 2] = [0xA5, 0x5A];
/// IV label for response decryption
pub const RESPONSE_IV_LABEL: [u8; 2] = [0x5A, 0xA5];

/// AES block size
pub const AES_BLOCK_SIZE: usize = 16;
/// DES/3DES block size
pub const DES_BLOCK_SIZE: usize = 8;
/// Length of the truncated CMAC appended to secured frames
pub const MAC_LENGTH: usize = 8;
/// Length of the EV2 handshake nonces
pub const EV2_NONCE_LENGTH: usize = 16;
/// Length of the transaction identifier
pub const TI_LENGTH: usize = 4;
/// Length of PCDcap2/PDcap2 capability fields
pub const CAPABILITIES_LENGTH: usize = 6;
/// Length of the AuthenticateEV2First final answer: TI, RndA', PDcap2, PCDcap2
pub const EV2_FIRST_ANSWER_LENGTH: usize = TI_LENGTH + EV2_NONCE_LENGTH + 2 * CAPABILITIES_LENGTH;
/// Highest key number addressable inside an application
pub const MAX_KEY_NUMBER: u8 = 0x0D;

/// Application identifier of the PICC level
pub const PICC_AID: [u8; 3] = [0x00, 0x00, 0x00];
