//! Protocol constants for the Orvibo S20 outlet family.
//!
//! Derived from captures of the S20 "hd" UDP protocol and the HF-LPB100
//! WiFi module's AT command set.

// ============================================================================
// Binary Control Protocol (port 10000)
// ============================================================================

/// UDP port the outlets listen and answer on.
pub const DEVICE_UDP_PORT: u16 = 10000;

/// Frame magic, "hd".
pub const FRAME_MAGIC: [u8; 2] = [0x68, 0x64];

/// magic(2) + length(2) + command(2) + mac(6) + padding(6)
pub const HEADER_SIZE: usize = 18;

/// Filler following the MAC field, also used after the reversed MAC in
/// subscription payloads.
pub const MAC_PADDING: [u8; 6] = [0x20; 6];

/// Organisationally unique identifier used by Orvibo hardware.
pub const ORVIBO_OUI: [u8; 3] = [0xAC, 0xCF, 0x23];

/// Largest datagram read per poll; anything longer is truncated and then
/// fails the length check.
pub const RX_BUFFER_SIZE: usize = 64;

// ============================================================================
// Command Codes
// ============================================================================

/// Subscribe ("cl")
pub const CMD_SUBSCRIBE: u16 = 0x636C;

/// Set relay state ("dc")
pub const CMD_SET_STATE: u16 = 0x6463;

/// Discovery ("qa")
pub const CMD_DISCOVER: u16 = 0x7161;

/// State change notification ("sf")
pub const CMD_STATE_CHANGE: u16 = 0x7366;

/// Payload length of set-state and state-change frames.
pub const STATE_PAYLOAD_LEN: usize = 5;

// ============================================================================
// Engine Timing
// ============================================================================

pub const SUBSCRIBE_INTERVAL_MS: u32 = 60 * 1000;
pub const CONNECTION_TIMEOUT_MS: u32 = 150 * 1000;
pub const CHECK_INTERVAL_MS: u32 = 10 * 1000;

/// Number of distinct MACs reported through `on_found_device`.
pub const KNOWN_MAC_CAPACITY: usize = 10;

/// Device names are clipped to this many characters.
pub const MAX_NAME_LEN: usize = 31;

// ============================================================================
// WiFi Pairing (HF-LPB100 assist protocol, port 48899)
// ============================================================================

pub const PAIR_UDP_PORT: u16 = 48899;

/// SSID broadcast by an outlet waiting to be configured.
pub const UNCONFIGURED_SSID: &str = "WiWo-S20";

pub const GLOBAL_TIMEOUT_MS: u32 = 60 * 1000;
pub const CONNECT_TIMEOUT_MS: u32 = 10 * 1000;
pub const COMMAND_TIMEOUT_MS: u32 = 3 * 1000;
pub const MAX_RETRANSMITS: u8 = 2;

pub const ASSIST_HANDSHAKE: &str = "HF-A11ASSISTHREAD";
pub const RESPONSE_OK: &str = "+OK";
pub const RESPONSE_ERR: &str = "+ERR";
/// The module answers the handshake with "<ip>,<mac>,HF-LPB100".
pub const GREETING_SUFFIX: &str = "HF-LPB100";
/// Reply expected after the greeting.
pub const GREETING_ACK: &str = "+ok";

/// Longest SSID accepted by 802.11.
pub const MAX_SSID_LEN: usize = 32;
/// WPA2 passphrases are 8..=63 printable characters.
pub const MIN_PASSPHRASE_LEN: usize = 8;
pub const MAX_PASSPHRASE_LEN: usize = 63;
