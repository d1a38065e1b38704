//! Frame layout for the S20 control protocol.
//!
//! ```text
//! | magic "hd" | length (BE) | command (BE) | mac (6) | padding (6) | payload |
//! |     2      |      2      |      2       |    6    |      6      |   ...   |
//! ```

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use std::fmt;
use std::io::Cursor;
use thiserror::Error;

use super::constants::*;
use super::mac::MacAddr;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Frame too short: expected at least {expected}, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("Invalid magic: expected {expected:02X?}, got {actual:02X?}")]
    BadMagic { expected: [u8; 2], actual: [u8; 2] },
    #[error("Length mismatch: header declares {declared}, received {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("Payload of {0} bytes does not fit a frame")]
    PayloadTooLarge(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Command code carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Subscribe,
    SetState,
    Discover,
    StateChange,
    /// Anything else the outlet sends; only refreshes liveness.
    Other(u16),
}

impl Command {
    pub const fn code(self) -> u16 {
        match self {
            Command::Subscribe => CMD_SUBSCRIBE,
            Command::SetState => CMD_SET_STATE,
            Command::Discover => CMD_DISCOVER,
            Command::StateChange => CMD_STATE_CHANGE,
            Command::Other(code) => code,
        }
    }
}

impl From<u16> for Command {
    fn from(code: u16) -> Self {
        match code {
            CMD_SUBSCRIBE => Command::Subscribe,
            CMD_SET_STATE => Command::SetState,
            CMD_DISCOVER => Command::Discover,
            CMD_STATE_CHANGE => Command::StateChange,
            other => Command::Other(other),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Subscribe => write!(f, "SUBSCRIBE"),
            Command::SetState => write!(f, "SET_STATE"),
            Command::Discover => write!(f, "DISCOVER"),
            Command::StateChange => write!(f, "STATE_CHANGE"),
            Command::Other(code) => write!(f, "0x{code:04X}"),
        }
    }
}

/// A decoded (or to-be-encoded) protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Sender MAC for received frames, target MAC for sent ones.
    pub mac: MacAddr,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(command: Command, mac: MacAddr, payload: Vec<u8>) -> Self {
        Self {
            command,
            mac,
            payload,
        }
    }

    /// Subscription request. The payload repeats the MAC byte-reversed,
    /// while the header MAC stays in wire order.
    pub fn subscribe(mac: MacAddr) -> Self {
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(mac.reversed().as_bytes());
        payload.extend_from_slice(&MAC_PADDING);
        Self::new(Command::Subscribe, mac, payload)
    }

    /// Relay command, `00 00 00 00 <state>`.
    pub fn set_state(mac: MacAddr, on: bool) -> Self {
        let mut payload = vec![0u8; STATE_PAYLOAD_LEN];
        payload[STATE_PAYLOAD_LEN - 1] = u8::from(on);
        Self::new(Command::SetState, mac, payload)
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        encode(self.command, self.mac, &self.payload)
    }

    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        decode(data)
    }
}

/// Serialize a frame: magic, BE total length, BE command, MAC as given,
/// padding, payload.
pub fn encode(command: Command, mac: MacAddr, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let total = HEADER_SIZE + payload.len();
    let declared =
        u16::try_from(total).map_err(|_| FrameError::PayloadTooLarge(payload.len()))?;

    let mut buf = vec![0u8; HEADER_SIZE];
    buf[0..2].copy_from_slice(&FRAME_MAGIC);
    BigEndian::write_u16(&mut buf[2..4], declared);
    BigEndian::write_u16(&mut buf[4..6], command.code());
    buf[6..12].copy_from_slice(mac.as_bytes());
    buf[12..18].copy_from_slice(&MAC_PADDING);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Parse and validate a received datagram.
///
/// Discovery frames from S20 firmware carry the MAC one byte late, pushing
/// the payload back by one as well. That offset is applied for
/// `CMD_DISCOVER` only.
pub fn decode(data: &[u8]) -> Result<Frame, FrameError> {
    if data.len() < HEADER_SIZE {
        return Err(FrameError::TooShort {
            expected: HEADER_SIZE,
            actual: data.len(),
        });
    }

    let mut cursor = Cursor::new(data);
    let mut magic = [0u8; 2];
    magic[0] = cursor.read_u8()?;
    magic[1] = cursor.read_u8()?;
    if magic != FRAME_MAGIC {
        return Err(FrameError::BadMagic {
            expected: FRAME_MAGIC,
            actual: magic,
        });
    }

    let declared = cursor.read_u16::<BigEndian>()? as usize;
    if declared != data.len() {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: data.len(),
        });
    }

    let command = Command::from(cursor.read_u16::<BigEndian>()?);

    let (mac_offset, payload_offset) = match command {
        Command::Discover => (7, HEADER_SIZE + 1),
        _ => (6, HEADER_SIZE),
    };
    if data.len() < payload_offset {
        return Err(FrameError::TooShort {
            expected: payload_offset,
            actual: data.len(),
        });
    }

    let mac = MacAddr::from_slice(&data[mac_offset..]).ok_or(FrameError::TooShort {
        expected: mac_offset + MacAddr::SIZE,
        actual: data.len(),
    })?;

    Ok(Frame {
        command,
        mac,
        payload: data[payload_offset..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: MacAddr = MacAddr::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    fn raw(command: u16, mac: [u8; 6], payload: &[u8]) -> Vec<u8> {
        let mut buf = FRAME_MAGIC.to_vec();
        buf.extend_from_slice(&((HEADER_SIZE + payload.len()) as u16).to_be_bytes());
        buf.extend_from_slice(&command.to_be_bytes());
        buf.extend_from_slice(&mac);
        buf.extend_from_slice(&MAC_PADDING);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_subscribe_reverses_payload_mac_only() {
        let bytes = Frame::subscribe(MAC).encode().unwrap();
        assert_eq!(bytes.len(), 30);
        assert_eq!(&bytes[0..2], b"hd");
        assert_eq!(&bytes[2..4], &[0x00, 0x1E]);
        assert_eq!(&bytes[4..6], b"cl");
        assert_eq!(&bytes[6..12], &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(&bytes[12..18], &[0x20; 6]);
        assert_eq!(&bytes[18..24], &[0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(&bytes[24..30], &[0x20; 6]);
    }

    #[test]
    fn test_set_state_payload() {
        let bytes = Frame::set_state(MAC, true).encode().unwrap();
        assert_eq!(&bytes[2..4], &[0x00, 0x17]);
        assert_eq!(&bytes[4..6], b"dc");
        assert_eq!(&bytes[18..], &[0, 0, 0, 0, 1]);

        let off = Frame::set_state(MAC, false).encode().unwrap();
        assert_eq!(off[22], 0);
    }

    #[test]
    fn test_decode_state_change() {
        let bytes = raw(CMD_STATE_CHANGE, MAC.octets(), &[0, 0, 0, 0, 1]);
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.command, Command::StateChange);
        assert_eq!(frame.mac, MAC);
        assert_eq!(frame.payload, vec![0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_decode_rejects_short_frames() {
        for len in 0..HEADER_SIZE {
            let mut bytes = raw(CMD_STATE_CHANGE, MAC.octets(), &[]);
            bytes.truncate(len);
            assert!(matches!(decode(&bytes), Err(FrameError::TooShort { .. })));
        }
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut bytes = raw(CMD_STATE_CHANGE, MAC.octets(), &[0, 0, 0, 0, 1]);
        bytes[1] = 0x65;
        assert!(matches!(decode(&bytes), Err(FrameError::BadMagic { .. })));
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let mut bytes = raw(CMD_STATE_CHANGE, MAC.octets(), &[0, 0, 0, 0, 1]);
        bytes.push(0);
        assert!(matches!(
            decode(&bytes),
            Err(FrameError::LengthMismatch {
                declared: 23,
                actual: 24
            })
        ));
    }

    #[test]
    fn test_unknown_command_is_preserved() {
        let bytes = raw(0x1234, MAC.octets(), &[9]);
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.command, Command::Other(0x1234));
        assert_eq!(frame.command.code(), 0x1234);
    }

    // Firmware quirk: discovery replies shift MAC and payload by one byte.
    #[test]
    fn test_discover_offset_quirk() {
        let mut bytes = FRAME_MAGIC.to_vec();
        bytes.extend_from_slice(&[0x00, 0x16]);
        bytes.extend_from_slice(&CMD_DISCOVER.to_be_bytes());
        bytes.push(0x00);
        bytes.extend_from_slice(&MAC.octets());
        bytes.extend_from_slice(&[0x20; 6]);
        bytes.extend_from_slice(&[0x01, 0x02, 0x03]);
        assert_eq!(bytes.len(), 0x16);

        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.command, Command::Discover);
        assert_eq!(frame.mac, MAC);
        assert_eq!(frame.payload, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_quirk_not_applied_to_other_commands() {
        let bytes = raw(CMD_SUBSCRIBE, MAC.octets(), &[0x01, 0x02]);
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.mac, MAC);
        assert_eq!(frame.payload, vec![0x01, 0x02]);
    }

    #[test]
    fn test_discover_without_shift_byte_is_invalid() {
        let bytes = raw(CMD_DISCOVER, MAC.octets(), &[]);
        assert!(matches!(decode(&bytes), Err(FrameError::TooShort { .. })));
    }

    #[test]
    fn test_oversized_payload() {
        let payload = vec![0u8; u16::MAX as usize];
        assert!(matches!(
            encode(Command::SetState, MAC, &payload),
            Err(FrameError::PayloadTooLarge(_))
        ));
    }
}
