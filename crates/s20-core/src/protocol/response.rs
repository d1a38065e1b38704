//! Classification of plain-text replies from the HF-LPB100 module during
//! pairing.

use std::fmt;

use super::constants::{GREETING_SUFFIX, RESPONSE_ERR, RESPONSE_OK};

/// Kind of a received pairing datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Nothing received this tick.
    None,
    /// Starts with `+ok` (any case).
    Ok,
    /// Starts with `+err` (any case).
    Error,
    /// `<ip>,<mac>,HF-LPB100`, the module's answer to the assist handshake.
    Greeting,
    /// Anything else.
    Unrecognized,
}

impl Response {
    pub fn classify(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes).to_ascii_uppercase();
        if text.starts_with(RESPONSE_OK) {
            Response::Ok
        } else if text.starts_with(RESPONSE_ERR) {
            Response::Error
        } else if text.trim_end().ends_with(GREETING_SUFFIX) {
            Response::Greeting
        } else {
            Response::Unrecognized
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::None => write!(f, "none"),
            Response::Ok => write!(f, "ok"),
            Response::Error => write!(f, "error"),
            Response::Greeting => write!(f, "greeting"),
            Response::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affirmative() {
        assert_eq!(Response::classify(b"+ok"), Response::Ok);
        assert_eq!(Response::classify(b"+OK=STA\r\n\r\n"), Response::Ok);
    }

    #[test]
    fn test_negative() {
        assert_eq!(Response::classify(b"+ERR=-2\r\n"), Response::Error);
        assert_eq!(Response::classify(b"+err"), Response::Error);
    }

    #[test]
    fn test_greeting() {
        assert_eq!(
            Response::classify(b"10.10.100.254,ACCF23123456,HF-LPB100"),
            Response::Greeting
        );
        assert_eq!(
            Response::classify(b"10.10.100.254,accf23123456,hf-lpb100\r\n"),
            Response::Greeting
        );
    }

    #[test]
    fn test_prefix_only() {
        assert_eq!(Response::classify(b"OK+"), Response::Unrecognized);
        assert_eq!(Response::classify(b" +OK"), Response::Unrecognized);
        assert_eq!(Response::classify(b""), Response::Unrecognized);
    }
}
