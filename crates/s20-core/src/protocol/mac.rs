//! Hardware address type shared by the control protocol and pairing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::ORVIBO_OUI;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacParseError {
    #[error("Expected 6 octets, got {0}")]
    WrongLength(usize),
    #[error("Invalid octet '{0}'")]
    InvalidOctet(String),
}

/// 6-byte MAC address. Also used for BSSIDs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const SIZE: usize = 6;
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Build from the first six bytes of `data`.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let octets: [u8; 6] = data.get(..Self::SIZE)?.try_into().ok()?;
        Some(Self(octets))
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Byte-reversed copy, as carried in subscription payloads.
    pub fn reversed(&self) -> Self {
        let mut octets = self.0;
        octets.reverse();
        Self(octets)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }

    /// Whether the address carries Orvibo's OUI.
    pub fn is_orvibo(&self) -> bool {
        self.0[..3] == ORVIBO_OUI
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({self})")
    }
}

impl FromStr for MacAddr {
    type Err = MacParseError;

    /// Accepts `AA:BB:CC:DD:EE:FF`, `AA-BB-CC-DD-EE-FF` or bare `AABBCCDDEEFF`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parts: Vec<&str> = if s.contains([':', '-']) {
            s.split([':', '-']).collect()
        } else if s.len() == 12 && s.is_ascii() {
            (0..6).map(|i| &s[i * 2..i * 2 + 2]).collect()
        } else {
            vec![s]
        };

        if parts.len() != Self::SIZE {
            return Err(MacParseError::WrongLength(parts.len()));
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(MacParseError::InvalidOctet(part.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| MacParseError::InvalidOctet(part.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = MacParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats() {
        let expected = MacAddr::new([0xAC, 0xCF, 0x23, 0x12, 0x34, 0x56]);
        assert_eq!("AC:CF:23:12:34:56".parse::<MacAddr>().unwrap(), expected);
        assert_eq!("ac-cf-23-12-34-56".parse::<MacAddr>().unwrap(), expected);
        assert_eq!("ACCF23123456".parse::<MacAddr>().unwrap(), expected);
        assert!(expected.is_orvibo());
        assert_eq!(expected.to_string(), "AC:CF:23:12:34:56");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(
            "AC:CF:23".parse::<MacAddr>(),
            Err(MacParseError::WrongLength(3))
        );
        assert!("AC:CF:23:12:34:ZZ".parse::<MacAddr>().is_err());
        assert!("AC:CF:23:12:34:567".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_reversed() {
        let mac = MacAddr::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(
            mac.reversed().octets(),
            [0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]
        );
    }
}
