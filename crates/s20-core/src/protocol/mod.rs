//! Protocol module - S20 wire formats.

pub mod constants;
pub mod header;
pub mod mac;
pub mod response;

pub use constants::*;
pub use header::{Command, Frame, FrameError, decode, encode};
pub use mac::{MacAddr, MacParseError};
pub use response::Response;
