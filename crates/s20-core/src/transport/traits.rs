//! Network collaborator abstractions.
//!
//! Defines the datagram socket and WiFi control traits the engine and the
//! pairing machine are written against, allowing:
//! - Host implementations (`std::net` UDP, NetworkManager)
//! - Mock implementations for unit testing

use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;

use crate::protocol::MacAddr;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Send to {addr} failed: {message}")]
    Send { addr: SocketAddr, message: String },

    #[error("Receive failed: {0}")]
    Receive(String),
}

#[derive(Error, Debug)]
pub enum WifiError {
    #[error("WiFi command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Non-blocking UDP endpoint bound to a fixed port. Dropping it closes it.
pub trait DatagramSocket {
    /// Queue one datagram; never waits.
    fn send_to(&self, addr: SocketAddr, data: &[u8]) -> Result<usize, TransportError>;

    /// Copy the next pending datagram into `buf`, or `Ok(None)` when nothing
    /// is waiting. Longer datagrams are truncated to `buf.len()`.
    fn try_recv(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, TransportError>;
}

/// One network seen by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub ssid: String,
    pub bssid: MacAddr,
}

/// Outcome of polling an asynchronous scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    InProgress,
    /// Networks in the order the scanner listed them.
    Complete(Vec<ScanEntry>),
}

/// Asynchronous network scan.
pub trait WifiScanner {
    /// Begin a scan and return immediately.
    fn start_scan(&mut self) -> Result<(), WifiError>;

    fn poll_scan(&mut self) -> Result<ScanStatus, WifiError>;
}

/// Station-mode association control.
pub trait WifiStation {
    /// Start joining `ssid`; completion is observed through `is_associated`.
    fn associate(&mut self, ssid: &str, passphrase: Option<&str>) -> Result<(), WifiError>;

    fn is_associated(&mut self) -> bool;

    fn disassociate(&mut self) -> Result<(), WifiError>;

    /// BSSID of the access point currently joined. Known once
    /// `is_associated` has reported true; never waits.
    fn current_bssid(&self) -> Option<MacAddr>;

    /// Directed broadcast of the joined subnet (local address | !netmask).
    /// Known once `is_associated` has reported true; never waits.
    fn broadcast_address(&self) -> Option<Ipv4Addr>;
}
