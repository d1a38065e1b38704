//! Mock network collaborators for testing.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;

use super::traits::{
    DatagramSocket, ScanEntry, ScanStatus, TransportError, WifiError, WifiScanner, WifiStation,
};
use crate::protocol::MacAddr;

#[derive(Debug, Default)]
struct SocketState {
    inbound: VecDeque<(SocketAddr, Vec<u8>)>,
    sent: Vec<(SocketAddr, Vec<u8>)>,
}

/// Mock socket. Clones share the same queues, so a test can keep a handle
/// after moving one into the engine.
#[derive(Debug, Clone, Default)]
pub struct MockSocket {
    state: Rc<RefCell<SocketState>>,
}

impl MockSocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a datagram to be returned by `try_recv`.
    pub fn queue_datagram(&self, from: SocketAddr, data: &[u8]) {
        self.state
            .borrow_mut()
            .inbound
            .push_back((from, data.to_vec()));
    }

    /// Get all captured sends.
    pub fn sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        self.state.borrow().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.state.borrow_mut().sent.clear();
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().inbound.len()
    }
}

impl DatagramSocket for MockSocket {
    fn send_to(&self, addr: SocketAddr, data: &[u8]) -> Result<usize, TransportError> {
        self.state.borrow_mut().sent.push((addr, data.to_vec()));
        Ok(data.len())
    }

    fn try_recv(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, TransportError> {
        let Some((from, data)) = self.state.borrow_mut().inbound.pop_front() else {
            return Ok(None);
        };
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(Some((n, from)))
    }
}

/// Calls observed by [`MockWifi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiCall {
    StartScan,
    Associate {
        ssid: String,
        passphrase: Option<String>,
    },
    Disassociate,
}

#[derive(Debug, Default)]
struct WifiState {
    calls: Vec<WifiCall>,
    scan: Option<ScanStatus>,
    associated: bool,
    /// Association completes as soon as it is requested.
    auto_associate: bool,
    bssid: Option<MacAddr>,
    broadcast: Option<Ipv4Addr>,
}

/// Mock scanner + station. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockWifi {
    state: Rc<RefCell<WifiState>>,
}

impl MockWifi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result handed out by the next `poll_scan`; `None` keeps the scan
    /// in progress.
    pub fn set_scan_result(&self, entries: Option<Vec<ScanEntry>>) {
        self.state.borrow_mut().scan = entries.map(ScanStatus::Complete);
    }

    pub fn set_associated(&self, associated: bool) {
        self.state.borrow_mut().associated = associated;
    }

    pub fn set_auto_associate(&self, enabled: bool) {
        self.state.borrow_mut().auto_associate = enabled;
    }

    pub fn set_bssid(&self, bssid: Option<MacAddr>) {
        self.state.borrow_mut().bssid = bssid;
    }

    pub fn set_broadcast(&self, addr: Option<Ipv4Addr>) {
        self.state.borrow_mut().broadcast = addr;
    }

    pub fn calls(&self) -> Vec<WifiCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }
}

impl WifiScanner for MockWifi {
    fn start_scan(&mut self) -> Result<(), WifiError> {
        self.state.borrow_mut().calls.push(WifiCall::StartScan);
        Ok(())
    }

    fn poll_scan(&mut self) -> Result<ScanStatus, WifiError> {
        Ok(self
            .state
            .borrow_mut()
            .scan
            .take()
            .unwrap_or(ScanStatus::InProgress))
    }
}

impl WifiStation for MockWifi {
    fn associate(&mut self, ssid: &str, passphrase: Option<&str>) -> Result<(), WifiError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(WifiCall::Associate {
            ssid: ssid.to_string(),
            passphrase: passphrase.map(str::to_string),
        });
        if state.auto_associate {
            state.associated = true;
        }
        Ok(())
    }

    fn is_associated(&mut self) -> bool {
        self.state.borrow().associated
    }

    fn disassociate(&mut self) -> Result<(), WifiError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(WifiCall::Disassociate);
        state.associated = false;
        Ok(())
    }

    fn current_bssid(&self) -> Option<MacAddr> {
        let state = self.state.borrow();
        if state.associated { state.bssid } else { None }
    }

    fn broadcast_address(&self) -> Option<Ipv4Addr> {
        self.state.borrow().broadcast
    }
}
