//! Pairing session - binds the state machine to real collaborators.

use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::machine::{Action, PairMachine, PairState, TickInput};
use crate::clock::Clock;
use crate::config::PairingConfig;
use crate::events::{PairObserver, TracingObserver};
use crate::protocol::{
    GREETING_ACK, MAX_PASSPHRASE_LEN, MAX_SSID_LEN, MIN_PASSPHRASE_LEN, RX_BUFFER_SIZE, Response,
};
use crate::transport::{DatagramSocket, ScanEntry, ScanStatus, WifiScanner, WifiStation};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PairError {
    #[error("SSID must be 1 to 32 bytes, got {0}")]
    InvalidSsid(usize),
    #[error("Passphrase must be 8 to 63 characters, got {0}")]
    InvalidPassphrase(usize),
}

/// Network the outlet should join. No passphrase means an open network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairTarget {
    ssid: String,
    passphrase: Option<String>,
}

impl PairTarget {
    pub fn new(ssid: &str, passphrase: Option<&str>) -> Result<Self, PairError> {
        if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
            return Err(PairError::InvalidSsid(ssid.len()));
        }
        if let Some(pass) = passphrase {
            let len = pass.chars().count();
            if !(MIN_PASSPHRASE_LEN..=MAX_PASSPHRASE_LEN).contains(&len) {
                return Err(PairError::InvalidPassphrase(len));
            }
        }
        Ok(Self {
            ssid: ssid.to_string(),
            passphrase: passphrase.map(str::to_string),
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }
}

pub struct PairingSession<W, S, C, O = TracingObserver>
where
    W: WifiScanner + WifiStation,
    S: DatagramSocket,
    C: Clock,
    O: PairObserver,
{
    machine: PairMachine,
    wifi: W,
    socket: Option<S>,
    clock: C,
    observer: Rc<O>,
    target: Option<PairTarget>,
    /// Where the last reply came from; the greeting is answered there.
    last_sender: Option<SocketAddr>,
}

impl<W, S, C> PairingSession<W, S, C, TracingObserver>
where
    W: WifiScanner + WifiStation,
    S: DatagramSocket,
    C: Clock,
{
    pub fn new(config: PairingConfig, wifi: W, clock: C) -> Self {
        Self::with_observer(config, wifi, clock, Rc::new(TracingObserver))
    }
}

impl<W, S, C, O> PairingSession<W, S, C, O>
where
    W: WifiScanner + WifiStation,
    S: DatagramSocket,
    C: Clock,
    O: PairObserver,
{
    pub fn with_observer(config: PairingConfig, wifi: W, clock: C, observer: Rc<O>) -> Self {
        Self {
            machine: PairMachine::new(config),
            wifi,
            socket: None,
            clock,
            observer,
            target: None,
            last_sender: None,
        }
    }

    pub fn state(&self) -> PairState {
        self.machine.state()
    }

    pub fn is_active(&self) -> bool {
        self.machine.is_active()
    }

    /// Start pairing an outlet onto `ssid`. `socket` should be bound to the
    /// pairing port; it is dropped when the session stops. A session already
    /// in progress is replaced.
    pub fn start(
        &mut self,
        ssid: &str,
        passphrase: Option<&str>,
        socket: S,
    ) -> Result<(), PairError> {
        let target = PairTarget::new(ssid, passphrase)?;
        info!(ssid = %target.ssid, open = target.passphrase.is_none(), "Pairing started");
        self.target = Some(target);
        self.socket = Some(socket);
        self.last_sender = None;

        let actions = self.machine.start(self.clock.now_ms());
        self.perform(actions);
        Ok(())
    }

    pub fn stop(&mut self) {
        let actions = self.machine.stop(self.clock.now_ms());
        self.perform(actions);
    }

    /// Run one cooperative tick. No-op while stopped.
    pub fn tick(&mut self) {
        if !self.machine.is_active() {
            return;
        }
        let now = self.clock.now_ms();
        let state = self.machine.state();

        let response = self.receive();
        let scan = if state == PairState::Scan {
            self.poll_scan()
        } else {
            None
        };
        let associated = state == PairState::Connect && self.wifi.is_associated();

        let input = TickInput {
            response,
            scan,
            associated,
        };
        let actions = self.machine.tick(input, now);
        self.perform(actions);
    }

    fn receive(&mut self) -> Response {
        let Some(socket) = self.socket.as_ref() else {
            return Response::None;
        };
        let mut buf = [0u8; RX_BUFFER_SIZE];
        match socket.try_recv(&mut buf) {
            Ok(Some((len, from))) => {
                self.last_sender = Some(from);
                let response = Response::classify(&buf[..len]);
                debug!(%from, %response, "Pairing reply");
                response
            }
            Ok(None) => Response::None,
            Err(e) => {
                warn!(error = %e, "Receive failed");
                Response::None
            }
        }
    }

    fn poll_scan(&mut self) -> Option<Vec<ScanEntry>> {
        match self.wifi.poll_scan() {
            Ok(ScanStatus::InProgress) => None,
            Ok(ScanStatus::Complete(entries)) => Some(entries),
            Err(e) => {
                // Treated as an empty result, which triggers a rescan.
                warn!(error = %e, "Scan failed");
                Some(Vec::new())
            }
        }
    }

    fn broadcast(&self) -> SocketAddr {
        let ip = self
            .wifi
            .broadcast_address()
            .unwrap_or(Ipv4Addr::BROADCAST);
        SocketAddr::from((ip, self.machine.config().port))
    }

    fn send(&mut self, to: SocketAddr, text: &str) {
        let Some(socket) = self.socket.as_ref() else {
            warn!("Pairing socket already closed");
            return;
        };
        if let Err(e) = socket.send_to(to, text.as_bytes()) {
            warn!(%to, error = %e, "Pairing send failed");
        }
    }

    fn perform(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Disassociate => {
                    if let Err(e) = self.wifi.disassociate() {
                        warn!(error = %e, "Disassociate failed");
                    }
                }
                Action::StartScan => {
                    if let Err(e) = self.wifi.start_scan() {
                        warn!(error = %e, "Scan start failed");
                    }
                }
                Action::Associate => {
                    let ssid = self.machine.config().device_ssid.clone();
                    if let Err(e) = self.wifi.associate(&ssid, None) {
                        warn!(%ssid, error = %e, "Association start failed");
                    }
                }
                Action::Send(command) => {
                    let Some(target) = self.target.as_ref() else {
                        continue;
                    };
                    let text = command.render(target.ssid(), target.passphrase());
                    let bssid = self.wifi.current_bssid();
                    self.observer.on_sending_command(bssid, &text);
                    let to = self.broadcast();
                    self.send(to, &text);
                }
                Action::Acknowledge => {
                    let to = match self.last_sender {
                        Some(from) => from,
                        None => self.broadcast(),
                    };
                    self.send(to, GREETING_ACK);
                }
                Action::ReportFound(bssid) => self.observer.on_found_device(bssid),
                Action::ReportSuccess => {
                    let bssid = self.wifi.current_bssid();
                    self.observer.on_success(bssid);
                }
                Action::ReportStopped(reason) => self.observer.on_stopped(reason),
                Action::CloseSocket => {
                    self.socket = None;
                    self.last_sender = None;
                }
            }
        }
    }
}
