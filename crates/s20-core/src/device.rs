//! Logical outlet entries and their connection lifecycle.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::elapsed;
use crate::events::DeviceObserver;
use crate::protocol::{Command, Frame, MAX_NAME_LEN, MacAddr, STATE_PAYLOAD_LEN};

/// Stable handle into the [`DeviceRegistry`](crate::registry::DeviceRegistry).
/// Never reused after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub(crate) u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Last relay state reported by the outlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayState {
    #[default]
    Unknown,
    Off,
    On,
}

impl RelayState {
    pub fn from_byte(b: u8) -> Self {
        if b == 0 { RelayState::Off } else { RelayState::On }
    }

    pub fn is_on(self) -> bool {
        self == RelayState::On
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayState::Unknown => write!(f, "unknown"),
            RelayState::Off => write!(f, "off"),
            RelayState::On => write!(f, "on"),
        }
    }
}

/// How an application declares an outlet: with a known MAC, or as a
/// wildcard that binds to the first unclaimed sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mac: Option<MacAddr>,
}

impl DeviceSpec {
    pub fn with_mac(mac: MacAddr, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mac: Some(mac),
        }
    }

    pub fn any(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mac: None,
        }
    }
}

/// One physical outlet.
#[derive(Debug, Clone)]
pub struct Device {
    id: DeviceId,
    name: String,
    /// `None` while a wildcard entry is unbound.
    mac: Option<MacAddr>,
    address: Option<IpAddr>,
    relay: RelayState,
    connected: bool,
    last_rx_ms: u32,
}

impl Device {
    pub(crate) fn new(id: DeviceId, spec: DeviceSpec) -> Self {
        Self {
            id,
            name: spec.name.chars().take(MAX_NAME_LEN).collect(),
            mac: spec.mac,
            address: None,
            relay: RelayState::Unknown,
            connected: false,
            last_rx_ms: 0,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound MAC, or all zeroes for an unbound wildcard.
    pub fn mac(&self) -> MacAddr {
        self.mac.unwrap_or(MacAddr::ZERO)
    }

    pub fn bound_mac(&self) -> Option<MacAddr> {
        self.mac
    }

    pub fn is_wildcard(&self) -> bool {
        self.mac.is_none()
    }

    /// Address of the last datagram received from this outlet.
    pub fn address(&self) -> Option<IpAddr> {
        self.address
    }

    pub fn relay_state(&self) -> RelayState {
        self.relay
    }

    /// `true` only when the relay is known to be on.
    pub fn is_on(&self) -> bool {
        self.relay.is_on()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn last_rx_ms(&self) -> u32 {
        self.last_rx_ms
    }

    pub(crate) fn bind(&mut self, mac: MacAddr) {
        self.mac = Some(mac);
    }

    pub(crate) fn set_address(&mut self, address: IpAddr) {
        self.address = Some(address);
    }

    /// Record a packet from the outlet and report a connect transition.
    pub fn on_packet_received<O: DeviceObserver + ?Sized>(&mut self, now: u32, observer: &O) {
        self.last_rx_ms = now;
        if !self.connected {
            self.connected = true;
            observer.on_connect(self);
        }
    }

    /// Disconnect if silent for longer than `timeout_ms`. Returns whether a
    /// transition happened.
    pub fn check_timeout<O: DeviceObserver + ?Sized>(
        &mut self,
        now: u32,
        timeout_ms: u32,
        observer: &O,
    ) -> bool {
        if self.connected && elapsed(now, self.last_rx_ms) > timeout_ms {
            debug!(
                device = %self.name,
                silent_ms = elapsed(now, self.last_rx_ms),
                "Connection timed out"
            );
            self.connected = false;
            observer.on_disconnect(self);
            return true;
        }
        false
    }

    /// Cache a reported relay state, notifying only on change.
    pub fn apply_state_change<O: DeviceObserver + ?Sized>(
        &mut self,
        state: RelayState,
        observer: &O,
    ) -> bool {
        if state == self.relay {
            return false;
        }
        self.relay = state;
        observer.on_state_change(self, state.is_on());
        true
    }

    /// Lifecycle dispatch for a frame addressed to this outlet.
    pub fn handle_frame<O: DeviceObserver + ?Sized>(
        &mut self,
        frame: &Frame,
        now: u32,
        observer: &O,
    ) {
        self.on_packet_received(now, observer);

        match frame.command {
            Command::StateChange if frame.payload.len() == STATE_PAYLOAD_LEN => {
                let state = RelayState::from_byte(frame.payload[STATE_PAYLOAD_LEN - 1]);
                self.apply_state_change(state, observer);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::{Recorded, Recorder};
    use crate::protocol::CONNECTION_TIMEOUT_MS;

    const MAC: MacAddr = MacAddr::new([0xAC, 0xCF, 0x23, 0x01, 0x02, 0x03]);

    fn device() -> Device {
        Device::new(DeviceId(0), DeviceSpec::with_mac(MAC, "lamp"))
    }

    fn state_frame(state: u8) -> Frame {
        Frame::new(Command::StateChange, MAC, vec![0, 0, 0, 0, state])
    }

    #[test]
    fn test_connect_fires_once() {
        let obs = Recorder::default();
        let mut dev = device();
        dev.on_packet_received(100, &obs);
        dev.on_packet_received(200, &obs);
        assert!(dev.is_connected());
        assert_eq!(dev.last_rx_ms(), 200);
        assert_eq!(obs.events(), vec![Recorded::Connected("lamp".into())]);
    }

    #[test]
    fn test_timeout_boundary() {
        let obs = Recorder::default();
        let mut dev = device();
        let t = 5_000;
        dev.on_packet_received(t, &obs);
        obs.clear();

        assert!(!dev.check_timeout(t + CONNECTION_TIMEOUT_MS, CONNECTION_TIMEOUT_MS, &obs));
        assert!(dev.is_connected());

        assert!(dev.check_timeout(t + CONNECTION_TIMEOUT_MS + 1, CONNECTION_TIMEOUT_MS, &obs));
        assert!(!dev.is_connected());

        assert!(!dev.check_timeout(t + 10 * CONNECTION_TIMEOUT_MS, CONNECTION_TIMEOUT_MS, &obs));
        assert_eq!(obs.events(), vec![Recorded::Disconnected("lamp".into())]);
    }

    #[test]
    fn test_timeout_across_clock_wrap() {
        let obs = Recorder::default();
        let mut dev = device();
        dev.on_packet_received(u32::MAX - 10, &obs);
        assert!(!dev.check_timeout(1_000, CONNECTION_TIMEOUT_MS, &obs));
        assert!(dev.is_connected());
    }

    #[test]
    fn test_repeated_state_is_deduplicated() {
        let obs = Recorder::default();
        let mut dev = device();
        dev.handle_frame(&state_frame(1), 10, &obs);
        dev.handle_frame(&state_frame(1), 20, &obs);
        dev.handle_frame(&state_frame(0), 30, &obs);

        assert_eq!(
            obs.events(),
            vec![
                Recorded::Connected("lamp".into()),
                Recorded::StateChanged("lamp".into(), true),
                Recorded::StateChanged("lamp".into(), false),
            ]
        );
        assert_eq!(dev.relay_state(), RelayState::Off);
    }

    #[test]
    fn test_other_commands_only_refresh_liveness() {
        let obs = Recorder::default();
        let mut dev = device();
        let frame = Frame::new(Command::Other(0x7274), MAC, vec![0, 0, 0, 0, 1]);
        dev.handle_frame(&frame, 42, &obs);
        assert_eq!(dev.relay_state(), RelayState::Unknown);
        assert_eq!(dev.last_rx_ms(), 42);

        // Wrong payload length is ignored too.
        let short = Frame::new(Command::StateChange, MAC, vec![1]);
        dev.handle_frame(&short, 43, &obs);
        assert_eq!(dev.relay_state(), RelayState::Unknown);
    }

    #[test]
    fn test_name_is_clipped() {
        let dev = Device::new(DeviceId(1), DeviceSpec::any("x".repeat(40)));
        assert_eq!(dev.name().len(), MAX_NAME_LEN);
        assert!(dev.is_wildcard());
        assert!(dev.mac().is_zero());
    }
}
