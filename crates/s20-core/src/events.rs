//! Observer interfaces for application decoupling.
//!
//! Every callback has a no-op default, so an observer only implements what
//! it cares about. Callbacks run synchronously inside `poll`/`tick`; the
//! engine is mutably borrowed while they run, so structural changes to the
//! registry (e.g. removing a device on disconnect) are made after `poll`
//! returns.

use crate::device::Device;
use crate::pairing::StopReason;
use crate::protocol::MacAddr;

/// Notifications from the protocol engine.
pub trait DeviceObserver {
    /// A MAC not seen before (bounded by the known-MAC cache).
    fn on_found_device(&self, _mac: MacAddr) {}

    /// The device went from disconnected to connected.
    fn on_connect(&self, _device: &Device) {}

    /// The device stayed silent past the connection timeout.
    fn on_disconnect(&self, _device: &Device) {}

    /// Relay state differs from the last one reported.
    fn on_state_change(&self, _device: &Device, _on: bool) {}
}

/// Notifications from the pairing session.
pub trait PairObserver {
    /// An unconfigured outlet's access point showed up in a scan.
    fn on_found_device(&self, _bssid: MacAddr) {}

    /// A pairing command is about to be broadcast.
    fn on_sending_command(&self, _bssid: Option<MacAddr>, _command: &str) {}

    /// Pairing finished; the outlet is rebooting onto the target network.
    fn on_success(&self, _bssid: Option<MacAddr>) {}

    /// The session stopped. Fired once per session.
    fn on_stopped(&self, _reason: StopReason) {}
}

/// No-op observer that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl DeviceObserver for NullObserver {}
impl PairObserver for NullObserver {}

/// Observer that logs events using tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DeviceObserver for TracingObserver {
    fn on_found_device(&self, mac: MacAddr) {
        tracing::info!(%mac, orvibo = mac.is_orvibo(), "New device found");
    }

    fn on_connect(&self, device: &Device) {
        tracing::info!(device = %device.name(), mac = %device.mac(), "Device connected");
    }

    fn on_disconnect(&self, device: &Device) {
        tracing::warn!(device = %device.name(), mac = %device.mac(), "Device disconnected");
    }

    fn on_state_change(&self, device: &Device, on: bool) {
        tracing::info!(
            device = %device.name(),
            state = if on { "on" } else { "off" },
            "Relay state changed"
        );
    }
}

impl PairObserver for TracingObserver {
    fn on_found_device(&self, bssid: MacAddr) {
        tracing::info!(%bssid, "Unconfigured outlet found");
    }

    fn on_sending_command(&self, bssid: Option<MacAddr>, command: &str) {
        tracing::debug!(
            bssid = ?bssid,
            command = %command.trim_end(),
            "Sending pairing command"
        );
    }

    fn on_success(&self, bssid: Option<MacAddr>) {
        tracing::info!(bssid = ?bssid, "Pairing successful");
    }

    fn on_stopped(&self, reason: StopReason) {
        match reason {
            StopReason::PairingSuccessful | StopReason::StoppedByUser => {
                tracing::info!(%reason, code = reason.code(), "Pairing stopped");
            }
            StopReason::CommandFailed | StopReason::Timeout => {
                tracing::warn!(%reason, code = reason.code(), "Pairing stopped");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Observer that records every callback.

    use std::cell::RefCell;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Recorded {
        Found(MacAddr),
        Connected(String),
        Disconnected(String),
        StateChanged(String, bool),
        PairFound(MacAddr),
        Sending(Option<MacAddr>, String),
        Success(Option<MacAddr>),
        Stopped(StopReason),
    }

    #[derive(Debug, Default)]
    pub(crate) struct Recorder {
        events: RefCell<Vec<Recorded>>,
    }

    impl Recorder {
        pub(crate) fn events(&self) -> Vec<Recorded> {
            self.events.borrow().clone()
        }

        pub(crate) fn clear(&self) {
            self.events.borrow_mut().clear();
        }

        fn push(&self, event: Recorded) {
            self.events.borrow_mut().push(event);
        }
    }

    impl DeviceObserver for Recorder {
        fn on_found_device(&self, mac: MacAddr) {
            self.push(Recorded::Found(mac));
        }

        fn on_connect(&self, device: &Device) {
            self.push(Recorded::Connected(device.name().to_string()));
        }

        fn on_disconnect(&self, device: &Device) {
            self.push(Recorded::Disconnected(device.name().to_string()));
        }

        fn on_state_change(&self, device: &Device, on: bool) {
            self.push(Recorded::StateChanged(device.name().to_string(), on));
        }
    }

    impl PairObserver for Recorder {
        fn on_found_device(&self, bssid: MacAddr) {
            self.push(Recorded::PairFound(bssid));
        }

        fn on_sending_command(&self, bssid: Option<MacAddr>, command: &str) {
            self.push(Recorded::Sending(bssid, command.to_string()));
        }

        fn on_success(&self, bssid: Option<MacAddr>) {
            self.push(Recorded::Success(bssid));
        }

        fn on_stopped(&self, reason: StopReason) {
            self.push(Recorded::Stopped(reason));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ProtocolEngine;
    use crate::protocol::{Command, encode};
    use crate::transport::MockSocket;
    use crate::{EngineConfig, ManualClock};
    use std::net::SocketAddr;
    use std::rc::Rc;

    #[test]
    fn test_null_observer_accepts_all_events() {
        let mac = MacAddr::new([0xAC, 0xCF, 0x23, 0, 0, 1]);
        let config = EngineConfig {
            devices: vec![crate::DeviceSpec::with_mac(mac, "lamp")],
            ..Default::default()
        };
        let mut engine: ProtocolEngine<MockSocket, ManualClock, NullObserver> =
            ProtocolEngine::with_observer(config, ManualClock::new(0), Rc::new(NullObserver))
                .unwrap();
        let socket = MockSocket::new();
        engine.start(socket.clone());

        let packet = encode(Command::StateChange, mac, &[0, 0, 0, 0, 1]).unwrap();
        socket.queue_datagram(SocketAddr::from(([10, 0, 0, 9], 10000)), &packet);
        engine.poll();

        let lamp = engine.registry().find(&mac).unwrap();
        assert!(lamp.is_connected());
        assert!(lamp.is_on());
    }
}
