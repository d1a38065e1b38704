//! S20-Core: Orvibo S20 smart outlet control in Rust.
//!
//! This crate discovers, controls and pairs Orvibo S20 WiFi outlets over
//! their proprietary UDP protocol. Everything runs on one cooperative
//! polling loop: no call blocks on the network, and all waiting is
//! expressed as deadlines against a shared millisecond clock.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, frame codec, MAC addresses, pairing replies
//! - **Transport**: Socket and WiFi abstractions (std UDP, nmcli, mock)
//! - **Registry**: Declared outlets, wildcard binding, liveness
//! - **Engine**: Receive dispatch, subscriptions, timeout sweep
//! - **Pairing**: WiFi onboarding state machine and its driver
//! - **Events**: Observer traits for application decoupling
//!
//! # Example
//!
//! ```no_run
//! use s20_core::{EngineConfig, MonotonicClock, ProtocolEngine, UdpTransport};
//!
//! let config = EngineConfig::default();
//! let socket = UdpTransport::bind(config.port).expect("bind failed");
//! let mut engine = ProtocolEngine::new(config, MonotonicClock::new()).expect("bad config");
//! engine.start(socket);
//! loop {
//!     engine.poll();
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! ```

pub mod clock;
pub mod config;
pub mod device;
pub mod engine;
pub mod events;
pub mod known_macs;
pub mod pairing;
pub mod protocol;
pub mod registry;
pub mod transport;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{Config, EngineConfig, PairingConfig};
pub use device::{Device, DeviceId, DeviceSpec, RelayState};
pub use engine::{EngineError, ProtocolEngine};
pub use events::{DeviceObserver, NullObserver, PairObserver, TracingObserver};
pub use pairing::{PairError, PairState, PairingSession, StopReason};
pub use protocol::{Frame, FrameError, MacAddr};
pub use registry::{DeviceRegistry, RegistryError};
pub use transport::{
    DatagramSocket, MockSocket, MockWifi, NmcliWifi, TransportError, UdpTransport, WifiError,
};
