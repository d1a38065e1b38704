//! Transport layer module.

pub mod mock;
pub mod nmcli;
pub mod traits;
pub mod udp;

pub use mock::{MockSocket, MockWifi, WifiCall};
pub use nmcli::NmcliWifi;
pub use traits::{
    DatagramSocket, ScanEntry, ScanStatus, TransportError, WifiError, WifiScanner, WifiStation,
};
pub use udp::UdpTransport;
