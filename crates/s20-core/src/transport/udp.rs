//! `std::net` UDP transport.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use tracing::{debug, info, instrument};

use super::traits::{DatagramSocket, TransportError};

/// Non-blocking, broadcast-capable UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    port: u16,
}

impl UdpTransport {
    /// Bind `0.0.0.0:port`.
    #[instrument(level = "info")]
    pub fn bind(port: u16) -> Result<Self, TransportError> {
        let bind_err = |source| TransportError::Bind { port, source };

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;
        socket.set_broadcast(true).map_err(bind_err)?;

        let port = socket.local_addr().map_err(bind_err)?.port();
        info!(port, "UDP socket bound");
        Ok(Self { socket, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl DatagramSocket for UdpTransport {
    fn send_to(&self, addr: SocketAddr, data: &[u8]) -> Result<usize, TransportError> {
        let sent = self
            .socket
            .send_to(data, addr)
            .map_err(|e| TransportError::Send {
                addr,
                message: e.to_string(),
            })?;
        debug!(%addr, bytes = sent, "Datagram sent");
        Ok(sent)
    }

    fn try_recv(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, TransportError> {
        match self.socket.recv_from(buf) {
            Ok((n, from)) => Ok(Some((n, from))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(TransportError::Receive(e.to_string())),
        }
    }
}
