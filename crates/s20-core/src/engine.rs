//! Protocol engine - receive dispatch and periodic duties.
//!
//! One `poll` call performs, in order: re-subscription when due, the
//! liveness sweep when due, then at most one non-blocking receive. Nothing
//! in `poll` blocks and no per-datagram failure is surfaced to the caller.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};

use crate::clock::{Clock, elapsed};
use crate::config::EngineConfig;
use crate::device::{Device, DeviceId, DeviceSpec};
use crate::events::{DeviceObserver, TracingObserver};
use crate::known_macs::KnownMacCache;
use crate::protocol::{DEVICE_UDP_PORT, Frame, FrameError, RX_BUFFER_SIZE, decode};
use crate::registry::{DeviceRegistry, RegistryError};
use crate::transport::{DatagramSocket, TransportError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine is not started")]
    NotStarted,
    #[error("No device {0}")]
    UnknownDevice(DeviceId),
    #[error("Device {0} has not been bound to a MAC yet")]
    UnboundDevice(DeviceId),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

pub struct ProtocolEngine<S: DatagramSocket, C: Clock, O: DeviceObserver = TracingObserver> {
    config: EngineConfig,
    registry: DeviceRegistry,
    known: KnownMacCache,
    socket: Option<S>,
    clock: C,
    observer: Rc<O>,
    last_subscribe_ms: u32,
    last_sweep_ms: u32,
}

impl<S: DatagramSocket, C: Clock> ProtocolEngine<S, C, TracingObserver> {
    /// Create an engine with the default tracing observer.
    pub fn new(config: EngineConfig, clock: C) -> Result<Self, RegistryError> {
        Self::with_observer(config, clock, Rc::new(TracingObserver))
    }
}

impl<S: DatagramSocket, C: Clock, O: DeviceObserver> ProtocolEngine<S, C, O> {
    /// Create an engine with a custom observer. The devices listed in
    /// `config` are registered in order.
    pub fn with_observer(
        config: EngineConfig,
        clock: C,
        observer: Rc<O>,
    ) -> Result<Self, RegistryError> {
        let mut registry = DeviceRegistry::new();
        for spec in &config.devices {
            registry.add(spec.clone())?;
        }
        Ok(Self {
            known: KnownMacCache::new(config.known_mac_capacity),
            config,
            registry,
            socket: None,
            clock,
            observer,
            last_subscribe_ms: 0,
            last_sweep_ms: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Structural changes (add/remove) are made between polls.
    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    pub fn add_device(&mut self, spec: DeviceSpec) -> Result<DeviceId, RegistryError> {
        self.registry.add(spec)
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.registry.get(id)
    }

    pub fn known_macs(&self) -> &KnownMacCache {
        &self.known
    }

    pub fn is_started(&self) -> bool {
        self.socket.is_some()
    }

    /// Take ownership of a bound socket and begin polling. The first poll
    /// sends subscriptions immediately.
    pub fn start(&mut self, socket: S) {
        let now = self.clock.now_ms();
        self.socket = Some(socket);
        self.last_subscribe_ms = now.wrapping_sub(self.config.subscribe_interval_ms);
        self.last_sweep_ms = now;
        info!(devices = self.registry.len(), "Protocol engine started");
    }

    /// Close the socket. The registry and device state are kept.
    pub fn stop(&mut self) {
        if self.socket.take().is_some() {
            info!("Protocol engine stopped");
        }
    }

    /// Run one cooperative tick.
    pub fn poll(&mut self) {
        if self.socket.is_none() {
            return;
        }
        let now = self.clock.now_ms();

        if elapsed(now, self.last_subscribe_ms) >= self.config.subscribe_interval_ms {
            self.last_subscribe_ms = now;
            self.subscribe_all();
        }

        if elapsed(now, self.last_sweep_ms) >= self.config.check_interval_ms {
            self.last_sweep_ms = now;
            self.sweep(now);
        }

        self.receive(now);
    }

    /// Switch an outlet's relay.
    #[instrument(skip(self))]
    pub fn set_state(&mut self, id: DeviceId, on: bool) -> Result<(), EngineError> {
        let socket = self.socket.as_ref().ok_or(EngineError::NotStarted)?;
        let device = self.registry.get(id).ok_or(EngineError::UnknownDevice(id))?;
        let mac = device.bound_mac().ok_or(EngineError::UnboundDevice(id))?;

        let bytes = Frame::set_state(mac, on).encode()?;
        let target = Self::target(device);
        socket.send_to(target, &bytes)?;
        debug!(%mac, %target, on, "Relay command sent");
        Ok(())
    }

    fn target(device: &Device) -> SocketAddr {
        let ip = device
            .address()
            .unwrap_or(IpAddr::V4(Ipv4Addr::BROADCAST));
        SocketAddr::new(ip, DEVICE_UDP_PORT)
    }

    fn subscribe_all(&self) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };
        for device in self.registry.iter() {
            let bytes = match Frame::subscribe(device.mac()).encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(device = %device.name(), error = %e, "Cannot encode subscription");
                    continue;
                }
            };
            let target = Self::target(device);
            match socket.send_to(target, &bytes) {
                Ok(_) => trace!(device = %device.name(), %target, "Subscription sent"),
                Err(e) => warn!(device = %device.name(), error = %e, "Subscription failed"),
            }
        }
    }

    fn sweep(&mut self, now: u32) {
        let timeout = self.config.connection_timeout_ms;
        for id in self.registry.ids() {
            if let Some(device) = self.registry.get_mut(id) {
                device.check_timeout(now, timeout, &*self.observer);
            }
        }
    }

    fn receive(&mut self, now: u32) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };
        let mut buf = [0u8; RX_BUFFER_SIZE];
        let (len, from) = match socket.try_recv(&mut buf) {
            Ok(Some(received)) => received,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Receive failed");
                return;
            }
        };

        let frame = match decode(&buf[..len]) {
            Ok(frame) => frame,
            Err(e) => {
                trace!(%from, error = %e, "Dropping invalid datagram");
                return;
            }
        };
        self.dispatch(frame, from.ip(), now);
    }

    fn dispatch(&mut self, frame: Frame, from: IpAddr, now: u32) {
        let mac = frame.mac;
        debug!(%mac, %from, command = %frame.command, "Frame received");

        if self.known.insert(mac) {
            self.observer.on_found_device(mac);
        }

        let id = match self.registry.find(&mac).map(Device::id) {
            Some(id) => id,
            None => {
                let Some(wildcard) = self.registry.first_wildcard().map(Device::id) else {
                    trace!(%mac, "No device entry matches; dropping");
                    return;
                };
                if let Err(e) = self.registry.bind(wildcard, mac, from) {
                    warn!(%mac, error = %e, "Wildcard bind failed");
                    return;
                }
                info!(%mac, device = %wildcard, "Wildcard entry bound");
                wildcard
            }
        };

        if let Some(device) = self.registry.get_mut(id) {
            device.set_address(from);
            device.handle_frame(&frame, now, &*self.observer);
        }
    }
}
