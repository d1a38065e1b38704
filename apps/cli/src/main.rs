use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use s20_core::{
    Config, Device, DeviceSpec, MacAddr, MonotonicClock, NmcliWifi, PairObserver,
    PairingSession, ProtocolEngine, RelayState, StopReason, TracingObserver, UdpTransport,
};
use tracing::{error, info, warn};

/// Sleep between polls of the cooperative loop.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Parser, Debug)]
#[command(author, version, about = "Orvibo S20 outlet tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch outlets on the local network
    Listen {
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Outlet to track, as MAC or MAC=NAME (repeatable)
        #[arg(long = "device", value_parser = parse_device)]
        devices: Vec<DeviceSpec>,

        /// Number of wildcard entries bound to the first unknown senders
        #[arg(long, default_value_t = 0)]
        any: usize,

        /// Stop after this many seconds instead of running forever
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Switch an outlet's relay
    Switch {
        #[arg(long)]
        mac: MacAddr,

        #[arg(long, conflicts_with = "off", required_unless_present = "off")]
        on: bool,

        #[arg(long)]
        off: bool,

        /// Seconds to wait for the outlet to answer
        #[arg(long, default_value_t = 5)]
        wait: u64,
    },
    /// Put an unconfigured outlet onto a WiFi network
    Pair {
        /// Network the outlet should join
        #[arg(long)]
        ssid: String,

        /// WPA2 passphrase; omit for an open network
        #[arg(long)]
        passphrase: Option<String>,

        /// Wireless interface used to reach the outlet's access point
        #[arg(long, default_value = "wlan0")]
        iface: String,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn parse_device(arg: &str) -> Result<DeviceSpec, String> {
    let (mac, name) = match arg.split_once('=') {
        Some((mac, name)) => (mac, Some(name)),
        None => (arg, None),
    };
    let mac: MacAddr = mac.parse().map_err(|e| format!("{e}"))?;
    let name = name.map_or_else(|| mac.to_string(), str::to_string);
    Ok(DeviceSpec::with_mac(mac, name))
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn listen(
    config: Option<PathBuf>,
    devices: Vec<DeviceSpec>,
    any: usize,
    seconds: Option<u64>,
) -> Result<()> {
    let mut config = load_config(config.as_ref())?;
    config.engine.devices.extend(devices);
    config
        .engine
        .devices
        .extend((1..=any).map(|n| DeviceSpec::any(format!("any-{n}"))));

    let socket = UdpTransport::bind(config.engine.port)?;
    let mut engine = ProtocolEngine::new(config.engine, MonotonicClock::new())?;
    engine.start(socket);

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    while deadline.is_none_or(|d| Instant::now() < d) {
        engine.poll();
        thread::sleep(POLL_INTERVAL);
    }
    engine.stop();

    for device in engine.registry().iter() {
        info!(
            device = %device.name(),
            mac = %device.mac(),
            connected = device.is_connected(),
            state = %device.relay_state(),
            "Summary"
        );
    }
    Ok(())
}

fn switch(mac: MacAddr, on: bool, wait: u64) -> Result<()> {
    let config = Config::default();
    let socket = UdpTransport::bind(config.engine.port)?;
    let mut engine = ProtocolEngine::new(config.engine, MonotonicClock::new())?;
    let id = engine.add_device(DeviceSpec::with_mac(mac, mac.to_string()))?;
    engine.start(socket);

    let deadline = Instant::now() + Duration::from_secs(wait);
    while !engine.device(id).is_some_and(Device::is_connected) {
        if Instant::now() >= deadline {
            bail!("Outlet {mac} did not answer within {wait}s");
        }
        engine.poll();
        thread::sleep(POLL_INTERVAL);
    }

    engine.set_state(id, on)?;
    let wanted = if on { RelayState::On } else { RelayState::Off };
    while Instant::now() < deadline {
        engine.poll();
        if engine.device(id).is_some_and(|d| d.relay_state() == wanted) {
            info!(%mac, on, "Relay switched");
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
    warn!(%mac, "No state confirmation received");
    Ok(())
}

/// Logs like [`TracingObserver`] and keeps the stop reason for the exit
/// status.
#[derive(Default)]
struct PairReport {
    reason: Cell<Option<StopReason>>,
}

impl PairObserver for PairReport {
    fn on_found_device(&self, bssid: MacAddr) {
        TracingObserver.on_found_device(bssid);
    }

    fn on_sending_command(&self, bssid: Option<MacAddr>, command: &str) {
        TracingObserver.on_sending_command(bssid, command);
    }

    fn on_success(&self, bssid: Option<MacAddr>) {
        TracingObserver.on_success(bssid);
    }

    fn on_stopped(&self, reason: StopReason) {
        TracingObserver.on_stopped(reason);
        self.reason.set(Some(reason));
    }
}

fn pair(
    ssid: String,
    passphrase: Option<String>,
    iface: String,
    config: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config.as_ref())?;
    let socket = UdpTransport::bind(config.pairing.port)?;
    let report = Rc::new(PairReport::default());
    let mut session = PairingSession::with_observer(
        config.pairing,
        NmcliWifi::new(iface),
        MonotonicClock::new(),
        report.clone(),
    );
    session.start(&ssid, passphrase.as_deref(), socket)?;

    while session.is_active() {
        session.tick();
        thread::sleep(POLL_INTERVAL);
    }

    match report.reason.get() {
        Some(StopReason::PairingSuccessful) => Ok(()),
        Some(reason) => bail!("Pairing failed: {reason} ({})", reason.code()),
        None => bail!("Pairing ended without a result"),
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }

    info!("Starting S20 tool...");

    let result = match args.command {
        Commands::Listen {
            config,
            devices,
            any,
            seconds,
        } => listen(config, devices, any, seconds),
        Commands::Switch { mac, on, wait, .. } => switch(mac, on, wait),
        Commands::Pair {
            ssid,
            passphrase,
            iface,
            config,
        } => pair(ssid, passphrase, iface, config),
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_with_and_without_name() {
        let named = parse_device("AC:CF:23:12:34:56=lamp").unwrap();
        assert_eq!(named.name, "lamp");
        assert!(named.mac.is_some());

        let bare = parse_device("accf23123456").unwrap();
        assert_eq!(bare.name, "AC:CF:23:12:34:56");

        assert!(parse_device("lamp").is_err());
    }

    #[test]
    fn test_switch_requires_direction() {
        assert!(Args::try_parse_from(["s20", "switch", "--mac", "AC:CF:23:12:34:56"]).is_err());
        assert!(
            Args::try_parse_from(["s20", "switch", "--mac", "AC:CF:23:12:34:56", "--on", "--off"])
                .is_err()
        );
        assert!(
            Args::try_parse_from(["s20", "switch", "--mac", "AC:CF:23:12:34:56", "--off"]).is_ok()
        );
    }
}
