//! NetworkManager (`nmcli`) WiFi backend for Linux hosts.
//!
//! Every nmcli invocation runs as a child process polled with `try_wait`,
//! so nothing here blocks the polling loop. Once association succeeds the
//! BSSID and subnet broadcast address are looked up the same way and
//! cached; `is_associated` only reports true after both lookups finished.
//! Only the connection profile this backend created is ever deleted.

use std::net::Ipv4Addr;
use std::process::{Child, Command, Stdio};

use tracing::{debug, info, instrument, warn};

use super::traits::{ScanEntry, ScanStatus, WifiError, WifiScanner, WifiStation};
use crate::protocol::MacAddr;

const NMCLI: &str = "nmcli";

/// Link detail read once association has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Bssid,
    Broadcast,
}

pub struct NmcliWifi {
    program: String,
    iface: String,
    scan: Option<Child>,
    connect: Option<Child>,
    lookups: Vec<(Lookup, Child)>,
    /// UUID of the profile `associate` created, deleted on `disassociate`.
    connection: Option<String>,
    /// `connection delete` children still running.
    cleanup: Vec<Child>,
    associated: bool,
    bssid: Option<MacAddr>,
    broadcast: Option<Ipv4Addr>,
}

impl NmcliWifi {
    pub fn new(iface: impl Into<String>) -> Self {
        Self::with_program(NMCLI, iface)
    }

    /// Drive another nmcli-compatible executable instead of `nmcli`.
    pub fn with_program(program: impl Into<String>, iface: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            iface: iface.into(),
            scan: None,
            connect: None,
            lookups: Vec::new(),
            connection: None,
            cleanup: Vec::new(),
            associated: false,
            bssid: None,
            broadcast: None,
        }
    }

    fn spawn(&self, args: &[&str]) -> Result<Child, WifiError> {
        debug!(?args, "Spawning nmcli");
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| WifiError::Command {
                command: args.join(" "),
                message: e.to_string(),
            })
    }

    fn reap(child: &mut Option<Child>) {
        if let Some(mut c) = child.take() {
            let _ = c.kill();
            let _ = c.wait();
        }
    }

    fn reap_lookups(&mut self) {
        for (_, mut child) in self.lookups.drain(..) {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn poll_connect(&mut self) {
        let Some(child) = self.connect.as_mut() else {
            return;
        };
        match child.try_wait() {
            Ok(None) => return,
            Ok(Some(_)) => {}
            Err(e) => {
                warn!(error = %e, "Lost track of association process");
                Self::reap(&mut self.connect);
                return;
            }
        }
        let Some(child) = self.connect.take() else {
            return;
        };
        match collect(child, "device wifi connect") {
            Ok(stdout) => {
                self.connection = parse_connection_uuid(&stdout);
                if self.connection.is_none() {
                    warn!("Associated, but nmcli did not name the new profile");
                }
                self.associated = true;
                self.start_lookups();
            }
            Err(e) => warn!(error = %e, "Association failed"),
        }
    }

    fn start_lookups(&mut self) {
        let iface = self.iface.as_str();
        let bssid = self.spawn(&[
            "-t",
            "-f",
            "ACTIVE,BSSID",
            "device",
            "wifi",
            "list",
            "--rescan",
            "no",
            "ifname",
            iface,
        ]);
        let broadcast = self.spawn(&["-t", "-g", "IP4.ADDRESS", "device", "show", iface]);

        for (lookup, spawned) in [(Lookup::Bssid, bssid), (Lookup::Broadcast, broadcast)] {
            match spawned {
                Ok(child) => self.lookups.push((lookup, child)),
                Err(e) => warn!(?lookup, error = %e, "Link lookup failed"),
            }
        }
    }

    fn poll_lookups(&mut self) {
        for (lookup, mut child) in std::mem::take(&mut self.lookups) {
            match child.try_wait() {
                Ok(None) => self.lookups.push((lookup, child)),
                Ok(Some(_)) => match collect(child, "link lookup") {
                    Ok(stdout) => self.record(lookup, &stdout),
                    Err(e) => warn!(?lookup, error = %e, "Link lookup failed"),
                },
                Err(e) => {
                    warn!(?lookup, error = %e, "Lost track of link lookup");
                    let _ = child.kill();
                    let _ = child.wait();
                }
            }
        }
    }

    fn record(&mut self, lookup: Lookup, stdout: &str) {
        match lookup {
            Lookup::Bssid => {
                self.bssid = parse_active_bssid(stdout);
                debug!(bssid = ?self.bssid, "Joined access point");
            }
            Lookup::Broadcast => {
                self.broadcast = parse_broadcast(stdout);
                debug!(broadcast = ?self.broadcast, "Subnet broadcast address");
            }
        }
    }
}

impl WifiScanner for NmcliWifi {
    #[instrument(skip(self), fields(iface = %self.iface))]
    fn start_scan(&mut self) -> Result<(), WifiError> {
        Self::reap(&mut self.scan);
        let child = self.spawn(&[
            "-t",
            "-f",
            "SSID,BSSID",
            "device",
            "wifi",
            "list",
            "--rescan",
            "yes",
            "ifname",
            self.iface.as_str(),
        ])?;
        self.scan = Some(child);
        Ok(())
    }

    fn poll_scan(&mut self) -> Result<ScanStatus, WifiError> {
        let Some(child) = self.scan.as_mut() else {
            return Err(WifiError::Command {
                command: "device wifi list".into(),
                message: "no scan in progress".into(),
            });
        };
        if child.try_wait()?.is_none() {
            return Ok(ScanStatus::InProgress);
        }

        let Some(child) = self.scan.take() else {
            return Ok(ScanStatus::InProgress);
        };
        let entries = parse_scan(&collect(child, "device wifi list")?);
        debug!(networks = entries.len(), "Scan complete");
        Ok(ScanStatus::Complete(entries))
    }
}

impl WifiStation for NmcliWifi {
    #[instrument(skip(self, passphrase), fields(iface = %self.iface))]
    fn associate(&mut self, ssid: &str, passphrase: Option<&str>) -> Result<(), WifiError> {
        Self::reap(&mut self.connect);
        self.reap_lookups();
        self.associated = false;

        let mut args = vec!["device", "wifi", "connect", ssid];
        if let Some(pass) = passphrase {
            args.extend(["password", pass]);
        }
        args.extend(["ifname", self.iface.as_str()]);

        self.connect = Some(self.spawn(&args)?);
        info!(ssid, "Association started");
        Ok(())
    }

    fn is_associated(&mut self) -> bool {
        self.poll_connect();
        self.poll_lookups();
        self.associated && self.lookups.is_empty()
    }

    /// A connect still in flight is killed; a profile it may already have
    /// created is not known and stays behind.
    fn disassociate(&mut self) -> Result<(), WifiError> {
        Self::reap(&mut self.connect);
        self.reap_lookups();
        self.associated = false;
        self.bssid = None;
        self.broadcast = None;

        self.cleanup
            .retain_mut(|child| matches!(child.try_wait(), Ok(None)));
        if let Some(uuid) = self.connection.take() {
            info!(connection = %uuid, "Removing pairing connection");
            // `delete` also deactivates.
            let child = self.spawn(&["connection", "delete", "uuid", uuid.as_str()])?;
            self.cleanup.push(child);
        }
        Ok(())
    }

    fn current_bssid(&self) -> Option<MacAddr> {
        self.bssid
    }

    fn broadcast_address(&self) -> Option<Ipv4Addr> {
        self.broadcast
    }
}

impl Drop for NmcliWifi {
    fn drop(&mut self) {
        Self::reap(&mut self.scan);
        Self::reap(&mut self.connect);
        self.reap_lookups();
        // Pending deletes are left to finish on their own.
    }
}

/// Read the output of a child that has already exited.
fn collect(child: Child, command: &str) -> Result<String, WifiError> {
    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(WifiError::Command {
            command: command.into(),
            message: format!("exited with {}", output.status),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Split one line of `nmcli -t` output on unescaped colons.
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_scan(output: &str) -> Vec<ScanEntry> {
    output
        .lines()
        .filter_map(|line| {
            let fields = split_terse(line);
            let [ssid, bssid] = fields.as_slice() else {
                return None;
            };
            Some(ScanEntry {
                ssid: ssid.clone(),
                bssid: bssid.parse().ok()?,
            })
        })
        .collect()
}

fn parse_active_bssid(output: &str) -> Option<MacAddr> {
    output.lines().find_map(|line| {
        let fields = split_terse(line);
        match fields.as_slice() {
            [active, bssid] if active == "yes" => bssid.parse().ok(),
            _ => None,
        }
    })
}

fn parse_broadcast(output: &str) -> Option<Ipv4Addr> {
    output
        .split(['|', '\n'])
        .find_map(|cidr| broadcast_from_cidr(cidr.trim()))
}

/// `Device 'wlan0' successfully activated with '<uuid>'.` -> `<uuid>`
fn parse_connection_uuid(output: &str) -> Option<String> {
    let (_, rest) = output.rsplit_once("activated with '")?;
    let (uuid, _) = rest.split_once('\'')?;
    (!uuid.is_empty()).then(|| uuid.to_string())
}

/// `10.10.100.150/24` -> `10.10.100.255`
fn broadcast_from_cidr(cidr: &str) -> Option<Ipv4Addr> {
    let (addr, prefix) = cidr.split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;
    let prefix: u32 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
    Some(Ipv4Addr::from(u32::from(addr) | !mask))
}
