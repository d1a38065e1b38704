//! Pairing state machine.
//!
//! Pure: it never touches the network. Each call takes the tick's inputs and
//! returns the side effects to perform, in order. Entry actions may cascade
//! into further states within a single call, so pseudo-states like
//! `Timeout` always settle in `Stopped` before the call returns.

use std::fmt;

use tracing::{debug, info, warn};

use super::commands::PairCommand;
use crate::clock::Deadline;
use crate::config::PairingConfig;
use crate::protocol::{MacAddr, Response};
use crate::transport::ScanEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairState {
    #[default]
    Stopped,
    Idle,
    Scan,
    Connect,
    SendCommands,
    PairingComplete,
    CommandFailed,
    Timeout,
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairState::Stopped => write!(f, "STOPPED"),
            PairState::Idle => write!(f, "IDLE"),
            PairState::Scan => write!(f, "SCAN"),
            PairState::Connect => write!(f, "CONNECT"),
            PairState::SendCommands => write!(f, "SEND_COMMANDS"),
            PairState::PairingComplete => write!(f, "PAIRING_COMPLETE"),
            PairState::CommandFailed => write!(f, "COMMAND_FAILED"),
            PairState::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// Why a pairing session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Timeout,
    CommandFailed,
    StoppedByUser,
    PairingSuccessful,
}

impl StopReason {
    /// Numeric code; negative values are failures.
    pub fn code(self) -> i8 {
        match self {
            StopReason::Timeout => -2,
            StopReason::CommandFailed => -1,
            StopReason::StoppedByUser => 0,
            StopReason::PairingSuccessful => 1,
        }
    }

    pub fn is_failure(self) -> bool {
        self.code() < 0
    }

    fn leaving(state: PairState) -> Self {
        match state {
            PairState::PairingComplete => StopReason::PairingSuccessful,
            PairState::CommandFailed => StopReason::CommandFailed,
            PairState::Timeout => StopReason::Timeout,
            _ => StopReason::StoppedByUser,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Timeout => write!(f, "timeout"),
            StopReason::CommandFailed => write!(f, "command failed"),
            StopReason::StoppedByUser => write!(f, "stopped by user"),
            StopReason::PairingSuccessful => write!(f, "pairing successful"),
        }
    }
}

/// Side effect requested by the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Disassociate,
    StartScan,
    /// Join the unconfigured outlet's open access point.
    Associate,
    Send(PairCommand),
    /// Answer the module's greeting.
    Acknowledge,
    ReportFound(MacAddr),
    ReportSuccess,
    ReportStopped(StopReason),
    CloseSocket,
}

/// What the session observed since the previous tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInput {
    pub response: Response,
    /// Finished scan results, if a scan completed this tick.
    pub scan: Option<Vec<ScanEntry>>,
    pub associated: bool,
}

impl Default for TickInput {
    fn default() -> Self {
        Self {
            response: Response::None,
            scan: None,
            associated: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PairMachine {
    config: PairingConfig,
    state: PairState,
    global: Deadline,
    timer: Deadline,
    command: PairCommand,
    retransmits: u8,
}

impl PairMachine {
    pub fn new(config: PairingConfig) -> Self {
        Self {
            config,
            state: PairState::Stopped,
            global: Deadline::default(),
            timer: Deadline::default(),
            command: PairCommand::FIRST,
            retransmits: 0,
        }
    }

    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    pub fn state(&self) -> PairState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != PairState::Stopped
    }

    /// Command currently awaiting an answer.
    pub fn command(&self) -> PairCommand {
        self.command
    }

    pub fn retransmits(&self) -> u8 {
        self.retransmits
    }

    /// Begin a fresh attempt. Any session in progress is abandoned without
    /// a stop report.
    pub fn start(&mut self, now: u32) -> Vec<Action> {
        let mut actions = Vec::new();
        self.goto(PairState::Idle, now, &mut actions);
        actions
    }

    /// Abort. Reports `StoppedByUser` only if a session was active.
    pub fn stop(&mut self, now: u32) -> Vec<Action> {
        let mut actions = Vec::new();
        self.goto(PairState::Stopped, now, &mut actions);
        actions
    }

    pub fn tick(&mut self, input: TickInput, now: u32) -> Vec<Action> {
        let mut actions = Vec::new();
        self.execute(input, now, &mut actions);
        actions
    }

    fn execute(&mut self, input: TickInput, now: u32, actions: &mut Vec<Action>) {
        if self.state == PairState::Stopped {
            return;
        }
        if self.global.expired(now) {
            warn!(state = %self.state, "Pairing timed out");
            self.goto(PairState::Timeout, now, actions);
            return;
        }

        match self.state {
            PairState::Idle => self.goto(PairState::Scan, now, actions),
            PairState::Scan => {
                let Some(results) = input.scan else {
                    return;
                };
                let ssid = self.config.device_ssid.as_str();
                match results.iter().find(|entry| entry.ssid == ssid) {
                    Some(entry) => {
                        actions.push(Action::ReportFound(entry.bssid));
                        self.goto(PairState::Connect, now, actions);
                    }
                    None => {
                        debug!(networks = results.len(), "Outlet not in scan results");
                        self.goto(PairState::Scan, now, actions);
                    }
                }
            }
            PairState::Connect => {
                if input.associated {
                    self.goto(PairState::SendCommands, now, actions);
                } else if self.timer.expired(now) {
                    debug!("Association timed out");
                    self.goto(PairState::Scan, now, actions);
                }
            }
            PairState::SendCommands => self.await_answer(input.response, now, actions),
            PairState::Stopped
            | PairState::PairingComplete
            | PairState::CommandFailed
            | PairState::Timeout => self.goto(PairState::Stopped, now, actions),
        }
    }

    fn await_answer(&mut self, response: Response, now: u32, actions: &mut Vec<Action>) {
        match response {
            Response::Ok => self.advance(now, actions),
            Response::Greeting if self.command == PairCommand::AssistThread => {
                actions.push(Action::Acknowledge);
                self.advance(now, actions);
            }
            Response::Error => {
                warn!(command = %self.command, "Outlet rejected command");
                self.goto(PairState::CommandFailed, now, actions);
            }
            _ if self.timer.expired(now) => {
                if self.retransmits < self.config.max_retransmits {
                    self.retransmits += 1;
                    debug!(command = %self.command, attempt = self.retransmits, "Retransmitting");
                    if let Some(next) = self.send_current(now, actions) {
                        self.goto(next, now, actions);
                    }
                } else {
                    debug!(command = %self.command, "Retransmissions exhausted");
                    self.goto(PairState::Scan, now, actions);
                }
            }
            _ => {}
        }
    }

    fn advance(&mut self, now: u32, actions: &mut Vec<Action>) {
        match self.command.next() {
            Some(next) => {
                self.command = next;
                self.retransmits = 0;
                if let Some(state) = self.send_current(now, actions) {
                    self.goto(state, now, actions);
                }
            }
            None => self.goto(PairState::PairingComplete, now, actions),
        }
    }

    /// Queue the current command and restart its deadline. The final
    /// command is never answered, so sending it completes the session.
    fn send_current(&mut self, now: u32, actions: &mut Vec<Action>) -> Option<PairState> {
        self.timer = Deadline::new(now, self.config.command_timeout_ms);
        actions.push(Action::Send(self.command));
        self.command.is_final().then_some(PairState::PairingComplete)
    }

    fn goto(&mut self, mut next: PairState, now: u32, actions: &mut Vec<Action>) {
        loop {
            let previous = self.state;
            info!(from = %previous, to = %next, "Pairing state transition");
            self.state = next;
            match self.enter(previous, now, actions) {
                Some(cascade) => next = cascade,
                None => break,
            }
        }
    }

    /// Entry actions. Returns the state to cascade into, if any.
    fn enter(
        &mut self,
        previous: PairState,
        now: u32,
        actions: &mut Vec<Action>,
    ) -> Option<PairState> {
        match self.state {
            PairState::Stopped => {
                actions.push(Action::Disassociate);
                if previous != PairState::Stopped {
                    actions.push(Action::CloseSocket);
                    actions.push(Action::ReportStopped(StopReason::leaving(previous)));
                }
                None
            }
            PairState::Idle => {
                self.global = Deadline::new(now, self.config.global_timeout_ms);
                actions.push(Action::Disassociate);
                None
            }
            PairState::Scan => {
                actions.push(Action::StartScan);
                None
            }
            PairState::Connect => {
                self.timer = Deadline::new(now, self.config.connect_timeout_ms);
                actions.push(Action::Associate);
                None
            }
            PairState::SendCommands => {
                self.command = PairCommand::FIRST;
                self.retransmits = 0;
                self.send_current(now, actions)
            }
            PairState::PairingComplete => {
                actions.push(Action::ReportSuccess);
                Some(PairState::Stopped)
            }
            PairState::CommandFailed | PairState::Timeout => Some(PairState::Stopped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTLET: MacAddr = MacAddr::new([0xAC, 0xCF, 0x23, 0x12, 0x34, 0x56]);
    const CONNECT_MS: u32 = crate::protocol::CONNECT_TIMEOUT_MS;
    const COMMAND_MS: u32 = crate::protocol::COMMAND_TIMEOUT_MS;

    fn entry(ssid: &str, last: u8) -> ScanEntry {
        ScanEntry {
            ssid: ssid.to_string(),
            bssid: MacAddr::new([0x10, 0, 0, 0, 0, last]),
        }
    }

    fn scanned(results: Vec<ScanEntry>) -> TickInput {
        TickInput {
            scan: Some(results),
            ..Default::default()
        }
    }

    fn associated() -> TickInput {
        TickInput {
            associated: true,
            ..Default::default()
        }
    }

    fn answer(response: Response) -> TickInput {
        TickInput {
            response,
            ..Default::default()
        }
    }

    fn idle() -> TickInput {
        TickInput::default()
    }

    /// Drives a fresh machine to `SendCommands` at t=0.
    fn sending() -> PairMachine {
        let mut m = PairMachine::new(PairingConfig::default());
        m.start(0);
        m.tick(idle(), 0);
        m.tick(
            scanned(vec![ScanEntry {
                ssid: "WiWo-S20".into(),
                bssid: OUTLET,
            }]),
            0,
        );
        let actions = m.tick(associated(), 0);
        assert_eq!(actions, vec![Action::Send(PairCommand::AssistThread)]);
        m
    }

    #[test]
    fn test_start_scans_on_first_tick() {
        let mut m = PairMachine::new(PairingConfig::default());
        assert!(!m.is_active());
        assert_eq!(m.start(0), vec![Action::Disassociate]);
        assert_eq!(m.state(), PairState::Idle);
        assert_eq!(m.tick(idle(), 10), vec![Action::StartScan]);
        assert_eq!(m.state(), PairState::Scan);

        // Scan still running.
        assert!(m.tick(idle(), 20).is_empty());
        assert_eq!(m.state(), PairState::Scan);
    }

    #[test]
    fn test_target_found_regardless_of_index() {
        let mut m = PairMachine::new(PairingConfig::default());
        m.start(0);
        m.tick(idle(), 0);

        let results = vec![entry("home", 1), entry("office", 2), entry("WiWo-S20", 3)];
        let actions = m.tick(scanned(results), 100);
        assert_eq!(
            actions,
            vec![
                Action::ReportFound(MacAddr::new([0x10, 0, 0, 0, 0, 3])),
                Action::Associate,
            ]
        );
        assert_eq!(m.state(), PairState::Connect);
    }

    #[test]
    fn test_missing_target_rescans() {
        let mut m = PairMachine::new(PairingConfig::default());
        m.start(0);
        m.tick(idle(), 0);
        let actions = m.tick(scanned(vec![entry("home", 1)]), 100);
        assert_eq!(actions, vec![Action::StartScan]);
        assert_eq!(m.state(), PairState::Scan);
    }

    #[test]
    fn test_connect_timeout_returns_to_scan() {
        let mut m = PairMachine::new(PairingConfig::default());
        m.start(0);
        m.tick(idle(), 0);
        m.tick(scanned(vec![entry("WiWo-S20", 1)]), 1_000);

        assert!(m.tick(idle(), 1_000 + CONNECT_MS - 1).is_empty());
        assert_eq!(m.tick(idle(), 1_000 + CONNECT_MS), vec![Action::StartScan]);
        assert_eq!(m.state(), PairState::Scan);
    }

    #[test]
    fn test_error_after_ssid_stops_with_command_failed() {
        let mut m = sending();
        assert_eq!(
            m.tick(answer(Response::Ok), 10),
            vec![Action::Send(PairCommand::Ssid)]
        );

        let actions = m.tick(answer(Response::Error), 20);
        assert_eq!(
            actions,
            vec![
                Action::Disassociate,
                Action::CloseSocket,
                Action::ReportStopped(StopReason::CommandFailed),
            ]
        );
        assert_eq!(m.state(), PairState::Stopped);
        assert!(m.tick(answer(Response::Ok), 30).is_empty());
    }

    #[test]
    fn test_third_expiry_returns_to_scan() {
        let mut m = sending();
        m.tick(answer(Response::Ok), 0);

        let mut now = 0;
        for attempt in 1..=2 {
            assert!(m.tick(idle(), now + COMMAND_MS - 1).is_empty());
            now += COMMAND_MS;
            assert_eq!(m.tick(idle(), now), vec![Action::Send(PairCommand::Ssid)]);
            assert_eq!(m.retransmits(), attempt);
        }

        now += COMMAND_MS;
        assert_eq!(m.tick(idle(), now), vec![Action::StartScan]);
        assert_eq!(m.state(), PairState::Scan);
    }

    #[test]
    fn test_answer_resets_retransmit_budget() {
        let mut m = sending();
        m.tick(idle(), COMMAND_MS);
        assert_eq!(m.retransmits(), 1);

        m.tick(answer(Response::Ok), COMMAND_MS + 5);
        assert_eq!(m.command(), PairCommand::Ssid);
        assert_eq!(m.retransmits(), 0);
        // The deadline restarted with the new command.
        assert!(m.tick(idle(), 2 * COMMAND_MS).is_empty());
    }

    #[test]
    fn test_global_timeout_mid_connect() {
        let mut m = PairMachine::new(PairingConfig::default());
        let global = m.config().global_timeout_ms;
        m.start(0);
        m.tick(idle(), 0);
        m.tick(scanned(vec![entry("WiWo-S20", 1)]), global - 1);
        assert_eq!(m.state(), PairState::Connect);

        // Association succeeding in the same tick does not win.
        let actions = m.tick(associated(), global);
        assert_eq!(
            actions,
            vec![
                Action::Disassociate,
                Action::CloseSocket,
                Action::ReportStopped(StopReason::Timeout),
            ]
        );
        assert_eq!(m.state(), PairState::Stopped);
    }

    #[test]
    fn test_full_sequence_succeeds_on_commit() {
        let mut m = sending();
        let mut sent = Vec::new();
        for t in 1..=3 {
            sent.extend(m.tick(answer(Response::Ok), t));
        }
        assert_eq!(
            sent,
            vec![
                Action::Send(PairCommand::Ssid),
                Action::Send(PairCommand::Key),
                Action::Send(PairCommand::Mode),
            ]
        );

        let actions = m.tick(answer(Response::Ok), 4);
        assert_eq!(
            actions,
            vec![
                Action::Send(PairCommand::Commit),
                Action::ReportSuccess,
                Action::Disassociate,
                Action::CloseSocket,
                Action::ReportStopped(StopReason::PairingSuccessful),
            ]
        );
        assert!(!m.is_active());
    }

    #[test]
    fn test_greeting_acknowledged_only_for_handshake() {
        let mut m = sending();
        assert_eq!(
            m.tick(answer(Response::Greeting), 5),
            vec![Action::Acknowledge, Action::Send(PairCommand::Ssid)]
        );
        assert!(m.tick(answer(Response::Greeting), 6).is_empty());
        assert_eq!(m.command(), PairCommand::Ssid);
    }

    #[test]
    fn test_redundant_stop_reports_once() {
        let mut m = sending();
        assert_eq!(
            m.stop(10),
            vec![
                Action::Disassociate,
                Action::CloseSocket,
                Action::ReportStopped(StopReason::StoppedByUser),
            ]
        );
        assert_eq!(m.stop(20), vec![Action::Disassociate]);
    }

    #[test]
    fn test_restart_does_not_report_stop() {
        let mut m = sending();
        assert_eq!(m.start(50), vec![Action::Disassociate]);
        assert_eq!(m.state(), PairState::Idle);
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(StopReason::Timeout.code(), -2);
        assert_eq!(StopReason::CommandFailed.code(), -1);
        assert_eq!(StopReason::StoppedByUser.code(), 0);
        assert_eq!(StopReason::PairingSuccessful.code(), 1);
        assert!(StopReason::Timeout.is_failure());
        assert!(!StopReason::PairingSuccessful.is_failure());
    }
}
