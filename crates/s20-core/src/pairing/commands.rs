//! The fixed AT command sequence that configures an outlet's WiFi module.

use std::fmt;

use crate::protocol::ASSIST_HANDSHAKE;

/// One step of the configuration sequence, in send order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairCommand {
    /// Wakes the module's command interpreter.
    AssistThread,
    Ssid,
    Key,
    /// Switch from access point to station mode.
    Mode,
    /// Reboot onto the new network. Never acknowledged.
    Commit,
}

impl PairCommand {
    pub const FIRST: PairCommand = PairCommand::AssistThread;

    pub fn next(self) -> Option<PairCommand> {
        match self {
            PairCommand::AssistThread => Some(PairCommand::Ssid),
            PairCommand::Ssid => Some(PairCommand::Key),
            PairCommand::Key => Some(PairCommand::Mode),
            PairCommand::Mode => Some(PairCommand::Commit),
            PairCommand::Commit => None,
        }
    }

    pub fn is_final(self) -> bool {
        self.next().is_none()
    }

    /// Wire text for this step. Everything but the handshake ends in `\r`.
    pub fn render(self, ssid: &str, passphrase: Option<&str>) -> String {
        match self {
            PairCommand::AssistThread => ASSIST_HANDSHAKE.to_string(),
            PairCommand::Ssid => format!("AT+WSSSID={ssid}\r"),
            PairCommand::Key => match passphrase {
                Some(pass) => format!("AT+WSKEY=WPA2PSK,AES,{pass}\r"),
                None => "AT+WSKEY=OPEN,NONE,\r".to_string(),
            },
            PairCommand::Mode => "AT+WMODE=STA\r".to_string(),
            PairCommand::Commit => "AT+Z\r".to_string(),
        }
    }
}

impl fmt::Display for PairCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairCommand::AssistThread => write!(f, "ASSIST"),
            PairCommand::Ssid => write!(f, "WSSSID"),
            PairCommand::Key => write!(f, "WSKEY"),
            PairCommand::Mode => write!(f, "WMODE"),
            PairCommand::Commit => write!(f, "Z"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_order() {
        let mut seq = vec![PairCommand::FIRST];
        while let Some(next) = seq.last().and_then(|c| c.next()) {
            seq.push(next);
        }
        assert_eq!(
            seq,
            vec![
                PairCommand::AssistThread,
                PairCommand::Ssid,
                PairCommand::Key,
                PairCommand::Mode,
                PairCommand::Commit,
            ]
        );
        assert!(PairCommand::Commit.is_final());
        assert!(!PairCommand::Mode.is_final());
    }

    #[test]
    fn test_key_variants() {
        assert_eq!(
            PairCommand::Key.render("home", Some("hunter22")),
            "AT+WSKEY=WPA2PSK,AES,hunter22\r"
        );
        assert_eq!(PairCommand::Key.render("home", None), "AT+WSKEY=OPEN,NONE,\r");
    }

    #[test]
    fn test_render_strings() {
        assert_eq!(PairCommand::AssistThread.render("x", None), "HF-A11ASSISTHREAD");
        assert_eq!(PairCommand::Ssid.render("my net", None), "AT+WSSSID=my net\r");
        assert_eq!(PairCommand::Mode.render("x", None), "AT+WMODE=STA\r");
        assert_eq!(PairCommand::Commit.render("x", None), "AT+Z\r");
    }
}
