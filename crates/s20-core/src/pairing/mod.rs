//! WiFi onboarding of unconfigured outlets.
//!
//! An outlet without network credentials opens an access point. Pairing
//! finds it in a scan, joins it, and broadcasts the AT command sequence
//! that points the outlet at the target network.

pub mod commands;
pub mod machine;
pub mod session;

pub use commands::PairCommand;
pub use machine::{Action, PairMachine, PairState, StopReason, TickInput};
pub use session::{PairError, PairTarget, PairingSession};
