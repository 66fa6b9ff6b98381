pub mod bootstrap;
pub mod envelope;
pub mod fsm;
pub mod gate;
pub mod log;

pub use bootstrap::{bootstrap, BootstrapOptions, BootstrapResults, Bootstrapped, NetworkPolicy};
pub use envelope::{decode_command, encode_command, Encoding, Envelope};
pub use fsm::StateMachine;
pub use gate::{actions_for, Gatekeeper};
pub use log::{ConsensusLog, LocalLog};
