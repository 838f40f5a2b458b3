// Backend process layer
// - process.rs: language-server subprocess lifecycle
// - bridge.rs: pumps between the subprocess stdio and a connection

pub mod bridge;
pub mod process;

pub use bridge::{BridgeWriter, CloseReason, WriteError, spawn_reader};
pub use process::{BackendCommand, BackendIo, BackendProcess, SpawnError};
