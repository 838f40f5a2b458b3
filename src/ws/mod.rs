// Websocket endpoint layer
// - server.rs: listener and accept loop
// - connection.rs: per-client session, one backend process each
// - registry.rs: live connection bookkeeping

pub mod connection;
pub mod registry;
pub mod server;

pub use registry::{ConnectionPhase, ConnectionRegistry};
pub use server::Server;
