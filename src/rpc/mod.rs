// JSON-RPC framing layer
// - codec.rs: Content-Length frame encoder/decoder
// - error.rs: encode/decode error types

pub mod codec;
pub mod error;

pub use error::{DecodeError, EncodeError};
