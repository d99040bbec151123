//! `bolt-core` — the wire-level pieces of the Bolt v1 protocol shared by
//! client and server: the handshake preamble, PackStream value codec, and
//! chunked message framing.
//!
//! Nothing in this crate is async or knows about sockets; it operates on
//! in-memory byte buffers so it can be driven from any transport.

pub mod chunk;
pub mod config;
pub mod handshake;
pub mod message;
pub mod value;

pub use config::CodecConfig;
pub use message::{signatures, Message, MessageError};
pub use value::{Map, PackStreamError, Value};
