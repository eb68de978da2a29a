//! Wire protocol for mjsoul.
//!
//! This crate defines the bytes that travel over the connection:
//!
//! - **Frames** ([`Frame`], [`MessageType`]): the one-byte type tag and,
//!   for requests and responses, the 16-bit sequence index.
//! - **Envelope** ([`Envelope`]): the `(name, data)` pair inside every
//!   frame.
//! - **Wire primitives** ([`wire`]): protobuf varints, keys and
//!   length-delimited fields, shared with the dynamic message codec.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the client
//! (correlation and dispatch). It knows nothing about schemas or
//! connections.
//!
//! ```text
//! Transport (bytes) → Protocol (Frame, Envelope) → Client (calls, notifications)
//! ```

mod envelope;
mod error;
mod frame;
pub mod wire;

pub use envelope::Envelope;
pub use error::ProtocolError;
pub use frame::{Frame, MessageType};

/// Size of the sequence index space. Indices wrap modulo this value.
pub const INDEX_SPACE: usize = 1 << 16;
