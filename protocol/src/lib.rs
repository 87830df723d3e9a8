//! Wire-level protocol pieces shared between the proxy and its tests.
//!
//! This crate is transport-agnostic: it knows how to frame, compress and
//! (de)serialize application packets, but nothing about connections,
//! sessions or players. It provides:
//!
//! - [`varint`]: the variable-length integer codec used for length
//!   prefixes (LEB128-style, with zigzag variants for signed values)
//! - [`wrapped`]: the single custom transport packet type carrying all
//!   application traffic as an opaque payload
//! - [`compression`]: zlib deflate/inflate helpers used when batching
//!   packets into a wrapped frame
//! - [`packet`]: the application-packet abstraction, the id -> decoder
//!   table, and the disconnect notification packet
//! - [`info`]: protocol identification constants used for advertisement

pub mod compression;
pub mod error;
pub mod info;
pub mod packet;
pub mod varint;
pub mod wrapped;

pub use error::ProtocolError;
pub use packet::{DataPacket, DisconnectPacket, OutboundPacket, PacketRegistry};
pub use wrapped::{WrappedPacket, WRAPPED_PACKET_ID};
