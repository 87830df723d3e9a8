//! The application-packet abstraction and the inbound decoder table.
//!
//! The proxy never interprets application packets beyond their one-byte
//! type identifier; everything else is opaque to it. The single exception
//! is [`DisconnectPacket`], which the session itself emits when it tears a
//! connection down.

use std::collections::HashMap;
use std::fmt;

use crate::error::ProtocolError;
use crate::varint;

/// One application-level packet, as seen at the proxy boundary.
///
/// The encoded body always starts with the packet's type identifier byte.
/// Implementations that already hold their serialized form return it from
/// [`DataPacket::encoded`] so the session does not encode twice.
pub trait DataPacket: fmt::Debug + Send + Sync {
    /// One-byte type identifier, the first byte of the encoded body.
    fn packet_id(&self) -> u8;

    /// Serialize the full packet body, including the leading id byte.
    fn encode(&self) -> Result<Vec<u8>, ProtocolError>;

    /// Cached serialized form, if this packet is already encoded.
    fn encoded(&self) -> Option<&[u8]> {
        None
    }
}

/// An item awaiting transmission on a session's outgoing queue.
#[derive(Debug)]
pub enum OutboundPacket {
    /// A plain application packet, batched and compressed at flush time.
    Packet(Box<dyn DataPacket>),
    /// An already-compressed batch, forwarded as its own frame without
    /// recompression.
    Batch(Vec<u8>),
}

/// Decodes one sub-packet body (id byte included) into a packet value.
pub type DecodeFn = fn(&[u8]) -> Result<Box<dyn DataPacket>, ProtocolError>;

/// Maps packet type identifiers to their decoders.
///
/// Populated once at startup; lookups during demultiplexing are read-only.
pub struct PacketRegistry {
    decoders: HashMap<u8, DecodeFn>,
}

impl PacketRegistry {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// A registry with the packets the proxy itself understands.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(DISCONNECT_PACKET, DisconnectPacket::decode);
        registry
    }

    /// Register a decoder for a type identifier. Returns false if the id
    /// is already taken (the existing decoder wins).
    pub fn register(&mut self, id: u8, decoder: DecodeFn) -> bool {
        use std::collections::hash_map::Entry;
        match self.decoders.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(decoder);
                true
            }
        }
    }

    pub fn get(&self, id: u8) -> Option<DecodeFn> {
        self.decoders.get(&id).copied()
    }
}

impl Default for PacketRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Type identifier of the disconnect notification.
pub const DISCONNECT_PACKET: u8 = 0x05;

/// Notifies the remote peer that its session is being terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectPacket {
    pub message: String,
    /// Suppresses the client-side disconnect screen when set.
    pub hide_disconnect_screen: bool,
}

impl DisconnectPacket {
    pub fn new(message: impl Into<String>, hide_disconnect_screen: bool) -> Self {
        Self {
            message: message.into(),
            hide_disconnect_screen,
        }
    }

    pub fn decode(body: &[u8]) -> Result<Box<dyn DataPacket>, ProtocolError> {
        // body[0] is the type identifier that routed us here.
        let rest = body.get(1..).ok_or(ProtocolError::UnexpectedEof)?;
        let (&hide, rest) = rest.split_first().ok_or(ProtocolError::UnexpectedEof)?;
        let (len, rest) = varint::read_unsigned_u32(rest)?;
        let raw = rest
            .get(..len as usize)
            .ok_or(ProtocolError::UnexpectedEof)?;
        let message = std::str::from_utf8(raw)?.to_string();
        Ok(Box::new(Self {
            message,
            hide_disconnect_screen: hide != 0,
        }))
    }
}

impl DataPacket for DisconnectPacket {
    fn packet_id(&self) -> u8 {
        DISCONNECT_PACKET
    }

    fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = vec![DISCONNECT_PACKET, u8::from(self.hide_disconnect_screen)];
        varint::write_unsigned_u32(&mut buf, self.message.len() as u32);
        buf.extend_from_slice(self.message.as_bytes());
        Ok(buf)
    }
}
