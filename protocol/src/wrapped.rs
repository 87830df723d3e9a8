//! The wrapped packet: the single custom transport packet type under which
//! all application traffic travels.
//!
//! The envelope is deliberately dumb. Its body is an opaque byte sequence
//! prepared by the session (a deflated concatenation of length-prefixed
//! application packets, or an already-compressed batch forwarded verbatim).
//! Encoding writes the payload as-is; decoding consumes every remaining
//! byte of the frame body. Decompression and demultiplexing belong to the
//! session, not here.

/// Reserved transport packet type identifier for wrapped frames.
pub const WRAPPED_PACKET_ID: u8 = 0xFE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedPacket {
    pub payload: Vec<u8>,
}

impl WrappedPacket {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// Write the payload verbatim into an outgoing frame body.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.payload);
    }

    /// Consume all remaining bytes of a frame body as the payload.
    pub fn decode(body: &[u8]) -> Self {
        Self {
            payload: body.to_vec(),
        }
    }
}
