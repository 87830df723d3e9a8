use std::io;
use std::str::Utf8Error;
use thiserror::Error;

/// Protocol and data-format errors.
///
/// Every variant here is fatal for the frame or value being processed and
/// is expected to terminate the session that produced it. Unknown packet
/// type identifiers are deliberately *not* represented: they are skipped
/// during demultiplexing, not raised.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A varint ran past the group count that fits its target width
    /// without a terminating byte. Corrupt or adversarial input.
    #[error("varint too large")]
    VarIntTooLarge,

    /// The buffer ended in the middle of a value.
    #[error("unexpected end of buffer")]
    UnexpectedEof,

    /// A length-prefixed sub-packet had an empty body.
    #[error("contained packet is empty")]
    EmptyPacket,

    #[error("unable to deflate buffer data")]
    Deflate(#[source] io::Error),

    #[error("unable to inflate buffer data")]
    Inflate(#[source] io::Error),

    #[error("invalid utf-8 in string field")]
    InvalidString(#[from] Utf8Error),
}
