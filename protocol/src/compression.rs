//! Zlib helpers for batching packets into wrapped frames.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::ProtocolError;

pub fn deflate(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(ProtocolError::Deflate)?;
    encoder.finish().map_err(ProtocolError::Deflate)
}

pub fn inflate(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(ProtocolError::Inflate)?;
    Ok(out)
}
