// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Payload compression negotiated through the Content-Type header.

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use std::io::{Read, Write};

/// Compression applied to request bodies and advertised to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    None,
    #[default]
    Zlib,
    Gzip,
}

impl Compression {
    /// The Content-Type advertising this compression.
    pub fn content_type(&self) -> &'static str {
        match self {
            Compression::None => "application/json",
            Compression::Zlib => "application/x-compress-zlib",
            Compression::Gzip => "application/x-compress-gzip",
        }
    }

    pub fn compress(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Compression::None => data.to_vec(),
            Compression::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                match encoder.write_all(data).and_then(|_| encoder.finish()) {
                    Ok(out) => out,
                    Err(_) => data.to_vec(),
                }
            }
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                match encoder.write_all(data).and_then(|_| encoder.finish()) {
                    Ok(out) => out,
                    Err(_) => data.to_vec(),
                }
            }
        }
    }
}

/// Decode a response body according to its declared Content-Type.
///
/// Unknown or uncompressed types pass through. Returns None when the
/// body claims compression but does not inflate.
pub fn uncompress(data: &[u8], content_type: &str) -> Option<Vec<u8>> {
    if content_type.contains("x-compress-zlib") || content_type.contains("x-zlib") {
        let mut out = Vec::new();
        ZlibDecoder::new(data).read_to_end(&mut out).ok()?;
        Some(out)
    } else if content_type.contains("x-compress-gzip") || content_type.contains("x-gzip") {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out).ok()?;
        Some(out)
    } else {
        Some(data.to_vec())
    }
}

#[cfg(test)]
#[path = "compress_tests.rs"]
mod tests;
