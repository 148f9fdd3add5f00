//! Response body decoding.
//!
//! Bodies handed to listeners are always raw bytes. The rewritten response is
//! sent without a `Content-Encoding`, so nothing is ever re-encoded.

use bytes::Bytes;
use std::io::{self, Read};

use crate::error::ProxyError;

/// Upper bound on a decoded body, guards against decompression bombs.
pub const MAX_DECODED_LEN: u64 = 1_000_000_000;

const BROTLI_BUFFER_SIZE: usize = 8 * 1024;

/// A `Content-Encoding` the proxy knows how to undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
    Brotli,
}

impl ContentEncoding {
    /// Parse a `Content-Encoding` header value. A missing or empty header is
    /// identity, anything other than `gzip`, `deflate` or `br` is rejected.
    pub fn from_header(value: Option<&str>) -> Result<Self, ProxyError> {
        let value = value.unwrap_or("").trim().to_ascii_lowercase();
        match value.as_str() {
            "" | "identity" => Ok(Self::Identity),
            "gzip" | "x-gzip" => Ok(Self::Gzip),
            "deflate" => Ok(Self::Deflate),
            "br" => Ok(Self::Brotli),
            _ => Err(ProxyError::UnsupportedEncoding(value)),
        }
    }

    /// The header token for this encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Brotli => "br",
        }
    }

    /// Decode a complete body.
    pub fn decode(&self, data: Bytes) -> io::Result<Bytes> {
        match self {
            Self::Identity => Ok(data),
            Self::Gzip => read_limited(flate2::read::MultiGzDecoder::new(&data[..])),
            Self::Deflate => decode_deflate(&data),
            Self::Brotli => read_limited(brotli::Decompressor::new(&data[..], BROTLI_BUFFER_SIZE)),
        }
    }
}

/// `deflate` is meant to be zlib-wrapped, but some servers send raw deflate.
fn decode_deflate(data: &[u8]) -> io::Result<Bytes> {
    match read_limited(flate2::read::ZlibDecoder::new(data)) {
        Ok(decoded) => Ok(decoded),
        Err(zlib_err) => read_limited(flate2::read::DeflateDecoder::new(data)).map_err(|_| zlib_err),
    }
}

fn read_limited<R: Read>(reader: R) -> io::Result<Bytes> {
    let mut out = Vec::new();
    let read = reader.take(MAX_DECODED_LEN + 1).read_to_end(&mut out)?;
    if read as u64 > MAX_DECODED_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "decoded body exceeds size limit",
        ));
    }
    Ok(Bytes::from(out))
}
