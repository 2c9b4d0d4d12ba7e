//! Shared primitives: the zlib compress/decompress pair used by loose
//! objects and pack entries. Pure functions, no state.

use anyhow::Context;
use bytes::Bytes;
use std::io::{Read, Write};

pub fn zlib_compress(data: &[u8]) -> anyhow::Result<Bytes> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .context("Unable to compress content")?;

    encoder
        .finish()
        .map(Bytes::from)
        .context("Unable to finish compressing content")
}

pub fn zlib_decompress(data: &[u8]) -> anyhow::Result<Bytes> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .context("Unable to decompress content")?;

    Ok(Bytes::from(decompressed))
}
