use std::io::{Read, Write};

use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};

use super::errors::{CrlError, CrlResult};

/// zlib-compress a serialized shard.
pub fn zlib_compress(blob: &[u8]) -> CrlResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(blob).map_err(CrlError::Compression)?;
    encoder.finish().map_err(CrlError::Compression)
}

pub fn zlib_decompress(zipped: &[u8]) -> CrlResult<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(zipped)
        .read_to_end(&mut out)
        .map_err(CrlError::Decompression)?;
    Ok(out)
}
