//! Thin `flate2` wrappers used by content-stream compression and by the
//! cross-reference-stream / object-stream decompression the decryptor needs.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{PdfCraftError, Result};
use crate::util::pool::PooledBuffer;

/// Compresses `data` with Flate. The working buffer is checked out of the
/// process-wide pool rather than allocated fresh, since content streams are
/// compressed once per page and the decryptor's object-stream handling
/// compresses/decompresses repeatedly per document.
pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut scratch = PooledBuffer::checkout();
    {
        let mut encoder = ZlibEncoder::new(scratch.as_mut(), Compression::default());
        encoder.write_all(data).expect("writing to an in-memory encoder cannot fail");
        encoder.finish().expect("finishing an in-memory encoder cannot fail");
    }
    scratch.as_mut().clone()
}

pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut scratch = PooledBuffer::checkout();
    {
        let mut decoder = ZlibDecoder::new(data);
        decoder.read_to_end(scratch.as_mut()).map_err(|e| PdfCraftError::Parse {
            offset: 0,
            message: format!("zlib inflate failed: {e}"),
        })?;
    }
    Ok(scratch.as_mut().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let data = b"Hello World, Hello World, Hello World".to_vec();
        let compressed = deflate(&data);
        let decompressed = inflate(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }
}
