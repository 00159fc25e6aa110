//! Block compressor: zlib (deflate) at a fixed level.
//!
//! Each block is an independent, self-terminating zlib stream, so any block
//! can be decompressed without touching its neighbours. The raw size recorded
//! in the metadata table is only a pre-allocation hint here.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::error::{CcolError, Result};

/// zlib level used for every block. Changing it does not affect readers.
pub const DEFLATE_LEVEL: u32 = 6;

/// Compress `raw` into a single zlib stream.
pub fn compress(raw: &[u8]) -> Result<Vec<u8>> {
    let mut deflater = Compress::new(Compression::new(DEFLATE_LEVEL), true);
    // zlib worst case is a few bytes per 16 KB stored block plus framing.
    let mut out = Vec::with_capacity(raw.len() + raw.len() / 1000 + 64);
    loop {
        let consumed = deflater.total_in() as usize;
        let status = deflater
            .compress_vec(&raw[consumed..], &mut out, FlushCompress::Finish)
            .map_err(|e| {
                CcolError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
            })?;
        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => out.reserve(out.capacity().max(64)),
        }
    }
}

/// Decompress one zlib stream.
///
/// Fails with `CorruptBlock` on an invalid stream, a stream that ends early,
/// or trailing bytes after the end of the stream. Never returns partial data.
pub fn decompress(compressed: &[u8], raw_size_hint: Option<usize>) -> Result<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    // Deflate cannot expand beyond ~1032:1, which bounds a bogus hint.
    let initial = raw_size_hint
        .unwrap_or(compressed.len() * 4)
        .min(compressed.len().saturating_mul(1032))
        .max(64);
    let mut out = Vec::with_capacity(initial);

    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity());
        }
        let consumed = inflater.total_in() as usize;
        let produced = inflater.total_out();
        let status = inflater
            .decompress_vec(&compressed[consumed..], &mut out, FlushDecompress::Finish)
            .map_err(|e| CcolError::CorruptBlock(format!("invalid deflate stream: {}", e)))?;

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                let stalled = inflater.total_in() as usize == consumed
                    && inflater.total_out() == produced
                    && out.len() < out.capacity();
                if stalled {
                    return Err(CcolError::CorruptBlock(format!(
                        "deflate stream truncated after {} of {} bytes",
                        consumed,
                        compressed.len()
                    )));
                }
            }
        }
    }

    let consumed = inflater.total_in() as usize;
    if consumed != compressed.len() {
        return Err(CcolError::CorruptBlock(format!(
            "{} trailing bytes after deflate stream",
            compressed.len() - consumed
        )));
    }
    Ok(out)
}
