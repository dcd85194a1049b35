//! Compressed chunk framing.
//!
//! The codec itself is a [`Decompressor`]; this module only walks the chunk
//! headers and stitches the uncompressed stream back together.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::archive::{Archive, ArchiveVersion};
use crate::error::{Error, Result};
use crate::summary::{CompressedChunk, CompressionFlags, PackageSummary, PACKAGE_TAG};

/// Byte count a block covers when the chunk header leaves it unset.
pub const DEFAULT_BLOCK_SIZE: i32 = 0x20000;

/// Upper bound on deflate's expansion ratio.
const MAX_INFLATE_RATIO: usize = 1032;

pub trait Decompressor {
    /// Inflate one sub-block into exactly `uncompressed_size` bytes.
    fn decompress(
        &self,
        flags: CompressionFlags,
        input: &[u8],
        uncompressed_size: usize,
    ) -> Result<Vec<u8>>;
}

/// zlib-only decompressor.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZlibDecompressor;

impl Decompressor for ZlibDecompressor {
    fn decompress(
        &self,
        flags: CompressionFlags,
        input: &[u8],
        uncompressed_size: usize,
    ) -> Result<Vec<u8>> {
        if !flags.contains(CompressionFlags::ZLIB) {
            return Err(Error::Decompression(format!(
                "unsupported compression flags {:?}",
                flags
            )));
        }
        let capacity = uncompressed_size.min(input.len().saturating_mul(MAX_INFLATE_RATIO));
        let mut out = Vec::with_capacity(capacity);
        ZlibDecoder::new(input)
            .read_to_end(&mut out)
            .map_err(|e| Error::Decompression(e.to_string()))?;
        if out.len() != uncompressed_size {
            return Err(Error::Decompression(format!(
                "block inflated to {} bytes, expected {}",
                out.len(),
                uncompressed_size
            )));
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy)]
struct BlockSize {
    compressed: i32,
    uncompressed: i32,
}

/// Decode one chunk located by `chunk` inside `raw`.
///
/// Layout: signature, block size, total compressed and uncompressed sizes,
/// then one `(compressed, uncompressed)` pair per block, then the block data.
pub fn decompress_chunk(
    raw: &[u8],
    chunk: &CompressedChunk,
    flags: CompressionFlags,
    big_endian: bool,
    decompressor: &dyn Decompressor,
) -> Result<Vec<u8>> {
    let mut ar = Archive::new(raw, ArchiveVersion::default().big_endian(big_endian));
    ar.seek(chunk.compressed_offset as usize)?;
    let signature = ar.read_u32()?;
    if signature != PACKAGE_TAG {
        return Err(Error::format(
            "compressed chunk",
            format!(
                "signature {:#010x} at {:#x} does not match the package tag",
                signature, chunk.compressed_offset
            ),
        ));
    }
    let mut block_size = ar.read_i32()?;
    if block_size <= 0 {
        block_size = DEFAULT_BLOCK_SIZE;
    }
    let _total_compressed = ar.read_i32()?;
    let total_uncompressed = ar.read_i32()?;
    if total_uncompressed < 0 {
        return Err(Error::format("compressed chunk", "negative uncompressed size"));
    }
    let block_count = (total_uncompressed as i64 + block_size as i64 - 1) / block_size as i64;
    // Each block header is two i32s.
    if block_count * 8 > ar.remaining() as i64 {
        return Err(Error::format(
            "compressed chunk",
            format!(
                "{} blocks at {:#x} do not fit in the file",
                block_count, chunk.compressed_offset
            ),
        ));
    }
    let blocks = ar.read_array(block_count as i32, |ar| {
        Ok(BlockSize {
            compressed: ar.read_i32()?,
            uncompressed: ar.read_i32()?,
        })
    })?;

    let mut out = Vec::new();
    for block in blocks {
        if block.compressed < 0 || block.uncompressed < 0 {
            return Err(Error::format("compressed chunk", "negative block size"));
        }
        let input = ar.read_bytes(block.compressed as usize)?;
        out.extend(decompressor.decompress(flags, input, block.uncompressed as usize)?);
    }
    if out.len() != total_uncompressed as usize {
        return Err(Error::Decompression(format!(
            "chunk at {:#x} inflated to {} bytes, expected {}",
            chunk.compressed_offset,
            out.len(),
            total_uncompressed
        )));
    }
    Ok(out)
}

/// Rebuild the uncompressed package: the summary bytes ahead of the first
/// chunk are kept as-is and each chunk lands at its uncompressed offset.
pub fn decompress_package(
    raw: &[u8],
    summary: &PackageSummary,
    decompressor: &dyn Decompressor,
) -> Result<Vec<u8>> {
    let chunks = &summary.compressed_chunks;
    let Some(first) = chunks.iter().map(|c| c.uncompressed_offset).min() else {
        return Ok(raw.to_vec());
    };
    let total = chunks
        .iter()
        .map(|c| c.uncompressed_offset as i64 + c.uncompressed_size as i64)
        .max()
        .unwrap_or(0);
    if first < 0 || total < 0 || total > u32::MAX as i64 {
        return Err(Error::format("compressed chunk", "chunk offsets overflow"));
    }
    let head = (first as usize).min(raw.len());
    let mut out = vec![0u8; (total as usize).max(head)];
    out[..head].copy_from_slice(&raw[..head]);

    for chunk in chunks {
        let data = decompress_chunk(
            raw,
            chunk,
            summary.compression_flags,
            summary.big_endian,
            decompressor,
        )?;
        let start = chunk.uncompressed_offset as usize;
        if data.len() != chunk.uncompressed_size as usize || start + data.len() > out.len() {
            return Err(Error::Decompression(format!(
                "chunk at {:#x} inflated to {} bytes, summary expects {}",
                chunk.compressed_offset,
                data.len(),
                chunk.uncompressed_size
            )));
        }
        out[start..start + data.len()].copy_from_slice(&data);
        log::debug!(
            "inflated chunk {:#x}+{:#x} -> {:#x}+{:#x}",
            chunk.compressed_offset,
            chunk.compressed_size,
            chunk.uncompressed_offset,
            data.len()
        );
    }
    Ok(out)
}
