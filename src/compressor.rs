//! Compressor identifiers, compressor-specific tuning options, and the
//! pluggable [`Extractor`] trait used to decompress metablocks and data
//! blocks.

use std::io::Read;

use deku::prelude::*;
use tracing::trace;

use crate::error::SqshError;

/// Compressor id stored in the superblock. `None` means the archive stores
/// everything uncompressed and decompression is a memcpy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, DekuRead, DekuWrite, Default)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
#[deku(id_type = "u16")]
#[rustfmt::skip]
pub enum Compressor {
    None = 0,
    Gzip = 1,
    Lzma = 2,
    Lzo  = 3,
    #[default]
    Xz   = 4,
    Lz4  = 5,
    Zstd = 6,
}

/// Compressor-specific tuning, present immediately after the superblock when
/// `compressor_options_are_present` is set. Parsing this is best-effort: a
/// failure here does not fail archive open, only compression introspection.
#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone, Copy)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian, compressor: Compressor")]
#[deku(id = "compressor")]
pub enum CompressionOptions {
    #[deku(id = "Compressor::Gzip")]
    Gzip(GzipOptions),

    #[deku(id = "Compressor::Lzo")]
    Lzo(LzoOptions),

    #[deku(id = "Compressor::Xz")]
    Xz(XzOptions),

    #[deku(id = "Compressor::Lz4")]
    Lz4(Lz4Options),

    #[deku(id = "Compressor::Zstd")]
    Zstd(ZstdOptions),

    #[deku(id = "Compressor::Lzma")]
    Lzma,
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone, Copy)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct GzipOptions {
    pub compression_level: u32,
    pub window_size: u16,
    pub strategies: u16,
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone, Copy)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct LzoOptions {
    pub algorithm: u32,
    pub compression_level: u32,
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone, Copy)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct XzOptions {
    pub dictionary_size: u32,
    pub filters: u32,
    // squashfs-tools emits two more optional u16 fields here that the
    // kernel ignores; only parse them if present.
    #[deku(cond = "!deku::reader.end()")]
    pub bit_opts: Option<u16>,
    #[deku(cond = "!deku::reader.end()")]
    pub fb: Option<u16>,
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone, Copy)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct Lz4Options {
    pub version: u32,
    pub flags: u32,
}

#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone, Copy)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct ZstdOptions {
    pub compression_level: u32,
}

/// Decompresses a single metablock or data block.
///
/// A caller may supply a custom implementation (e.g. a vendor format with a
/// nonstandard LZMA header) via [`crate::OpenOptions::extractor`]; the
/// default implementation, [`DefaultExtractor`], covers the compressors
/// enabled by this crate's cargo features.
pub trait Extractor: Send + Sync {
    /// Decompress `compressed` (the on-disk bytes of one block) into `out`,
    /// appending. `compressor` is the archive-wide compressor id from the
    /// superblock.
    fn decompress(
        &self,
        compressed: &[u8],
        out: &mut Vec<u8>,
        compressor: Compressor,
    ) -> Result<(), SqshError>;
}

/// The built-in [`Extractor`], dispatching on cargo feature flags.
#[derive(Copy, Clone, Default)]
pub struct DefaultExtractor;

impl Extractor for DefaultExtractor {
    fn decompress(
        &self,
        bytes: &[u8],
        out: &mut Vec<u8>,
        compressor: Compressor,
    ) -> Result<(), SqshError> {
        trace!(?compressor, len = bytes.len(), "decompressing block");
        match compressor {
            Compressor::None => out.extend_from_slice(bytes),
            #[cfg(feature = "gzip")]
            Compressor::Gzip => {
                let mut decoder = flate2::read::ZlibDecoder::new(bytes);
                decoder
                    .read_to_end(out)
                    .map_err(|_| SqshError::CompressionDecompress)?;
            }
            #[cfg(feature = "xz")]
            Compressor::Xz => {
                let mut decoder = xz2::read::XzDecoder::new(bytes);
                decoder
                    .read_to_end(out)
                    .map_err(|_| SqshError::CompressionDecompress)?;
            }
            #[cfg(feature = "lzo")]
            Compressor::Lzo => {
                let start = out.len();
                out.resize(start + bytes.len().saturating_mul(16) + 64, 0);
                let (written, error) =
                    rust_lzo::LZOContext::decompress_to_slice(bytes, &mut out[start..]);
                let written = written.len();
                out.truncate(start + written);
                if error != rust_lzo::LZOError::OK {
                    return Err(SqshError::CompressionDecompress);
                }
            }
            #[cfg(feature = "zstd")]
            Compressor::Zstd => {
                let mut decoder = zstd::bulk::Decompressor::new()
                    .map_err(|_| SqshError::CompressionDecompress)?;
                decoder
                    .decompress_to_buffer(bytes, out)
                    .map_err(|_| SqshError::CompressionDecompress)?;
            }
            #[cfg(feature = "lz4")]
            Compressor::Lz4 => {
                let start = out.len();
                // The block's uncompressed size is bounded by the archive's
                // block_size; callers pre-size `out`'s capacity accordingly
                // before calling decompress, so grow to capacity here.
                let cap = out.capacity().max(start + bytes.len() * 4 + 4096);
                out.resize(cap, 0);
                let written = lz4_flex::decompress_into(bytes, &mut out[start..])
                    .map_err(|_| SqshError::CompressionDecompress)?;
                out.truncate(start + written);
            }
            other => return Err(SqshError::CompressionUnsupported(other)),
        }
        Ok(())
    }
}
