//! Point-cloud binary codec
//!
//! Parses and writes the three related point-cloud formats a reconstruction
//! job touches:
//!
//! - **raw** gaussian PLY (full or legacy point schema),
//! - **chunk-compressed** PLY (per-chunk bounds plus packed 32-bit words),
//! - **splat**: flat 32-byte records ordered by descending importance.
//!
//! Conversion is pure: bytes in, bytes out, typed [`CodecError`]s. The
//! compressed decode has two backends — a scalar per-point loop and a
//! batch columnar path — that produce identical output.

pub mod batch;
pub mod chunked;
pub mod error;
pub mod header;
pub mod packing;
pub mod raw;
pub mod splat;

pub use batch::build_splat_buffer_batch;
pub use chunked::{compress, decompress, ChunkBounds, CompressedCloud, PackedGaussian};
pub use error::{CodecError, Result};
pub use header::{PlyHeader, PropertyType};
pub use raw::{GaussianPoint, RawCloud, SchemaKind};
pub use splat::{build_splat_buffer, SPLAT_RECORD_SIZE};

/// Source encoding of a conversion input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Raw,
    ChunkCompressed,
}

/// Requested conversion output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Splat,
    ChunkCompressed,
    Raw,
}

/// Which execution backend decodes compressed input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeBackend {
    #[default]
    Scalar,
    Batch,
}

/// Classify a file by its header: a `chunk` element marks the
/// chunk-compressed variant.
///
/// # Errors
///
/// Propagates header parse failures; a file without `chunk` or `vertex`
/// elements fails with `MissingElement`.
pub fn detect_format(data: &[u8]) -> Result<SourceFormat> {
    let header = PlyHeader::parse(data)?;
    if header.element("chunk").is_some() {
        Ok(SourceFormat::ChunkCompressed)
    } else if header.element("vertex").is_some() {
        Ok(SourceFormat::Raw)
    } else {
        Err(CodecError::MissingElement("vertex".to_string()))
    }
}

/// Convert between the three formats using the scalar backend
///
/// # Errors
///
/// Returns a [`CodecError`] when the input cannot be parsed as `source`.
pub fn convert(data: &[u8], source: SourceFormat, target: TargetFormat) -> Result<Vec<u8>> {
    convert_with(data, source, target, DecodeBackend::Scalar)
}

/// Convert between the three formats with an explicit decode backend
///
/// # Errors
///
/// Returns a [`CodecError`] when the input cannot be parsed as `source`.
pub fn convert_with(
    data: &[u8],
    source: SourceFormat,
    target: TargetFormat,
    backend: DecodeBackend,
) -> Result<Vec<u8>> {
    match source {
        SourceFormat::Raw => {
            let cloud = RawCloud::parse(data)?;
            Ok(match target {
                TargetFormat::Splat => build_splat_buffer(&cloud.points),
                TargetFormat::ChunkCompressed => compress(&cloud).write(),
                TargetFormat::Raw => cloud.write(),
            })
        }
        SourceFormat::ChunkCompressed => {
            let cloud = CompressedCloud::parse(data)?;
            Ok(match target {
                TargetFormat::Splat => match backend {
                    DecodeBackend::Scalar => build_splat_buffer(&decompress(&cloud).points),
                    DecodeBackend::Batch => build_splat_buffer_batch(&cloud),
                },
                TargetFormat::ChunkCompressed => cloud.write(),
                TargetFormat::Raw => decompress(&cloud).write(),
            })
        }
    }
}
