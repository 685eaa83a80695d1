//! Chunk-compressed point-cloud format
//!
//! Points are grouped into fixed-size chunks; each chunk carries min/max
//! bounds for position, log-space scale, and display-space color, and each
//! point stores four packed 32-bit words decoded against those bounds.

use bytemuck::{Pod, Zeroable};

use crate::error::{CodecError, Result};
use crate::header::PlyHeader;
use crate::packing::{
    denormalize, normalize_bound, normalize_quat, pack_111011, pack_8888, pack_quat,
    unpack_111011, unpack_8888, unpack_quat, CHUNK_SIZE,
};
use crate::raw::{GaussianPoint, RawCloud, SchemaKind};

/// Quantization bounds for one chunk of points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkBounds {
    pub pos_min: [f32; 3],
    pub pos_max: [f32; 3],
    pub scale_min: [f32; 3],
    pub scale_max: [f32; 3],
    pub color_min: [f32; 3],
    pub color_max: [f32; 3],
}

impl ChunkBounds {
    /// Floats per chunk record in the file
    pub const FLOAT_COUNT: usize = 18;

    fn from_floats(f: &[f32]) -> Self {
        Self {
            pos_min: [f[0], f[1], f[2]],
            pos_max: [f[3], f[4], f[5]],
            scale_min: [f[6], f[7], f[8]],
            scale_max: [f[9], f[10], f[11]],
            color_min: [f[12], f[13], f[14]],
            color_max: [f[15], f[16], f[17]],
        }
    }

    fn to_floats(self) -> [f32; Self::FLOAT_COUNT] {
        let mut out = [0.0; Self::FLOAT_COUNT];
        out[0..3].copy_from_slice(&self.pos_min);
        out[3..6].copy_from_slice(&self.pos_max);
        out[6..9].copy_from_slice(&self.scale_min);
        out[9..12].copy_from_slice(&self.scale_max);
        out[12..15].copy_from_slice(&self.color_min);
        out[15..18].copy_from_slice(&self.color_max);
        out
    }

    /// Bounds over one run of points
    fn measure(points: &[GaussianPoint]) -> Self {
        let mut b = Self {
            pos_min: [f32::INFINITY; 3],
            pos_max: [f32::NEG_INFINITY; 3],
            scale_min: [f32::INFINITY; 3],
            scale_max: [f32::NEG_INFINITY; 3],
            color_min: [f32::INFINITY; 3],
            color_max: [f32::NEG_INFINITY; 3],
        };
        for p in points {
            for k in 0..3 {
                b.pos_min[k] = b.pos_min[k].min(p.position[k]);
                b.pos_max[k] = b.pos_max[k].max(p.position[k]);
                b.scale_min[k] = b.scale_min[k].min(p.scale[k]);
                b.scale_max[k] = b.scale_max[k].max(p.scale[k]);
                b.color_min[k] = b.color_min[k].min(p.color[k]);
                b.color_max[k] = b.color_max[k].max(p.color[k]);
            }
        }
        b
    }
}

/// One chunk-compressed vertex: four packed 32-bit words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PackedGaussian {
    pub position: u32,
    pub rotation: u32,
    pub scale: u32,
    pub color: u32,
}

/// A parsed chunk-compressed point cloud
#[derive(Debug, Clone)]
pub struct CompressedCloud {
    pub chunks: Vec<ChunkBounds>,
    pub vertices: Vec<PackedGaussian>,
}

impl CompressedCloud {
    /// Parse a chunk-compressed file.
    ///
    /// # Errors
    ///
    /// `MissingElement` when the `chunk` or `vertex` element is absent,
    /// `MalformedHeader` on a bad chunk layout or a chunk/vertex count
    /// mismatch, `TruncatedPayload` when the data block is short.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = PlyHeader::parse(data)?;

        let chunk_elem = header
            .element("chunk")
            .ok_or_else(|| CodecError::MissingElement("chunk".to_string()))?;
        if chunk_elem.stride != ChunkBounds::FLOAT_COUNT * 4 {
            return Err(CodecError::MalformedHeader(format!(
                "chunk element must carry {} float bounds, stride is {}",
                ChunkBounds::FLOAT_COUNT,
                chunk_elem.stride
            )));
        }

        let vertex_elem = header
            .element("vertex")
            .ok_or_else(|| CodecError::MissingElement("vertex".to_string()))?;
        let mut word_offsets = [0usize; 4];
        for (slot, name) in word_offsets.iter_mut().zip([
            "packed_position",
            "packed_rotation",
            "packed_scale",
            "packed_color",
        ]) {
            let (offset, _) = vertex_elem
                .property_offset(name)
                .ok_or_else(|| CodecError::MissingProperty(name.to_string()))?;
            *slot = offset;
        }

        let expected_chunks = vertex_elem.count.div_ceil(CHUNK_SIZE);
        if chunk_elem.count != expected_chunks {
            return Err(CodecError::MalformedHeader(format!(
                "{} chunks declared for {} vertices, expected {}",
                chunk_elem.count, vertex_elem.count, expected_chunks
            )));
        }

        let chunk_data = header.element_data(data, chunk_elem)?;
        let mut chunks = Vec::with_capacity(chunk_elem.count);
        for record in chunk_data.chunks_exact(chunk_elem.stride) {
            let mut floats = [0.0f32; ChunkBounds::FLOAT_COUNT];
            for (f, bytes) in floats.iter_mut().zip(record.chunks_exact(4)) {
                *f = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            chunks.push(ChunkBounds::from_floats(&floats));
        }

        let vertex_data = header.element_data(data, vertex_elem)?;
        let read_word = |record: &[u8], at: usize| {
            u32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
        };
        let mut vertices = Vec::with_capacity(vertex_elem.count);
        for record in vertex_data.chunks_exact(vertex_elem.stride) {
            vertices.push(PackedGaussian {
                position: read_word(record, word_offsets[0]),
                rotation: read_word(record, word_offsets[1]),
                scale: read_word(record, word_offsets[2]),
                color: read_word(record, word_offsets[3]),
            });
        }

        Ok(Self { chunks, vertices })
    }

    /// Bounds governing the vertex at `index`
    #[must_use]
    pub fn bounds_for(&self, index: usize) -> &ChunkBounds {
        &self.chunks[index / CHUNK_SIZE]
    }

    /// Decode one vertex against its chunk bounds
    #[must_use]
    pub fn decode_point(&self, index: usize) -> GaussianPoint {
        decode_vertex(&self.vertices[index], self.bounds_for(index))
    }

    /// Serialize as a chunk-compressed file with the canonical header
    #[must_use]
    pub fn write(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(512 + self.chunks.len() * 72 + self.vertices.len() * 16);
        out.extend_from_slice(b"ply\nformat binary_little_endian 1.0\n");
        out.extend_from_slice(format!("element chunk {}\n", self.chunks.len()).as_bytes());
        for name in [
            "min_x", "min_y", "min_z", "max_x", "max_y", "max_z", "min_scale_x", "min_scale_y",
            "min_scale_z", "max_scale_x", "max_scale_y", "max_scale_z", "min_r", "min_g",
            "min_b", "max_r", "max_g", "max_b",
        ] {
            out.extend_from_slice(format!("property float {name}\n").as_bytes());
        }
        out.extend_from_slice(format!("element vertex {}\n", self.vertices.len()).as_bytes());
        for name in [
            "packed_position",
            "packed_rotation",
            "packed_scale",
            "packed_color",
        ] {
            out.extend_from_slice(format!("property uint {name}\n").as_bytes());
        }
        out.extend_from_slice(b"end_header\n");

        for chunk in &self.chunks {
            for f in chunk.to_floats() {
                out.extend_from_slice(&f.to_le_bytes());
            }
        }
        for v in &self.vertices {
            out.extend_from_slice(&v.position.to_le_bytes());
            out.extend_from_slice(&v.rotation.to_le_bytes());
            out.extend_from_slice(&v.scale.to_le_bytes());
            out.extend_from_slice(&v.color.to_le_bytes());
        }
        out
    }
}

/// Quantize a raw cloud into chunk-compressed form
#[must_use]
pub fn compress(cloud: &RawCloud) -> CompressedCloud {
    let mut chunks = Vec::with_capacity(cloud.points.len().div_ceil(CHUNK_SIZE));
    let mut vertices = Vec::with_capacity(cloud.points.len());

    for run in cloud.points.chunks(CHUNK_SIZE) {
        let bounds = ChunkBounds::measure(run);
        for p in run {
            vertices.push(encode_vertex(p, &bounds));
        }
        chunks.push(bounds);
    }

    CompressedCloud { chunks, vertices }
}

/// Decode every vertex back into raw points
#[must_use]
pub fn decompress(cloud: &CompressedCloud) -> RawCloud {
    let points = (0..cloud.vertices.len())
        .map(|i| cloud.decode_point(i))
        .collect();
    RawCloud {
        points,
        schema: SchemaKind::Gaussian,
    }
}

fn encode_vertex(p: &GaussianPoint, b: &ChunkBounds) -> PackedGaussian {
    let norm3 = |v: [f32; 3], min: [f32; 3], max: [f32; 3]| {
        [
            normalize_bound(v[0], min[0], max[0]),
            normalize_bound(v[1], min[1], max[1]),
            normalize_bound(v[2], min[2], max[2]),
        ]
    };
    let color = norm3(p.color, b.color_min, b.color_max);
    PackedGaussian {
        position: pack_111011(norm3(p.position, b.pos_min, b.pos_max)),
        rotation: pack_quat(p.rotation),
        scale: pack_111011(norm3(p.scale, b.scale_min, b.scale_max)),
        color: pack_8888([color[0], color[1], color[2], p.opacity]),
    }
}

/// Shared scalar decode: both backends produce points through this
pub(crate) fn decode_vertex(v: &PackedGaussian, b: &ChunkBounds) -> GaussianPoint {
    let denorm3 = |n: [f32; 3], min: [f32; 3], max: [f32; 3]| {
        [
            denormalize(n[0], min[0], max[0]),
            denormalize(n[1], min[1], max[1]),
            denormalize(n[2], min[2], max[2]),
        ]
    };
    let pos = unpack_111011(v.position);
    let scale = unpack_111011(v.scale);
    let rgba = unpack_8888(v.color);

    GaussianPoint {
        position: denorm3(pos, b.pos_min, b.pos_max),
        scale: denorm3(scale, b.scale_min, b.scale_max),
        rotation: normalize_quat(unpack_quat(v.rotation)),
        color: [
            denormalize(rgba[0], b.color_min[0], b.color_max[0]),
            denormalize(rgba[1], b.color_min[1], b.color_max[1]),
            denormalize(rgba[2], b.color_min[2], b.color_max[2]),
        ],
        opacity: rgba[3],
    }
}
