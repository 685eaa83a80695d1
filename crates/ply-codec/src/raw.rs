//! Raw gaussian point-cloud reading and writing
//!
//! A raw file stores one `vertex` element, either in the full gaussian
//! schema (position, log-space scale, quaternion, SH-DC color, logit
//! opacity) or in the legacy point schema (position plus 8-bit RGB). The
//! schema is decided once per file and matched exhaustively afterwards.

use crate::error::{CodecError, Result};
use crate::header::{PlyElement, PlyHeader, PropertyType};
use crate::packing::{logit, sigmoid, SH_C0};

/// Log-space scale assigned to legacy points without scale properties
pub const LEGACY_SCALE: f32 = 0.01;

/// One decoded splat with all storage transforms already applied:
/// color is display-space [0, 1], opacity is [0, 1], scale stays
/// log-space, the quaternion is unnormalized as stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianPoint {
    pub position: [f32; 3],
    /// Log-space scale; exponentiate for world units
    pub scale: [f32; 3],
    pub rotation: [f32; 4],
    /// Display-space RGB in [0, 1]
    pub color: [f32; 3],
    /// Opacity in [0, 1]
    pub opacity: f32,
}

/// Which vertex layout a raw file declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// Full gaussian attributes
    Gaussian,
    /// Position plus 8-bit RGB only
    Legacy,
}

/// A fully decoded raw point cloud
#[derive(Debug, Clone)]
pub struct RawCloud {
    pub points: Vec<GaussianPoint>,
    pub schema: SchemaKind,
}

/// Per-schema property layout, resolved once before the point loop
enum SchemaLayout {
    Gaussian {
        position: [FieldRef; 3],
        f_dc: [FieldRef; 3],
        opacity: FieldRef,
        scale: [FieldRef; 3],
        rot: [FieldRef; 4],
    },
    Legacy {
        position: [FieldRef; 3],
        rgb: [FieldRef; 3],
    },
}

#[derive(Clone, Copy)]
struct FieldRef {
    offset: usize,
    ty: PropertyType,
}

fn field(element: &PlyElement, name: &str) -> Result<FieldRef> {
    element
        .property_offset(name)
        .map(|(offset, ty)| FieldRef { offset, ty })
        .ok_or_else(|| CodecError::MissingProperty(name.to_string()))
}

fn fields<const N: usize>(element: &PlyElement, names: [&str; N]) -> Result<[FieldRef; N]> {
    let mut out = [FieldRef {
        offset: 0,
        ty: PropertyType::Float,
    }; N];
    for (slot, name) in out.iter_mut().zip(names) {
        *slot = field(element, name)?;
    }
    Ok(out)
}

impl SchemaLayout {
    fn detect(element: &PlyElement) -> Result<Self> {
        if element.has_property("scale_0") {
            Ok(Self::Gaussian {
                position: fields(element, ["x", "y", "z"])?,
                f_dc: fields(element, ["f_dc_0", "f_dc_1", "f_dc_2"])?,
                opacity: field(element, "opacity")?,
                scale: fields(element, ["scale_0", "scale_1", "scale_2"])?,
                rot: fields(element, ["rot_0", "rot_1", "rot_2", "rot_3"])?,
            })
        } else if element.has_property("red") {
            Ok(Self::Legacy {
                position: fields(element, ["x", "y", "z"])?,
                rgb: fields(element, ["red", "green", "blue"])?,
            })
        } else {
            Err(CodecError::MissingProperty(
                "scale_0 or red (neither gaussian nor legacy vertex layout)".to_string(),
            ))
        }
    }

    fn kind(&self) -> SchemaKind {
        match self {
            Self::Gaussian { .. } => SchemaKind::Gaussian,
            Self::Legacy { .. } => SchemaKind::Legacy,
        }
    }
}

/// Read one scalar property as f32, converting from its declared type
fn read_scalar(record: &[u8], field: FieldRef) -> f32 {
    let at = field.offset;
    match field.ty {
        PropertyType::Char => record[at] as i8 as f32,
        PropertyType::UChar => record[at] as f32,
        PropertyType::Short => i16::from_le_bytes([record[at], record[at + 1]]) as f32,
        PropertyType::UShort => u16::from_le_bytes([record[at], record[at + 1]]) as f32,
        PropertyType::Int => {
            i32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]]) as f32
        }
        PropertyType::UInt => {
            u32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]]) as f32
        }
        PropertyType::Float => {
            f32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
        }
        PropertyType::Double => f64::from_le_bytes([
            record[at],
            record[at + 1],
            record[at + 2],
            record[at + 3],
            record[at + 4],
            record[at + 5],
            record[at + 6],
            record[at + 7],
        ]) as f32,
    }
}

fn read_vec<const N: usize>(record: &[u8], refs: [FieldRef; N]) -> [f32; N] {
    let mut out = [0.0; N];
    for (slot, r) in out.iter_mut().zip(refs) {
        *slot = read_scalar(record, r);
    }
    out
}

impl RawCloud {
    /// Parse a raw point-cloud file.
    ///
    /// # Errors
    ///
    /// Header errors propagate from [`PlyHeader::parse`]; a file without a
    /// `vertex` element or with neither schema's properties fails with
    /// `MissingElement`/`MissingProperty`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = PlyHeader::parse(data)?;
        let vertex = header
            .element("vertex")
            .ok_or_else(|| CodecError::MissingElement("vertex".to_string()))?;
        let layout = SchemaLayout::detect(vertex)?;
        let payload = header.element_data(data, vertex)?;

        let mut points = Vec::with_capacity(vertex.count);
        for record in payload.chunks_exact(vertex.stride) {
            points.push(match &layout {
                SchemaLayout::Gaussian {
                    position,
                    f_dc,
                    opacity,
                    scale,
                    rot,
                } => {
                    let dc = read_vec(record, *f_dc);
                    GaussianPoint {
                        position: read_vec(record, *position),
                        scale: read_vec(record, *scale),
                        rotation: read_vec(record, *rot),
                        color: [
                            0.5 + SH_C0 * dc[0],
                            0.5 + SH_C0 * dc[1],
                            0.5 + SH_C0 * dc[2],
                        ],
                        opacity: sigmoid(read_scalar(record, *opacity)),
                    }
                }
                SchemaLayout::Legacy { position, rgb } => {
                    let c = read_vec(record, *rgb);
                    GaussianPoint {
                        position: read_vec(record, *position),
                        scale: [LEGACY_SCALE.ln(); 3],
                        rotation: [1.0, 0.0, 0.0, 0.0],
                        color: [c[0] / 255.0, c[1] / 255.0, c[2] / 255.0],
                        opacity: 1.0,
                    }
                }
            });
        }

        Ok(Self {
            points,
            schema: layout.kind(),
        })
    }

    /// Serialize as a gaussian-schema raw file.
    ///
    /// Inverts the parse-time color and opacity transforms, so
    /// parse -> write round-trips up to float precision.
    #[must_use]
    pub fn write(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.points.len() * 14 * 4);
        out.extend_from_slice(b"ply\nformat binary_little_endian 1.0\n");
        out.extend_from_slice(format!("element vertex {}\n", self.points.len()).as_bytes());
        for name in [
            "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "opacity", "scale_0", "scale_1",
            "scale_2", "rot_0", "rot_1", "rot_2", "rot_3",
        ] {
            out.extend_from_slice(format!("property float {name}\n").as_bytes());
        }
        out.extend_from_slice(b"end_header\n");

        for p in &self.points {
            let mut push = |v: f32| out.extend_from_slice(&v.to_le_bytes());
            push(p.position[0]);
            push(p.position[1]);
            push(p.position[2]);
            push((p.color[0] - 0.5) / SH_C0);
            push((p.color[1] - 0.5) / SH_C0);
            push((p.color[2] - 0.5) / SH_C0);
            push(logit(p.opacity));
            push(p.scale[0]);
            push(p.scale[1]);
            push(p.scale[2]);
            push(p.rotation[0]);
            push(p.rotation[1]);
            push(p.rotation[2]);
            push(p.rotation[3]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_fixture(count: usize) -> Vec<GaussianPoint> {
        (0..count)
            .map(|i| {
                let t = i as f32 / count.max(1) as f32;
                GaussianPoint {
                    position: [t * 4.0 - 2.0, (t * 7.0).sin(), t * t],
                    scale: [-4.0 + t, -3.5 + t * 0.5, -5.0 + t * 2.0],
                    rotation: [1.0 - t * 0.5, t * 0.3, -t * 0.2, 0.1],
                    color: [t, 1.0 - t, 0.25 + t * 0.5],
                    opacity: 0.1 + 0.8 * t,
                }
            })
            .collect()
    }

    #[test]
    fn test_write_parse_round_trip() {
        let cloud = RawCloud {
            points: gaussian_fixture(33),
            schema: SchemaKind::Gaussian,
        };
        let parsed = RawCloud::parse(&cloud.write()).unwrap();
        assert_eq!(parsed.schema, SchemaKind::Gaussian);
        assert_eq!(parsed.points.len(), 33);
        for (a, b) in cloud.points.iter().zip(&parsed.points) {
            for k in 0..3 {
                assert!((a.position[k] - b.position[k]).abs() < 1e-6);
                assert!((a.scale[k] - b.scale[k]).abs() < 1e-6);
                assert!((a.color[k] - b.color[k]).abs() < 1e-5);
            }
            assert!((a.opacity - b.opacity).abs() < 1e-4);
        }
    }

    #[test]
    fn test_legacy_schema_gets_defaults() {
        let mut data = b"ply\nformat binary_little_endian 1.0\n\
             element vertex 1\n\
             property float x\nproperty float y\nproperty float z\n\
             property uchar red\nproperty uchar green\nproperty uchar blue\n\
             end_header\n"
            .to_vec();
        data.extend_from_slice(&1.0f32.to_le_bytes());
        data.extend_from_slice(&2.0f32.to_le_bytes());
        data.extend_from_slice(&3.0f32.to_le_bytes());
        data.extend_from_slice(&[255, 128, 0]);

        let cloud = RawCloud::parse(&data).unwrap();
        assert_eq!(cloud.schema, SchemaKind::Legacy);
        let p = &cloud.points[0];
        assert_eq!(p.position, [1.0, 2.0, 3.0]);
        assert!((p.scale[0] - LEGACY_SCALE.ln()).abs() < 1e-6);
        assert_eq!(p.rotation, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(p.opacity, 1.0);
        assert!((p.color[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_vertex_without_either_schema_fails() {
        let data = b"ply\nformat binary_little_endian 1.0\n\
             element vertex 0\nproperty float x\nproperty float y\nproperty float z\n\
             end_header\n";
        assert!(matches!(
            RawCloud::parse(data),
            Err(CodecError::MissingProperty(_))
        ));
    }

    #[test]
    fn test_missing_vertex_element_fails() {
        let data = b"ply\nformat binary_little_endian 1.0\nelement face 0\nend_header\n";
        assert!(matches!(
            RawCloud::parse(data),
            Err(CodecError::MissingElement(_))
        ));
    }
}
