//! Binary PLY header reader
//!
//! Parses the ASCII header of a little-endian binary PLY file into ordered
//! element/property descriptors with computed byte offsets. Pure parse, no
//! side effects; both codec paths consume the result.

use crate::error::{CodecError, Result};

/// Upper bound on the ASCII header; a corrupt file without an end marker
/// must not trigger an unbounded scan.
pub const MAX_HEADER_SIZE: usize = 128 * 1024;

const MAGIC: &[u8] = b"ply\n";
const END_HEADER: &[u8] = b"end_header\n";

/// Scalar property types a binary PLY may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl PropertyType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "char" | "int8" => Some(Self::Char),
            "uchar" | "uint8" => Some(Self::UChar),
            "short" | "int16" => Some(Self::Short),
            "ushort" | "uint16" => Some(Self::UShort),
            "int" | "int32" => Some(Self::Int),
            "uint" | "uint32" => Some(Self::UInt),
            "float" | "float32" => Some(Self::Float),
            "double" | "float64" => Some(Self::Double),
            _ => None,
        }
    }

    /// Size of one value in bytes
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::Char | Self::UChar => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Double => 8,
        }
    }
}

/// One declared property of an element
#[derive(Debug, Clone)]
pub struct PlyProperty {
    pub name: String,
    pub ty: PropertyType,
}

/// One declared element: a contiguous run of fixed-stride records
#[derive(Debug, Clone)]
pub struct PlyElement {
    pub name: String,
    pub count: usize,
    pub properties: Vec<PlyProperty>,
    /// Byte offset of this element's first record, relative to the data start
    pub data_offset: usize,
    /// Bytes per record
    pub stride: usize,
}

impl PlyElement {
    /// Byte offset of a property within one record, with its type
    #[must_use]
    pub fn property_offset(&self, name: &str) -> Option<(usize, PropertyType)> {
        let mut offset = 0;
        for prop in &self.properties {
            if prop.name == name {
                return Some((offset, prop.ty));
            }
            offset += prop.ty.size();
        }
        None
    }

    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p.name == name)
    }

    /// Total payload bytes this element occupies
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.count * self.stride
    }
}

/// Parsed header of a binary PLY file
#[derive(Debug, Clone)]
pub struct PlyHeader {
    pub elements: Vec<PlyElement>,
    /// Byte offset of the binary payload within the file
    pub data_start: usize,
}

impl PlyHeader {
    /// Parse the ASCII header at the front of `data`.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` when the format line does not declare
    /// little-endian binary v1.0; `MalformedHeader` on a missing magic or
    /// end marker (within [`MAX_HEADER_SIZE`]), out-of-order declarations,
    /// unknown primitive types, or unparseable counts.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
            return Err(CodecError::MalformedHeader(
                "missing 'ply' magic bytes".to_string(),
            ));
        }

        let scan = &data[..data.len().min(MAX_HEADER_SIZE)];
        let end_index = find_subslice(scan, END_HEADER).ok_or_else(|| {
            CodecError::MalformedHeader(format!(
                "no end_header marker within the first {MAX_HEADER_SIZE} bytes"
            ))
        })?;
        let data_start = end_index + END_HEADER.len();

        let text = std::str::from_utf8(&data[MAGIC.len()..end_index])
            .map_err(|_| CodecError::MalformedHeader("header is not ASCII".to_string()))?;

        let mut elements: Vec<PlyElement> = Vec::new();
        let mut format_seen = false;

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let keyword = parts.next().unwrap_or_default();
            match keyword {
                "format" => {
                    let encoding = parts.next().unwrap_or_default();
                    let version = parts.next().unwrap_or_default();
                    if encoding != "binary_little_endian" || version != "1.0" {
                        return Err(CodecError::UnsupportedFormat(format!(
                            "{encoding} {version} (expected binary_little_endian 1.0)"
                        )));
                    }
                    format_seen = true;
                }
                "comment" | "obj_info" => {}
                "element" => {
                    let name = parts
                        .next()
                        .ok_or_else(|| {
                            CodecError::MalformedHeader(format!("bad element line: '{line}'"))
                        })?
                        .to_string();
                    let count = parts
                        .next()
                        .and_then(|c| c.parse::<usize>().ok())
                        .ok_or_else(|| {
                            CodecError::MalformedHeader(format!(
                                "bad element count in line: '{line}'"
                            ))
                        })?;
                    elements.push(PlyElement {
                        name,
                        count,
                        properties: Vec::new(),
                        data_offset: 0,
                        stride: 0,
                    });
                }
                "property" => {
                    let element = elements.last_mut().ok_or_else(|| {
                        CodecError::MalformedHeader(
                            "property declared before any element".to_string(),
                        )
                    })?;
                    let ty_str = parts.next().unwrap_or_default();
                    if ty_str == "list" {
                        return Err(CodecError::UnsupportedFormat(
                            "list properties are not supported".to_string(),
                        ));
                    }
                    let ty = PropertyType::parse(ty_str).ok_or_else(|| {
                        CodecError::MalformedHeader(format!("unknown property type '{ty_str}'"))
                    })?;
                    let name = parts
                        .next()
                        .ok_or_else(|| {
                            CodecError::MalformedHeader(format!("bad property line: '{line}'"))
                        })?
                        .to_string();
                    element.stride += ty.size();
                    element.properties.push(PlyProperty { name, ty });
                }
                other => {
                    return Err(CodecError::MalformedHeader(format!(
                        "unrecognized header keyword '{other}'"
                    )));
                }
            }
        }

        if !format_seen {
            return Err(CodecError::MalformedHeader(
                "missing format declaration".to_string(),
            ));
        }

        // Element payloads are laid out back to back after the header.
        let mut offset = 0;
        for element in &mut elements {
            element.data_offset = offset;
            offset += element.byte_len();
        }

        Ok(Self {
            elements,
            data_start,
        })
    }

    #[must_use]
    pub fn element(&self, name: &str) -> Option<&PlyElement> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// Payload slice of an element, bounds-checked against the file
    pub fn element_data<'a>(&self, data: &'a [u8], element: &PlyElement) -> Result<&'a [u8]> {
        let start = self.data_start + element.data_offset;
        let end = start + element.byte_len();
        if end > data.len() {
            return Err(CodecError::TruncatedPayload {
                element: element.name.clone(),
                expected: element.byte_len(),
                actual: data.len().saturating_sub(start),
            });
        }
        Ok(&data[start..end])
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(body: &str) -> Vec<u8> {
        format!("ply\n{body}end_header\n").into_bytes()
    }

    #[test]
    fn test_parses_elements_and_offsets() {
        let data = header_bytes(
            "format binary_little_endian 1.0\n\
             comment generated for a unit test\n\
             element chunk 2\n\
             property float min_x\n\
             property float min_y\n\
             element vertex 3\n\
             property uint packed_position\n",
        );
        let header = PlyHeader::parse(&data).unwrap();
        assert_eq!(header.elements.len(), 2);

        let chunk = header.element("chunk").unwrap();
        assert_eq!(chunk.count, 2);
        assert_eq!(chunk.stride, 8);
        assert_eq!(chunk.data_offset, 0);

        let vertex = header.element("vertex").unwrap();
        assert_eq!(vertex.stride, 4);
        assert_eq!(vertex.data_offset, 16);
        assert_eq!(
            vertex.property_offset("packed_position"),
            Some((0, PropertyType::UInt))
        );
    }

    #[test]
    fn test_rejects_big_endian() {
        let data = header_bytes("format binary_big_endian 1.0\nelement vertex 0\n");
        assert!(matches!(
            PlyHeader::parse(&data),
            Err(CodecError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_rejects_missing_magic() {
        assert!(matches!(
            PlyHeader::parse(b"not a ply file"),
            Err(CodecError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_rejects_property_before_element() {
        let data = header_bytes("format binary_little_endian 1.0\nproperty float x\n");
        assert!(matches!(
            PlyHeader::parse(&data),
            Err(CodecError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_property_type() {
        let data = header_bytes(
            "format binary_little_endian 1.0\nelement vertex 1\nproperty quaternion q\n",
        );
        assert!(matches!(
            PlyHeader::parse(&data),
            Err(CodecError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_missing_end_marker_is_bounded() {
        // A large corrupt file with no end marker must fail instead of
        // being scanned to the end.
        let mut data = b"ply\nformat binary_little_endian 1.0\n".to_vec();
        data.resize(MAX_HEADER_SIZE + 1024, b'x');
        assert!(matches!(
            PlyHeader::parse(&data),
            Err(CodecError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_truncated_payload_detected() {
        let mut data = header_bytes(
            "format binary_little_endian 1.0\nelement vertex 4\nproperty float x\n",
        );
        data.extend_from_slice(&[0u8; 8]); // 8 of the 16 payload bytes
        let header = PlyHeader::parse(&data).unwrap();
        let vertex = header.element("vertex").unwrap();
        assert!(matches!(
            header.element_data(&data, vertex),
            Err(CodecError::TruncatedPayload { .. })
        ));
    }
}
