use std::io::Write;

use crate::color::ColorMapper;
use crate::error::{Error, Result};
use crate::extract::PointSelection;

/// Scalar property names looked up when reading, in priority order.
pub const SCALAR_PROPERTY_NAMES: &[&str] = &["ScalarValue", "scalar", "intensity"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlyFormat {
    Ascii,
    BinaryLittle,
    BinaryBig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlyScalarType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl PlyScalarType {
    fn size(self) -> usize {
        match self {
            PlyScalarType::Int8 | PlyScalarType::Uint8 => 1,
            PlyScalarType::Int16 | PlyScalarType::Uint16 => 2,
            PlyScalarType::Int32 | PlyScalarType::Uint32 | PlyScalarType::Float32 => 4,
            PlyScalarType::Float64 => 8,
        }
    }
}

#[derive(Debug)]
struct PlyProperty {
    name: String,
    data_type: PlyScalarType,
}

#[derive(Debug)]
struct PlyHeader {
    format: PlyFormat,
    vertex_count: usize,
    vertex_properties: Vec<PlyProperty>,
}

impl PlyHeader {
    fn property_index(&self, name: &str) -> Option<usize> {
        self.vertex_properties.iter().position(|p| p.name == name)
    }
}

/// Vertices decoded from a binary little-endian PLY.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlyPoints {
    pub positions: Vec<[f32; 3]>,
    pub scalar_name: Option<String>,
    pub scalars: Option<Vec<f32>>,
    pub colors: Option<Vec<[u8; 3]>>,
}

impl PlyPoints {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn write_header(out: &mut Vec<u8>, vertex_count: usize, properties: &[(&str, &str)]) {
    // Writes into a Vec cannot fail.
    let _ = writeln!(out, "ply");
    let _ = writeln!(out, "format binary_little_endian 1.0");
    let _ = writeln!(out, "element vertex {vertex_count}");
    for (data_type, name) in properties {
        let _ = writeln!(out, "property {data_type} {name}");
    }
    let _ = writeln!(out, "end_header");
}

pub fn write_scalar_points(points: &PointSelection) -> Result<Vec<u8>> {
    points.validate()?;
    let mut out = Vec::with_capacity(256 + points.len() * 16);
    write_header(
        &mut out,
        points.len(),
        &[
            ("float", "x"),
            ("float", "y"),
            ("float", "z"),
            ("float", "scalar"),
        ],
    );
    for (position, scalar) in points.positions.iter().zip(&points.scalars) {
        for component in position {
            out.extend_from_slice(&component.to_le_bytes());
        }
        out.extend_from_slice(&scalar.to_le_bytes());
    }
    Ok(out)
}

pub fn write_color_points(points: &PointSelection, mapper: &ColorMapper) -> Result<Vec<u8>> {
    points.validate()?;
    let mut out = Vec::with_capacity(256 + points.len() * 15);
    write_header(
        &mut out,
        points.len(),
        &[
            ("float", "x"),
            ("float", "y"),
            ("float", "z"),
            ("uchar", "red"),
            ("uchar", "green"),
            ("uchar", "blue"),
        ],
    );
    for (position, scalar) in points.positions.iter().zip(&points.scalars) {
        for component in position {
            out.extend_from_slice(&component.to_le_bytes());
        }
        out.extend_from_slice(&mapper.map(*scalar));
    }
    Ok(out)
}

pub fn read_points(data: &[u8]) -> Result<PlyPoints> {
    let (header, data_start) = parse_header_bytes(data)?;
    if header.format != PlyFormat::BinaryLittle {
        return Err(Error::Decode(
            "only binary_little_endian PLY payloads are supported".to_string(),
        ));
    }
    let (Some(ix), Some(iy), Some(iz)) = (
        header.property_index("x"),
        header.property_index("y"),
        header.property_index("z"),
    ) else {
        return Err(Error::Decode(
            "PLY is missing position properties (x, y, z)".to_string(),
        ));
    };
    let scalar = SCALAR_PROPERTY_NAMES
        .iter()
        .find_map(|name| header.property_index(name).map(|idx| (idx, *name)));
    let color = match (
        header.property_index("red"),
        header.property_index("green"),
        header.property_index("blue"),
    ) {
        (Some(r), Some(g), Some(b)) => Some([r, g, b]),
        _ => None,
    };

    let mut points = PlyPoints {
        positions: Vec::with_capacity(header.vertex_count),
        scalar_name: scalar.map(|(_, name)| name.to_string()),
        scalars: scalar.map(|_| Vec::with_capacity(header.vertex_count)),
        colors: color.map(|_| Vec::with_capacity(header.vertex_count)),
    };
    let body = &data[data_start..];
    let mut values = vec![0.0f64; header.vertex_properties.len()];
    let mut cursor = 0usize;
    for _ in 0..header.vertex_count {
        for (idx, prop) in header.vertex_properties.iter().enumerate() {
            let end = cursor + prop.data_type.size();
            if end > body.len() {
                return Err(Error::Decode(
                    "unexpected end of binary PLY data".to_string(),
                ));
            }
            values[idx] = read_scalar(&body[cursor..end], prop.data_type);
            cursor = end;
        }
        points
            .positions
            .push([values[ix] as f32, values[iy] as f32, values[iz] as f32]);
        if let (Some(scalars), Some((idx, _))) = (points.scalars.as_mut(), scalar) {
            scalars.push(values[idx] as f32);
        }
        if let (Some(colors), Some([r, g, b])) = (points.colors.as_mut(), color) {
            colors.push([values[r] as u8, values[g] as u8, values[b] as u8]);
        }
    }
    Ok(points)
}

fn parse_header<'a, I>(lines: &mut I) -> Result<PlyHeader>
where
    I: Iterator<Item = &'a str>,
{
    let malformed = |message: &str| Error::Decode(message.to_string());
    let first = lines.next().ok_or_else(|| malformed("PLY header is missing"))?;
    if first.trim() != "ply" {
        return Err(malformed("not a PLY file"));
    }

    let mut format = None;
    let mut vertex_count = None;
    let mut vertex_properties = Vec::new();
    let mut in_vertex = false;

    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with("comment") {
            continue;
        }
        if line == "end_header" {
            break;
        }

        let mut parts = line.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "format" => {
                format = Some(match parts.next().unwrap_or("") {
                    "ascii" => PlyFormat::Ascii,
                    "binary_little_endian" => PlyFormat::BinaryLittle,
                    "binary_big_endian" => PlyFormat::BinaryBig,
                    _ => return Err(malformed("unknown PLY format")),
                });
            }
            "element" => {
                let name = parts.next().unwrap_or("");
                let count = parts
                    .next()
                    .and_then(|count| count.parse::<usize>().ok())
                    .ok_or_else(|| malformed("malformed PLY element count"))?;
                in_vertex = name == "vertex";
                if in_vertex {
                    vertex_count = Some(count);
                }
            }
            "property" if in_vertex => {
                let data_type = parse_scalar_type(parts.next().unwrap_or(""))?;
                let name = parts.next().unwrap_or("").to_string();
                if name.is_empty() {
                    return Err(malformed("PLY property missing name"));
                }
                vertex_properties.push(PlyProperty { name, data_type });
            }
            _ => {}
        }
    }

    Ok(PlyHeader {
        format: format.ok_or_else(|| malformed("PLY format not specified"))?,
        vertex_count: vertex_count.ok_or_else(|| malformed("PLY has no vertex element"))?,
        vertex_properties,
    })
}

fn parse_header_bytes(data: &[u8]) -> Result<(PlyHeader, usize)> {
    let mut line_start = 0usize;
    let mut header_end = None;
    for (idx, byte) in data.iter().enumerate() {
        if *byte != b'\n' {
            continue;
        }
        let line = String::from_utf8_lossy(&data[line_start..idx]);
        if line.trim_end_matches('\r').trim() == "end_header" {
            header_end = Some(idx + 1);
            break;
        }
        line_start = idx + 1;
    }

    let header_end = header_end
        .ok_or_else(|| Error::Decode("PLY header is missing end_header".to_string()))?;
    let header_text = std::str::from_utf8(&data[..header_end])
        .map_err(|_| Error::Decode("PLY header is not ASCII".to_string()))?;
    let header = parse_header(&mut header_text.lines())?;
    Ok((header, header_end))
}

fn parse_scalar_type(value: &str) -> Result<PlyScalarType> {
    match value {
        "char" | "int8" => Ok(PlyScalarType::Int8),
        "uchar" | "uint8" => Ok(PlyScalarType::Uint8),
        "short" | "int16" => Ok(PlyScalarType::Int16),
        "ushort" | "uint16" => Ok(PlyScalarType::Uint16),
        "int" | "int32" => Ok(PlyScalarType::Int32),
        "uint" | "uint32" => Ok(PlyScalarType::Uint32),
        "float" | "float32" => Ok(PlyScalarType::Float32),
        "double" | "float64" => Ok(PlyScalarType::Float64),
        other => Err(Error::Decode(format!(
            "unsupported PLY property type '{other}'"
        ))),
    }
}

fn read_scalar(data: &[u8], data_type: PlyScalarType) -> f64 {
    match data_type {
        PlyScalarType::Int8 => data[0] as i8 as f64,
        PlyScalarType::Uint8 => data[0] as f64,
        PlyScalarType::Int16 => i16::from_le_bytes([data[0], data[1]]) as f64,
        PlyScalarType::Uint16 => u16::from_le_bytes([data[0], data[1]]) as f64,
        PlyScalarType::Int32 => i32::from_le_bytes([data[0], data[1], data[2], data[3]]) as f64,
        PlyScalarType::Uint32 => u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as f64,
        PlyScalarType::Float32 => f32::from_le_bytes([data[0], data[1], data[2], data[3]]) as f64,
        PlyScalarType::Float64 => f64::from_le_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ]),
    }
}
