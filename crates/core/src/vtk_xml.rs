//! VTK XML PolyData / ImageData bodies built on the `vtkio` data model.

use vtkio::model::{
    Attribute, Attributes, ByteOrder, DataArray, DataSet, ElementType, Extent, IOBuffer,
    ImageDataPiece, Piece, PolyDataPiece, Version, VertexNumbers, Vtk,
};

use crate::error::{Error, Result};
use crate::extract::{MaskedVolume, PointSelection};
use crate::ply::SCALAR_PROPERTY_NAMES;

pub const SCALAR_ARRAY_NAME: &str = "ScalarValue";

fn scalar_attribute(values: Vec<f32>) -> Attribute {
    Attribute::DataArray(DataArray {
        name: SCALAR_ARRAY_NAME.to_string(),
        elem: ElementType::Scalars {
            num_comp: 1,
            lookup_table: None,
        },
        data: IOBuffer::F32(values),
    })
}

fn document(title: &str, data: DataSet) -> Vtk {
    Vtk {
        version: Version::new((1, 0)),
        title: title.to_string(),
        byte_order: ByteOrder::LittleEndian,
        data,
        file_path: None,
    }
}

fn write(vtk: Vtk) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    vtk.write_xml(&mut out).map_err(|err| Error::Encoding(format!("vtk xml: {err}")))?;
    Ok(out)
}

/// Points + one vertex cell per point + `ScalarValue` point data.
pub fn write_poly_data(points: &PointSelection) -> Result<Vec<u8>> {
    points.validate()?;
    let count = points.len() as u64;
    let piece = PolyDataPiece {
        points: IOBuffer::F32(points.positions.iter().flatten().copied().collect()),
        verts: Some(VertexNumbers::XML {
            connectivity: (0..count).collect(),
            offsets: (1..=count).collect(),
        }),
        lines: None,
        polys: None,
        strips: None,
        data: Attributes {
            point: vec![scalar_attribute(points.scalars.clone())],
            cell: Vec::new(),
        },
    };
    write(document(
        "range selection",
        DataSet::PolyData {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(piece))],
        },
    ))
}

/// Full regular grid, zeros included.
pub fn write_image_data(masked: &MaskedVolume) -> Result<Vec<u8>> {
    masked.validate()?;
    let grid = masked.grid;
    let [nx, ny, nz] = grid.dims.map(|d| d as i32);
    let extent = Extent::Ranges([0..=nx - 1, 0..=ny - 1, 0..=nz - 1]);
    let piece = ImageDataPiece {
        extent: extent.clone(),
        data: Attributes {
            point: vec![scalar_attribute(masked.values.clone())],
            cell: Vec::new(),
        },
    };
    write(document(
        "masked volume",
        DataSet::ImageData {
            extent,
            origin: grid.origin,
            spacing: grid.spacing,
            meta: None,
            pieces: vec![Piece::Inline(Box::new(piece))],
        },
    ))
}

#[derive(Debug, Clone, PartialEq)]
pub enum VtkGeometry {
    Points {
        positions: Vec<[f32; 3]>,
        verts: usize,
    },
    Grid {
        dims: [u32; 3],
        origin: [f32; 3],
        spacing: [f32; 3],
    },
}

/// A PolyData or ImageData body read back from XML.
#[derive(Debug, Clone, PartialEq)]
pub struct VtkBody {
    pub geometry: VtkGeometry,
    pub scalar_name: Option<String>,
    pub scalars: Option<Vec<f32>>,
}

impl VtkBody {
    pub fn kind(&self) -> &'static str {
        match self.geometry {
            VtkGeometry::Points { .. } => "vtp",
            VtkGeometry::Grid { .. } => "vti",
        }
    }

    pub fn point_count(&self) -> usize {
        match &self.geometry {
            VtkGeometry::Points { positions, .. } => positions.len(),
            VtkGeometry::Grid { dims, .. } => dims.iter().map(|&d| d as usize).product(),
        }
    }
}

fn f32_values(buffer: IOBuffer) -> Option<Vec<f32>> {
    match buffer {
        IOBuffer::F32(values) => Some(values),
        IOBuffer::F64(values) => Some(values.into_iter().map(|v| v as f32).collect()),
        _ => None,
    }
}

/// First point array named like a scalar (`ScalarValue`, `scalar`, `intensity`).
fn find_scalars(attributes: Attributes) -> (Option<String>, Option<Vec<f32>>) {
    let mut arrays: Vec<DataArray> = attributes
        .point
        .into_iter()
        .filter_map(|attribute| match attribute {
            Attribute::DataArray(array) => Some(array),
            Attribute::Field { .. } => None,
        })
        .collect();
    for &name in SCALAR_PROPERTY_NAMES {
        if let Some(idx) = arrays.iter().position(|array| array.name == name) {
            let array = arrays.swap_remove(idx);
            return (Some(array.name), f32_values(array.data));
        }
    }
    (None, None)
}

fn inline_piece<P>(mut pieces: Vec<Piece<P>>) -> Result<P> {
    if pieces.len() != 1 {
        return Err(Error::Decode(format!("expected one piece, found {}", pieces.len())));
    }
    match pieces.remove(0) {
        Piece::Inline(piece) => Ok(*piece),
        _ => Err(Error::Decode("piece data is not inline".to_string())),
    }
}

pub fn read_vtk(data: &[u8]) -> Result<VtkBody> {
    let vtk = Vtk::parse_xml(data).map_err(|err| Error::Decode(format!("vtk xml: {err}")))?;
    match vtk.data {
        DataSet::PolyData { pieces, .. } => {
            let piece = inline_piece(pieces)?;
            let verts = piece.verts.as_ref().map_or(0, VertexNumbers::num_cells);
            let coords = f32_values(piece.points)
                .ok_or_else(|| Error::Decode("points are not floating point".to_string()))?;
            let positions = coords.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
            let (scalar_name, scalars) = find_scalars(piece.data);
            Ok(VtkBody {
                geometry: VtkGeometry::Points { positions, verts },
                scalar_name,
                scalars,
            })
        }
        DataSet::ImageData {
            extent,
            origin,
            spacing,
            pieces,
            ..
        } => {
            let dims = match extent {
                Extent::Dims(dims) => dims,
                Extent::Ranges(ranges) => ranges.map(|r| (r.end() - r.start() + 1).max(0) as u32),
            };
            let (scalar_name, scalars) = find_scalars(inline_piece(pieces)?.data);
            Ok(VtkBody {
                geometry: VtkGeometry::Grid {
                    dims,
                    origin,
                    spacing,
                },
                scalar_name,
                scalars,
            })
        }
        _ => Err(Error::Decode("only PolyData and ImageData bodies are supported".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Grid;

    #[test]
    fn poly_data_has_points_verts_and_scalar() {
        let points = PointSelection {
            positions: vec![[0.0, 0.0, 0.0], [20.0, 40.0, 60.0], [1.0, 2.0, 3.0]],
            scalars: vec![3.0, 4.0, 5.0],
        };
        let bytes = write_poly_data(&points).expect("write");
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("PolyData"));
        assert!(text.contains(SCALAR_ARRAY_NAME));

        let body = read_vtk(&bytes).expect("read");
        assert_eq!(body.kind(), "vtp");
        assert_eq!(
            body.geometry,
            VtkGeometry::Points {
                positions: points.positions.clone(),
                verts: 3,
            }
        );
        assert_eq!(body.scalar_name.as_deref(), Some(SCALAR_ARRAY_NAME));
        assert_eq!(body.scalars, Some(vec![3.0, 4.0, 5.0]));
    }

    #[test]
    fn image_data_keeps_every_voxel() {
        let grid = Grid::new([2, 2, 2], [20.0, 20.0, 20.0], [0.0, 0.0, 0.0]);
        let masked = MaskedVolume {
            grid,
            values: vec![0.0, 0.0, 3.0, 4.0, 5.0, 6.0, 0.0, 0.0],
            selected: 4,
        };
        let body = read_vtk(&write_image_data(&masked).expect("write")).expect("read");
        assert_eq!(body.kind(), "vti");
        assert_eq!(
            body.geometry,
            VtkGeometry::Grid {
                dims: [2, 2, 2],
                origin: [0.0, 0.0, 0.0],
                spacing: [20.0, 20.0, 20.0],
            }
        );
        assert_eq!(body.point_count(), 8);
        assert_eq!(body.scalars, Some(masked.values));
    }

    #[test]
    fn empty_selection_still_writes_a_document() {
        let bytes = write_poly_data(&PointSelection::default()).expect("write");
        assert!(String::from_utf8_lossy(&bytes).contains("PolyData"));
    }

    #[test]
    fn output_is_deterministic() {
        let points = PointSelection {
            positions: vec![[1.0, 2.0, 3.0]],
            scalars: vec![9.5],
        };
        assert_eq!(
            write_poly_data(&points).expect("first"),
            write_poly_data(&points).expect("second")
        );
    }

    #[test]
    fn read_rejects_non_vtk_input() {
        assert!(matches!(read_vtk(b"ply\nformat"), Err(Error::Decode(_))));
    }

    #[test]
    fn malformed_masked_volume_is_rejected() {
        let masked = MaskedVolume {
            grid: Grid::new([2, 2, 2], [1.0; 3], [0.0; 3]),
            values: vec![0.0; 3],
            selected: 0,
        };
        assert!(matches!(write_image_data(&masked), Err(Error::Encoding(_))));
    }
}
