use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::color::{ColorMapper, DEFAULT_BRIGHTNESS};
use crate::error::{Error, Result};
use crate::extract::{ExtractMode, Selection};
use crate::gradient::ColorGradient;
use crate::octree::{self, LeafKind, OctreePolicy};
use crate::{ply, vtk_xml};

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const GZIP: &str = "application/gzip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    ScalarPoint,
    ColorPoint,
    AttributedPointSet,
    RegularGrid,
    Octree,
    PointOctree,
}

impl Format {
    pub const ALL: [Format; 6] = [
        Format::ScalarPoint,
        Format::ColorPoint,
        Format::AttributedPointSet,
        Format::RegularGrid,
        Format::Octree,
        Format::PointOctree,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Format::ScalarPoint => "scalar-point",
            Format::ColorPoint => "color-point",
            Format::AttributedPointSet => "attributed-point-set",
            Format::RegularGrid => "regular-grid",
            Format::Octree => "octree",
            Format::PointOctree => "point-octree",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let format = match value.trim().to_ascii_lowercase().as_str() {
            "scalar-point" | "ply" | "scalar" => Format::ScalarPoint,
            "color-point" | "ply-color" | "colored-ply" | "color" => Format::ColorPoint,
            "attributed-point-set" | "vtp" | "polydata" => Format::AttributedPointSet,
            "regular-grid" | "vti" | "imagedata" | "grid" => Format::RegularGrid,
            "octree" => Format::Octree,
            "point-octree" | "point_octree" => Format::PointOctree,
            _ => return None,
        };
        Some(format)
    }

    pub fn extract_mode(self) -> ExtractMode {
        match self {
            Format::RegularGrid | Format::Octree | Format::PointOctree => {
                ExtractMode::DenseMasked
            }
            _ => ExtractMode::Sparse,
        }
    }

    pub fn default_gzip(self) -> bool {
        matches!(self, Format::AttributedPointSet | Format::RegularGrid)
    }

    pub fn file_name(self, gzipped: bool) -> String {
        let base = match self {
            Format::ScalarPoint | Format::ColorPoint => "pointcloud.ply",
            Format::AttributedPointSet => "pointcloud.vtp",
            Format::RegularGrid => "pointcloud.vti",
            Format::Octree => "octree.bin",
            Format::PointOctree => "point_octree.bin",
        };
        if gzipped {
            format!("{base}.gz")
        } else {
            base.to_string()
        }
    }

    pub fn content_type(self, gzipped: bool) -> &'static str {
        if gzipped {
            GZIP
        } else {
            OCTET_STREAM
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        Format::parse(value)
            .ok_or_else(|| Error::InvalidRequest(format!("unknown format '{value}'")))
    }
}

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub gradient: ColorGradient,
    pub brightness: f32,
    /// Leaf kind is taken from the format.
    pub octree: OctreePolicy,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            gradient: ColorGradient::default(),
            brightness: DEFAULT_BRIGHTNESS,
            octree: OctreePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPayload {
    pub format: Format,
    pub bytes: Vec<u8>,
    pub count: usize,
}

pub fn encode(
    selection: &Selection,
    format: Format,
    options: &EncodeOptions,
) -> Result<EncodedPayload> {
    let bytes = match (format, selection) {
        (Format::ScalarPoint, Selection::Points(points)) => ply::write_scalar_points(points)?,
        (Format::ColorPoint, Selection::Points(points)) => {
            let mapper = ColorMapper::for_scalars(options.gradient.clone(), &points.scalars)
                .with_brightness(options.brightness);
            ply::write_color_points(points, &mapper)?
        }
        (Format::AttributedPointSet, Selection::Points(points)) => {
            vtk_xml::write_poly_data(points)?
        }
        (Format::RegularGrid, Selection::Masked(masked)) => vtk_xml::write_image_data(masked)?,
        (Format::Octree, Selection::Masked(masked)) => octree::encode_masked(
            masked,
            OctreePolicy {
                leaf: LeafKind::Uniform,
                ..options.octree
            },
        )?,
        (Format::PointOctree, Selection::Masked(masked)) => octree::encode_masked(
            masked,
            OctreePolicy {
                leaf: LeafKind::Point,
                ..options.octree
            },
        )?,
        (format, selection) => {
            return Err(Error::Encoding(format!(
                "{format} cannot encode a {:?} selection",
                selection.mode()
            )))
        }
    };
    tracing::debug!(
        target: "saltf::encode",
        format = format.tag(),
        count = selection.count(),
        bytes = bytes.len(),
        "encoded"
    );
    Ok(EncodedPayload {
        format,
        bytes,
        count: selection.count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract, ValueRange};
    use crate::octree::Octree;
    use crate::volume::{Grid, Volume};

    fn volume() -> Volume {
        let grid = Grid::new([2, 2, 2], [1.0, 1.0, 1.0], [0.0, 0.0, 0.0]);
        Volume::new(grid, (1..=8).map(|v| v as f32).collect()).expect("volume")
    }

    fn encode_range(format: Format, min: f64, max: f64) -> EncodedPayload {
        let range = ValueRange::new(min, max).expect("range");
        let selection = extract(&volume(), range, format.extract_mode());
        encode(&selection, format, &EncodeOptions::default()).expect("encode")
    }

    #[test]
    fn aliases_resolve_to_formats() {
        assert_eq!(Format::parse("ply"), Some(Format::ScalarPoint));
        assert_eq!(Format::parse("VTI"), Some(Format::RegularGrid));
        assert_eq!(Format::parse("point_octree"), Some(Format::PointOctree));
        for format in Format::ALL {
            assert_eq!(Format::parse(format.tag()), Some(format));
        }
        assert!(matches!("obj".parse::<Format>(), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn download_metadata() {
        assert_eq!(Format::ScalarPoint.file_name(false), "pointcloud.ply");
        assert_eq!(Format::AttributedPointSet.file_name(true), "pointcloud.vtp.gz");
        assert_eq!(Format::PointOctree.file_name(true), "point_octree.bin.gz");
        assert_eq!(Format::RegularGrid.content_type(true), GZIP);
        assert_eq!(Format::Octree.content_type(false), OCTET_STREAM);
        assert!(Format::RegularGrid.default_gzip());
        assert!(!Format::ColorPoint.default_gzip());
    }

    #[test]
    fn every_format_encodes_a_selection() {
        for format in Format::ALL {
            let payload = encode_range(format, 3.0, 6.0);
            assert_eq!(payload.count, 4, "{format}");
            assert!(!payload.bytes.is_empty(), "{format}");
        }
    }

    #[test]
    fn every_format_survives_an_empty_selection() {
        for format in Format::ALL {
            let payload = encode_range(format, 100.0, 200.0);
            assert_eq!(payload.count, 0, "{format}");
        }
        let points = ply::read_points(&encode_range(Format::ColorPoint, 100.0, 200.0).bytes)
            .expect("ply");
        assert!(points.is_empty());
    }

    #[test]
    fn octree_formats_round_trip_the_masked_volume() {
        let payload = encode_range(Format::Octree, 3.0, 6.0);
        let tree = Octree::decode(&payload.bytes, LeafKind::Uniform).expect("decode");
        assert_eq!(tree.rasterize(), vec![0.0, 0.0, 3.0, 4.0, 5.0, 6.0, 0.0, 0.0]);

        let payload = encode_range(Format::PointOctree, 3.0, 6.0);
        let tree = Octree::decode(&payload.bytes, LeafKind::Point).expect("decode");
        assert_eq!(tree.rasterize(), vec![0.0, 0.0, 3.0, 4.0, 5.0, 6.0, 0.0, 0.0]);
    }

    #[test]
    fn mismatched_selection_is_an_encoding_error() {
        let range = ValueRange::new(3.0, 6.0).expect("range");
        let sparse = extract(&volume(), range, ExtractMode::Sparse);
        let err = encode(&sparse, Format::RegularGrid, &EncodeOptions::default());
        assert!(matches!(err, Err(Error::Encoding(_))));
    }

    #[test]
    fn encoding_is_deterministic() {
        for format in Format::ALL {
            assert_eq!(
                encode_range(format, 2.0, 7.0).bytes,
                encode_range(format, 2.0, 7.0).bytes,
                "{format}"
            );
        }
    }
}
