mod color;
mod compress;
mod encode;
mod error;
mod extract;
mod gradient;
mod log_sink;
mod metrics;
mod octree;
mod parallel;
mod pipeline;
mod ply;
mod request;
mod settings;
mod volume;
mod vtk_xml;

pub use color::{map_scalar, ColorMapper, DEFAULT_BRIGHTNESS};
pub use compress::{compress, decompress, is_gzip, Compressed, GRID_GZIP_LEVEL, POINT_GZIP_LEVEL};
pub use encode::{encode, EncodeOptions, EncodedPayload, Format, GZIP, OCTET_STREAM};
pub use error::{Error, Result};
pub use extract::{
    count_in_range, extract, extract_points, mask_volume, ExtractMode, MaskedVolume,
    PointSelection, Selection, ValueRange,
};
pub use gradient::{ColorGradient, ColorStop, GRAYSCALE, PALETTE_NAMES, RAINBOW};
pub use log_sink::{FileLogSink, LogAck, LogSink, LogSubmission};
pub use metrics::{MetricsRecorder, MetricsSnapshot, Stage, StageTiming};
pub use octree::{
    LeafKind, LevelStats, Octree, OctreeNode, OctreePolicy, OctreeStats, VoxelBox,
};
pub use parallel::{submit, Offload};
pub use pipeline::{Pipeline, PipelineOutput, Response};
pub use ply::{read_points, write_color_points, write_scalar_points, PlyPoints};
pub use request::RequestParams;
pub use settings::{PipelineSettings, Settings, VolumeSettings};
pub use volume::{value_range, Grid, Histogram, Volume, SALTF_DIMS, SALTF_SPACING};
pub use vtk_xml::{read_vtk, write_image_data, write_poly_data, VtkBody, VtkGeometry};

pub mod formats {
    pub use crate::ply::SCALAR_PROPERTY_NAMES;
    pub use crate::vtk_xml::SCALAR_ARRAY_NAME;
}
