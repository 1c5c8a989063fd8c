use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::compress::{self, Compressed};
use crate::encode::{self, EncodeOptions, EncodedPayload, Format};
use crate::error::{Error, Result};
use crate::extract::{self, Selection};
use crate::gradient::ColorGradient;
use crate::metrics::{MetricsRecorder, MetricsSnapshot, Stage};
use crate::parallel;
use crate::request::RequestParams;
use crate::settings::PipelineSettings;
use crate::volume::Volume;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Request-scoped stages over a shared, read-only volume.
#[derive(Debug, Clone)]
pub struct Pipeline {
    volume: Arc<Volume>,
    settings: PipelineSettings,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub format: Format,
    pub body: Vec<u8>,
    pub gzipped: bool,
    pub count: usize,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub file_name: Option<String>,
    pub body: Vec<u8>,
    pub metrics: Option<MetricsSnapshot>,
}

impl Response {
    pub fn ok(output: PipelineOutput) -> Self {
        Self {
            status: 200,
            content_type: output.format.content_type(output.gzipped),
            file_name: Some(output.format.file_name(output.gzipped)),
            body: output.body,
            metrics: Some(output.metrics),
        }
    }

    pub fn rejected(err: &Error) -> Self {
        Self {
            status: err.status_code(),
            content_type: TEXT_PLAIN,
            file_name: None,
            body: err.to_string().into_bytes(),
            metrics: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn reason(&self) -> Option<&str> {
        if self.is_ok() {
            return None;
        }
        std::str::from_utf8(&self.body).ok()
    }
}

struct Staged {
    payload: EncodedPayload,
    encode_elapsed: Duration,
    compressed: Option<Compressed>,
}

fn encode_and_compress(
    selection: &Selection,
    format: Format,
    options: &EncodeOptions,
    gzip_level: Option<u32>,
) -> Result<Staged> {
    let start = Instant::now();
    let payload = encode::encode(selection, format, options)?;
    let encode_elapsed = start.elapsed();
    let compressed = gzip_level
        .map(|level| compress::compress(&payload.bytes, level))
        .transpose()?;
    Ok(Staged {
        payload,
        encode_elapsed,
        compressed,
    })
}

impl Pipeline {
    pub fn new(volume: Arc<Volume>, settings: PipelineSettings) -> Self {
        Self { volume, settings }
    }

    pub fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn options(&self, params: &RequestParams) -> Result<EncodeOptions> {
        let name = params
            .colormap
            .as_deref()
            .unwrap_or(&self.settings.default_palette);
        let gradient = ColorGradient::resolve(name)
            .ok_or_else(|| Error::InvalidRequest(format!("unknown colormap '{name}'")))?;
        Ok(EncodeOptions {
            gradient,
            brightness: params.brightness.unwrap_or(self.settings.brightness),
            octree: self.settings.octree_policy(),
        })
    }

    fn gzip_level(&self, params: &RequestParams) -> Option<u32> {
        let format = params.format;
        if !params.compress.unwrap_or(format.default_gzip()) {
            return None;
        }
        Some(if format == Format::RegularGrid {
            self.settings.grid_gzip_level
        } else {
            self.settings.gzip_level
        })
    }

    pub fn run(&self, params: &RequestParams) -> Result<PipelineOutput> {
        let mut metrics = MetricsRecorder::new();

        let format = params.format;
        metrics.set_request(format.tag(), params.min_val, params.max_val);
        let start = Instant::now();
        let range = params.range()?;
        let options = self.options(params)?;
        metrics.record(Stage::Validate, start.elapsed());

        let selection = metrics.time(Stage::Extract, || {
            extract::extract(&self.volume, range, format.extract_mode())
        });
        metrics.set_count(selection.count());

        let gzip_level = self.gzip_level(params);
        let staged = if format == Format::RegularGrid && self.settings.offload_grid {
            parallel::submit("regular-grid encode", move || {
                encode_and_compress(&selection, format, &options, gzip_level)
            })
            .wait()??
        } else {
            encode_and_compress(&selection, format, &options, gzip_level)?
        };

        metrics.record(Stage::Encode, staged.encode_elapsed);
        metrics.set_payload_len(staged.payload.bytes.len());
        if let Some(compressed) = &staged.compressed {
            metrics.record_compression(compressed);
        }
        let snapshot = metrics.snapshot();

        tracing::info!(target: "saltf::pipeline", "request done: {snapshot}");

        let gzipped = staged.compressed.is_some();
        let body = match staged.compressed {
            Some(compressed) => compressed.bytes,
            None => staged.payload.bytes,
        };
        Ok(PipelineOutput {
            format,
            body,
            gzipped,
            count: staged.payload.count,
            metrics: snapshot,
        })
    }

    /// Request boundary: every failure becomes a rejected response.
    pub fn handle_json(&self, body: &Value) -> Response {
        match RequestParams::from_json(body).and_then(|params| self.run(&params)) {
            Ok(output) => Response::ok(output),
            Err(err) => {
                if err.is_client_error() {
                    tracing::warn!(target: "saltf::pipeline", "request rejected: {err}");
                } else {
                    tracing::error!(target: "saltf::pipeline", "request failed: {err}");
                }
                Response::rejected(&err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::decompress;
    use crate::octree::{LeafKind, Octree};
    use crate::ply;
    use crate::volume::Grid;
    use crate::vtk_xml;
    use serde_json::json;

    fn pipeline() -> Pipeline {
        let grid = Grid::new([2, 2, 2], [20.0, 20.0, 20.0], [0.0, 0.0, 0.0]);
        let volume = Volume::new(grid, (1..=8).map(|v| v as f32).collect()).expect("volume");
        Pipeline::new(Arc::new(volume), PipelineSettings::default())
    }

    #[test]
    fn scalar_points_are_returned_raw() {
        let response = pipeline().handle_json(&json!({ "min_val": 3, "max_val": 6 }));
        assert!(response.is_ok());
        assert_eq!(response.file_name.as_deref(), Some("pointcloud.ply"));
        assert_eq!(response.content_type, "application/octet-stream");
        let points = ply::read_points(&response.body).expect("ply");
        assert_eq!(points.scalars, Some(vec![3.0, 4.0, 5.0, 6.0]));

        let metrics = response.metrics.expect("metrics");
        assert_eq!(metrics.count, 4);
        assert_eq!(metrics.compressed_len, None);
        assert_eq!(metrics.stage_ms(Stage::Compress), 0.0);
    }

    #[test]
    fn regular_grid_is_offloaded_and_gzipped() {
        let pipeline = pipeline();
        let params = RequestParams::new(3.0, 6.0, Format::RegularGrid);
        let output = pipeline.run(&params).expect("run");
        assert!(output.gzipped);
        assert_eq!(output.count, 4);
        let xml = decompress(&output.body).expect("gunzip");
        let body = vtk_xml::read_vtk(&xml).expect("vti");
        assert_eq!(body.point_count(), 8);
        assert_eq!(body.scalars, Some(vec![0.0, 0.0, 3.0, 4.0, 5.0, 6.0, 0.0, 0.0]));
        let order: Vec<Stage> = output.metrics.stages.iter().map(|t| t.stage).collect();
        assert_eq!(
            order,
            vec![Stage::Validate, Stage::Extract, Stage::Encode, Stage::Compress]
        );
        assert_eq!(output.metrics.format.as_deref(), Some("regular-grid"));
        assert_eq!(output.metrics.min_val, Some(3.0));
        assert_eq!(output.metrics.max_val, Some(6.0));
        assert_eq!(output.metrics.compressed_len, Some(output.body.len()));
        let savings = output.metrics.savings_percent.expect("savings");
        let ratio = output.metrics.ratio.expect("ratio");
        assert!((savings - (1.0 - ratio) * 100.0).abs() < 1.0e-9);
    }

    #[test]
    fn compress_flag_overrides_format_default() {
        let pipeline = pipeline();
        let response = pipeline.handle_json(&json!({
            "min_val": 3, "max_val": 6, "format": "point-octree", "compress": true
        }));
        assert_eq!(response.file_name.as_deref(), Some("point_octree.bin.gz"));
        let bytes = decompress(&response.body).expect("gunzip");
        let tree = Octree::decode(&bytes, LeafKind::Point).expect("decode");
        assert_eq!(tree.rasterize(), vec![0.0, 0.0, 3.0, 4.0, 5.0, 6.0, 0.0, 0.0]);

        let response = pipeline.handle_json(&json!({
            "min_val": 3, "max_val": 6, "format": "vtp", "compress": false
        }));
        assert_eq!(response.file_name.as_deref(), Some("pointcloud.vtp"));
        let body = vtk_xml::read_vtk(&response.body).expect("vtp");
        assert_eq!(body.kind(), "vtp");
        assert_eq!(body.scalars, Some(vec![3.0, 4.0, 5.0, 6.0]));
    }

    #[test]
    fn malformed_colormap_is_a_client_error() {
        for colormap in ["0:#a\u{e9}123", "0:#\u{e9}\u{e9}\u{e9};1:#ffffff", "0:#12345"] {
            let response = pipeline().handle_json(&json!({
                "min_val": 3, "max_val": 6, "format": "color-point", "colormap": colormap
            }));
            assert_eq!(response.status, 400, "{colormap}");
            assert!(response.metrics.is_none());
        }
    }

    #[test]
    fn empty_selection_is_not_an_error() {
        let response = pipeline().handle_json(&json!({
            "min_val": 100, "max_val": 200, "format": "color-point"
        }));
        assert!(response.is_ok());
        assert_eq!(response.metrics.expect("metrics").count, 0);
    }

    #[test]
    fn client_errors_are_rejected_with_a_reason() {
        let pipeline = pipeline();
        for body in [
            json!({ "min_val": 5, "max_val": 5 }),
            json!({ "min_val": "a", "max_val": 5 }),
            json!({ "min_val": 0, "max_val": 5, "colormap": "nope" }),
        ] {
            let response = pipeline.handle_json(&body);
            assert_eq!(response.status, 400, "{body}");
            assert!(response.reason().is_some_and(|reason| !reason.is_empty()));
            assert_eq!(response.file_name, None);
        }
    }

    #[test]
    fn color_points_use_requested_palette() {
        let response = pipeline().handle_json(&json!({
            "min_val": 1, "max_val": 8, "format": "ply-color",
            "colormap": "rainbow", "brightness": 1.0
        }));
        let points = ply::read_points(&response.body).expect("ply");
        let colors = points.colors.expect("colors");
        assert_eq!(colors.first(), Some(&[0, 0, 255]));
        assert_eq!(colors.last(), Some(&[255, 0, 0]));
    }
}
