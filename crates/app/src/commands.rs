use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use saltf_core::formats::{SCALAR_ARRAY_NAME, SCALAR_PROPERTY_NAMES};
use saltf_core::{
    decompress, is_gzip, read_points, read_vtk, FileLogSink, LeafKind, LogSink, LogSubmission,
    Octree, Pipeline, RequestParams, Settings, Volume, VtkGeometry,
};
use serde_json::{json, Value};

pub fn load_settings(config: Option<&Path>, volume: Option<PathBuf>) -> Result<Settings> {
    let mut settings = match config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(path) = volume {
        settings.volume.path = path;
    }
    Ok(settings)
}

fn load_pipeline(settings: &Settings) -> Result<Pipeline> {
    let start = Instant::now();
    let volume = match Volume::load(&settings.volume.path, settings.volume.grid()) {
        Ok(volume) => volume,
        Err(err) if err.is_data_load() => {
            tracing::error!("volume unavailable, not serving requests: {err}");
            bail!(err);
        }
        Err(err) => return Err(err.into()),
    };
    tracing::info!(
        voxels = volume.len(),
        elapsed_ms = start.elapsed().as_secs_f32() * 1000.0,
        "pipeline ready"
    );
    Ok(Pipeline::new(Arc::new(volume), settings.pipeline.clone()))
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut bytes = Vec::new();
        io::stdin().read_to_end(&mut bytes)?;
        return Ok(bytes);
    }
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn read_json(path: &Path) -> Result<Value> {
    let bytes = read_input(path)?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

/// Metrics persistence never fails the request that produced them.
fn persist_metrics(settings: &Settings, snapshot: &saltf_core::MetricsSnapshot) {
    let sink = FileLogSink::new(settings.log_dir());
    if let Err(err) = sink.record_metrics(snapshot) {
        tracing::warn!("metrics not persisted: {err}");
    }
}

pub fn extract(settings: &Settings, params: &RequestParams, out: Option<PathBuf>) -> Result<()> {
    let pipeline = load_pipeline(settings)?;
    let output = pipeline.run(params)?;
    let path = out.unwrap_or_else(|| PathBuf::from(output.format.file_name(output.gzipped)));
    fs::write(&path, &output.body).with_context(|| format!("writing {}", path.display()))?;
    persist_metrics(settings, &output.metrics);
    println!(
        "{} points -> {} ({} bytes)",
        output.count,
        path.display(),
        output.body.len()
    );
    Ok(())
}

pub fn request(settings: &Settings, body: &Path, out: Option<PathBuf>) -> Result<()> {
    let body = read_json(body)?;
    let pipeline = load_pipeline(settings)?;
    let response = pipeline.handle_json(&body);
    if !response.is_ok() {
        bail!(
            "{} {}",
            response.status,
            response.reason().unwrap_or("request failed")
        );
    }
    let path = out
        .or_else(|| response.file_name.as_deref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("response.bin"));
    fs::write(&path, &response.body).with_context(|| format!("writing {}", path.display()))?;
    if let Some(metrics) = &response.metrics {
        persist_metrics(settings, metrics);
    }
    println!(
        "{} {} -> {}",
        response.status,
        response.content_type,
        path.display()
    );
    Ok(())
}

pub fn save_log(settings: &Settings, body: &Path) -> Result<()> {
    let submission = LogSubmission::from_json(&read_json(body)?)?;
    let ack = FileLogSink::new(settings.log_dir()).submit(&submission)?;
    println!("{}", serde_json::to_string(&ack)?);
    Ok(())
}

pub fn stats(settings: &Settings, bins: usize) -> Result<()> {
    let pipeline = load_pipeline(settings)?;
    let volume = pipeline.volume();
    let grid = volume.grid;
    let (lo, hi) = grid.bounds();
    let histogram = volume.histogram(bins);
    let bins: Vec<Value> = histogram
        .iter()
        .flat_map(|histogram| {
            histogram.counts.iter().enumerate().map(move |(bin, count)| {
                let (start, end) = histogram.bin_edges(bin);
                json!({ "start": start, "end": end, "count": count })
            })
        })
        .collect();
    let report = json!({
        "dims": grid.dims,
        "spacing": grid.spacing,
        "origin": grid.origin,
        "bounds": [lo.to_array(), hi.to_array()],
        "voxels": volume.len(),
        "range": volume.value_range(),
        "histogram": bins,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn unwrap_gzip(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if is_gzip(&bytes) {
        return Ok(decompress(&bytes)?);
    }
    Ok(bytes)
}

pub fn octree_stats(file: &Path, points: bool) -> Result<()> {
    let bytes = unwrap_gzip(read_input(file)?)?;
    let leaf = if points {
        LeafKind::Point
    } else {
        LeafKind::Uniform
    };
    let tree = Octree::decode(&bytes, leaf)
        .with_context(|| format!("decoding {} as a {leaf:?} octree", file.display()))?;
    let stats = tree.stats();
    let mut report = json!({
        "dims": tree.dims,
        "bytes": bytes.len(),
        "nodes": stats.nodes(),
        "compression_factor": stats.compression_factor(),
        "mean_leaf_voxels": stats.mean_leaf_voxels(),
        "stats": stats,
    });
    if points {
        let leaf_points: Vec<Value> = tree
            .leaf_points()
            .into_iter()
            .filter(|(_, value)| *value != 0.0)
            .map(|(position, value)| json!({ "position": position, "value": value }))
            .collect();
        report["points"] = Value::from(leaf_points);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn inspect(file: &Path) -> Result<()> {
    let bytes = unwrap_gzip(read_input(file)?)?;
    let report = if bytes.starts_with(b"ply") {
        let points = read_points(&bytes)?;
        let range = points
            .scalars
            .as_deref()
            .and_then(saltf_core::value_range);
        json!({
            "kind": "ply",
            "points": points.len(),
            "scalar": points.scalar_name,
            "scalar_range": range,
            "colors": points.colors.is_some(),
            "known_scalar_names": SCALAR_PROPERTY_NAMES,
        })
    } else if bytes.windows(8).any(|window| window == b"<VTKFile") {
        let body = read_vtk(&bytes)?;
        let range = body.scalars.as_deref().and_then(saltf_core::value_range);
        let mut report = json!({
            "kind": body.kind(),
            "points": body.point_count(),
            "scalar": body.scalar_name,
            "scalar_range": range,
            "has_scalar_array": body.scalar_name.as_deref() == Some(SCALAR_ARRAY_NAME),
        });
        match &body.geometry {
            VtkGeometry::Points { verts, .. } => report["verts"] = json!(verts),
            VtkGeometry::Grid {
                dims,
                origin,
                spacing,
            } => {
                report["dims"] = json!(dims);
                report["origin"] = json!(origin);
                report["spacing"] = json!(spacing);
            }
        }
        report
    } else {
        bail!("{} is neither PLY nor VTK XML", file.display());
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
