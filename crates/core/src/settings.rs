use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color::DEFAULT_BRIGHTNESS;
use crate::compress::{GRID_GZIP_LEVEL, POINT_GZIP_LEVEL};
use crate::error::{Error, Result};
use crate::gradient::GRAYSCALE;
use crate::octree::OctreePolicy;
use crate::volume::{Grid, SALTF_DIMS, SALTF_SPACING};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub volume: VolumeSettings,
    pub pipeline: PipelineSettings,
    /// Root for `saltf.log`, metrics and saved frontend logs.
    pub log_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            volume: VolumeSettings::default(),
            pipeline: PipelineSettings::default(),
            log_dir: PathBuf::from("log"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeSettings {
    pub path: PathBuf,
    pub dims: [u32; 3],
    pub spacing: [f32; 3],
    pub origin: [f32; 3],
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("Saltf"),
            dims: SALTF_DIMS,
            spacing: SALTF_SPACING,
            origin: [0.0, 0.0, 0.0],
        }
    }
}

impl VolumeSettings {
    pub fn grid(&self) -> Grid {
        Grid::new(self.dims, self.spacing, self.origin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub default_palette: String,
    pub brightness: f32,
    pub gzip_level: u32,
    pub grid_gzip_level: u32,
    /// Run regular-grid encode+compress on the worker pool.
    pub offload_grid: bool,
    pub octree_tolerance: f32,
    pub octree_max_depth: Option<u32>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_palette: GRAYSCALE.to_string(),
            brightness: DEFAULT_BRIGHTNESS,
            gzip_level: POINT_GZIP_LEVEL,
            grid_gzip_level: GRID_GZIP_LEVEL,
            offload_grid: true,
            octree_tolerance: 0.0,
            octree_max_depth: None,
        }
    }
}

impl PipelineSettings {
    pub fn octree_policy(&self) -> OctreePolicy {
        OctreePolicy {
            tolerance: self.octree_tolerance.max(0.0),
            max_depth: self.octree_max_depth,
            ..OctreePolicy::default()
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| Error::Settings {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_json(&text).map_err(|err| match err {
            Error::Settings { message, .. } => Error::Settings {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| Error::Settings {
            path: PathBuf::new(),
            message: err.to_string(),
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_describe_the_reference_volume() {
        let settings = Settings::default();
        assert_eq!(settings.volume.dims, [210, 676, 676]);
        assert_eq!(settings.volume.grid().voxel_count(), 210 * 676 * 676);
        assert_eq!(settings.pipeline.gzip_level, 9);
        assert_eq!(settings.pipeline.grid_gzip_level, 1);
        assert_eq!(settings.log_dir(), Path::new("log"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = Settings::from_json(
            r#"{ "volume": { "dims": [4, 4, 4] }, "pipeline": { "octree_max_depth": 3 } }"#,
        )
        .expect("settings");
        assert_eq!(settings.volume.dims, [4, 4, 4]);
        assert_eq!(settings.volume.path, PathBuf::from("Saltf"));
        assert_eq!(settings.pipeline.octree_policy().max_depth, Some(3));
        assert_eq!(settings.pipeline.default_palette, "grayscale");
    }

    #[test]
    fn load_reports_the_path() {
        let mut file = tempfile::NamedTempFile::new().expect("temp");
        file.write_all(b"{ not json").expect("write");
        match Settings::load(file.path()) {
            Err(Error::Settings { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected settings error, got {other:?}"),
        }
        assert!(Settings::load(Path::new("/no/such/settings.json")).is_err());
    }

    #[test]
    fn serializes_back_to_json() {
        let json = serde_json::to_string(&Settings::default()).expect("json");
        let parsed = Settings::from_json(&json).expect("parse");
        assert_eq!(parsed, Settings::default());
    }
}
