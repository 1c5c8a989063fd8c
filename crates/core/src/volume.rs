use std::path::Path;
use std::time::Instant;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parallel;

pub const SALTF_DIMS: [u32; 3] = [210, 676, 676];
pub const SALTF_SPACING: [f32; 3] = [20.0, 20.0, 20.0];

/// Regular grid geometry. Voxels are linearized X-fastest:
/// `index = x + y * nx + z * nx * ny`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub dims: [u32; 3],
    pub spacing: [f32; 3],
    pub origin: [f32; 3],
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            dims: SALTF_DIMS,
            spacing: SALTF_SPACING,
            origin: [0.0, 0.0, 0.0],
        }
    }
}

impl Grid {
    pub fn new(dims: [u32; 3], spacing: [f32; 3], origin: [f32; 3]) -> Self {
        Self {
            dims,
            spacing,
            origin,
        }
    }

    pub fn voxel_count(&self) -> usize {
        self.dims.iter().map(|&d| d as usize).product()
    }

    pub fn slab_len(&self) -> usize {
        self.dims[0] as usize * self.dims[1] as usize
    }

    pub fn value_index(&self, x: u32, y: u32, z: u32) -> usize {
        let nx = self.dims[0] as usize;
        let ny = self.dims[1] as usize;
        x as usize + y as usize * nx + z as usize * nx * ny
    }

    pub fn voxel_coords(&self, index: usize) -> [u32; 3] {
        let nx = self.dims[0].max(1) as usize;
        let ny = self.dims[1].max(1) as usize;
        let x = index % nx;
        let y = (index / nx) % ny;
        let z = index / (nx * ny);
        [x as u32, y as u32, z as u32]
    }

    pub fn world_position(&self, x: u32, y: u32, z: u32) -> Vec3 {
        Vec3::from(self.origin)
            + Vec3::new(x as f32, y as f32, z as f32) * Vec3::from(self.spacing)
    }

    pub fn bounds(&self) -> (Vec3, Vec3) {
        let min = Vec3::from(self.origin);
        let size = Vec3::new(
            self.dims[0].saturating_sub(1) as f32,
            self.dims[1].saturating_sub(1) as f32,
            self.dims[2].saturating_sub(1) as f32,
        ) * Vec3::from(self.spacing);
        (min, min + size)
    }
}

#[derive(Debug, Clone)]
pub struct Volume {
    pub grid: Grid,
    pub values: Vec<f32>,
}

impl Volume {
    pub fn new(grid: Grid, values: Vec<f32>) -> Result<Self> {
        let expected = grid.voxel_count();
        if values.len() != expected {
            return Err(Error::VolumeSize {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { grid, values })
    }

    pub fn load(path: &Path, grid: Grid) -> Result<Self> {
        let start = Instant::now();
        let bytes = std::fs::read(path).map_err(|source| Error::DataLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let volume = Self::from_be_bytes(&bytes, grid)?;
        tracing::info!(
            "loaded volume {:?} ({} voxels, dims {:?}) in {:.3}s",
            path,
            volume.len(),
            grid.dims,
            start.elapsed().as_secs_f64()
        );
        Ok(volume)
    }

    /// Decodes a raw big-endian float32 buffer.
    pub fn from_be_bytes(bytes: &[u8], grid: Grid) -> Result<Self> {
        let expected = grid.voxel_count();
        if bytes.len() != expected * 4 {
            return Err(Error::VolumeSize {
                expected,
                actual: bytes.len() / 4,
            });
        }
        let mut values = vec![0.0f32; expected];
        parallel::for_each_indexed_mut(&mut values, |idx, value| {
            let offset = idx * 4;
            *value = f32::from_be_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]);
        });
        Ok(Self { grid, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value_range(&self) -> Option<(f32, f32)> {
        value_range(&self.values)
    }

    pub fn histogram(&self, bins: usize) -> Option<Histogram> {
        let (min, max) = self.value_range()?;
        let bins = bins.max(1);
        let mut counts = vec![0u64; bins];
        let width = (max - min) as f64 / bins as f64;
        for &value in &self.values {
            if !value.is_finite() {
                continue;
            }
            let bin = if width > 0.0 {
                (((value - min) as f64 / width) as usize).min(bins - 1)
            } else {
                0
            };
            counts[bin] += 1;
        }
        Some(Histogram { min, max, counts })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub min: f32,
    pub max: f32,
    pub counts: Vec<u64>,
}

impl Histogram {
    pub fn bin_edges(&self, bin: usize) -> (f32, f32) {
        let width = (self.max - self.min) / self.counts.len().max(1) as f32;
        let lo = self.min + width * bin as f32;
        (lo, lo + width)
    }
}

/// Min/max over finite values; `None` when there are none.
pub fn value_range(values: &[f32]) -> Option<(f32, f32)> {
    let mut range: Option<(f32, f32)> = None;
    for &value in values {
        if !value.is_finite() {
            continue;
        }
        range = Some(match range {
            Some((lo, hi)) => (lo.min(value), hi.max(value)),
            None => (value, value),
        });
    }
    range
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn tiny_grid() -> Grid {
        Grid::new([2, 2, 2], [1.0, 1.0, 1.0], [0.0, 0.0, 0.0])
    }

    #[test]
    fn linearization_is_x_fastest() {
        let grid = Grid::new([3, 4, 5], [1.0; 3], [0.0; 3]);
        assert_eq!(grid.value_index(1, 0, 0), 1);
        assert_eq!(grid.value_index(0, 1, 0), 3);
        assert_eq!(grid.value_index(0, 0, 1), 12);
        for index in 0..grid.voxel_count() {
            let [x, y, z] = grid.voxel_coords(index);
            assert_eq!(grid.value_index(x, y, z), index);
        }
    }

    #[test]
    fn world_position_applies_spacing_and_origin() {
        let grid = Grid::new([4, 4, 4], [20.0, 10.0, 5.0], [1.0, 2.0, 3.0]);
        let pos = grid.world_position(1, 2, 3);
        assert_eq!(pos, Vec3::new(21.0, 22.0, 18.0));
        let (min, max) = grid.bounds();
        assert_eq!(min, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(max, Vec3::new(61.0, 32.0, 18.0));
    }

    #[test]
    fn decodes_big_endian_values() {
        let mut bytes = Vec::new();
        for value in 1..=8 {
            bytes.extend_from_slice(&(value as f32).to_be_bytes());
        }
        let volume = Volume::from_be_bytes(&bytes, tiny_grid()).expect("decode");
        assert_eq!(volume.values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(volume.values[volume.grid.value_index(1, 1, 1)], 8.0);
        assert_eq!(volume.value_range(), Some((1.0, 8.0)));
    }

    #[test]
    fn rejects_wrong_size() {
        let bytes = vec![0u8; 7 * 4];
        let err = Volume::from_be_bytes(&bytes, tiny_grid()).unwrap_err();
        assert!(err.is_data_load());
        assert!(Volume::new(tiny_grid(), vec![0.0; 9]).is_err());
    }

    #[test]
    fn load_reads_file_and_reports_missing() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        for value in [0.5f32, -1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0] {
            file.write_all(&value.to_be_bytes()).expect("write");
        }
        let volume = Volume::load(file.path(), tiny_grid()).expect("load");
        assert_eq!(volume.values[0], 0.5);
        assert_eq!(volume.values[1], -1.0);

        let missing = Volume::load(Path::new("/nonexistent/Saltf"), tiny_grid());
        assert!(matches!(missing, Err(Error::DataLoad { .. })));
    }

    #[test]
    fn histogram_counts_every_finite_value() {
        let values = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, f32::NAN];
        let volume = Volume::new(tiny_grid(), values).expect("volume");
        let hist = volume.histogram(3).expect("histogram");
        assert_eq!(hist.counts.iter().sum::<u64>(), 7);
        assert_eq!(hist.counts, vec![2, 2, 3]);
        assert_eq!(hist.bin_edges(0), (0.0, 2.0));
    }
}
