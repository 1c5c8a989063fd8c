use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parallel;
use crate::volume::{Grid, Volume};

/// Inclusive scalar window. Bounds are compared in f64 so the caller's
/// numbers are honoured exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    min: f64,
    max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(Error::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        let value = value as f64;
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractMode {
    Sparse,
    DenseMasked,
}

/// Surviving voxels in linear-index order, as parallel arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSelection {
    pub positions: Vec<[f32; 3]>,
    pub scalars: Vec<f32>,
}

impl PointSelection {
    pub fn len(&self) -> usize {
        self.scalars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.positions.len() != self.scalars.len() {
            return Err(Error::Encoding(format!(
                "point selection has {} positions but {} scalars",
                self.positions.len(),
                self.scalars.len()
            )));
        }
        Ok(())
    }
}

/// Source-shaped copy with out-of-range voxels zeroed.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedVolume {
    pub grid: Grid,
    pub values: Vec<f32>,
    pub selected: usize,
}

impl MaskedVolume {
    pub fn validate(&self) -> Result<()> {
        if self.values.len() != self.grid.voxel_count() {
            return Err(Error::Encoding(format!(
                "masked volume has {} values for a {:?} grid",
                self.values.len(),
                self.grid.dims
            )));
        }
        Ok(())
    }

    pub fn nonzero_count(&self) -> usize {
        parallel::count_matching(&self.values, |value| *value != 0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Points(PointSelection),
    Masked(MaskedVolume),
}

impl Selection {
    pub fn count(&self) -> usize {
        match self {
            Selection::Points(points) => points.len(),
            Selection::Masked(masked) => masked.selected,
        }
    }

    pub fn mode(&self) -> ExtractMode {
        match self {
            Selection::Points(_) => ExtractMode::Sparse,
            Selection::Masked(_) => ExtractMode::DenseMasked,
        }
    }
}

pub fn extract(volume: &Volume, range: ValueRange, mode: ExtractMode) -> Selection {
    match mode {
        ExtractMode::Sparse => Selection::Points(extract_points(volume, range)),
        ExtractMode::DenseMasked => Selection::Masked(mask_volume(volume, range)),
    }
}

/// Single pass per Z slab with incremental (x, y) tracking; slabs run in
/// parallel and are concatenated in Z order.
pub fn extract_points(volume: &Volume, range: ValueRange) -> PointSelection {
    let grid = volume.grid;
    let slab_len = grid.slab_len();
    if slab_len == 0 || volume.is_empty() {
        return PointSelection::default();
    }
    let nx = grid.dims[0];
    let ny = grid.dims[1];
    let slabs = parallel::map_ordered(grid.dims[2] as usize, |z| {
        let start = z * slab_len;
        let slab = &volume.values[start..start + slab_len];
        let mut selection = PointSelection::default();
        let (mut x, mut y) = (0u32, 0u32);
        for &value in slab {
            if range.contains(value) {
                selection
                    .positions
                    .push(grid.world_position(x, y, z as u32).to_array());
                selection.scalars.push(value);
            }
            x += 1;
            if x == nx {
                x = 0;
                y += 1;
                if y == ny {
                    y = 0;
                }
            }
        }
        selection
    });

    let total: usize = slabs.iter().map(PointSelection::len).sum();
    let mut selection = PointSelection {
        positions: Vec::with_capacity(total),
        scalars: Vec::with_capacity(total),
    };
    for slab in slabs {
        selection.positions.extend(slab.positions);
        selection.scalars.extend(slab.scalars);
    }
    selection
}

pub fn mask_volume(volume: &Volume, range: ValueRange) -> MaskedVolume {
    let mut values = volume.values.clone();
    parallel::for_each_indexed_mut(&mut values, |_, value| {
        if !range.contains(*value) {
            *value = 0.0;
        }
    });
    let selected = count_in_range(volume, range);
    MaskedVolume {
        grid: volume.grid,
        values,
        selected,
    }
}

pub fn count_in_range(volume: &Volume, range: ValueRange) -> usize {
    parallel::count_matching(&volume.values, |value| range.contains(*value))
}
