//! Recursive octree container.
//!
//! Layout: `nx, ny, nz` as little-endian u32, then nodes in pre-order. A node
//! starts with a tag byte: `0` is a leaf followed by one LE f32 (uniform leaf)
//! or by LE f32 value + LE f32 x, y, z world position (point leaf); any other
//! tag is an internal node followed by its 8 children. Children bisect every
//! axis (first half `ceil(s / 2)`), X fastest, then Y, then Z.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::extract::MaskedVolume;
use crate::parallel;
use crate::volume::Grid;

pub const HEADER_LEN: usize = 12;

const LEAF_TAG: u8 = 0;
const INTERNAL_TAG: u8 = 1;
const PARALLEL_BOX_VOXELS: usize = 1 << 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeafKind {
    Uniform,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OctreePolicy {
    pub leaf: LeafKind,
    /// Largest `max - min` spread a box may have and still become a leaf.
    pub tolerance: f32,
    pub max_depth: Option<u32>,
}

impl Default for OctreePolicy {
    fn default() -> Self {
        Self {
            leaf: LeafKind::Uniform,
            tolerance: 0.0,
            max_depth: None,
        }
    }
}

impl OctreePolicy {
    pub fn with_leaf(leaf: LeafKind) -> Self {
        Self {
            leaf,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelBox {
    pub min: [u32; 3],
    pub size: [u32; 3],
}

impl VoxelBox {
    pub fn root(dims: [u32; 3]) -> Self {
        Self {
            min: [0, 0, 0],
            size: dims,
        }
    }

    pub fn voxel_count(&self) -> usize {
        self.size.iter().map(|&s| s as usize).product()
    }

    pub fn is_empty(&self) -> bool {
        self.voxel_count() == 0
    }

    pub fn is_splittable(&self) -> bool {
        self.size.iter().any(|&s| s >= 2)
    }

    pub fn center(&self) -> [u32; 3] {
        [
            self.min[0] + self.size[0] / 2,
            self.min[1] + self.size[1] / 2,
            self.min[2] + self.size[2] / 2,
        ]
    }

    pub fn children(&self) -> [VoxelBox; 8] {
        let half = self.size.map(|s| (s + 1) / 2);
        std::array::from_fn(|child| {
            let mut min = self.min;
            let mut size = half;
            for axis in 0..3 {
                if (child >> axis) & 1 == 1 {
                    min[axis] += half[axis];
                    size[axis] = self.size[axis] - half[axis];
                }
            }
            VoxelBox { min, size }
        })
    }

    fn rows(&self, grid: &Grid) -> impl Iterator<Item = std::ops::Range<usize>> + '_ {
        let grid = *grid;
        let [x0, y0, z0] = self.min;
        let [sx, sy, sz] = self.size;
        (z0..z0 + sz).flat_map(move |z| {
            (y0..y0 + sy).map(move |y| {
                let start = grid.value_index(x0, y, z);
                start..start + sx as usize
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OctreeNode {
    Leaf { value: f32 },
    PointLeaf { value: f32, position: [f32; 3] },
    Internal(Box<[OctreeNode; 8]>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Octree {
    pub dims: [u32; 3],
    pub root: OctreeNode,
}

struct BoxSummary {
    min: f32,
    max: f32,
    sum: f64,
}

fn summarize(grid: &Grid, values: &[f32], bx: &VoxelBox) -> BoxSummary {
    let mut summary = BoxSummary {
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
        sum: 0.0,
    };
    for row in bx.rows(grid) {
        for &value in &values[row] {
            summary.min = summary.min.min(value);
            summary.max = summary.max.max(value);
            summary.sum += value as f64;
        }
    }
    summary
}

struct Builder<'a> {
    grid: &'a Grid,
    values: &'a [f32],
    policy: OctreePolicy,
}

impl Builder<'_> {
    fn leaf(&self, bx: &VoxelBox, summary: Option<&BoxSummary>) -> OctreeNode {
        match self.policy.leaf {
            LeafKind::Uniform => {
                let value = match summary {
                    Some(s) if s.min == s.max => s.min,
                    Some(s) => (s.sum / bx.voxel_count() as f64) as f32,
                    None => 0.0,
                };
                OctreeNode::Leaf { value }
            }
            LeafKind::Point => {
                let [cx, cy, cz] = bx.center();
                // An empty box has no voxel at its center.
                let value = match summary {
                    Some(_) => self.values[self.grid.value_index(cx, cy, cz)],
                    None => 0.0,
                };
                OctreeNode::PointLeaf {
                    value,
                    position: self.grid.world_position(cx, cy, cz).to_array(),
                }
            }
        }
    }

    fn build(&self, bx: VoxelBox, depth: u32) -> Result<OctreeNode> {
        if bx.is_empty() {
            return Ok(self.leaf(&bx, None));
        }
        let summary = summarize(self.grid, self.values, &bx);
        let spread = summary.max - summary.min;
        let depth_limited = self.policy.max_depth.is_some_and(|max| depth >= max);
        if spread <= self.policy.tolerance || !bx.is_splittable() || depth_limited {
            return Ok(self.leaf(&bx, Some(&summary)));
        }

        let boxes = bx.children();
        let children: Vec<OctreeNode> = if bx.voxel_count() >= PARALLEL_BOX_VOXELS {
            parallel::map_ordered(8, |child| self.build(boxes[child], depth + 1))
                .into_iter()
                .collect::<Result<_>>()?
        } else {
            boxes
                .iter()
                .map(|child| self.build(*child, depth + 1))
                .collect::<Result<_>>()?
        };
        let children: Box<[OctreeNode; 8]> = children
            .into_boxed_slice()
            .try_into()
            .map_err(|_| Error::Encoding("octree node must have 8 children".to_string()))?;
        Ok(OctreeNode::Internal(children))
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self
            .data
            .get(self.pos..self.pos + N)
            .ok_or_else(|| Error::Decode(format!("truncated at byte {}", self.pos)))?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take::<4>()?))
    }

    fn node(&mut self, bx: VoxelBox, leaf: LeafKind) -> Result<OctreeNode> {
        let [tag] = self.take::<1>()?;
        if tag == LEAF_TAG {
            let value = self.f32()?;
            return Ok(match leaf {
                LeafKind::Uniform => OctreeNode::Leaf { value },
                LeafKind::Point => OctreeNode::PointLeaf {
                    value,
                    position: [self.f32()?, self.f32()?, self.f32()?],
                },
            });
        }
        if !bx.is_splittable() {
            return Err(Error::Decode(format!(
                "internal node at byte {} covers an unsplittable box {:?}",
                self.pos - 1,
                bx.size
            )));
        }
        let boxes = bx.children();
        let mut children = Vec::with_capacity(8);
        for child in boxes {
            children.push(self.node(child, leaf)?);
        }
        let children: Box<[OctreeNode; 8]> = children
            .into_boxed_slice()
            .try_into()
            .map_err(|_| Error::Decode("internal node must have 8 children".to_string()))?;
        Ok(OctreeNode::Internal(children))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelStats {
    pub level: u32,
    pub leaves: usize,
    pub internals: usize,
    pub voxels: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OctreeStats {
    pub total_voxels: usize,
    pub represented_voxels: usize,
    pub leaves: usize,
    pub internals: usize,
    pub levels: Vec<LevelStats>,
}

impl OctreeStats {
    pub fn nodes(&self) -> usize {
        self.leaves + self.internals
    }

    /// Voxels per stored node.
    pub fn compression_factor(&self) -> f64 {
        if self.nodes() == 0 {
            return 0.0;
        }
        self.total_voxels as f64 / self.nodes() as f64
    }

    pub fn mean_leaf_voxels(&self) -> f64 {
        if self.leaves == 0 {
            return 0.0;
        }
        self.represented_voxels as f64 / self.leaves as f64
    }
}

impl Octree {
    pub fn build(grid: &Grid, values: &[f32], policy: OctreePolicy) -> Result<Self> {
        if values.len() != grid.voxel_count() {
            return Err(Error::Encoding(format!(
                "octree input has {} values for a {:?} grid",
                values.len(),
                grid.dims
            )));
        }
        let builder = Builder {
            grid,
            values,
            policy,
        };
        let root = builder.build(VoxelBox::root(grid.dims), 0)?;
        Ok(Self {
            dims: grid.dims,
            root,
        })
    }

    pub fn from_masked(masked: &MaskedVolume, policy: OctreePolicy) -> Result<Self> {
        masked.validate()?;
        Self::build(&masked.grid, &masked.values, policy)
    }

    pub fn decode(data: &[u8], leaf: LeafKind) -> Result<Self> {
        let mut reader = Reader { data, pos: 0 };
        let dims = [
            u32::from_le_bytes(reader.take::<4>()?),
            u32::from_le_bytes(reader.take::<4>()?),
            u32::from_le_bytes(reader.take::<4>()?),
        ];
        let root = reader.node(VoxelBox::root(dims), leaf)?;
        if reader.pos != data.len() {
            return Err(Error::Decode(format!(
                "{} trailing bytes after the root node",
                data.len() - reader.pos
            )));
        }
        Ok(Self { dims, root })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + 64);
        for dim in self.dims {
            out.extend_from_slice(&dim.to_le_bytes());
        }
        write_node(&self.root, &mut out);
        out
    }

    /// Expands leaves back to one value per voxel, X-fastest.
    pub fn rasterize(&self) -> Vec<f32> {
        let grid = Grid::new(self.dims, [1.0; 3], [0.0; 3]);
        let mut values = vec![0.0f32; grid.voxel_count()];
        fill_node(&self.root, VoxelBox::root(self.dims), &grid, &mut values);
        values
    }

    pub fn stats(&self) -> OctreeStats {
        let mut stats = OctreeStats {
            total_voxels: VoxelBox::root(self.dims).voxel_count(),
            ..OctreeStats::default()
        };
        collect_stats(&self.root, VoxelBox::root(self.dims), 0, &mut stats);
        stats
    }

    /// Point leaves that cover at least one voxel, in pre-order.
    pub fn leaf_points(&self) -> Vec<([f32; 3], f32)> {
        let mut points = Vec::new();
        collect_points(&self.root, VoxelBox::root(self.dims), &mut points);
        points
    }
}

pub fn encode_masked(masked: &MaskedVolume, policy: OctreePolicy) -> Result<Vec<u8>> {
    Ok(Octree::from_masked(masked, policy)?.to_bytes())
}

fn write_node(node: &OctreeNode, out: &mut Vec<u8>) {
    match node {
        OctreeNode::Leaf { value } => {
            out.push(LEAF_TAG);
            out.extend_from_slice(&value.to_le_bytes());
        }
        OctreeNode::PointLeaf { value, position } => {
            out.push(LEAF_TAG);
            out.extend_from_slice(&value.to_le_bytes());
            for component in position {
                out.extend_from_slice(&component.to_le_bytes());
            }
        }
        OctreeNode::Internal(children) => {
            out.push(INTERNAL_TAG);
            for child in children.iter() {
                write_node(child, out);
            }
        }
    }
}

fn fill_node(node: &OctreeNode, bx: VoxelBox, grid: &Grid, values: &mut [f32]) {
    match node {
        OctreeNode::Leaf { value } | OctreeNode::PointLeaf { value, .. } => {
            for row in bx.rows(grid) {
                values[row].fill(*value);
            }
        }
        OctreeNode::Internal(children) => {
            for (child, child_box) in children.iter().zip(bx.children()) {
                fill_node(child, child_box, grid, values);
            }
        }
    }
}

fn collect_stats(node: &OctreeNode, bx: VoxelBox, level: u32, stats: &mut OctreeStats) {
    let idx = level as usize;
    if stats.levels.len() <= idx {
        stats.levels.resize_with(idx + 1, LevelStats::default);
        stats.levels[idx].level = level;
    }
    match node {
        OctreeNode::Leaf { .. } | OctreeNode::PointLeaf { .. } => {
            stats.leaves += 1;
            stats.represented_voxels += bx.voxel_count();
            stats.levels[idx].leaves += 1;
            stats.levels[idx].voxels += bx.voxel_count();
        }
        OctreeNode::Internal(children) => {
            stats.internals += 1;
            stats.levels[idx].internals += 1;
            for (child, child_box) in children.iter().zip(bx.children()) {
                collect_stats(child, child_box, level + 1, stats);
            }
        }
    }
}

fn collect_points(node: &OctreeNode, bx: VoxelBox, points: &mut Vec<([f32; 3], f32)>) {
    if bx.is_empty() {
        return;
    }
    match node {
        OctreeNode::Leaf { .. } => {}
        OctreeNode::PointLeaf { value, position } => points.push((*position, *value)),
        OctreeNode::Internal(children) => {
            for (child, child_box) in children.iter().zip(bx.children()) {
                collect_points(child, child_box, points);
            }
        }
    }
}
