//! Sparse voxel world and its conversion to and from a cube octree.

use std::collections::HashMap;

use anyhow::{Result, bail};
use glam::IVec3;
use octamap_ogz::cube::fill_children;
use octamap_ogz::{Cube, IdSequence};

/// A cubic grid of unit voxels. Only occupied cells are stored.
#[derive(Debug, Clone)]
pub struct VoxelWorld {
    size: i32,
    voxels: HashMap<IVec3, Cube>,
    ids: IdSequence,
}

impl VoxelWorld {
    /// Create an empty world with edge length `size` (a power of two, at least 2).
    pub fn new(size: i32) -> Result<Self> {
        if size < 2 || size.count_ones() != 1 {
            bail!("World size must be a power of two >= 2, got {}", size);
        }
        Ok(Self {
            size,
            voxels: HashMap::new(),
            ids: IdSequence::new(),
        })
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn contains(&self, pos: IVec3) -> bool {
        pos.cmpge(IVec3::ZERO).all() && pos.cmplt(IVec3::splat(self.size)).all()
    }

    /// Store a cube at `pos`, returning the previous one. Out of range
    /// positions are ignored.
    pub fn set(&mut self, pos: IVec3, cube: Cube) -> Option<Cube> {
        if !self.contains(pos) {
            log::trace!("Ignoring voxel outside world: {}", pos);
            return None;
        }
        self.voxels.insert(pos, cube)
    }

    pub fn get(&self, pos: IVec3) -> Option<&Cube> {
        self.voxels.get(&pos)
    }

    pub fn remove(&mut self, pos: IVec3) -> Option<Cube> {
        self.voxels.remove(&pos)
    }

    /// Place a solid cube with one texture on every face.
    pub fn set_solid(&mut self, pos: IVec3, texture: u16) {
        let cube = Cube::solid(self.ids.next_id(), texture);
        self.set(pos, cube);
    }

    /// Clear a cell. Unoccupied cells compact to empty space.
    pub fn set_empty(&mut self, pos: IVec3) {
        self.voxels.remove(&pos);
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = IVec3> + '_ {
        self.voxels.keys().copied()
    }

    pub fn cubes(&self) -> impl Iterator<Item = &Cube> + '_ {
        self.voxels.values()
    }

    /// Highest occupied z in the column at (x, y).
    pub fn top(&self, x: i32, y: i32) -> Option<i32> {
        (0..self.size).rev().find(|&z| self.voxels.contains_key(&IVec3::new(x, y, z)))
    }

    /// Compact the world into the eight root octants of a cube tree.
    ///
    /// Unit voxels end up at depth log2(size); every box without occupied
    /// cells is a single empty leaf.
    pub fn to_octree(self) -> Box<[Cube; 8]> {
        let points: Vec<IVec3> = self.voxels.keys().copied().collect();
        let mut compactor = Compactor {
            voxels: self.voxels,
            ids: self.ids,
        };
        let octants = compactor.octants(IVec3::ZERO, self.size, points);
        fill_children(octants, &mut compactor.ids)
    }

    /// Expand a cube tree of edge length `size` back into voxels.
    ///
    /// Non-empty leaves larger than one unit are filled with copies of the leaf.
    pub fn from_octree(root: &[Cube; 8], size: i32) -> Result<Self> {
        let mut world = Self::new(size)?;
        let half = size / 2;
        for (i, c) in root.iter().enumerate() {
            world.expand(c, child_offset(IVec3::ZERO, half, i), half);
        }
        Ok(world)
    }

    fn expand(&mut self, c: &Cube, origin: IVec3, size: i32) {
        if let Some(children) = &c.children {
            let half = size / 2;
            if half == 0 {
                log::warn!("Cube tree deeper than world grid at {}", origin);
                return;
            }
            for (i, ch) in children.iter().enumerate() {
                self.expand(ch, child_offset(origin, half, i), half);
            }
            return;
        }
        if c.is_default_empty() {
            return;
        }
        for z in 0..size {
            for y in 0..size {
                for x in 0..size {
                    let mut cube = c.clone();
                    cube.id = self.ids.next_id();
                    self.voxels.insert(origin + IVec3::new(x, y, z), cube);
                }
            }
        }
    }
}

fn child_offset(origin: IVec3, half: i32, i: usize) -> IVec3 {
    let i = i as i32;
    origin + IVec3::new(i & 1, (i >> 1) & 1, (i >> 2) & 1) * half
}

struct Compactor {
    voxels: HashMap<IVec3, Cube>,
    ids: IdSequence,
}

impl Compactor {
    /// Split `points` across the eight octants of the box and compact each.
    fn octants(&mut self, origin: IVec3, size: i32, points: Vec<IVec3>) -> [Option<Cube>; 8] {
        let half = size / 2;
        let mut buckets: [Vec<IVec3>; 8] = Default::default();
        for p in points {
            let rel = p - origin;
            let i = (rel.x >= half) as usize | ((rel.y >= half) as usize) << 1 | ((rel.z >= half) as usize) << 2;
            buckets[i].push(p);
        }
        let mut out: [Option<Cube>; 8] = Default::default();
        for (i, bucket) in buckets.into_iter().enumerate() {
            out[i] = self.compact(child_offset(origin, half, i), half, bucket);
        }
        out
    }

    fn compact(&mut self, origin: IVec3, size: i32, points: Vec<IVec3>) -> Option<Cube> {
        if points.is_empty() {
            return None;
        }
        if size == 1 {
            return self.voxels.remove(&origin);
        }
        let children = self.octants(origin, size, points);
        if children.iter().all(Option::is_none) {
            return None;
        }
        let id = self.ids.next_id();
        Some(Cube::with_children(id, fill_children(children, &mut self.ids)))
    }
}
