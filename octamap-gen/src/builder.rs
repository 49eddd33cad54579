use std::time::Instant;

use anyhow::{Result, bail};
use glam::{IVec3, Vec3};
use octamap_benchmark::BenchmarkMetrics;
use octamap_ogz::map::MAX_WORLD_SIZE;
use octamap_ogz::octree::MAX_LEAF_SIZE;
use octamap_ogz::{Entity, EntityKind, Map, MapVar, OctSav};

use crate::WorldGenerator;
use crate::world::VoxelWorld;

/// World units per voxel edge unless overridden.
pub const DEFAULT_VOXEL_SCALE: i32 = 16;

/// Assembles a voxel world, entities and variables into a [`Map`].
pub struct MapBuilder {
    world: VoxelWorld,
    entities: Vec<Entity>,
    vars: Vec<(String, MapVar)>,
    voxel_scale: i32,
}

impl MapBuilder {
    pub fn new(size: i32) -> Result<Self> {
        Self::from_world(VoxelWorld::new(size)?)
    }

    pub fn from_world(world: VoxelWorld) -> Result<Self> {
        Self::scaled(world, DEFAULT_VOXEL_SCALE)
    }

    /// Builder whose voxels are `scale` world units on each edge.
    pub fn scaled(world: VoxelWorld, scale: i32) -> Result<Self> {
        check_scale(world.size(), scale)?;
        Ok(Self {
            world,
            entities: Vec::new(),
            vars: Vec::new(),
            voxel_scale: scale,
        })
    }

    /// Set the voxel edge length in world units (a power of two up to the max leaf size).
    pub fn with_voxel_scale(mut self, scale: i32) -> Result<Self> {
        check_scale(self.world.size(), scale)?;
        self.voxel_scale = scale;
        Ok(self)
    }

    pub fn world(&self) -> &VoxelWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut VoxelWorld {
        &mut self.world
    }

    /// Edge length of the resulting map in world units.
    pub fn worldsize(&self) -> i32 {
        self.world.size() * self.voxel_scale
    }

    pub fn set_block(&mut self, x: i32, y: i32, z: i32, texture: u16) {
        self.world.set_solid(IVec3::new(x, y, z), texture);
    }

    /// Fill a whole horizontal layer at height `z`.
    pub fn fill_layer(&mut self, z: i32, texture: u16) {
        let size = self.world.size();
        for y in 0..size {
            for x in 0..size {
                self.set_block(x, y, z, texture);
            }
        }
    }

    pub fn add_entity(&mut self, entity: Entity) {
        self.entities.push(entity);
    }

    /// Place an entity at a position given in voxel units.
    pub fn place(&mut self, voxel_pos: Vec3, kind: EntityKind) {
        let pos = voxel_pos * self.voxel_scale as f32;
        self.entities.push(Entity::new(pos.to_array(), kind));
    }

    pub fn set_var(&mut self, name: &str, value: MapVar) {
        match self.vars.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.vars.push((name.to_string(), value)),
        }
    }

    /// Run a generator over the world and place its entities.
    pub fn generate(&mut self, generator: &dyn WorldGenerator, benchmark: Option<&BenchmarkMetrics>) -> Result<()> {
        let start = Instant::now();
        generator.generate(&mut self.world)?;
        for (pos, kind) in generator.entities(&self.world) {
            self.place(pos, kind);
        }
        if let Some(b) = benchmark {
            b.record_generation(start.elapsed());
        }
        log::info!(
            "Generated '{}' world: {} voxels, {} entities",
            generator.name(),
            self.world.len(),
            self.entities.len()
        );
        Ok(())
    }

    pub fn build(self, benchmark: Option<&BenchmarkMetrics>) -> Map {
        let worldsize = self.worldsize();
        let voxels = self.world.len();

        let mut texmru: Vec<u16> = self
            .world
            .cubes()
            .filter(|c| c.kind != OctSav::Empty)
            .flat_map(|c| c.texture)
            .collect();
        texmru.sort_unstable();
        texmru.dedup();

        let start = Instant::now();
        let root = self.world.to_octree();
        if let Some(b) = benchmark {
            b.record_compaction(start.elapsed(), voxels);
        }
        log::debug!("Compacted {} voxels into a {} unit map", voxels, worldsize);

        let mut map = Map::new(worldsize);
        map.root = root;
        map.texmru = texmru;
        map.entities = self.entities;
        for (name, value) in self.vars {
            map.set_var(&name, value);
        }
        map
    }
}

/// Maps larger than the decoder's world size limit could not be read back.
fn check_scale(voxels: i32, scale: i32) -> Result<()> {
    if scale < 1 || scale.count_ones() != 1 || scale > MAX_LEAF_SIZE {
        bail!("Voxel scale must be a power of two in 1..={}, got {}", MAX_LEAF_SIZE, scale);
    }
    match voxels.checked_mul(scale) {
        Some(worldsize) if worldsize <= MAX_WORLD_SIZE => Ok(()),
        _ => bail!(
            "{} voxels at scale {} exceed the maximum world size {}",
            voxels,
            scale,
            MAX_WORLD_SIZE
        ),
    }
}
