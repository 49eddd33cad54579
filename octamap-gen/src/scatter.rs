use anyhow::{Result, bail};
use glam::{IVec3, Vec3};
use octamap_ogz::EntityKind;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::WorldGenerator;
use crate::flat::FLOOR_TEXTURE;
use crate::world::VoxelWorld;

/// Textures handed out to pillars, inclusive.
const PILLAR_TEXTURES: std::ops::RangeInclusive<u16> = 2..=6;

/// Floor plus randomly placed pillars. The same seed always yields the same world.
pub struct ScatterGenerator {
    pub seed: u64,
    pub pillars: usize,
    pub max_height: i32,
}

impl ScatterGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            pillars: 16,
            max_height: 6,
        }
    }
}

impl WorldGenerator for ScatterGenerator {
    fn name(&self) -> &'static str {
        "scatter"
    }

    fn generate(&self, world: &mut VoxelWorld) -> Result<()> {
        if self.max_height < 1 {
            bail!("Pillar height must be at least 1, got {}", self.max_height);
        }
        let size = world.size();
        for y in 0..size {
            for x in 0..size {
                world.set_solid(IVec3::new(x, y, 0), FLOOR_TEXTURE);
            }
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        for _ in 0..self.pillars {
            let x = rng.gen_range(0..size);
            let y = rng.gen_range(0..size);
            let height = rng.gen_range(1..=self.max_height).min(size - 1);
            let texture = rng.gen_range(PILLAR_TEXTURES);
            for z in 1..=height {
                world.set_solid(IVec3::new(x, y, z), texture);
            }
        }
        log::debug!("Scattered {} pillars with seed {}", self.pillars, self.seed);
        Ok(())
    }

    fn entities(&self, world: &VoxelWorld) -> Vec<(Vec3, EntityKind)> {
        let mid = world.size() / 2;
        let top = world.top(mid, mid).unwrap_or(0) as f32 + 1.0;
        vec![
            (Vec3::new(mid as f32 + 0.5, mid as f32 + 0.5, top), EntityKind::PlayerStart { team: 0, yaw: 0, pitch: 0 }),
            (
                Vec3::ZERO,
                EntityKind::Sunlight { yaw: 30, pitch: 60, red: 200, green: 190, blue: 170, offset: 0, flare: 0, flarescale: 0 },
            ),
        ]
    }
}
