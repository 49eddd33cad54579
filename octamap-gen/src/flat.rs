use anyhow::Result;
use glam::{IVec3, Vec3};
use octamap_ogz::EntityKind;

use crate::WorldGenerator;
use crate::world::VoxelWorld;

pub const FLOOR_TEXTURE: u16 = 1;
pub const PILLAR_TEXTURE: u16 = 2;
const PILLAR_HEIGHT: i32 = 4;

/// A single floor layer with one pillar in the middle.
pub struct FlatGenerator;

impl FlatGenerator {
    fn pillar_column(world: &VoxelWorld) -> (i32, i32) {
        let mid = world.size() / 2;
        (mid, mid)
    }
}

impl WorldGenerator for FlatGenerator {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn generate(&self, world: &mut VoxelWorld) -> Result<()> {
        let size = world.size();
        for y in 0..size {
            for x in 0..size {
                world.set_solid(IVec3::new(x, y, 0), FLOOR_TEXTURE);
            }
        }

        // Pillar marker, clipped to the world height
        let (px, py) = Self::pillar_column(world);
        for z in 1..=PILLAR_HEIGHT.min(size - 1) {
            world.set_solid(IVec3::new(px, py, z), PILLAR_TEXTURE);
        }
        Ok(())
    }

    fn entities(&self, world: &VoxelWorld) -> Vec<(Vec3, EntityKind)> {
        let (px, py) = Self::pillar_column(world);
        let top = world.top(px, py).unwrap_or(0) as f32 + 1.0;
        vec![
            (Vec3::new(0.5, 0.5, 1.0), EntityKind::PlayerStart { team: 0, yaw: 45, pitch: 0 }),
            (
                Vec3::new(px as f32 + 0.5, py as f32 + 0.5, top + 0.5),
                EntityKind::Light { radius: 128, red: 255, green: 255, blue: 255, flare: 0, flarescale: 0 },
            ),
        ]
    }
}
