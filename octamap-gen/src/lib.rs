use anyhow::Result;
use glam::Vec3;
use octamap_ogz::EntityKind;


pub trait WorldGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate(&self, world: &mut VoxelWorld) -> Result<()>;

    /// Entities to place after terrain generation, positioned in voxel units.
    fn entities(&self, _world: &VoxelWorld) -> Vec<(Vec3, EntityKind)> {
        Vec::new()
    }
}

pub mod builder;
pub mod flat;
pub mod scatter;
pub mod world;

pub use builder::MapBuilder;
pub use flat::FlatGenerator;
pub use scatter::ScatterGenerator;
pub use world::VoxelWorld;
