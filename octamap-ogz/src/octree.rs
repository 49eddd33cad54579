//! Octree node codec and the post-load validation pass.

use glam::IVec3;

use crate::cube::{Cube, CubeExt, IdSequence, OctSav, fill_children, is_degenerate_face};
use crate::cursor::{Cursor, Writer};
use crate::error::{DecodeError, Result, TagKind};
use crate::surface::{read_surfaces, write_surfaces};

const OCTSAV_EXT: u8 = 0x20;
const OCTSAV_MATERIAL: u8 = 0x40;
const OCTSAV_MERGED: u8 = 0x80;

/// Children of a node this small are coalesced into a solid leaf.
pub const MIN_CUBE_SIZE: i32 = 1;
/// Leaves larger than this are split on load.
pub const MAX_LEAF_SIZE: i32 = 0x1000;

/// Where an octree decode hit an unknown node tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagFailure {
    pub offset: usize,
    pub tag: u8,
}

impl From<TagFailure> for DecodeError {
    fn from(f: TagFailure) -> Self {
        DecodeError::UnknownTag {
            kind: TagKind::OctreeNode,
            tag: f.tag as i64,
            offset: f.offset,
        }
    }
}

/// A decoded root. With `failure` set the tree is partial: every node after
/// the bad tag is an empty placeholder.
#[derive(Debug)]
pub struct CubeTree {
    pub root: Box<[Cube; 8]>,
    pub failure: Option<TagFailure>,
}

impl CubeTree {
    pub fn into_result(self) -> Result<Box<[Cube; 8]>> {
        match self.failure {
            Some(f) => Err(f.into()),
            None => Ok(self.root),
        }
    }
}

#[inline]
fn child_origin(co: IVec3, i: usize, size: i32) -> IVec3 {
    co + IVec3::new(
        (i & 1) as i32 * size,
        ((i >> 1) & 1) as i32 * size,
        ((i >> 2) & 1) as i32 * size,
    )
}

struct TreeReader<'a, 'b> {
    cur: &'a mut Cursor<'b>,
    ids: &'a mut IdSequence,
    failure: Option<TagFailure>,
}

impl TreeReader<'_, '_> {
    fn load_children(&mut self, co: IVec3, size: i32) -> Result<Box<[Cube; 8]>> {
        let mut children: [Option<Cube>; 8] = Default::default();
        for (i, slot) in children.iter_mut().enumerate() {
            *slot = Some(self.load_cube(child_origin(co, i, size), size)?);
            if self.failure.is_some() {
                break;
            }
        }
        Ok(fill_children(children, self.ids))
    }

    fn load_cube(&mut self, co: IVec3, size: i32) -> Result<Cube> {
        let mut c = Cube::empty(self.ids.next_id());
        let tag_offset = self.cur.position();
        let octsav = self.cur.read_u8()?;

        let Some(kind) = OctSav::from_tag(octsav) else {
            log::warn!("Unknown octree node tag {} at offset {}", octsav & 0x7, tag_offset);
            self.failure = Some(TagFailure { offset: tag_offset, tag: octsav & 0x7 });
            return Ok(c);
        };
        c.kind = kind;

        if matches!(kind, OctSav::Children | OctSav::LodCube) && size <= 0 {
            return Err(DecodeError::TreeTooDeep { size, offset: tag_offset });
        }

        match kind {
            OctSav::Children => {
                c.children = Some(self.load_children(co, size >> 1)?);
                return Ok(c);
            }
            OctSav::LodCube => {}
            OctSav::Empty => c.set_empty(),
            OctSav::Solid => c.set_solid(),
            OctSav::Normal => c.edges.copy_from_slice(self.cur.read_bytes(12)?),
        }

        for t in c.texture.iter_mut() {
            *t = self.cur.read_u16()?;
        }
        if octsav & OCTSAV_MATERIAL != 0 {
            c.material = Some(self.cur.read_u16()?);
        }
        if octsav & OCTSAV_MERGED != 0 {
            c.merged = Some(self.cur.read_u8()?);
        }
        if octsav & OCTSAV_EXT != 0 {
            let surfaces = read_surfaces(self.cur, &c.edges, co, size)?;
            c.ext = Some(CubeExt { surfaces });
        }

        if kind == OctSav::LodCube {
            c.children = Some(self.load_children(co, size >> 1)?);
        }
        Ok(c)
    }
}

/// Decode the 8 root nodes, each of edge length `size`.
///
/// Cursor over-reads abort with an error. An unknown node tag stops the
/// decode but still returns the partial tree.
pub fn read_cube_tree(cur: &mut Cursor, size: i32, ids: &mut IdSequence) -> Result<CubeTree> {
    let mut reader = TreeReader { cur, ids, failure: None };
    let root = reader.load_children(IVec3::ZERO, size)?;
    if let Some(f) = reader.failure {
        log::warn!("Octree decode stopped at offset {} (tag {})", f.offset, f.tag);
    }
    Ok(CubeTree { root, failure: reader.failure })
}

fn save_cube(w: &mut Writer, c: &Cube) {
    if c.kind == OctSav::Children {
        w.write_u8(OctSav::Children as u8);
        save_children_or_empty(w, c);
        return;
    }

    let mut octsav = c.kind as u8;
    if c.material.is_some() {
        octsav |= OCTSAV_MATERIAL;
    }
    if c.merged.is_some() {
        octsav |= OCTSAV_MERGED;
    }
    if c.ext.is_some() {
        octsav |= OCTSAV_EXT;
    }
    w.write_u8(octsav);
    if c.kind == OctSav::Normal {
        w.write_bytes(&c.edges);
    }
    for &t in &c.texture {
        w.write_u16(t);
    }
    if let Some(m) = c.material {
        w.write_u16(m);
    }
    if let Some(m) = c.merged {
        w.write_u8(m);
    }
    if let Some(ext) = &c.ext {
        write_surfaces(w, &ext.surfaces);
    }
    if c.kind == OctSav::LodCube {
        save_children_or_empty(w, c);
    }
}

/// A node tagged with children must be followed by eight nodes or the stream desyncs.
fn save_children_or_empty(w: &mut Writer, c: &Cube) {
    match &c.children {
        Some(children) => save_children(w, children),
        None => {
            for _ in 0..8 {
                save_cube(w, &Cube::empty(0));
            }
        }
    }
}

fn save_children(w: &mut Writer, children: &[Cube; 8]) {
    for c in children {
        save_cube(w, c);
    }
}

pub fn write_cube_tree(w: &mut Writer, root: &[Cube; 8]) {
    save_children(w, root);
}

/// Normalize a freshly loaded tree.
///
/// Coalesces children below the minimum size, splits oversized leaves and
/// empties leaves whose edges describe a degenerate shape.
pub fn validate(cubes: &mut [Cube; 8], size: i32, ids: &mut IdSequence) {
    for c in cubes.iter_mut() {
        if c.children.is_some() {
            if size <= MIN_CUBE_SIZE {
                log::debug!("Coalescing children of cube {} at size {}", c.id, size);
                c.set_solid();
                c.children = None;
            } else if let Some(children) = c.children.as_mut() {
                validate(children, size >> 1, ids);
            }
        } else if size > MAX_LEAF_SIZE {
            c.subdivide(ids);
            if let Some(children) = c.children.as_mut() {
                validate(children, size >> 1, ids);
            }
        } else if c.faces().iter().any(|&f| is_degenerate_face(f)) && !c.is_empty() {
            log::debug!("Emptying degenerate cube {}", c.id);
            c.set_empty();
        }
    }
}
