//! Octree nodes.
//!
//! Edge layout: `edges[d * 4 + y * 2 + x]` is the edge running along
//! dimension `d` at corner `(x, y)` of the other two dimensions. The low nibble
//! is where the solid span starts (0..=8), the high nibble where it ends.

use serde::{Deserialize, Serialize};

use crate::surface::Surface;

pub const F_EMPTY: u32 = 0;
pub const F_SOLID: u32 = 0x8080_8080;

/// Leading byte of every serialized node; the low 3 bits select the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OctSav {
    Children = 0,
    Empty = 1,
    Solid = 2,
    Normal = 3,
    LodCube = 4,
}

impl OctSav {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag & 0x7 {
            0 => Some(OctSav::Children),
            1 => Some(OctSav::Empty),
            2 => Some(OctSav::Solid),
            3 => Some(OctSav::Normal),
            4 => Some(OctSav::LodCube),
            _ => None,
        }
    }
}

/// Hands out debug ids for cubes built by one decode or one world build.
#[derive(Debug, Default, Clone)]
pub struct IdSequence {
    next: u32,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn issued(&self) -> u32 {
        self.next
    }
}

/// Extended per-face data of a leaf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CubeExt {
    pub surfaces: [Option<Surface>; 6],
}

impl CubeExt {
    pub fn total_verts(&self) -> usize {
        self.surfaces
            .iter()
            .flatten()
            .map(|s| s.info.totalverts())
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cube {
    /// Debug id. Never used for identity.
    pub id: u32,
    pub kind: OctSav,
    pub children: Option<Box<[Cube; 8]>>,
    pub ext: Option<CubeExt>,
    pub edges: [u8; 12],
    pub texture: [u16; 6],
    pub material: Option<u16>,
    pub merged: Option<u8>,
    /// Runtime-only masks, not serialized.
    #[serde(default)]
    pub escaped: u8,
    #[serde(default)]
    pub visible: u8,
}

impl Cube {
    /// An empty leaf with default textures.
    pub fn empty(id: u32) -> Self {
        Self {
            id,
            kind: OctSav::Empty,
            children: None,
            ext: None,
            edges: [0; 12],
            texture: [0; 6],
            material: None,
            merged: None,
            escaped: 0,
            visible: 0,
        }
    }

    pub fn solid(id: u32, texture: u16) -> Self {
        let mut c = Self::empty(id);
        c.set_solid();
        c.texture = [texture; 6];
        c
    }

    pub fn with_children(id: u32, children: Box<[Cube; 8]>) -> Self {
        let mut c = Self::empty(id);
        c.kind = OctSav::Children;
        c.children = Some(children);
        c
    }

    pub fn set_empty(&mut self) {
        self.edges = [0; 12];
        self.kind = OctSav::Empty;
    }

    pub fn set_solid(&mut self) {
        self.edges = [0x80; 12];
        self.kind = OctSav::Solid;
    }

    /// The three packed face words (four edges each, little-endian).
    pub fn faces(&self) -> [u32; 3] {
        let mut faces = [0u32; 3];
        for (d, f) in faces.iter_mut().enumerate() {
            let e = &self.edges[d * 4..d * 4 + 4];
            *f = u32::from_le_bytes([e[0], e[1], e[2], e[3]]);
        }
        faces
    }

    pub fn is_empty(&self) -> bool {
        self.faces()[0] == F_EMPTY
    }

    pub fn is_entirely_solid(&self) -> bool {
        self.faces().iter().all(|&f| f == F_SOLID)
    }

    /// True for an empty leaf that carries nothing but defaults.
    pub fn is_default_empty(&self) -> bool {
        self.children.is_none()
            && self.kind == OctSav::Empty
            && self.ext.is_none()
            && self.texture == [0; 6]
            && self.material.is_none()
            && self.merged.is_none()
    }

    #[inline]
    pub fn edge(&self, d: usize, x: usize, y: usize) -> u8 {
        self.edges[(d << 2) + (y << 1) + x]
    }

    /// Split a leaf into eight children covering the same geometry.
    ///
    /// Empty and solid leaves copy uniformly. Other shapes re-slice each edge
    /// into the child's half; edges at the parent's mid lines interpolate the
    /// two neighbouring parent edges.
    pub fn subdivide(&mut self, ids: &mut IdSequence) {
        if self.children.is_some() {
            return;
        }
        let uniform = self.is_empty() || self.is_entirely_solid();
        let empty = self.is_empty();

        let children: [Cube; 8] = std::array::from_fn(|i| {
            let mut child = Cube::empty(ids.next_id());
            child.texture = self.texture;
            child.material = self.material;
            if uniform {
                if !empty {
                    child.set_solid();
                }
            } else {
                child.edges = self.child_edges(i);
                child.kind = classify(&child.edges);
            }
            child
        });

        self.ext = None;
        self.kind = OctSav::Children;
        self.children = Some(Box::new(children));
    }

    fn child_edges(&self, child: usize) -> [u8; 12] {
        let bits = [child & 1, (child >> 1) & 1, (child >> 2) & 1];
        let mut out = [0u8; 12];
        for d in 0..3 {
            // The two dimensions orthogonal to d, in the order the edge index uses.
            let (dx, dy) = ((d + 1) % 3, (d + 2) % 3);
            for y in 0..2 {
                for x in 0..2 {
                    // Corner position in parent halves: 0, 1 (mid) or 2.
                    let px = bits[dx] + x;
                    let py = bits[dy] + y;
                    let (s, e) = self.sample_edge(d, px, py);
                    let half = bits[d] as i32 * 8;
                    let s = (s * 2 - half).clamp(0, 8);
                    let e = (e * 2 - half).clamp(0, 8);
                    out[(d << 2) + (y << 1) + x] = if e <= s {
                        0
                    } else {
                        (s as u8) | ((e as u8) << 4)
                    };
                }
            }
        }
        out
    }

    /// Edge span at a corner given in parent half-units, interpolated at mid lines.
    fn sample_edge(&self, d: usize, px: usize, py: usize) -> (i32, i32) {
        let span = |x: usize, y: usize| {
            let e = self.edge(d, x, y);
            ((e & 0xF) as i32, (e >> 4) as i32)
        };
        let xs: &[usize] = match px {
            0 => &[0],
            1 => &[0, 1],
            _ => &[1],
        };
        let ys: &[usize] = match py {
            0 => &[0],
            1 => &[0, 1],
            _ => &[1],
        };
        let (mut s, mut e, mut n) = (0, 0, 0);
        for &x in xs {
            for &y in ys {
                let (a, b) = span(x, y);
                s += a;
                e += b;
                n += 1;
            }
        }
        (s / n, (e + n - 1) / n)
    }
}

fn classify(edges: &[u8; 12]) -> OctSav {
    if edges.iter().all(|&e| e == 0) {
        OctSav::Empty
    } else if edges.iter().all(|&e| e == 0x80) {
        OctSav::Solid
    } else {
        OctSav::Normal
    }
}

/// Collapse test for one face word: the span is inverted or zero-length.
pub fn is_degenerate_face(f: u32) -> bool {
    let e0 = f & 0x0F0F_0F0F;
    let e1 = (f >> 4) & 0x0F0F_0F0F;
    e0 == e1 || ((e1.wrapping_add(0x0707_0707)) | e1.wrapping_sub(e0)) & 0x1010_1010 != 0
}

/// Build an 8-child array, filling gaps with fresh empty leaves.
pub fn fill_children(children: [Option<Cube>; 8], ids: &mut IdSequence) -> Box<[Cube; 8]> {
    let mut children = children.into_iter();
    Box::new(std::array::from_fn(|_| {
        children
            .next()
            .flatten()
            .unwrap_or_else(|| Cube::empty(ids.next_id()))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_words() {
        let mut ids = IdSequence::new();
        let solid = Cube::solid(ids.next_id(), 1);
        assert_eq!(solid.faces(), [F_SOLID; 3]);
        assert!(solid.is_entirely_solid());
        let empty = Cube::empty(ids.next_id());
        assert!(empty.is_empty());
        assert!(empty.is_default_empty());
        assert_eq!(ids.issued(), 2);
    }

    #[test]
    fn test_degenerate_faces() {
        assert!(!is_degenerate_face(F_SOLID));
        assert!(is_degenerate_face(F_EMPTY));
        // start == end on every edge
        assert!(is_degenerate_face(0x4444_4444));
        // start after end on one edge
        assert!(is_degenerate_face(0x8080_8026));
        // a proper half-height span
        assert!(!is_degenerate_face(0x4040_4040));
    }

    #[test]
    fn test_subdivide_solid_is_uniform() {
        let mut ids = IdSequence::new();
        let mut c = Cube::solid(ids.next_id(), 7);
        c.subdivide(&mut ids);
        assert_eq!(c.kind, OctSav::Children);
        let children = c.children.as_ref().unwrap();
        assert!(children.iter().all(|ch| ch.is_entirely_solid() && ch.texture == [7; 6]));
    }

    #[test]
    fn test_subdivide_half_height_cube() {
        let mut ids = IdSequence::new();
        let mut c = Cube::solid(ids.next_id(), 1);
        // Solid from z = 0 to z = 4 (in eighths): the four z edges end at 4.
        for i in 8..12 {
            c.edges[i] = 0x40;
        }
        c.kind = OctSav::Normal;
        c.subdivide(&mut ids);
        let children = c.children.as_ref().unwrap();
        for (i, ch) in children.iter().enumerate() {
            if i & 4 == 0 {
                assert!(ch.is_entirely_solid(), "lower child {} should be solid", i);
            } else {
                assert_eq!(&ch.edges[8..12], &[0, 0, 0, 0], "upper child {} z edges", i);
            }
        }
    }

    #[test]
    fn test_fill_children() {
        let mut ids = IdSequence::new();
        let mut slots: [Option<Cube>; 8] = Default::default();
        slots[3] = Some(Cube::solid(100, 2));
        let filled = fill_children(slots, &mut ids);
        assert!(filled[3].is_entirely_solid());
        assert_eq!(filled.iter().filter(|c| c.is_default_empty()).count(), 7);
    }
}
