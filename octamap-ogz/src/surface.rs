//! Extended surface block of a leaf: per-face surface info and vertices.
//!
//! Vertices are stored in eighths of a world unit, relative to the 4096-unit
//! block the cube sits in. Only the coordinates that cannot be derived from
//! the cube's edges or the face plane are present on disk.

use glam::IVec3;
use serde::{Deserialize, Serialize};

use crate::cursor::{Cursor, Writer};
use crate::error::Result;

pub const MAXFACEVERTS: u8 = 0x0F;
pub const LAYER_DUP: u8 = 0x80;

const VERT_ORDER: u8 = 0x01;
const VERT_COMPACT_UV: u8 = 0x02;
const VERT_XYZ: u8 = 0x04;
const VERT_COMPACT_NORM: u8 = 0x08;
const VERT_UV_ORDER: u8 = 0x30;
const VERT_UV: u8 = 0x40;
const VERT_NORM: u8 = 0x80;

/// Row and column axes of the face plane for each dimension.
const R: [usize; 3] = [1, 2, 0];
const C: [usize; 3] = [2, 0, 1];

/// Corner selection (x, y, z bits) of the four face vertices per orientation.
const FACE_CORNERS: [[[usize; 3]; 4]; 6] = [
    [[0, 1, 1], [0, 1, 0], [0, 0, 0], [0, 0, 1]],
    [[1, 1, 1], [1, 0, 1], [1, 0, 0], [1, 1, 0]],
    [[1, 0, 1], [0, 0, 1], [0, 0, 0], [1, 0, 0]],
    [[0, 1, 0], [0, 1, 1], [1, 1, 1], [1, 1, 0]],
    [[0, 0, 0], [0, 1, 0], [1, 1, 0], [1, 0, 0]],
    [[0, 0, 1], [1, 0, 1], [1, 1, 1], [0, 1, 1]],
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceInfo {
    pub lmid: [u8; 2],
    /// Vertex mask on disk.
    pub verts: u8,
    /// Low 4 bits: vertices per layer. `LAYER_DUP`: a second layer follows.
    pub numverts: u8,
}

impl SurfaceInfo {
    pub fn layerverts(&self) -> usize {
        (self.numverts & MAXFACEVERTS) as usize
    }

    pub fn totalverts(&self) -> usize {
        if self.numverts & LAYER_DUP != 0 {
            self.layerverts() * 2
        } else {
            self.layerverts()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertInfo {
    pub x: u16,
    pub y: u16,
    pub z: u16,
    pub u: u16,
    pub v: u16,
    pub norm: u16,
}

impl VertInfo {
    pub fn coord(&self, dim: usize) -> u16 {
        match dim {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn set_xyz(&mut self, p: IVec3) {
        self.x = p.x as u16;
        self.y = p.y as u16;
        self.z = p.z as u16;
    }

    pub fn xyz(&self) -> IVec3 {
        IVec3::new(self.x as i32, self.y as i32, self.z as i32)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub info: SurfaceInfo,
    /// `info.totalverts()` entries: the layer, then its duplicate if any.
    pub verts: Vec<VertInfo>,
}

/// The four face corners of `orient`, in eighths of the cube, from the edges.
pub fn face_verts(edges: &[u8; 12], orient: usize) -> [IVec3; 4] {
    let edge = |d: usize, x: usize, y: usize| edges[(d << 2) + (y << 1) + x];
    let get = |e: u8, coord: usize| if coord != 0 { (e >> 4) as i32 } else { (e & 0xF) as i32 };
    FACE_CORNERS[orient].map(|[x, y, z]| {
        IVec3::new(
            get(edge(0, y, z), x),
            get(edge(1, z, x), y),
            get(edge(2, x, y), z),
        )
    })
}

/// Face plane normal from the corner vertices, falling back to the second
/// triangle when the first is degenerate.
pub fn face_normal(v: &[IVec3; 4]) -> IVec3 {
    let e1 = v[1] - v[0];
    let e2 = v[2] - v[0];
    let n = e1.cross(e2);
    if n == IVec3::ZERO {
        e2.cross(v[3] - v[0])
    } else {
        n
    }
}

struct FacePlane {
    dim: usize,
    vc: usize,
    vr: usize,
    n: IVec3,
    bias: i64,
    vo: IVec3,
}

impl FacePlane {
    /// Point on the plane with the given column and row coordinates.
    fn solve(&self, c: u16, r: u16) -> IVec3 {
        let mut xyz = IVec3::ZERO;
        xyz[self.vc] = c as i32;
        xyz[self.vr] = r as i32;
        xyz[self.dim] = if self.n[self.dim] != 0 {
            let known = self.n[self.vc] as i64 * c as i64 + self.n[self.vr] as i64 * r as i64;
            (-(self.bias + known) / self.n[self.dim] as i64) as i32
        } else {
            self.vo[self.dim]
        };
        xyz
    }
}

fn block_origin(co: IVec3) -> IVec3 {
    IVec3::new((co.x & 0xFFF) << 3, (co.y & 0xFFF) << 3, (co.z & 0xFFF) << 3)
}

fn set_xyz(verts: &mut [VertInfo], k: usize, p: IVec3) {
    if let Some(v) = verts.get_mut(k) {
        v.set_xyz(p);
    }
}

/// Read a surface block; `edges`, `co` and `size` describe the owning cube.
pub fn read_surfaces(
    cur: &mut Cursor,
    edges: &[u8; 12],
    co: IVec3,
    size: i32,
) -> Result<[Option<Surface>; 6]> {
    let surfmask = cur.read_u8()?;
    let totalverts = cur.read_u8()?;
    let mut surfaces: [Option<Surface>; 6] = Default::default();
    let vo = block_origin(co);

    for (i, slot) in surfaces.iter_mut().enumerate() {
        if surfmask & (1 << i) == 0 {
            continue;
        }
        let raw = cur.read_bytes(4)?;
        let info = SurfaceInfo {
            lmid: [raw[0], raw[1]],
            verts: raw[2],
            numverts: raw[3],
        };
        let mut verts = vec![VertInfo::default(); info.totalverts()];
        if !verts.is_empty() {
            read_face_verts(cur, &info, &mut verts, edges, i, vo, size)?;
        }
        *slot = Some(Surface { info, verts });
    }

    let found: usize = surfaces.iter().flatten().map(|s| s.info.totalverts()).sum();
    if found != totalverts as usize {
        log::debug!(
            "Surface block declares {} vertices but faces hold {}",
            totalverts,
            found
        );
    }
    Ok(surfaces)
}

fn read_face_verts(
    cur: &mut Cursor,
    info: &SurfaceInfo,
    verts: &mut [VertInfo],
    edges: &[u8; 12],
    orient: usize,
    vo: IVec3,
    size: i32,
) -> Result<()> {
    let vertmask = info.verts;
    let layerverts = info.layerverts();
    let dup = info.numverts & LAYER_DUP != 0;
    let dim = orient >> 1;
    let v = face_verts(edges, orient);
    let mut hasxyz = vertmask & VERT_XYZ != 0;
    let mut hasuv = vertmask & VERT_UV != 0;
    let mut hasnorm = vertmask & VERT_NORM != 0;

    let mut plane = FacePlane {
        dim,
        vc: C[dim],
        vr: R[dim],
        n: IVec3::ZERO,
        bias: 0,
        vo,
    };
    if hasxyz {
        plane.n = face_normal(&v);
        let p0 = v[0] * size + vo;
        plane.bias = -(plane.n.x as i64 * p0.x as i64
            + plane.n.y as i64 * p0.y as i64
            + plane.n.z as i64 * p0.z as i64);
    } else {
        let vis = if layerverts < 4 {
            if vertmask & VERT_COMPACT_UV != 0 { 2 } else { 1 }
        } else {
            3
        };
        let order = (vertmask & VERT_ORDER) as usize;
        let mut k = 0;
        set_xyz(verts, k, v[order] * size + vo);
        k += 1;
        if vis & 1 != 0 {
            set_xyz(verts, k, v[order + 1] * size + vo);
            k += 1;
        }
        set_xyz(verts, k, v[order + 2] * size + vo);
        k += 1;
        if vis & 2 != 0 {
            set_xyz(verts, k, v[(order + 3) & 3] * size + vo);
        }
    }

    if layerverts == 4 {
        if hasxyz && vertmask & VERT_ORDER != 0 {
            let c1 = cur.read_u16()?;
            let r1 = cur.read_u16()?;
            let c2 = cur.read_u16()?;
            let r2 = cur.read_u16()?;
            verts[0].set_xyz(plane.solve(c1, r1));
            verts[1].set_xyz(plane.solve(c1, r2));
            verts[2].set_xyz(plane.solve(c2, r2));
            verts[3].set_xyz(plane.solve(c2, r1));
            hasxyz = false;
        }
        if hasuv && vertmask & VERT_COMPACT_UV != 0 {
            let uvorder = ((vertmask & VERT_UV_ORDER) >> 4) as usize;
            read_compact_uv(cur, verts, 0, uvorder)?;
            if dup {
                read_compact_uv(cur, verts, 4, uvorder)?;
            }
            hasuv = false;
        }
    }
    if hasnorm && vertmask & VERT_COMPACT_NORM != 0 {
        let norm = cur.read_u16()?;
        for v in verts.iter_mut().take(layerverts) {
            v.norm = norm;
        }
        hasnorm = false;
    }
    if hasxyz || hasuv || hasnorm {
        for v in verts.iter_mut().take(layerverts) {
            if hasxyz {
                let c = cur.read_u16()?;
                let r = cur.read_u16()?;
                v.set_xyz(plane.solve(c, r));
            }
            if hasuv {
                v.u = cur.read_u16()?;
                v.v = cur.read_u16()?;
            }
            if hasnorm {
                v.norm = cur.read_u16()?;
            }
        }
    }
    if dup {
        for k in 0..layerverts {
            let t = verts[k];
            let d = &mut verts[k + layerverts];
            d.x = t.x;
            d.y = t.y;
            d.z = t.z;
            if hasuv {
                d.u = cur.read_u16()?;
                d.v = cur.read_u16()?;
            }
            d.norm = t.norm;
        }
    }
    Ok(())
}

/// Two opposite corners carry the UVs; the other two share their components.
fn read_compact_uv(cur: &mut Cursor, verts: &mut [VertInfo], base: usize, uvorder: usize) -> Result<()> {
    let i0 = base + uvorder;
    let i1 = base + ((uvorder + 1) & 3);
    let i2 = base + ((uvorder + 2) & 3);
    let i3 = base + ((uvorder + 3) & 3);
    let (u0, v0) = (cur.read_u16()?, cur.read_u16()?);
    let (u2, v2) = (cur.read_u16()?, cur.read_u16()?);
    verts[i0].u = u0;
    verts[i0].v = v0;
    verts[i2].u = u2;
    verts[i2].v = v2;
    verts[i1].u = u0;
    verts[i1].v = v2;
    verts[i3].u = u2;
    verts[i3].v = v0;
    Ok(())
}

pub fn write_surfaces(w: &mut Writer, surfaces: &[Option<Surface>; 6]) {
    let mut surfmask = 0u8;
    let mut totalverts = 0usize;
    for (i, s) in surfaces.iter().enumerate() {
        if let Some(s) = s {
            surfmask |= 1 << i;
            totalverts += s.info.totalverts();
        }
    }
    w.write_u8(surfmask);
    w.write_u8(totalverts as u8);

    for (i, s) in surfaces.iter().enumerate() {
        let Some(s) = s else { continue };
        w.write_bytes(&[s.info.lmid[0], s.info.lmid[1], s.info.verts, s.info.numverts]);
        if s.info.totalverts() > 0 {
            write_face_verts(w, s, i >> 1);
        }
    }
}

fn write_face_verts(w: &mut Writer, s: &Surface, dim: usize) {
    let vertmask = s.info.verts;
    let layerverts = s.info.layerverts();
    let dup = s.info.numverts & LAYER_DUP != 0;
    let (vc, vr) = (C[dim], R[dim]);
    let vert = |k: usize| s.verts.get(k).copied().unwrap_or_default();
    let mut hasxyz = vertmask & VERT_XYZ != 0;
    let mut hasuv = vertmask & VERT_UV != 0;
    let mut hasnorm = vertmask & VERT_NORM != 0;

    if layerverts == 4 {
        if hasxyz && vertmask & VERT_ORDER != 0 {
            w.write_u16(vert(0).coord(vc));
            w.write_u16(vert(0).coord(vr));
            w.write_u16(vert(2).coord(vc));
            w.write_u16(vert(2).coord(vr));
            hasxyz = false;
        }
        if hasuv && vertmask & VERT_COMPACT_UV != 0 {
            let uvorder = ((vertmask & VERT_UV_ORDER) >> 4) as usize;
            let bases: &[usize] = if dup { &[0, 4] } else { &[0] };
            for &base in bases {
                let a = vert(base + uvorder);
                let b = vert(base + ((uvorder + 2) & 3));
                w.write_u16(a.u);
                w.write_u16(a.v);
                w.write_u16(b.u);
                w.write_u16(b.v);
            }
            hasuv = false;
        }
    }
    if hasnorm && vertmask & VERT_COMPACT_NORM != 0 {
        w.write_u16(vert(0).norm);
        hasnorm = false;
    }
    if hasxyz || hasuv || hasnorm {
        for k in 0..layerverts {
            let v = vert(k);
            if hasxyz {
                w.write_u16(v.coord(vc));
                w.write_u16(v.coord(vr));
            }
            if hasuv {
                w.write_u16(v.u);
                w.write_u16(v.v);
            }
            if hasnorm {
                w.write_u16(v.norm);
            }
        }
    }
    if dup && hasuv {
        for k in 0..layerverts {
            let v = vert(k + layerverts);
            w.write_u16(v.u);
            w.write_u16(v.v);
        }
    }
}
