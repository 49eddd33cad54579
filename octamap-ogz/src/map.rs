//! Map container: header, variables, texture MRU, entities, vslots, octree.

use serde::{Deserialize, Serialize};

use crate::cube::{Cube, IdSequence};
use crate::cursor::{Cursor, Writer};
use crate::entity::Entity;
use crate::error::{DecodeError, Result, TagKind};
use crate::octree::{self, TagFailure};
use crate::text::RawString;
use crate::vslot::{self, VSlot};

pub const MAGIC_MAPZ: [u8; 4] = *b"MAPZ";
pub const MAGIC_OCTA: [u8; 4] = *b"OCTA";

/// Version written for new maps.
pub const MAP_VERSION: i32 = 50;
/// magic + 10 ints + game id.
pub const HEADER_SIZE: i32 = 48;
pub const DEFAULT_GAME_ID: &str = "fps";
/// Largest world edge accepted on load (world scale 16).
pub const MAX_WORLD_SIZE: i32 = 1 << 16;
const WORLDSIZE_OFFSET: usize = 12;
/// Game id bytes on disk, followed by a NUL.
const GAME_ID_LEN: usize = 3;

const VAR_INT: i32 = 0;
const VAR_FLOAT: i32 = 1;
const VAR_STRING: i32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMeta {
    pub worldsize: i32,
    pub numents: i32,
    pub numpvs: i32,
    pub lightmaps: i32,
    pub blendmap: i32,
    pub numvslots: i32,
    pub gamever: i32,
    pub revision: i32,
    pub gameid: RawString,
}

impl MapMeta {
    pub fn new(worldsize: i32) -> Self {
        Self {
            worldsize,
            numents: 0,
            numpvs: 0,
            lightmaps: 0,
            blendmap: 0,
            numvslots: 0,
            gamever: 0,
            revision: 0,
            gameid: RawString::from(DEFAULT_GAME_ID),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MapVar {
    Int(i32),
    Float(f32),
    Str(RawString),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Map {
    pub magic: [u8; 4],
    pub version: i32,
    pub headersize: i32,
    pub meta: MapMeta,
    /// Named variables in file order.
    pub vars: Vec<(RawString, MapVar)>,
    pub texmru: Vec<u16>,
    pub entities: Vec<Entity>,
    pub vslots: Vec<VSlot>,
    pub root: Box<[Cube; 8]>,
    /// Unparsed sections after the octree (PVS, lightmaps, blendmap), kept verbatim.
    #[serde(default)]
    pub trailer: Vec<u8>,
}

impl Map {
    /// An empty world of edge length `worldsize`.
    pub fn new(worldsize: i32) -> Self {
        let mut ids = IdSequence::new();
        Self {
            magic: MAGIC_MAPZ,
            version: MAP_VERSION,
            headersize: HEADER_SIZE,
            meta: MapMeta::new(worldsize),
            vars: Vec::new(),
            texmru: Vec::new(),
            entities: Vec::new(),
            vslots: Vec::new(),
            root: Box::new(std::array::from_fn(|_| Cube::empty(ids.next_id()))),
            trailer: Vec::new(),
        }
    }

    pub fn var(&self, name: &str) -> Option<&MapVar> {
        self.vars.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Set a variable, keeping its position if it already exists.
    pub fn set_var(&mut self, name: &str, value: MapVar) {
        match self.vars.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.vars.push((RawString::from(name), value)),
        }
    }

    /// Decode a decompressed map body. An unknown octree node tag is an error.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let (map, failure) = Self::decode_partial(body)?;
        match failure {
            Some(f) => Err(f.into()),
            None => Ok(map),
        }
    }

    /// Decode a decompressed map body, keeping a partially decoded octree.
    ///
    /// Anything but an unknown octree node tag still fails. On a tag failure the
    /// octree holds every node read before it, the trailer is empty, and the
    /// validation pass is skipped.
    pub fn decode_partial(body: &[u8]) -> Result<(Self, Option<TagFailure>)> {
        let mut cur = Cursor::new(body);

        let mut magic = [0u8; 4];
        magic.copy_from_slice(cur.read_bytes(4)?);
        if magic != MAGIC_MAPZ && magic != MAGIC_OCTA {
            return Err(DecodeError::BadMagic { found: magic });
        }
        let version = cur.read_i32()?;
        let headersize = cur.read_i32()?;
        let fields = cur.read_i32s(8)?;
        let gameid = cur.read_string(GAME_ID_LEN, true)?;
        let meta = MapMeta {
            worldsize: fields[0],
            numents: fields[1],
            numpvs: fields[2],
            lightmaps: fields[3],
            blendmap: fields[4],
            numvslots: fields[5],
            gamever: fields[6],
            revision: fields[7],
            gameid,
        };
        log::debug!(
            "Map header: {} v{} worldsize {} ents {} vslots {}",
            String::from_utf8_lossy(&magic),
            version,
            meta.worldsize,
            meta.numents,
            meta.numvslots
        );

        if !(2..=MAX_WORLD_SIZE).contains(&meta.worldsize) {
            return Err(DecodeError::CountOutOfRange {
                what: "world size",
                count: meta.worldsize as i64,
                limit: MAX_WORLD_SIZE as i64,
                offset: WORLDSIZE_OFFSET,
            });
        }

        let numvars = cur.read_i32()?.max(0);
        let mut vars = Vec::with_capacity(numvars.min(1024) as usize);
        for _ in 0..numvars {
            vars.push(read_var(&mut cur)?);
        }

        let nummru = cur.read_u16()?;
        let mut texmru = Vec::with_capacity(nummru as usize);
        for _ in 0..nummru {
            texmru.push(cur.read_u16()?);
        }

        let numents = meta.numents.max(0) as usize;
        let mut entities = Vec::with_capacity(numents.min(1 << 16));
        for _ in 0..numents {
            entities.push(Entity::read(&mut cur)?);
        }

        let vslots = vslot::read_vslots(&mut cur, meta.numvslots.max(0) as usize)?;

        let mut ids = IdSequence::new();
        let tree = octree::read_cube_tree(&mut cur, meta.worldsize >> 1, &mut ids)?;
        let mut root = tree.root;
        let trailer = if tree.failure.is_none() {
            octree::validate(&mut root, meta.worldsize >> 1, &mut ids);
            cur.read_bytes(cur.remaining())?.to_vec()
        } else {
            Vec::new()
        };

        log::info!(
            "Decoded map: {} vars, {} entities, {} vslots, {} cubes, {} trailing bytes",
            vars.len(),
            entities.len(),
            vslots.len(),
            ids.issued(),
            trailer.len()
        );

        let map = Self {
            magic,
            version,
            headersize,
            meta,
            vars,
            texmru,
            entities,
            vslots,
            root,
            trailer,
        };
        Ok((map, tree.failure))
    }

    /// Encode to a decompressed map body.
    ///
    /// Entity and vslot counts are taken from the lists, not from `meta`.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_bytes(&self.magic);
        w.write_i32(self.version);
        w.write_i32(self.headersize);
        let numents = clamp_count("entity", self.entities.len(), i32::MAX as usize);
        let numvslots = clamp_count("vslot", self.vslots.len(), i32::MAX as usize);
        let numvars = clamp_count("variable", self.vars.len(), i32::MAX as usize);
        let numtex = clamp_count("texture MRU", self.texmru.len(), u16::MAX as usize);

        w.write_i32(self.meta.worldsize);
        w.write_i32(numents as i32);
        w.write_i32(self.meta.numpvs);
        w.write_i32(self.meta.lightmaps);
        w.write_i32(self.meta.blendmap);
        w.write_i32(numvslots as i32);
        w.write_i32(self.meta.gamever);
        w.write_i32(self.meta.revision);
        let gameid = self.meta.gameid.as_bytes();
        if gameid.len() > GAME_ID_LEN {
            log::warn!("Game id '{}' truncated to {} bytes", self.meta.gameid, GAME_ID_LEN);
        }
        let mut padded = [0u8; GAME_ID_LEN + 1];
        for (dst, src) in padded.iter_mut().zip(gameid.iter().take(GAME_ID_LEN)) {
            *dst = *src;
        }
        w.write_bytes(&padded);

        w.write_i32(numvars as i32);
        for (name, value) in &self.vars[..numvars] {
            write_var(&mut w, name, value);
        }

        w.write_u16(numtex as u16);
        for &t in &self.texmru[..numtex] {
            w.write_u16(t);
        }

        for e in &self.entities[..numents] {
            e.write(&mut w);
        }
        vslot::write_vslots(&mut w, &self.vslots[..numvslots]);
        octree::write_cube_tree(&mut w, &self.root);
        w.write_bytes(&self.trailer);

        log::debug!("Encoded map body of {} bytes", w.position());
        w.into_inner()
    }
}

fn read_var(cur: &mut Cursor) -> Result<(RawString, MapVar)> {
    let len = cur.read_i32()?.max(0) as usize;
    let name = cur.read_string(len, true)?;
    let type_offset = cur.position();
    let value = match cur.read_i32()? {
        VAR_INT => MapVar::Int(cur.read_i32()?),
        VAR_FLOAT => MapVar::Float(cur.read_f32()?),
        VAR_STRING => {
            let slen = cur.read_i32()?.max(0) as usize;
            MapVar::Str(cur.read_string(slen, true)?)
        }
        other => {
            return Err(DecodeError::UnknownTag {
                kind: TagKind::MapVar,
                tag: other as i64,
                offset: type_offset,
            });
        }
    };
    Ok((name, value))
}

/// Number of list entries that fit the on-disk count field.
pub(crate) fn clamp_count(what: &str, len: usize, max: usize) -> usize {
    if len > max {
        log::warn!("Too many {} entries ({}), writing the first {}", what, len, max);
    }
    len.min(max)
}

fn write_sized_string(w: &mut Writer, what: &str, s: &RawString) {
    let n = clamp_count(what, s.len(), i32::MAX as usize);
    w.write_i32(n as i32);
    w.write_string(&s.as_bytes()[..n], true);
}

fn write_var(w: &mut Writer, name: &RawString, value: &MapVar) {
    write_sized_string(w, "variable name byte", name);
    match value {
        MapVar::Int(v) => {
            w.write_i32(VAR_INT);
            w.write_i32(*v);
        }
        MapVar::Float(v) => {
            w.write_i32(VAR_FLOAT);
            w.write_f32(*v);
        }
        MapVar::Str(s) => {
            w.write_i32(VAR_STRING);
            write_sized_string(w, "variable value byte", s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::OctSav;
    use crate::entity::EntityKind;
    use crate::vslot::VSLOT_SCALE;

    fn header(w: &mut Writer, worldsize: i32, numents: i32, numvslots: i32) {
        w.write_bytes(b"MAPZ");
        w.write_i32(MAP_VERSION);
        w.write_i32(HEADER_SIZE);
        for v in [worldsize, numents, 0, 0, 0, numvslots, 0, 0] {
            w.write_i32(v);
        }
        w.write_bytes(b"fps\0");
    }

    fn leaf(w: &mut Writer, tag: u8) {
        w.write_u8(tag);
        for _ in 0..6 {
            w.write_u16(1);
        }
    }

    /// World size 8, no entities or vslots, root[0] solid.
    fn minimal_body() -> Vec<u8> {
        let mut w = Writer::new();
        header(&mut w, 8, 0, 0);
        w.write_i32(0);
        w.write_u16(0);
        leaf(&mut w, OctSav::Solid as u8);
        for _ in 0..7 {
            leaf(&mut w, OctSav::Empty as u8);
        }
        w.into_inner()
    }

    #[test]
    fn test_minimal_map() {
        let body = minimal_body();
        let map = Map::decode(&body).unwrap();
        assert_eq!(map.meta.worldsize, 8);
        assert_eq!(map.meta.gameid, "fps");
        assert!(map.entities.is_empty());
        assert!(map.vslots.is_empty());
        assert_eq!(map.root[0].faces(), [crate::cube::F_SOLID; 3]);
        assert!(map.root[1].is_empty());
        assert_eq!(map.encode(), body);
    }

    #[test]
    fn test_full_body_round_trip() {
        let mut w = Writer::new();
        header(&mut w, 16, 2, 2);
        w.write_i32(3);
        for (name, ty) in [("skylight", VAR_INT), ("fogdensity", VAR_FLOAT), ("maptitle", VAR_STRING)] {
            w.write_i32(name.len() as i32);
            w.write_string(name, true);
            w.write_i32(ty);
            match ty {
                VAR_INT => w.write_i32(0x404040),
                VAR_FLOAT => w.write_f32(0.25),
                _ => {
                    w.write_i32(5);
                    w.write_string("Arena", true);
                }
            }
        }
        w.write_u16(2);
        w.write_u16(7);
        w.write_u16(3);
        Entity::new([8.0, 8.0, 4.0], EntityKind::PlayerStart { team: 0, yaw: 90, pitch: 0 }).write(&mut w);
        Entity::new([2.0, 2.0, 6.0], EntityKind::Light { radius: 64, red: 255, green: 200, blue: 100, flare: 0, flarescale: 0 }).write(&mut w);
        w.write_i32(-1);
        w.write_i32(1 << VSLOT_SCALE);
        w.write_i32(-1);
        w.write_f32(2.0);
        w.write_u8(OctSav::Children as u8);
        for _ in 0..8 {
            leaf(&mut w, OctSav::Solid as u8);
        }
        for _ in 0..7 {
            leaf(&mut w, OctSav::Empty as u8);
        }
        w.write_bytes(&[0xAA, 0xBB, 0xCC]);
        let body = w.into_inner();

        let map = Map::decode(&body).unwrap();
        assert_eq!(map.var("skylight"), Some(&MapVar::Int(0x404040)));
        assert_eq!(map.var("fogdensity"), Some(&MapVar::Float(0.25)));
        assert_eq!(map.var("maptitle"), Some(&MapVar::Str("Arena".into())));
        assert_eq!(map.texmru, vec![7, 3]);
        assert_eq!(map.entities.len(), 2);
        assert_eq!(map.vslots.len(), 2);
        assert_eq!(map.vslots[1].scale, 2.0);
        assert_eq!(map.trailer, vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(map.encode(), body);
    }

    #[test]
    fn test_single_byte_charset_title_round_trip() {
        let title = [0x43, 0xE9, 0x66, 0x65];
        let mut w = Writer::new();
        header(&mut w, 8, 0, 0);
        w.write_i32(1);
        w.write_i32(8);
        w.write_string("maptitle", true);
        w.write_i32(VAR_STRING);
        w.write_i32(title.len() as i32);
        w.write_string(title, true);
        w.write_u16(0);
        for _ in 0..8 {
            leaf(&mut w, OctSav::Empty as u8);
        }
        let body = w.into_inner();

        let map = Map::decode(&body).unwrap();
        match map.var("maptitle") {
            Some(MapVar::Str(s)) => assert_eq!(s.as_bytes(), &title),
            other => panic!("expected string var, got {:?}", other),
        }
        assert_eq!(map.encode(), body);
    }

    #[test]
    fn test_game_id_padding_and_truncation() {
        let mut map = Map::new(8);
        map.meta.gameid = RawString::from("rd");
        let body = map.encode();
        assert_eq!(&body[44..48], b"rd\0\0");
        assert_eq!(Map::decode(&body).unwrap().encode(), body);

        map.meta.gameid = RawString::from("fpsx");
        let body = map.encode();
        assert_eq!(&body[44..48], b"fps\0");
    }

    #[test]
    fn test_bad_magic() {
        let mut body = minimal_body();
        body[..4].copy_from_slice(b"NOPE");
        assert!(matches!(
            Map::decode(&body),
            Err(DecodeError::BadMagic { found }) if &found == b"NOPE"
        ));
    }

    #[test]
    fn test_octa_magic_accepted() {
        let mut body = minimal_body();
        body[..4].copy_from_slice(b"OCTA");
        let map = Map::decode(&body).unwrap();
        assert_eq!(map.magic, MAGIC_OCTA);
        assert_eq!(map.encode(), body);
    }

    #[test]
    fn test_unknown_var_type() {
        let mut w = Writer::new();
        header(&mut w, 8, 0, 0);
        w.write_i32(1);
        w.write_i32(1);
        w.write_string("x", true);
        w.write_i32(9);
        let body = w.into_inner();
        assert!(matches!(
            Map::decode(&body),
            Err(DecodeError::UnknownTag { kind: TagKind::MapVar, tag: 9, offset: 58 })
        ));
    }

    #[test]
    fn test_world_size_out_of_range() {
        for worldsize in [0, -8, MAX_WORLD_SIZE * 2] {
            let mut body = minimal_body();
            body[12..16].copy_from_slice(&worldsize.to_le_bytes());
            assert!(matches!(
                Map::decode(&body),
                Err(DecodeError::CountOutOfRange { what: "world size", offset: 12, .. })
            ));
        }
    }

    #[test]
    fn test_truncated_body() {
        let body = minimal_body();
        assert!(matches!(
            Map::decode(&body[..body.len() - 1]),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_partial_octree_is_inspectable() {
        let mut body = minimal_body();
        // Corrupt the tag of root[1]; root[0] is a 13-byte solid leaf.
        let tree_start = body.len() - 8 * 13;
        body[tree_start + 13] = 6;

        let (map, failure) = Map::decode_partial(&body).unwrap();
        let failure = failure.unwrap();
        assert_eq!(failure.offset, tree_start + 13);
        assert!(map.root[0].is_entirely_solid());
        assert!(matches!(Map::decode(&body), Err(DecodeError::UnknownTag { kind: TagKind::OctreeNode, .. })));
    }

    #[test]
    fn test_encode_counts_from_lists() {
        let mut map = Map::new(16);
        map.entities.push(Entity::new([0.0; 3], EntityKind::Weapon { weapon: 2, flags: 0 }));
        map.set_var("gravity", MapVar::Int(50));
        map.set_var("gravity", MapVar::Int(60));
        let back = Map::decode(&map.encode()).unwrap();
        assert_eq!(back.meta.numents, 1);
        assert_eq!(back.entities, map.entities);
        assert_eq!(back.vars, vec![(RawString::from("gravity"), MapVar::Int(60))]);
    }
}
