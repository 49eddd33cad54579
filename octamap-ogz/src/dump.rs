//! JSON views of decoded maps for inspection tooling.

use serde_json::{Map as JsonMap, Value as JsonValue, json};

use crate::cube::{Cube, OctSav};
use crate::entity::Entity;
use crate::map::Map;

/// Lossless JSON form of the whole map.
pub fn map_to_json(map: &Map) -> serde_json::Result<JsonValue> {
    serde_json::to_value(map)
}

/// Rebuild a map from [`map_to_json`] output.
pub fn map_from_json(value: JsonValue) -> serde_json::Result<Map> {
    serde_json::from_value(value)
}

pub fn cube_to_json(cube: &Cube) -> serde_json::Result<JsonValue> {
    serde_json::to_value(cube)
}

/// Entity with its attributes keyed by schema name.
pub fn entity_to_json(entity: &Entity) -> JsonValue {
    let mut attrs = JsonMap::new();
    for (name, value) in entity.kind.attr_names().iter().zip(entity.kind.attrs()) {
        attrs.insert((*name).to_string(), JsonValue::Number(value.into()));
    }
    json!({
        "type": entity.kind.name(),
        "pos": entity.pos,
        "attrs": JsonValue::Object(attrs),
        "links": entity.links,
    })
}

/// Node counts per kind plus depth, for a quick look at a tree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TreeStats {
    pub children: usize,
    pub empty: usize,
    pub solid: usize,
    pub normal: usize,
    pub lodcube: usize,
    pub surfaces: usize,
    pub max_depth: usize,
}

impl TreeStats {
    pub fn collect(root: &[Cube; 8]) -> Self {
        let mut stats = Self::default();
        for c in root {
            stats.visit(c, 1);
        }
        stats
    }

    fn visit(&mut self, c: &Cube, depth: usize) {
        self.max_depth = self.max_depth.max(depth);
        match c.kind {
            OctSav::Children => self.children += 1,
            OctSav::Empty => self.empty += 1,
            OctSav::Solid => self.solid += 1,
            OctSav::Normal => self.normal += 1,
            OctSav::LodCube => self.lodcube += 1,
        }
        if let Some(ext) = &c.ext {
            self.surfaces += ext.surfaces.iter().flatten().count();
        }
        if let Some(children) = &c.children {
            for ch in children.iter() {
                self.visit(ch, depth + 1);
            }
        }
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "children": self.children,
            "empty": self.empty,
            "solid": self.solid,
            "normal": self.normal,
            "lodcube": self.lodcube,
            "surfaces": self.surfaces,
            "max_depth": self.max_depth,
        })
    }
}

/// Header, counts and tree statistics without the full octree.
pub fn map_summary(map: &Map) -> JsonValue {
    let vars: JsonMap<String, JsonValue> = map
        .vars
        .iter()
        .map(|(name, value)| (name.to_string(), serde_json::to_value(value).unwrap_or(JsonValue::Null)))
        .collect();
    json!({
        "magic": String::from_utf8_lossy(&map.magic),
        "version": map.version,
        "meta": map.meta,
        "vars": JsonValue::Object(vars),
        "texmru": map.texmru.len(),
        "entities": map.entities.iter().map(entity_to_json).collect::<Vec<_>>(),
        "vslots": map.vslots.len(),
        "tree": TreeStats::collect(&map.root).to_json(),
        "trailer_bytes": map.trailer.len(),
    })
}
