//! Map entities.
//!
//! Each entity kind has a fixed attribute schema. The kinds are a closed enum
//! whose variant fields are that schema, so arity is checked at compile time
//! when building entities and at decode time when reading them.

use serde::{Deserialize, Serialize};

use crate::cursor::{Cursor, Writer};
use crate::error::{DecodeError, Result, TagKind};
use crate::map::clamp_count;

macro_rules! entity_kinds {
    ($($id:literal => $name:ident { $($field:ident),* }),* $(,)?) => {
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(tag = "type", rename_all = "snake_case")]
        pub enum EntityKind {
            $($name { $($field: i32),* },)*
        }

        impl EntityKind {
            /// Type byte used on disk.
            pub fn type_id(&self) -> u8 {
                match self {
                    $(EntityKind::$name { .. } => $id,)*
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(EntityKind::$name { .. } => stringify!($name),)*
                }
            }

            /// Attribute names in on-disk order.
            pub fn attr_names(&self) -> &'static [&'static str] {
                match self {
                    $(EntityKind::$name { .. } => &[$(stringify!($field)),*],)*
                }
            }

            /// Attribute values in on-disk order.
            pub fn attrs(&self) -> Vec<i32> {
                match self {
                    $(EntityKind::$name { $($field),* } => vec![$(*$field),*],)*
                }
            }

            /// Schema arity for a type byte, `None` if the type is unknown.
            pub fn arity(type_id: u8) -> Option<usize> {
                match type_id {
                    $($id => Some(<[&str]>::len(&[$(stringify!($field)),*])),)*
                    _ => None,
                }
            }

            /// Build a kind from its type byte and attribute values.
            ///
            /// Returns `None` for an unknown type or a wrong attribute count.
            pub fn from_attrs(type_id: u8, attrs: &[i32]) -> Option<Self> {
                if Self::arity(type_id)? != attrs.len() {
                    return None;
                }
                #[allow(unused_variables, unused_mut)]
                let mut it = attrs.iter().copied();
                match type_id {
                    $($id => Some(EntityKind::$name { $($field: it.next()?),* }),)*
                    _ => None,
                }
            }
        }
    };
}

entity_kinds! {
    0 => Empty {},
    1 => Light { radius, red, green, blue, flare, flarescale },
    2 => MapModel { model, yaw, pitch, roll, scale, blend },
    3 => PlayerStart { team, yaw, pitch },
    4 => EnvMap { radius, size, blur },
    5 => Particles { kind, param1, param2, param3, param4 },
    6 => Sound { sound, radius, size, volume },
    7 => LightFx { effect, param1, param2, param3 },
    8 => Decal { decal, yaw, pitch, roll, scale },
    9 => Sunlight { yaw, pitch, red, green, blue, offset, flare, flarescale },
    10 => Weapon { weapon, flags },
    11 => Teleport { yaw, pitch, push, radius },
    12 => Actor { kind, yaw, pitch },
    13 => Trigger { id, kind, action, radius },
    14 => Pusher { yaw, pitch, force, maxrad, minrad },
    15 => Affinity { team, yaw, pitch },
    16 => Checkpoint { radius, yaw, pitch },
    17 => Route { num, yaw, pitch },
    18 => Camera { kind, yaw, pitch },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub pos: [f32; 3],
    pub kind: EntityKind,
    pub reserved: [u8; 3],
    pub links: Vec<i32>,
}

impl Entity {
    pub fn new(pos: [f32; 3], kind: EntityKind) -> Self {
        Self {
            pos,
            kind,
            reserved: [0; 3],
            links: Vec::new(),
        }
    }

    pub fn read(cur: &mut Cursor) -> Result<Self> {
        let pos = [cur.read_f32()?, cur.read_f32()?, cur.read_f32()?];
        let type_offset = cur.position();
        let type_id = cur.read_u8()?;
        let mut reserved = [0u8; 3];
        reserved.copy_from_slice(cur.read_bytes(3)?);

        let expected = EntityKind::arity(type_id).ok_or(DecodeError::UnknownTag {
            kind: TagKind::Entity,
            tag: type_id as i64,
            offset: type_offset,
        })?;

        let count_offset = cur.position();
        let numattrs = cur.read_i32()?;
        if numattrs < 0 || numattrs as usize != expected {
            return Err(DecodeError::SchemaMismatch {
                kind: entity_type_name(type_id),
                expected,
                found: numattrs.max(0) as usize,
                offset: count_offset,
            });
        }
        let attrs = cur.read_i32s(expected)?;
        // Arity was checked above, so the schema build cannot fail here.
        let kind = EntityKind::from_attrs(type_id, &attrs).ok_or(DecodeError::SchemaMismatch {
            kind: entity_type_name(type_id),
            expected,
            found: attrs.len(),
            offset: count_offset,
        })?;

        let numlinks = cur.read_i32()?.max(0) as usize;
        let links = cur.read_i32s(numlinks)?;

        Ok(Self { pos, kind, reserved, links })
    }

    pub fn write(&self, w: &mut Writer) {
        for p in self.pos {
            w.write_f32(p);
        }
        w.write_u8(self.kind.type_id());
        w.write_bytes(&self.reserved);
        let attrs = self.kind.attrs();
        w.write_i32(attrs.len() as i32);
        for a in attrs {
            w.write_i32(a);
        }
        let numlinks = clamp_count("entity link", self.links.len(), i32::MAX as usize);
        w.write_i32(numlinks as i32);
        for &l in &self.links[..numlinks] {
            w.write_i32(l);
        }
    }
}

fn entity_type_name(type_id: u8) -> &'static str {
    // Any in-range type has a zero-filled instance to ask for its name.
    EntityKind::arity(type_id)
        .and_then(|n| EntityKind::from_attrs(type_id, &vec![0; n]))
        .map(|k| k.name())
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sunlight() -> EntityKind {
        EntityKind::Sunlight {
            yaw: 45,
            pitch: -30,
            red: 255,
            green: 240,
            blue: 200,
            offset: 10,
            flare: 1,
            flarescale: 100,
        }
    }

    #[test]
    fn test_sunlight_attribute_order() {
        let kind = sunlight();
        assert_eq!(kind.type_id(), 9);
        assert_eq!(kind.attrs(), vec![45, -30, 255, 240, 200, 10, 1, 100]);
        assert_eq!(
            kind.attr_names(),
            &["yaw", "pitch", "red", "green", "blue", "offset", "flare", "flarescale"]
        );
        assert_eq!(EntityKind::arity(9), Some(8));
    }

    #[test]
    fn test_entity_round_trip() {
        let mut ent = Entity::new([1.0, 2.5, -3.0], sunlight());
        ent.links = vec![4, 7];
        ent.reserved = [1, 0, 2];
        let mut w = Writer::new();
        ent.write(&mut w);
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), 16 + 4 + 8 * 4 + 4 + 2 * 4);

        let mut cur = Cursor::new(&bytes);
        assert_eq!(Entity::read(&mut cur).unwrap(), ent);
    }

    #[test]
    fn test_attribute_count_mismatch() {
        let mut w = Writer::new();
        for p in [0.0, 0.0, 0.0] {
            w.write_f32(p);
        }
        w.write_bytes(&[9, 0, 0, 0]);
        w.write_i32(5);
        for a in 0..5 {
            w.write_i32(a);
        }
        w.write_i32(0);
        let bytes = w.into_inner();

        match Entity::read(&mut Cursor::new(&bytes)) {
            Err(DecodeError::SchemaMismatch { kind, expected, found, offset }) => {
                assert_eq!(kind, "Sunlight");
                assert_eq!(expected, 8);
                assert_eq!(found, 5);
                assert_eq!(offset, 16);
            }
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_entity_type() {
        let mut w = Writer::new();
        for p in [0.0, 0.0, 0.0] {
            w.write_f32(p);
        }
        w.write_bytes(&[200, 0, 0, 0]);
        w.write_i32(0);
        w.write_i32(0);
        let bytes = w.into_inner();

        assert!(matches!(
            Entity::read(&mut Cursor::new(&bytes)),
            Err(DecodeError::UnknownTag { kind: TagKind::Entity, tag: 200, offset: 12 })
        ));
    }

    #[test]
    fn test_empty_kind_has_no_attributes() {
        assert_eq!(EntityKind::arity(0), Some(0));
        assert_eq!(EntityKind::from_attrs(0, &[]), Some(EntityKind::Empty {}));
        assert_eq!(EntityKind::from_attrs(0, &[1]), None);
    }
}
