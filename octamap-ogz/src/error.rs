use std::fmt;

use thiserror::Error;

/// Which table an unrecognized tag value was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    OctreeNode,
    MapVar,
    Entity,
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TagKind::OctreeNode => "octree node",
            TagKind::MapVar => "map variable",
            TagKind::Entity => "entity",
        };
        f.write_str(name)
    }
}

/// Errors raised while reading a map body.
///
/// Every variant carries the byte offset (into the decompressed body) where
/// decoding stopped.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("read of {wanted} bytes at offset {offset} exceeds buffer of {available} bytes")]
    OutOfBounds {
        offset: usize,
        wanted: usize,
        available: usize,
    },

    #[error("unrecognized map magic {found:?}")]
    BadMagic { found: [u8; 4] },

    #[error("unknown {kind} tag {tag} at offset {offset}")]
    UnknownTag { kind: TagKind, tag: i64, offset: usize },

    #[error("{kind} expects {expected} attributes, found {found} at offset {offset}")]
    SchemaMismatch {
        kind: &'static str,
        expected: usize,
        found: usize,
        offset: usize,
    },

    #[error("{what} count {count} out of range (limit {limit}) at offset {offset}")]
    CountOutOfRange {
        what: &'static str,
        count: i64,
        limit: i64,
        offset: usize,
    },

    #[error("octree node with children at size {size}, offset {offset}")]
    TreeTooDeep { size: i32, offset: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
