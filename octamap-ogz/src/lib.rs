//! Reader and writer for cube-engine `.ogz` maps.
//!
//! A map file is a gzip stream. The decompressed body holds, in order: the
//! header, map variables, texture MRU, entities, vslots and the octree.

use std::io::{Read, Write};

use anyhow::Context;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

pub mod cube;
pub mod cursor;
pub mod dump;
pub mod entity;
pub mod error;
pub mod map;
pub mod octree;
pub mod surface;
pub mod text;
pub mod vslot;

pub use cube::{Cube, IdSequence, OctSav};
pub use entity::{Entity, EntityKind};
pub use error::{DecodeError, TagKind};
pub use map::{Map, MapMeta, MapVar};
pub use text::RawString;
pub use vslot::VSlot;

/// Gzip magic bytes; anything else is treated as an already decompressed body.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    if !data.starts_with(&GZIP_MAGIC) {
        return Ok(data.to_vec());
    }
    let mut decoder = GzDecoder::new(data);
    let mut body = Vec::new();
    decoder.read_to_end(&mut body)?;
    Ok(body)
}

pub fn compress(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

/// Decode a map file (gzip compressed or raw body).
///
/// Codec failures stay reachable as [`DecodeError`] through `downcast_ref`.
pub fn read_map(data: &[u8]) -> anyhow::Result<Map> {
    let body = decompress(data).context("Failed to decompress map")?;
    log::debug!("Map body: {} bytes ({} compressed)", body.len(), data.len());
    Ok(Map::decode(&body)?)
}

/// Encode a map to a gzip compressed file image.
pub fn write_map(map: &Map) -> anyhow::Result<Vec<u8>> {
    let body = map.encode();
    let data = compress(&body).context("Failed to compress map")?;
    log::debug!("Wrote map: {} bytes ({} uncompressed)", data.len(), body.len());
    Ok(data)
}

/// Decode, re-encode and compare bodies. Returns the offset of the first
/// differing byte, if any.
pub fn verify_round_trip(data: &[u8]) -> anyhow::Result<Option<usize>> {
    let body = decompress(data).context("Failed to decompress map")?;
    let map = Map::decode(&body)?;
    let again = map.encode();
    let mismatch = body
        .iter()
        .zip(again.iter())
        .position(|(a, b)| a != b)
        .or(if body.len() != again.len() {
            Some(body.len().min(again.len()))
        } else {
            None
        });
    Ok(mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_round_trip() {
        let mut map = Map::new(64);
        map.root[5] = Cube::solid(0, 2);
        map.set_var("maptitle", MapVar::Str("test".into()));
        let data = write_map(&map).unwrap();
        assert_eq!(&data[..2], &GZIP_MAGIC);

        let back = read_map(&data).unwrap();
        assert_eq!(back.encode(), map.encode());
        assert_eq!(verify_round_trip(&data).unwrap(), None);
    }

    #[test]
    fn test_raw_body_accepted() {
        let map = Map::new(16);
        let body = map.encode();
        let back = read_map(&body).unwrap();
        assert_eq!(back.meta.worldsize, 16);
    }

    #[test]
    fn test_corrupt_gzip_is_io_error() {
        let data = [0x1f, 0x8b, 0x08, 0x00, 0x01];
        let err = read_map(&data).unwrap_err();
        assert!(err.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn test_decode_error_survives_framing() {
        let mut body = Map::new(16).encode();
        body[..4].copy_from_slice(b"NOPE");
        let data = compress(&body).unwrap();
        let err = read_map(&data).unwrap_err();
        assert!(matches!(err.downcast_ref::<DecodeError>(), Some(DecodeError::BadMagic { .. })));
        assert!(verify_round_trip(&data).is_err());
    }
}
