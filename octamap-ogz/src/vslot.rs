//! Variable slots: per-map material overrides stored as deltas over defaults.
//!
//! On disk the table is a sequence of records. A negative leading integer is a
//! run of unchanged slots; a non-negative one is the change mask of a single
//! slot, followed by that slot's previous-chain index and the changed fields.

use serde::{Deserialize, Serialize};

use crate::cursor::{Cursor, Writer};
use crate::error::{DecodeError, Result};
use crate::map::clamp_count;
use crate::text::RawString;

pub const VSLOT_SHPARAM: u32 = 0;
pub const VSLOT_SCALE: u32 = 1;
pub const VSLOT_ROTATION: u32 = 2;
pub const VSLOT_OFFSET: u32 = 3;
pub const VSLOT_SCROLL: u32 = 4;
pub const VSLOT_LAYER: u32 = 5;
pub const VSLOT_ALPHA: u32 = 6;
pub const VSLOT_COLOR: u32 = 7;
pub const VSLOT_PALETTE: u32 = 8;
pub const VSLOT_COAST: u32 = 9;

/// Shader param flag: palette/palindex pair follows each param.
const SHPARAM_PALETTE: u16 = 0x8000;
const SHPARAM_COUNT_MASK: u16 = 0x7FFF;

/// Largest vslot table accepted on load.
pub const MAX_VSLOTS: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderParam {
    pub name: RawString,
    pub val: [f32; 4],
    pub palette: i32,
    pub palindex: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VSlot {
    pub index: usize,
    /// Change mask as stored on disk. Encoding ORs in the mask of any field
    /// that differs from its default.
    pub changed: u32,
    /// Previous slot in this slot's chain, as serialized (-1 for none).
    pub prev: i32,
    /// Next slot in the chain, linked after the whole table is read.
    pub next: Option<usize>,
    pub params: Vec<ShaderParam>,
    /// Whether the params carry the palette pair on disk.
    pub param_palettes: bool,
    pub scale: f32,
    pub rotation: i32,
    pub offset: [i32; 2],
    pub scroll: [f32; 2],
    pub layer: i32,
    pub alpha: [f32; 2],
    pub colorscale: [f32; 3],
    pub palette: i32,
    pub palindex: i32,
    pub coastscale: f32,
}

impl VSlot {
    /// A slot with every field at its default.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            changed: 0,
            prev: -1,
            next: None,
            params: Vec::new(),
            param_palettes: false,
            scale: 1.0,
            rotation: 0,
            offset: [0, 0],
            scroll: [0.0, 0.0],
            layer: 0,
            alpha: [0.5, 0.0],
            colorscale: [1.0, 1.0, 1.0],
            palette: 0,
            palindex: 0,
            coastscale: 1.0,
        }
    }

    /// Mask of the fields whose value differs from the defaults.
    pub fn nondefault_mask(&self) -> u32 {
        let d = VSlot::new(self.index);
        let mut mask = 0;
        if !self.params.is_empty() {
            mask |= 1 << VSLOT_SHPARAM;
        }
        if self.scale != d.scale {
            mask |= 1 << VSLOT_SCALE;
        }
        if self.rotation != d.rotation {
            mask |= 1 << VSLOT_ROTATION;
        }
        if self.offset != d.offset {
            mask |= 1 << VSLOT_OFFSET;
        }
        if self.scroll != d.scroll {
            mask |= 1 << VSLOT_SCROLL;
        }
        if self.layer != d.layer {
            mask |= 1 << VSLOT_LAYER;
        }
        if self.alpha != d.alpha {
            mask |= 1 << VSLOT_ALPHA;
        }
        if self.colorscale != d.colorscale {
            mask |= 1 << VSLOT_COLOR;
        }
        if self.palette != d.palette || self.palindex != d.palindex {
            mask |= 1 << VSLOT_PALETTE;
        }
        if self.coastscale != d.coastscale {
            mask |= 1 << VSLOT_COAST;
        }
        mask
    }

    /// The mask actually written for this slot.
    pub fn effective_mask(&self) -> u32 {
        self.changed | self.nondefault_mask()
    }

    fn read_fields(&mut self, cur: &mut Cursor) -> Result<()> {
        let changed = self.changed;
        let has = |bit: u32| changed & (1 << bit) != 0;

        if has(VSLOT_SHPARAM) {
            let flags = cur.read_u16()?;
            self.param_palettes = flags & SHPARAM_PALETTE != 0;
            for _ in 0..(flags & SHPARAM_COUNT_MASK) {
                let nlen = cur.read_u16()? as usize;
                let name = cur.read_string(nlen, false)?;
                let mut val = [0.0f32; 4];
                for v in val.iter_mut() {
                    *v = cur.read_f32()?;
                }
                let (palette, palindex) = if self.param_palettes {
                    (cur.read_i32()?, cur.read_i32()?)
                } else {
                    (0, 0)
                };
                self.params.push(ShaderParam { name, val, palette, palindex });
            }
        }
        if has(VSLOT_SCALE) {
            self.scale = cur.read_f32()?;
        }
        if has(VSLOT_ROTATION) {
            self.rotation = cur.read_i32()?;
        }
        if has(VSLOT_OFFSET) {
            self.offset = [cur.read_i32()?, cur.read_i32()?];
        }
        if has(VSLOT_SCROLL) {
            self.scroll = [cur.read_f32()?, cur.read_f32()?];
        }
        if has(VSLOT_LAYER) {
            self.layer = cur.read_i32()?;
        }
        if has(VSLOT_ALPHA) {
            self.alpha = [cur.read_f32()?, cur.read_f32()?];
        }
        if has(VSLOT_COLOR) {
            self.colorscale = [cur.read_f32()?, cur.read_f32()?, cur.read_f32()?];
        }
        if has(VSLOT_PALETTE) {
            self.palette = cur.read_i32()?;
            self.palindex = cur.read_i32()?;
        }
        if has(VSLOT_COAST) {
            self.coastscale = cur.read_f32()?;
        }
        Ok(())
    }

    fn write_fields(&self, w: &mut Writer, mask: u32) {
        let has = |bit: u32| mask & (1 << bit) != 0;

        if has(VSLOT_SHPARAM) {
            let palettes = self.param_palettes
                || self.params.iter().any(|p| p.palette != 0 || p.palindex != 0);
            let count = clamp_count("shader param", self.params.len(), SHPARAM_COUNT_MASK as usize);
            let mut flags = count as u16;
            if palettes {
                flags |= SHPARAM_PALETTE;
            }
            w.write_u16(flags);
            for p in &self.params[..count] {
                let n = clamp_count("shader param name byte", p.name.len(), u16::MAX as usize);
                w.write_u16(n as u16);
                w.write_string(&p.name.as_bytes()[..n], false);
                for v in p.val {
                    w.write_f32(v);
                }
                if palettes {
                    w.write_i32(p.palette);
                    w.write_i32(p.palindex);
                }
            }
        }
        if has(VSLOT_SCALE) {
            w.write_f32(self.scale);
        }
        if has(VSLOT_ROTATION) {
            w.write_i32(self.rotation);
        }
        if has(VSLOT_OFFSET) {
            w.write_i32(self.offset[0]);
            w.write_i32(self.offset[1]);
        }
        if has(VSLOT_SCROLL) {
            w.write_f32(self.scroll[0]);
            w.write_f32(self.scroll[1]);
        }
        if has(VSLOT_LAYER) {
            w.write_i32(self.layer);
        }
        if has(VSLOT_ALPHA) {
            w.write_f32(self.alpha[0]);
            w.write_f32(self.alpha[1]);
        }
        if has(VSLOT_COLOR) {
            for c in self.colorscale {
                w.write_f32(c);
            }
        }
        if has(VSLOT_PALETTE) {
            w.write_i32(self.palette);
            w.write_i32(self.palindex);
        }
        if has(VSLOT_COAST) {
            w.write_f32(self.coastscale);
        }
    }
}

/// Read the vslot table until `count` slots have been accounted for.
pub fn read_vslots(cur: &mut Cursor, count: usize) -> Result<Vec<VSlot>> {
    if count > MAX_VSLOTS {
        return Err(DecodeError::CountOutOfRange {
            what: "vslot",
            count: count as i64,
            limit: MAX_VSLOTS as i64,
            offset: cur.position(),
        });
    }
    let mut slots: Vec<VSlot> = Vec::with_capacity(count);
    let mut prev: Vec<i32> = Vec::with_capacity(count);
    let mut remaining = count as i64;

    while remaining > 0 {
        let offset = cur.position();
        let changed = cur.read_i32()?;
        if changed < 0 {
            let run = -(changed as i64);
            if run > remaining {
                return Err(DecodeError::CountOutOfRange {
                    what: "vslot placeholder run",
                    count: run,
                    limit: remaining,
                    offset,
                });
            }
            for _ in 0..run {
                let index = slots.len();
                slots.push(VSlot::new(index));
                prev.push(-1);
            }
            remaining -= run;
        } else {
            let index = slots.len();
            let mut slot = VSlot::new(index);
            slot.changed = changed as u32;
            slot.prev = cur.read_i32()?;
            slot.read_fields(cur)?;
            prev.push(slot.prev);
            slots.push(slot);
            remaining -= 1;
        }
    }

    for (i, &p) in prev.iter().enumerate() {
        if p >= 0 && (p as usize) < slots.len() {
            slots[p as usize].next = Some(i);
        }
    }

    log::debug!("Read {} vslots ({} requested)", slots.len(), count);
    Ok(slots)
}

pub fn write_vslots(w: &mut Writer, slots: &[VSlot]) {
    let mut lastroot = 0usize;
    for (i, slot) in slots.iter().enumerate() {
        let mask = slot.effective_mask();
        if mask == 0 {
            continue;
        }
        if lastroot < i {
            w.write_i32(-((i - lastroot) as i32));
        }
        w.write_i32(mask as i32);
        w.write_i32(slot.prev);
        slot.write_fields(w, mask);
        lastroot = i + 1;
    }
    if lastroot < slots.len() {
        w.write_i32(-((slots.len() - lastroot) as i32));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8], count: usize) -> Vec<VSlot> {
        let mut cur = Cursor::new(bytes);
        let slots = read_vslots(&mut cur, count).unwrap();
        assert_eq!(cur.remaining(), 0, "trailing bytes after vslot table");
        slots
    }

    #[test]
    fn test_placeholder_run_has_defaults() {
        let mut w = Writer::new();
        w.write_i32(-3);
        w.write_i32(1 << VSLOT_SCALE);
        w.write_i32(-1);
        w.write_f32(2.0);
        let slots = decode(&w.into_inner(), 4);

        assert_eq!(slots.len(), 4);
        for (i, s) in slots.iter().take(3).enumerate() {
            assert_eq!(s.index, i);
            assert_eq!(s.changed, 0);
            assert_eq!(s.scale, 1.0);
            assert_eq!(s.alpha, [0.5, 0.0]);
            assert_eq!(s.colorscale, [1.0, 1.0, 1.0]);
        }
        assert_eq!(slots[3].scale, 2.0);
        assert_eq!(slots[3].alpha, [0.5, 0.0]);
    }

    #[test]
    fn test_chain_links_from_prev() {
        let mut w = Writer::new();
        w.write_i32(-1);
        w.write_i32(1 << VSLOT_ROTATION);
        w.write_i32(0);
        w.write_i32(3);
        w.write_i32(1 << VSLOT_LAYER);
        w.write_i32(1);
        w.write_i32(9);
        let slots = decode(&w.into_inner(), 3);

        assert_eq!(slots[0].next, Some(1));
        assert_eq!(slots[1].next, Some(2));
        assert_eq!(slots[2].next, None);
        assert_eq!(slots[1].rotation, 3);
        assert_eq!(slots[2].layer, 9);
    }

    #[test]
    fn test_shader_params_with_palette() {
        let mut w = Writer::new();
        w.write_i32((1 << VSLOT_SHPARAM) | (1 << VSLOT_COLOR));
        w.write_i32(-1);
        w.write_u16(0x8000 | 1);
        w.write_u16(9);
        w.write_string("glowcolor", false);
        for v in [1.0, 0.5, 0.25, 0.0] {
            w.write_f32(v);
        }
        w.write_i32(4);
        w.write_i32(2);
        for c in [0.5, 0.5, 0.5] {
            w.write_f32(c);
        }
        let bytes = w.into_inner();
        let slots = decode(&bytes, 1);

        let slot = &slots[0];
        assert_eq!(slot.params.len(), 1);
        assert_eq!(slot.params[0].name, "glowcolor");
        assert_eq!(slot.params[0].val, [1.0, 0.5, 0.25, 0.0]);
        assert_eq!((slot.params[0].palette, slot.params[0].palindex), (4, 2));
        assert_eq!(slot.colorscale, [0.5, 0.5, 0.5]);

        let mut out = Writer::new();
        write_vslots(&mut out, &slots);
        assert_eq!(out.into_inner(), bytes);
    }

    #[test]
    fn test_oversized_params_clamped_on_write() {
        let param = |name: RawString| ShaderParam { name, val: [0.0; 4], palette: 0, palindex: 0 };
        let mut slot = VSlot::new(0);
        slot.params = vec![param("specscale".into()); SHPARAM_COUNT_MASK as usize + 1];
        slot.params[0] = param(RawString::new(vec![b'x'; u16::MAX as usize + 10]));

        let mut w = Writer::new();
        write_vslots(&mut w, std::slice::from_ref(&slot));
        let back = decode(&w.into_inner(), 1);

        let params = &back[0].params;
        assert_eq!(params.len(), SHPARAM_COUNT_MASK as usize);
        assert_eq!(params[0].name.len(), u16::MAX as usize);
        assert_eq!(params[1].name, "specscale");
    }

    #[test]
    fn test_huge_table_count_rejected() {
        let bytes = [0u8; 4];
        let mut cur = Cursor::new(&bytes);
        assert!(matches!(
            read_vslots(&mut cur, i32::MAX as usize),
            Err(DecodeError::CountOutOfRange { what: "vslot", offset: 0, .. })
        ));
    }

    #[test]
    fn test_run_longer_than_table_rejected() {
        let mut w = Writer::new();
        w.write_i32(i32::MIN);
        let bytes = w.into_inner();
        let mut cur = Cursor::new(&bytes);
        match read_vslots(&mut cur, 1) {
            Err(DecodeError::CountOutOfRange { count, limit, offset, .. }) => {
                assert_eq!(count, 1i64 << 31);
                assert_eq!(limit, 1);
                assert_eq!(offset, 0);
            }
            other => panic!("expected CountOutOfRange, got {:?}", other),
        }

        let mut w = Writer::new();
        w.write_i32(-1);
        w.write_i32(-2);
        let bytes = w.into_inner();
        let mut cur = Cursor::new(&bytes);
        assert!(matches!(
            read_vslots(&mut cur, 2),
            Err(DecodeError::CountOutOfRange { count: 2, limit: 1, offset: 4, .. })
        ));
    }

    #[test]
    fn test_encode_sets_bits_for_nondefault_fields() {
        let mut slots = vec![VSlot::new(0), VSlot::new(1), VSlot::new(2)];
        slots[1].scale = 0.5;
        slots[1].scroll = [0.1, 0.0];

        let mut w = Writer::new();
        write_vslots(&mut w, &slots);
        let bytes = w.into_inner();

        let mut c = Cursor::new(&bytes);
        assert_eq!(c.read_i32().unwrap(), -1);
        assert_eq!(
            c.read_i32().unwrap(),
            ((1 << VSLOT_SCALE) | (1 << VSLOT_SCROLL)) as i32
        );

        let back = decode(&bytes, 3);
        assert_eq!(back[1].scale, 0.5);
        assert_eq!(back[1].scroll, [0.1, 0.0]);
        assert_eq!(back[2], VSlot::new(2));
    }

    #[test]
    fn test_explicit_default_bits_survive_round_trip() {
        // A slot that stores scale = 1.0 explicitly must keep its bit.
        let mut w = Writer::new();
        w.write_i32(1 << VSLOT_SCALE);
        w.write_i32(-1);
        w.write_f32(1.0);
        let bytes = w.into_inner();
        let slots = decode(&bytes, 1);

        let mut out = Writer::new();
        write_vslots(&mut out, &slots);
        assert_eq!(out.into_inner(), bytes);
    }
}
