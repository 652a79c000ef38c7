//! A minimal OpenType/TrueType parser: table directory, glyph metrics,
//! cmap, and the handful of header fields the subsetter and font
//! descriptor need. Deliberately narrow — this is not a rendering-grade
//! font library, it exists to feed [`crate::font::subset`].

use std::collections::BTreeMap;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{PdfCraftError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct BBox {
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,
}

#[derive(Debug, Clone)]
pub struct TrueTypeFont {
    pub raw: Vec<u8>,
    pub tables: BTreeMap<[u8; 4], (u32, u32)>, // tag -> (offset, length)
    pub units_per_em: u16,
    pub ascent: i16,
    pub descent: i16,
    pub italic_angle: f64,
    pub is_fixed_pitch: bool,
    pub bbox: BBox,
    pub index_to_loc_format: i16,
    pub num_glyphs: u16,
    pub number_of_h_metrics: u16,
    /// glyph id -> (advance width, left side bearing)
    pub h_metrics: Vec<(u16, i16)>,
    /// Unicode codepoint -> glyph id, built from the best unicode cmap subtable found.
    pub cmap: BTreeMap<u32, u16>,
    pub family_name: String,
    pub full_name: String,
    pub postscript_name: String,
}

fn tag(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

impl TrueTypeFont {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(PdfCraftError::FontNotOpenType);
        }
        let mut cur = Cursor::new(data);
        let sfnt_version = cur.read_u32::<BigEndian>().map_err(|_| PdfCraftError::FontNotOpenType)?;
        if sfnt_version != 0x0001_0000 && &sfnt_version.to_be_bytes() != b"true" {
            if &sfnt_version.to_be_bytes() == b"OTTO" {
                return Err(PdfCraftError::Unsupported(
                    "OpenType CFF fonts are not supported for subsetting".into(),
                ));
            }
            return Err(PdfCraftError::FontNotOpenType);
        }
        let num_tables = cur.read_u16::<BigEndian>().map_err(|_| PdfCraftError::FontNotOpenType)?;
        cur.set_position(cur.position() + 6); // searchRange, entrySelector, rangeShift

        let mut tables = BTreeMap::new();
        for _ in 0..num_tables {
            let mut tag_bytes = [0u8; 4];
            std::io::Read::read_exact(&mut cur, &mut tag_bytes).map_err(|_| PdfCraftError::FontNotOpenType)?;
            let _checksum = cur.read_u32::<BigEndian>().map_err(|_| PdfCraftError::FontNotOpenType)?;
            let offset = cur.read_u32::<BigEndian>().map_err(|_| PdfCraftError::FontNotOpenType)?;
            let length = cur.read_u32::<BigEndian>().map_err(|_| PdfCraftError::FontNotOpenType)?;
            tables.insert(tag_bytes, (offset, length));
        }

        let head = table_bytes(data, &tables, b"head").ok_or(PdfCraftError::FontNotOpenType)?;
        let units_per_em = be_u16(head, 18);
        let index_to_loc_format = be_i16(head, 50);
        let bbox = BBox {
            x_min: be_i16(head, 36),
            y_min: be_i16(head, 38),
            x_max: be_i16(head, 40),
            y_max: be_i16(head, 42),
        };

        let hhea = table_bytes(data, &tables, b"hhea").ok_or(PdfCraftError::FontNotOpenType)?;
        let ascent = be_i16(hhea, 4);
        let descent = be_i16(hhea, 6);
        let number_of_h_metrics = be_u16(hhea, 34);

        let maxp = table_bytes(data, &tables, b"maxp").ok_or(PdfCraftError::FontNotOpenType)?;
        let num_glyphs = be_u16(maxp, 4);

        let post = table_bytes(data, &tables, b"post");
        let italic_angle = post
            .map(|p| be_i32(p, 4) as f64 / 65536.0)
            .unwrap_or(0.0);
        let is_fixed_pitch = post.map(|p| be_u32(p, 12) != 0).unwrap_or(false);

        let hmtx = table_bytes(data, &tables, b"hmtx").ok_or(PdfCraftError::FontNotOpenType)?;
        let mut h_metrics = Vec::with_capacity(num_glyphs as usize);
        let mut last_width = 0u16;
        for gid in 0..num_glyphs {
            if (gid as usize) < number_of_h_metrics as usize {
                let off = gid as usize * 4;
                if off + 4 > hmtx.len() {
                    break;
                }
                last_width = be_u16(hmtx, off);
                let lsb = be_i16(hmtx, off + 2);
                h_metrics.push((last_width, lsb));
            } else {
                let extra_off = number_of_h_metrics as usize * 4 + (gid as usize - number_of_h_metrics as usize) * 2;
                let lsb = if extra_off + 2 <= hmtx.len() { be_i16(hmtx, extra_off) } else { 0 };
                h_metrics.push((last_width, lsb));
            }
        }

        let cmap = table_bytes(data, &tables, b"cmap")
            .map(parse_cmap)
            .unwrap_or_default();

        let name_table = table_bytes(data, &tables, b"name");
        let (family_name, full_name, postscript_name) = name_table
            .map(parse_name_table)
            .unwrap_or_else(|| ("Unknown".to_string(), "Unknown".to_string(), "Unknown".to_string()));

        Ok(TrueTypeFont {
            raw: data.to_vec(),
            tables,
            units_per_em,
            ascent,
            descent,
            italic_angle,
            is_fixed_pitch,
            bbox,
            index_to_loc_format,
            num_glyphs,
            number_of_h_metrics,
            h_metrics,
            cmap,
            family_name,
            full_name,
            postscript_name,
        })
    }

    pub fn table(&self, tag_str: &[u8; 4]) -> Option<&[u8]> {
        table_bytes(&self.raw, &self.tables, tag_str)
    }

    pub fn glyph_data(&self, loca: &[u8], glyf: &[u8], gid: u16) -> &[u8] {
        let (start, end) = self.loca_range(loca, gid);
        if start >= end || end as usize > glyf.len() {
            &[]
        } else {
            &glyf[start as usize..end as usize]
        }
    }

    fn loca_range(&self, loca: &[u8], gid: u16) -> (u32, u32) {
        if self.index_to_loc_format == 0 {
            let i = gid as usize * 2;
            if i + 4 > loca.len() {
                return (0, 0);
            }
            (be_u16(loca, i) as u32 * 2, be_u16(loca, i + 2) as u32 * 2)
        } else {
            let i = gid as usize * 4;
            if i + 8 > loca.len() {
                return (0, 0);
            }
            (be_u32(loca, i), be_u32(loca, i + 4))
        }
    }

    pub fn advance_width(&self, gid: u16) -> u16 {
        self.h_metrics.get(gid as usize).map(|m| m.0).unwrap_or(0)
    }
}

fn table_bytes<'a>(data: &'a [u8], tables: &BTreeMap<[u8; 4], (u32, u32)>, want: &[u8; 4]) -> Option<&'a [u8]> {
    let (off, len) = *tables.get(want)?;
    data.get(off as usize..(off + len) as usize)
}

fn be_u16(b: &[u8], off: usize) -> u16 {
    if off + 2 > b.len() { return 0; }
    u16::from_be_bytes([b[off], b[off + 1]])
}
fn be_i16(b: &[u8], off: usize) -> i16 {
    be_u16(b, off) as i16
}
fn be_u32(b: &[u8], off: usize) -> u32 {
    if off + 4 > b.len() { return 0; }
    u32::from_be_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}
fn be_i32(b: &[u8], off: usize) -> i32 {
    be_u32(b, off) as i32
}

/// Parse the best available unicode cmap subtable (format 4 or 12) into a
/// flat `codepoint -> glyph id` map.
fn parse_cmap(cmap: &[u8]) -> BTreeMap<u32, u16> {
    let mut out = BTreeMap::new();
    if cmap.len() < 4 {
        return out;
    }
    let num_tables = be_u16(cmap, 2) as usize;
    let mut best_offset: Option<usize> = None;
    let mut best_score = -1i32;
    for i in 0..num_tables {
        let rec_off = 4 + i * 8;
        if rec_off + 8 > cmap.len() {
            break;
        }
        let platform_id = be_u16(cmap, rec_off);
        let encoding_id = be_u16(cmap, rec_off + 2);
        let offset = be_u32(cmap, rec_off + 4) as usize;
        let score = match (platform_id, encoding_id) {
            (3, 1) => 3,
            (3, 10) => 2,
            (0, _) => 1,
            _ => 0,
        };
        if score > best_score {
            best_score = score;
            best_offset = Some(offset);
        }
    }
    let Some(offset) = best_offset else { return out };
    let Some(sub) = cmap.get(offset..) else { return out };
    if sub.len() < 2 {
        return out;
    }
    match be_u16(sub, 0) {
        4 => parse_cmap_format4(sub, &mut out),
        12 => parse_cmap_format12(sub, &mut out),
        _ => {}
    }
    out
}

fn parse_cmap_format4(sub: &[u8], out: &mut BTreeMap<u32, u16>) {
    if sub.len() < 14 {
        return;
    }
    let seg_count_x2 = be_u16(sub, 6) as usize;
    let seg_count = seg_count_x2 / 2;
    let end_codes_off = 14;
    let start_codes_off = end_codes_off + seg_count_x2 + 2;
    let id_delta_off = start_codes_off + seg_count_x2;
    let id_range_off_off = id_delta_off + seg_count_x2;
    for s in 0..seg_count {
        let end_code = be_u16(sub, end_codes_off + s * 2);
        let start_code = be_u16(sub, start_codes_off + s * 2);
        let id_delta = be_i16(sub, id_delta_off + s * 2);
        let id_range_offset = be_u16(sub, id_range_off_off + s * 2);
        if start_code == 0xFFFF && end_code == 0xFFFF {
            continue;
        }
        for c in start_code..=end_code {
            if c == 0xFFFF {
                break;
            }
            let gid = if id_range_offset == 0 {
                (c as i32 + id_delta as i32) as u16
            } else {
                let glyph_index_addr = id_range_off_off + s * 2 + id_range_offset as usize + 2 * (c - start_code) as usize;
                let raw = be_u16(sub, glyph_index_addr);
                if raw == 0 { 0 } else { (raw as i32 + id_delta as i32) as u16 }
            };
            if gid != 0 {
                out.insert(c as u32, gid);
            }
        }
    }
}

fn parse_cmap_format12(sub: &[u8], out: &mut BTreeMap<u32, u16>) {
    if sub.len() < 16 {
        return;
    }
    let num_groups = be_u32(sub, 12) as usize;
    for g in 0..num_groups {
        let off = 16 + g * 12;
        if off + 12 > sub.len() {
            break;
        }
        let start_char = be_u32(sub, off);
        let end_char = be_u32(sub, off + 4);
        let start_glyph = be_u32(sub, off + 8);
        for (i, c) in (start_char..=end_char).enumerate() {
            out.insert(c, (start_glyph as usize + i) as u16);
        }
    }
}

fn parse_name_table(name: &[u8]) -> (String, String, String) {
    let mut family = None;
    let mut full = None;
    let mut postscript = None;
    if name.len() < 6 {
        return (
            "Unknown".into(),
            "Unknown".into(),
            "Unknown".into(),
        );
    }
    let count = be_u16(name, 2) as usize;
    let string_offset = be_u16(name, 4) as usize;
    for i in 0..count {
        let rec = 6 + i * 12;
        if rec + 12 > name.len() {
            break;
        }
        let platform_id = be_u16(name, rec);
        let name_id = be_u16(name, rec + 6);
        let length = be_u16(name, rec + 8) as usize;
        let offset = be_u16(name, rec + 10) as usize;
        let start = string_offset + offset;
        let Some(bytes) = name.get(start..start + length) else { continue };
        let decoded = if platform_id == 3 || platform_id == 0 {
            decode_utf16be(bytes)
        } else {
            String::from_utf8_lossy(bytes).into_owned()
        };
        match name_id {
            1 => family.get_or_insert(decoded),
            4 => full.get_or_insert(decoded),
            6 => postscript.get_or_insert(decoded),
            _ => continue,
        };
    }
    (
        family.unwrap_or_else(|| "Unknown".into()),
        full.unwrap_or_else(|| "Unknown".into()),
        postscript.unwrap_or_else(|| "Unknown".into()),
    )
}

fn decode_utf16be(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_too_short_input() {
        assert!(matches!(TrueTypeFont::parse(&[0u8; 4]), Err(PdfCraftError::FontNotOpenType)));
    }

    #[test]
    fn rejects_cff_fonts() {
        let mut data = vec![0u8; 12];
        data[0..4].copy_from_slice(b"OTTO");
        assert!(matches!(
            TrueTypeFont::parse(&data),
            Err(PdfCraftError::Unsupported(_))
        ));
    }
}
