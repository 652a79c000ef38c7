//! TrueType font subsetting (design document §4.2).
//!
//! Given a parsed [`TrueTypeFont`] and a set of used glyph IDs, produces a
//! new, structurally valid TTF containing only those glyphs plus
//! `.notdef`, with rewritten `cmap`, `glyf`, `loca`, `hmtx`, `hhea`,
//! `maxp`, `post`, `name` tables and recomputed checksums.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PdfCraftError, Result};
use crate::font::truetype::TrueTypeFont;
use crate::util::text::utf16be_with_bom;

/// Old glyph ID -> new (densely numbered) glyph ID. Always contains `0 -> 0`.
pub type GlyphMap = BTreeMap<u16, u16>;

pub struct SubsetResult {
    pub bytes: Vec<u8>,
    pub glyph_map: GlyphMap,
}

pub fn subset(font: &TrueTypeFont, used_glyphs: &BTreeSet<u16>) -> Result<SubsetResult> {
    let glyf = font.table(b"glyf").ok_or(PdfCraftError::FontNotOpenType)?;
    let loca = font.table(b"loca").ok_or(PdfCraftError::FontNotOpenType)?;

    // Step 1: glyph set = requested (filtered < numGlyphs) + {0}, sorted.
    let mut set: BTreeSet<u16> = used_glyphs
        .iter()
        .copied()
        .filter(|&g| g < font.num_glyphs)
        .collect();
    set.insert(0);
    let sorted: Vec<u16> = set.into_iter().collect();
    let glyph_map: GlyphMap = sorted
        .iter()
        .enumerate()
        .map(|(new_id, &old_id)| (old_id, new_id as u16))
        .collect();

    // Step 2: concatenate glyph descriptions in new-ID order, padding to even length.
    let mut new_glyf = Vec::new();
    let mut loca_offsets = Vec::with_capacity(sorted.len() + 1);
    for &old_gid in &sorted {
        loca_offsets.push(new_glyf.len() as u32);
        let data = font.glyph_data(loca, glyf, old_gid);
        new_glyf.extend_from_slice(data);
        if new_glyf.len() % 2 != 0 {
            new_glyf.push(0);
        }
    }
    loca_offsets.push(new_glyf.len() as u32);

    // Step 3: choose loca format.
    let long_format = new_glyf.len() > 0x1FFFE;
    let new_loca = build_loca(&loca_offsets, long_format);

    // Step 4: rewrite hmtx, one long metric per subset glyph, lsb = 0.
    let mut new_hmtx = Vec::with_capacity(sorted.len() * 4);
    for &old_gid in &sorted {
        let width = font.advance_width(old_gid);
        new_hmtx.extend_from_slice(&width.to_be_bytes());
        new_hmtx.extend_from_slice(&0i16.to_be_bytes());
    }

    // Step 5: rewrite cmap as a single format-4 subtable, platform 3 encoding 1.
    let new_cmap = build_cmap4(font, &glyph_map);

    // Step 6: minimal post/name, verbatim optional tables.
    let new_post = build_post();
    let new_name = build_name(font);

    // Step 7: update maxp.numGlyphs, hhea.numberOfHMetrics.
    let new_maxp = patch_maxp(font.table(b"maxp").ok_or(PdfCraftError::FontNotOpenType)?, sorted.len() as u16);
    let new_hhea = patch_hhea(font.table(b"hhea").ok_or(PdfCraftError::FontNotOpenType)?, sorted.len() as u16);
    let new_head = patch_head(font.table(b"head").ok_or(PdfCraftError::FontNotOpenType)?, long_format);

    let mut tables: Vec<([u8; 4], Vec<u8>)> = vec![
        (*b"head", new_head),
        (*b"hhea", new_hhea),
        (*b"maxp", new_maxp),
        (*b"hmtx", new_hmtx),
        (*b"cmap", new_cmap),
        (*b"loca", new_loca),
        (*b"glyf", new_glyf),
        (*b"post", new_post),
        (*b"name", new_name),
    ];
    for optional in [b"OS/2", b"cvt ", b"fpgm", b"prep"] {
        if let Some(bytes) = font.table(optional) {
            tables.push((*optional, bytes.to_vec()));
        }
    }

    log::debug!("subsetting {} -> {} glyphs", font.num_glyphs, sorted.len());
    let bytes = assemble(tables);
    Ok(SubsetResult { bytes, glyph_map })
}

fn build_loca(offsets: &[u32], long_format: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(offsets.len() * if long_format { 4 } else { 2 });
    for &off in offsets {
        if long_format {
            out.extend_from_slice(&off.to_be_bytes());
        } else {
            out.extend_from_slice(&((off / 2) as u16).to_be_bytes());
        }
    }
    out
}

/// Build a format-4 cmap subtable by scanning sorted (codepoint, new glyph)
/// pairs and starting a new segment whenever either the codepoint or the
/// mapped glyph ID breaks consecutiveness with the previous entry.
fn build_cmap4(font: &TrueTypeFont, glyph_map: &GlyphMap) -> Vec<u8> {
    let mut pairs: Vec<(u32, u16)> = font
        .cmap
        .iter()
        .filter_map(|(&cp, &old_gid)| glyph_map.get(&old_gid).map(|&new_gid| (cp, new_gid)))
        .collect();
    pairs.sort_by_key(|&(cp, _)| cp);

    struct Segment {
        start: u32,
        end: u32,
        id_delta: i32,
    }
    let mut segments: Vec<Segment> = Vec::new();
    for (cp, gid) in pairs {
        if let Some(last) = segments.last_mut() {
            let expected_cp = last.end + 1;
            let expected_gid = ((last.end as i32 + last.id_delta) as u32 + 1) as u16;
            if cp == expected_cp && gid == expected_gid {
                last.end = cp;
                continue;
            }
        }
        segments.push(Segment {
            start: cp,
            end: cp,
            id_delta: gid as i32 - cp as i32,
        });
    }
    segments.push(Segment {
        start: 0xFFFF,
        end: 0xFFFF,
        id_delta: 1,
    });

    let seg_count = segments.len();
    let seg_count_x2 = (seg_count * 2) as u16;
    let mut entry_selector = 0u16;
    while (1u32 << (entry_selector + 1)) <= seg_count as u32 {
        entry_selector += 1;
    }
    let search_range = 2u16.wrapping_mul(1u16 << entry_selector);
    let range_shift = seg_count_x2.wrapping_sub(search_range);

    let mut sub = Vec::new();
    sub.extend_from_slice(&4u16.to_be_bytes()); // format
    // length + language patched below; placeholder for now
    sub.extend_from_slice(&0u16.to_be_bytes());
    sub.extend_from_slice(&0u16.to_be_bytes());
    sub.extend_from_slice(&seg_count_x2.to_be_bytes());
    sub.extend_from_slice(&search_range.to_be_bytes());
    sub.extend_from_slice(&entry_selector.to_be_bytes());
    sub.extend_from_slice(&range_shift.to_be_bytes());
    for s in &segments {
        sub.extend_from_slice(&(s.end as u16).to_be_bytes());
    }
    sub.extend_from_slice(&0u16.to_be_bytes()); // reservedPad
    for s in &segments {
        sub.extend_from_slice(&(s.start as u16).to_be_bytes());
    }
    for s in &segments {
        sub.extend_from_slice(&(s.id_delta as i16).to_be_bytes());
    }
    for _ in &segments {
        sub.extend_from_slice(&0u16.to_be_bytes()); // idRangeOffset
    }
    let len = sub.len() as u16;
    sub[2..4].copy_from_slice(&len.to_be_bytes());

    let mut cmap = Vec::new();
    cmap.extend_from_slice(&0u16.to_be_bytes()); // version
    cmap.extend_from_slice(&1u16.to_be_bytes()); // numTables
    cmap.extend_from_slice(&3u16.to_be_bytes()); // platformID
    cmap.extend_from_slice(&1u16.to_be_bytes()); // encodingID
    cmap.extend_from_slice(&(12u32).to_be_bytes()); // offset to subtable
    cmap.extend_from_slice(&sub);
    cmap
}

/// Minimal `post` table, version 3.0 (no glyph names retained).
fn build_post() -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    out.extend_from_slice(&0x0003_0000u32.to_be_bytes()); // version 3.0
    out.extend_from_slice(&0i32.to_be_bytes()); // italicAngle
    out.extend_from_slice(&0i16.to_be_bytes()); // underlinePosition
    out.extend_from_slice(&0i16.to_be_bytes()); // underlineThickness
    out.extend_from_slice(&0u32.to_be_bytes()); // isFixedPitch
    out.extend_from_slice(&0u32.to_be_bytes()); // minMemType42
    out.extend_from_slice(&0u32.to_be_bytes()); // maxMemType42
    out.extend_from_slice(&0u32.to_be_bytes()); // minMemType1
    out.extend_from_slice(&0u32.to_be_bytes()); // maxMemType1
    out
}

/// Minimal `name` table with records 0,1,2,4,5,6 under platform 3,
/// encoding 1, language 0x0409 (US English), UTF-16BE.
fn build_name(font: &TrueTypeFont) -> Vec<u8> {
    let records: [(u16, &str); 6] = [
        (0, "Subset font"),
        (1, font.family_name.as_str()),
        (2, "Regular"),
        (4, font.full_name.as_str()),
        (5, "1.0"),
        (6, font.postscript_name.as_str()),
    ];

    let mut string_storage = Vec::new();
    let mut entries = Vec::new();
    for (name_id, value) in records {
        let encoded = &utf16be_with_bom(value)[2..]; // drop BOM; name records don't use one
        let offset = string_storage.len() as u16;
        string_storage.extend_from_slice(encoded);
        entries.push((name_id, offset, encoded.len() as u16));
    }

    let mut out = Vec::new();
    out.extend_from_slice(&0u16.to_be_bytes()); // format
    out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    let string_offset = (6 + entries.len() * 12) as u16;
    out.extend_from_slice(&string_offset.to_be_bytes());
    for (name_id, offset, length) in &entries {
        out.extend_from_slice(&3u16.to_be_bytes()); // platformID
        out.extend_from_slice(&1u16.to_be_bytes()); // encodingID
        out.extend_from_slice(&0x0409u16.to_be_bytes()); // languageID
        out.extend_from_slice(&name_id.to_be_bytes());
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&offset.to_be_bytes());
    }
    out.extend_from_slice(&string_storage);
    out
}

fn patch_maxp(maxp: &[u8], num_glyphs: u16) -> Vec<u8> {
    let mut out = maxp.to_vec();
    if out.len() >= 6 {
        out[4..6].copy_from_slice(&num_glyphs.to_be_bytes());
    }
    out
}

fn patch_hhea(hhea: &[u8], num_h_metrics: u16) -> Vec<u8> {
    let mut out = hhea.to_vec();
    if out.len() >= 36 {
        out[34..36].copy_from_slice(&num_h_metrics.to_be_bytes());
    }
    out
}

fn patch_head(head: &[u8], long_loca: bool) -> Vec<u8> {
    let mut out = head.to_vec();
    if out.len() >= 52 {
        out[50..52].copy_from_slice(&(if long_loca { 1i16 } else { 0i16 }).to_be_bytes());
    }
    // checksumAdjustment is patched last, over the whole assembled file.
    if out.len() >= 12 {
        out[8..12].copy_from_slice(&0u32.to_be_bytes());
    }
    out
}

/// Table checksum: sum of big-endian 32-bit words, zero-extended to a
/// 4-byte boundary.
fn table_checksum(data: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        sum = sum.wrapping_add(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    let rem = chunks.remainder();
    if !rem.is_empty() {
        let mut last = [0u8; 4];
        last[..rem.len()].copy_from_slice(rem);
        sum = sum.wrapping_add(u32::from_be_bytes(last));
    }
    sum
}

fn align4(len: usize) -> usize {
    (len + 3) & !3
}

/// Step 8-9: assemble the offset table, directory (sorted by tag), 4-byte
/// aligned table bodies, per-table checksums, then patch
/// `head.checksumAdjustment` over the whole file.
fn assemble(mut tables: Vec<([u8; 4], Vec<u8>)>) -> Vec<u8> {
    tables.sort_by_key(|(tag, _)| *tag);

    let num_tables = tables.len() as u16;
    let mut entry_selector = 0u16;
    while (1u32 << (entry_selector + 1)) <= num_tables as u32 {
        entry_selector += 1;
    }
    let search_range = 16u16.wrapping_mul(1u16 << entry_selector);
    let range_shift = (num_tables * 16).wrapping_sub(search_range);

    let header_len = 12 + tables.len() * 16;
    let mut body = Vec::new();
    let mut directory = Vec::new();
    let mut offset = header_len;
    for (tag, data) in &tables {
        let checksum = table_checksum(data);
        directory.push((*tag, checksum, offset as u32, data.len() as u32));
        body.extend_from_slice(data);
        let padded = align4(data.len());
        for _ in data.len()..padded {
            body.push(0);
        }
        offset += padded;
    }

    let mut out = Vec::with_capacity(offset);
    out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    out.extend_from_slice(&num_tables.to_be_bytes());
    out.extend_from_slice(&search_range.to_be_bytes());
    out.extend_from_slice(&entry_selector.to_be_bytes());
    out.extend_from_slice(&range_shift.to_be_bytes());
    for (tag, checksum, off, len) in &directory {
        out.extend_from_slice(tag);
        out.extend_from_slice(&checksum.to_be_bytes());
        out.extend_from_slice(&off.to_be_bytes());
        out.extend_from_slice(&len.to_be_bytes());
    }
    out.extend_from_slice(&body);

    // Patch head.checksumAdjustment: zero it (already zero from patch_head),
    // sum the whole file, store 0xB1B0AFBA - sum.
    if let Some((_, _, head_off, _)) = directory.iter().find(|(tag, ..)| tag == b"head") {
        let whole_sum = table_checksum(&out);
        let adjustment = 0xB1B0_AFBAu32.wrapping_sub(whole_sum);
        let at = *head_off as usize + 8;
        out[at..at + 4].copy_from_slice(&adjustment.to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::truetype::BBox;
    use std::collections::BTreeSet;

    /// Build a minimal but structurally valid synthetic font: two glyphs
    /// (.notdef plus one real glyph), fed through the same table layout
    /// `subset()` expects to find via `font.table(..)`.
    fn synthetic_font() -> TrueTypeFont {
        let glyf: Vec<u8> = vec![0u8; 10];
        let loca: Vec<u8> = vec![0, 0, 0, 0, 0, 10]; // long format: 0, 0, 10

        let head = {
            let mut h = vec![0u8; 54];
            h[18..20].copy_from_slice(&1000u16.to_be_bytes());
            h[50..52].copy_from_slice(&1i16.to_be_bytes()); // long loca
            h
        };
        let hhea = {
            let mut h = vec![0u8; 36];
            h[4..6].copy_from_slice(&800i16.to_be_bytes());
            h[6..8].copy_from_slice(&(-200i16).to_be_bytes());
            h[34..36].copy_from_slice(&2u16.to_be_bytes());
            h
        };
        let maxp = {
            let mut m = vec![0u8; 6];
            m[4..6].copy_from_slice(&2u16.to_be_bytes());
            m
        };

        let parts: [(&[u8; 4], Vec<u8>); 5] = [
            (b"head", head),
            (b"hhea", hhea),
            (b"maxp", maxp),
            (b"loca", loca),
            (b"glyf", glyf),
        ];
        let mut tables = BTreeMap::new();
        let mut raw = vec![0u8; 12]; // fake offset-table header, unused by subset()
        for (tag, data) in &parts {
            tables.insert(**tag, (raw.len() as u32, data.len() as u32));
            raw.extend_from_slice(data);
        }

        let mut cmap = BTreeMap::new();
        cmap.insert('A' as u32, 1u16);
        cmap.insert('B' as u32, 1u16);

        TrueTypeFont {
            raw,
            tables,
            units_per_em: 1000,
            ascent: 800,
            descent: -200,
            italic_angle: 0.0,
            is_fixed_pitch: false,
            bbox: BBox::default(),
            index_to_loc_format: 1,
            num_glyphs: 2,
            number_of_h_metrics: 2,
            h_metrics: vec![(0, 0), (500, 0)],
            cmap,
            family_name: "Test".into(),
            full_name: "Test Regular".into(),
            postscript_name: "Test-Regular".into(),
        }
    }

    #[test]
    fn subset_retains_notdef_and_requested_glyphs() {
        let font = synthetic_font();
        let mut wanted = BTreeSet::new();
        wanted.insert(1u16);
        let result = subset(&font, &wanted).unwrap();
        assert_eq!(result.glyph_map.get(&0), Some(&0));
        assert_eq!(result.glyph_map.get(&1), Some(&1));
        assert!(result.bytes.starts_with(&0x0001_0000u32.to_be_bytes()));
    }
}
