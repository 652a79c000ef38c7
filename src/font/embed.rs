//! Embeds a TrueType subset into a PDF as a simple (non-CID) `TrueType`
//! font: a `FontFile2` stream, a `FontDescriptor`, and the font dictionary
//! itself with a `WinAnsiEncoding` `/Widths` array built from the
//! *original* font's metrics (the encoding is independent of which glyph
//! IDs the subsetter renumbered things to).

use std::collections::BTreeSet;

use lopdf::{dictionary, Object};

use crate::error::Result;
use crate::font::subset::{subset, GlyphMap};
use crate::font::truetype::TrueTypeFont;
use crate::page::PageManager;
use crate::util::zlib;

pub struct EmbeddedFont {
    pub font_obj_id: u32,
    #[allow(dead_code)]
    pub glyph_map: GlyphMap,
}

const FIRST_CHAR: u32 = 32;
const LAST_CHAR: u32 = 255;

/// Subsets `font` down to the glyphs needed for `used_codepoints` and
/// registers the resulting `FontFile2`/`FontDescriptor`/Font dictionary as
/// extra objects, returning the font dictionary's object ID.
pub fn embed(pages: &mut PageManager, font: &TrueTypeFont, used_codepoints: &BTreeSet<u32>) -> Result<EmbeddedFont> {
    let used_glyphs: BTreeSet<u16> = used_codepoints
        .iter()
        .filter_map(|cp| font.cmap.get(cp).copied())
        .collect();
    let result = subset(font, &used_glyphs)?;

    let compressed = zlib::deflate(&result.bytes);
    let file_stream_id = pages.alloc_extra(font_file_stream_body(&compressed, result.bytes.len()));
    let descriptor_id = pages.alloc_extra(descriptor_body(font, file_stream_id));

    let base_font = format!("{}+{}", subset_tag(&font.postscript_name), sanitize_name(&font.postscript_name));

    let mut widths = Vec::with_capacity((LAST_CHAR - FIRST_CHAR + 1) as usize);
    for code in FIRST_CHAR..=LAST_CHAR {
        let old_gid = font.cmap.get(&code).copied().unwrap_or(0);
        let width = font.advance_width(old_gid) as f64 * 1000.0 / font.units_per_em.max(1) as f64;
        widths.push(Object::Integer(width.round() as i64));
    }

    let dict = dictionary! {
        "Type" => "Font",
        "Subtype" => "TrueType",
        "BaseFont" => Object::Name(base_font.into_bytes()),
        "FirstChar" => Object::Integer(FIRST_CHAR as i64),
        "LastChar" => Object::Integer(LAST_CHAR as i64),
        "Widths" => Object::Array(widths),
        "Encoding" => "WinAnsiEncoding",
        "FontDescriptor" => Object::Reference((descriptor_id, 0)),
    };
    let body = crate::emitter::object_to_bytes(&Object::Dictionary(dict));
    let font_obj_id = pages.alloc_extra(body);

    Ok(EmbeddedFont {
        font_obj_id,
        glyph_map: result.glyph_map,
    })
}

fn font_file_stream_body(compressed: &[u8], length1: usize) -> Vec<u8> {
    let dict = dictionary! {
        "Length" => Object::Integer(compressed.len() as i64),
        "Length1" => Object::Integer(length1 as i64),
        "Filter" => "FlateDecode",
    };
    let mut out = Vec::new();
    crate::emitter::write_object(&mut out, &Object::Dictionary(dict));
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(compressed);
    out.extend_from_slice(b"\nendstream");
    out
}

fn descriptor_body(font: &TrueTypeFont, file_stream_id: u32) -> Vec<u8> {
    let flags: i64 = (if font.is_fixed_pitch { 1 } else { 0 }) | 32;
    let scale = 1000.0 / font.units_per_em.max(1) as f64;
    let dict = dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => Object::Name(font.postscript_name.as_bytes().to_vec()),
        "Flags" => Object::Integer(flags),
        "FontBBox" => Object::Array(vec![
            Object::Integer((font.bbox.x_min as f64 * scale).round() as i64),
            Object::Integer((font.bbox.y_min as f64 * scale).round() as i64),
            Object::Integer((font.bbox.x_max as f64 * scale).round() as i64),
            Object::Integer((font.bbox.y_max as f64 * scale).round() as i64),
        ]),
        "ItalicAngle" => Object::Real(font.italic_angle as f32),
        "Ascent" => Object::Integer((font.ascent as f64 * scale).round() as i64),
        "Descent" => Object::Integer((font.descent as f64 * scale).round() as i64),
        "CapHeight" => Object::Integer((font.ascent as f64 * scale).round() as i64),
        "StemV" => Object::Integer(80),
        "FontFile2" => Object::Reference((file_stream_id, 0)),
    };
    crate::emitter::object_to_bytes(&Object::Dictionary(dict))
}

/// A deterministic 6-letter subset tag (ISO 32000 §9.6.5.3 recommends a
/// unique uppercase prefix) derived from the font name, not randomness, so
/// repeated builds of the same document stay byte-identical.
fn subset_tag(name: &str) -> String {
    let mut hash: u32 = 2166136261;
    for b in name.bytes() {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    let mut out = String::with_capacity(6);
    let mut h = hash;
    for _ in 0..6 {
        out.push((b'A' + (h % 26) as u8) as char);
        h /= 26;
    }
    out
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if cleaned.is_empty() {
        "Subset".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::truetype::BBox;
    use std::collections::BTreeMap;

    fn stub_font() -> TrueTypeFont {
        let mut cmap = BTreeMap::new();
        cmap.insert('A' as u32, 1u16);
        cmap.insert('B' as u32, 2u16);

        let glyf: Vec<u8> = vec![0u8; 12];
        let loca: Vec<u8> = vec![0, 0, 0, 0, 0, 6, 0, 12];
        let head = {
            let mut h = vec![0u8; 54];
            h[18..20].copy_from_slice(&1000u16.to_be_bytes());
            h
        };
        let hhea = {
            let mut h = vec![0u8; 36];
            h[34..36].copy_from_slice(&3u16.to_be_bytes());
            h
        };
        let maxp = {
            let mut m = vec![0u8; 6];
            m[4..6].copy_from_slice(&3u16.to_be_bytes());
            m
        };
        let mut raw = vec![0u8; 12];
        let mut tables = BTreeMap::new();
        for (tag, data) in [(b"head", &head), (b"hhea", &hhea), (b"maxp", &maxp), (b"loca", &loca), (b"glyf", &glyf)] {
            tables.insert(*tag, (raw.len() as u32, data.len() as u32));
            raw.extend_from_slice(data);
        }

        TrueTypeFont {
            raw,
            tables,
            units_per_em: 1000,
            ascent: 800,
            descent: -200,
            italic_angle: 0.0,
            is_fixed_pitch: false,
            bbox: BBox::default(),
            index_to_loc_format: 0,
            num_glyphs: 3,
            number_of_h_metrics: 3,
            h_metrics: vec![(0, 0), (500, 0), (600, 0)],
            cmap,
            family_name: "Test".into(),
            full_name: "Test Regular".into(),
            postscript_name: "Test-Regular".into(),
        }
    }

    #[test]
    fn embeds_subset_with_stable_tag() {
        let font = stub_font();
        let mut pages = PageManager::new(1, 841.89);
        let mut used = BTreeSet::new();
        used.insert('A' as u32);
        let embedded = embed(&mut pages, &font, &used).unwrap();
        assert!(embedded.font_obj_id >= 2000);
        assert_eq!(subset_tag("Test-Regular"), subset_tag("Test-Regular"));
    }
}
