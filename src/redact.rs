//! Content-level redaction.
//!
//! Takes already-resolved text-position hits (the heuristic text extractor
//! that turns a search term into page/rect pairs is an external
//! collaborator; only its contract is implemented here) and, for every hit,
//! blanks the matched run inside the page's text-showing operators and
//! overdraws the rectangle with an opaque box backed by a non-printing
//! `/Annot /Square`, so the redaction survives even if a viewer clips the
//! content stream differently than it was authored.

use std::collections::HashMap;

use lopdf::Dictionary;

use crate::draw;
use crate::emitter;
use crate::error::{PdfCraftError, Result};
use crate::lexer::{self, Token, Tokenizer, Value};
use crate::rebuild::{self, ParsedObject, ParsedPdf};
use crate::util::{hexutil, num, text::escape_literal, zlib};

/// A text hit resolved by an external text-position extractor: a 1-based
/// page number and the PDF-space rectangle the matched text occupies.
#[derive(Debug, Clone, Copy)]
pub struct TextHit {
    pub page: u32,
    pub rect: [f32; 4],
}

/// Redacts every case-insensitive occurrence of `needle` from the content
/// streams of the pages named by `hits`, and overdraws each hit's rectangle
/// with an opaque black box backed by a non-printing square annotation.
pub fn redact(pdf: &[u8], hits: &[TextHit], needle: &str) -> Result<Vec<u8>> {
    log::info!("redacting {} hit(s) for {needle:?}", hits.len());
    let parsed = rebuild::parse(pdf)?;
    let mut rebuilt = ParsedPdf {
        objects: parsed.objects,
        trailer: parsed.trailer,
    };

    let mut rects_by_page: HashMap<u32, Vec<[f32; 4]>> = HashMap::new();
    for hit in hits {
        rects_by_page.entry(hit.page).or_default().push(hit.rect);
    }

    let mut next_id = rebuilt.objects.keys().copied().max().unwrap_or(0) + 1;

    for (&page_number, rects) in &rects_by_page {
        let page_id = rebuild::resolve_page_id(&rebuilt, page_number)?;
        let page_body = rebuilt
            .objects
            .get(&page_id)
            .map(|o| o.body.clone())
            .ok_or_else(|| PdfCraftError::Parse { offset: 0, message: "redaction target page not found".into() })?;
        let page_dict = rebuild::parse_dict(&page_body)?;

        blank_page_contents(&mut rebuilt, &page_dict, needle)?;

        let mut ops = Vec::new();
        for &rect in rects {
            draw::draw_redaction_box(&mut ops, [rect[0] as f64, rect[1] as f64, rect[2] as f64, rect[3] as f64]);
        }
        let encoded = draw::encode(ops)?;
        let compressed = zlib::deflate(&encoded);
        let box_stream_id = next_id;
        next_id += 1;
        rebuilt.objects.insert(box_stream_id, ParsedObject { gen: 0, body: flate_stream_body(&compressed) });

        let mut new_page_body = page_body;
        append_to_contents(&mut new_page_body, &page_dict, box_stream_id);

        for &rect in rects {
            let annot_id = next_id;
            next_id += 1;
            rebuilt
                .objects
                .insert(annot_id, ParsedObject { gen: 0, body: square_annot_body(rect, page_id).into_bytes() });
            rebuild::splice_annot_into_page(&mut new_page_body, annot_id);
        }

        rebuilt.objects.get_mut(&page_id).unwrap().body = new_page_body;
    }

    Ok(rebuilt.reemit(&[], &[]))
}

fn blank_page_contents(rebuilt: &mut ParsedPdf, page_dict: &HashMap<String, Value>, needle: &str) -> Result<()> {
    for content_id in resolve_contents_ids(page_dict) {
        let Some(obj) = rebuilt.objects.get(&content_id) else { continue };
        let (dict, decoded) = decode_stream(&obj.body)?;
        let blanked = blank_text_operators(&decoded, needle)?;
        let compressed = zlib::deflate(&blanked);
        let new_body = rebuild_stream_object(&dict, &compressed);
        rebuilt.objects.get_mut(&content_id).unwrap().body = new_body;
    }
    Ok(())
}

fn resolve_contents_ids(dict: &HashMap<String, Value>) -> Vec<u32> {
    match dict.get("Contents") {
        Some(Value::Reference(id, _)) => vec![*id],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::Reference(id, _) => Some(*id),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn decode_stream(body: &[u8]) -> Result<(HashMap<String, Value>, Vec<u8>)> {
    let dict_end = lexer::find_bytes(body, b"stream")
        .ok_or_else(|| PdfCraftError::Parse { offset: 0, message: "content object has no stream".into() })?;
    let dict = rebuild::parse_dict(&body[..dict_end])?;
    let range = lexer::find_stream(body)
        .ok_or_else(|| PdfCraftError::Parse { offset: 0, message: "malformed content stream".into() })?;
    let raw = &body[range];
    let decoded = match dict.get("Filter").and_then(Value::as_name) {
        Some("FlateDecode") => zlib::inflate(raw)?,
        _ => raw.to_vec(),
    };
    Ok((dict, decoded))
}

fn rebuild_stream_object(old_dict: &HashMap<String, Value>, compressed: &[u8]) -> Vec<u8> {
    let mut dict = Dictionary::new();
    for (k, v) in old_dict {
        if matches!(k.as_str(), "Filter" | "Length" | "DecodeParms") {
            continue;
        }
        dict.set(k.clone(), rebuild::value_to_object(v));
    }
    dict.set("Filter", lopdf::Object::Name(b"FlateDecode".to_vec()));
    dict.set("Length", lopdf::Object::Integer(compressed.len() as i64));
    let mut out = Vec::new();
    emitter::write_object(&mut out, &lopdf::Object::Dictionary(dict));
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(compressed);
    out.extend_from_slice(b"\nendstream");
    out
}

fn flate_stream_body(compressed: &[u8]) -> Vec<u8> {
    let mut out = format!("<< /Filter /FlateDecode /Length {} >>", compressed.len()).into_bytes();
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(compressed);
    out.extend_from_slice(b"\nendstream");
    out
}

fn square_annot_body(rect: [f32; 4], page_id: u32) -> String {
    format!(
        "<< /Type /Annot /Subtype /Square /Rect [{} {} {} {}] /IC [0 0 0] /C [0 0 0] /P {page_id} 0 R >>",
        num::format_real(rect[0] as f64),
        num::format_real(rect[1] as f64),
        num::format_real(rect[2] as f64),
        num::format_real(rect[3] as f64),
    )
}

/// Appends `new_id` to a page body's `/Contents`, converting a lone
/// reference into a two-element array when needed.
fn append_to_contents(page_body: &mut Vec<u8>, page_dict: &HashMap<String, Value>, new_id: u32) {
    match page_dict.get("Contents") {
        Some(Value::Array(_)) => {
            if let Some(tag_pos) = lexer::find_bytes(page_body, b"/Contents") {
                if let Some(open_rel) = lexer::find_bytes(&page_body[tag_pos..], b"[") {
                    let open = tag_pos + open_rel;
                    if let Some(close_rel) = lexer::find_bytes(&page_body[open..], b"]") {
                        let close = open + close_rel;
                        let insertion = format!(" {new_id} 0 R");
                        page_body.splice(close..close, insertion.bytes());
                        return;
                    }
                }
            }
        }
        Some(Value::Reference(old_id, old_gen)) => {
            let old_ref = format!("{old_id} {old_gen} R");
            if let Some(tag_pos) = lexer::find_bytes(page_body, b"/Contents") {
                if let Some(ref_rel) = lexer::find_bytes(&page_body[tag_pos..], old_ref.as_bytes()) {
                    let ref_start = tag_pos + ref_rel;
                    let ref_end = ref_start + old_ref.len();
                    let replacement = format!("[{old_ref} {new_id} 0 R]");
                    page_body.splice(ref_start..ref_end, replacement.bytes());
                    return;
                }
            }
        }
        _ => {}
    }
    rebuild::insert_before_dict_close(page_body, format!("/Contents [{new_id} 0 R] ").as_bytes());
}

/// Re-tokenizes a content stream and blanks the bytes of `needle` wherever
/// they occur (case-insensitively) inside a text-showing operator's string
/// operand(s) — `Tj`/`'`/`"` for a single string, or every string inside a
/// `[...]` array immediately followed by `TJ`.
fn blank_text_operators(content: &[u8], needle: &str) -> Result<Vec<u8>> {
    let mut tok = Tokenizer::new(content);
    let mut tokens = Vec::new();
    while let Some(t) = tok.next_token()? {
        tokens.push(t);
    }

    let mut text_show = vec![false; tokens.len()];
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::LiteralString(_) | Token::HexString(_) => {
                if let Some(Token::Keyword(kw)) = tokens.get(i + 1) {
                    if matches!(kw.as_str(), "Tj" | "'" | "\"") {
                        text_show[i] = true;
                    }
                }
            }
            Token::ArrayStart => {
                let mut depth = 1i32;
                let mut j = i + 1;
                while j < tokens.len() && depth > 0 {
                    match &tokens[j] {
                        Token::ArrayStart => depth += 1,
                        Token::ArrayEnd => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    j += 1;
                }
                if depth == 0 {
                    if let Some(Token::Keyword(kw)) = tokens.get(j + 1) {
                        if kw.as_str() == "TJ" {
                            for item in text_show.iter_mut().take(j).skip(i + 1) {
                                *item = true;
                            }
                            // Only strings among the array's entries are operands;
                            // numbers (kerning adjustments) are left untouched by
                            // `write_token` regardless of this flag.
                        }
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }

    let needle_lower = needle.to_ascii_lowercase();
    let mut out = Vec::new();
    for (idx, t) in tokens.iter().enumerate() {
        if idx > 0 {
            out.push(b' ');
        }
        match t {
            Token::LiteralString(bytes) if text_show[idx] => {
                out.push(b'(');
                out.extend_from_slice(&escape_literal(&case_insensitive_blank(bytes, &needle_lower)));
                out.push(b')');
            }
            Token::HexString(bytes) if text_show[idx] => {
                out.push(b'<');
                out.extend_from_slice(hexutil::encode_upper(&case_insensitive_blank(bytes, &needle_lower)).as_bytes());
                out.push(b'>');
            }
            other => write_token(&mut out, other),
        }
    }
    Ok(out)
}

fn write_token(out: &mut Vec<u8>, t: &Token) {
    match t {
        Token::Int(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Token::Real(r) => out.extend_from_slice(num::format_real(*r).as_bytes()),
        Token::Name(n) => {
            out.push(b'/');
            out.extend_from_slice(n.as_bytes());
        }
        Token::LiteralString(bytes) => {
            out.push(b'(');
            out.extend_from_slice(&escape_literal(bytes));
            out.push(b')');
        }
        Token::HexString(bytes) => {
            out.push(b'<');
            out.extend_from_slice(hexutil::encode_upper(bytes).as_bytes());
            out.push(b'>');
        }
        Token::ArrayStart => out.push(b'['),
        Token::ArrayEnd => out.push(b']'),
        Token::DictStart => out.extend_from_slice(b"<<"),
        Token::DictEnd => out.extend_from_slice(b">>"),
        Token::Keyword(k) => out.extend_from_slice(k.as_bytes()),
    }
}

/// Replaces every case-insensitive occurrence of `needle_lower` with spaces,
/// byte for byte, so the string's length — and therefore any positioning
/// that depends on it — is unchanged.
fn case_insensitive_blank(bytes: &[u8], needle_lower: &str) -> Vec<u8> {
    let needle = needle_lower.as_bytes();
    if needle.is_empty() || bytes.len() < needle.len() {
        return bytes.to_vec();
    }
    let lower: Vec<u8> = bytes.iter().map(u8::to_ascii_lowercase).collect();
    let mut out = bytes.to_vec();
    let mut i = 0;
    while i + needle.len() <= lower.len() {
        if &lower[i..i + needle.len()] == needle {
            for b in &mut out[i..i + needle.len()] {
                *b = b' ';
            }
            i += needle.len();
        } else {
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_single_page_pdf(content: &[u8]) -> Vec<u8> {
        let compressed = zlib::deflate(content);
        let mut pdf = Vec::new();
        pdf.extend_from_slice(b"%PDF-1.7\n");
        pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        pdf.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n");
        pdf.extend_from_slice(
            b"3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << >> >>\nendobj\n",
        );
        pdf.extend_from_slice(b"4 0 obj\n");
        pdf.extend_from_slice(format!("<< /Filter /FlateDecode /Length {} >>\nstream\n", compressed.len()).as_bytes());
        pdf.extend_from_slice(&compressed);
        pdf.extend_from_slice(b"\nendstream\nendobj\n");
        pdf.extend_from_slice(b"trailer\n<< /Root 1 0 R /Size 5 >>\n%%EOF");
        pdf
    }

    #[test]
    fn blanks_matched_text_and_adds_square_annotation() {
        let content = b"BT /F1 12 Tf 36 700 Td (this is SeCrEt text) Tj ET";
        let pdf = build_single_page_pdf(content);
        let hits = [TextHit { page: 1, rect: [30.0, 690.0, 300.0, 715.0] }];

        let out = redact(&pdf, &hits, "secret").unwrap();

        let parsed = rebuild::parse(&out).unwrap();
        let page_body = &parsed.objects.get(&3).unwrap().body;
        let page_dict = rebuild::parse_dict(page_body).unwrap();

        for content_id in resolve_contents_ids(&page_dict) {
            let (_, decoded) = decode_stream(&parsed.objects.get(&content_id).unwrap().body).unwrap();
            let text = String::from_utf8_lossy(&decoded).to_lowercase();
            assert!(!text.contains("secret"), "content stream {content_id} still contains the needle");
        }

        let has_square = parsed
            .objects
            .values()
            .any(|o| String::from_utf8_lossy(&o.body).contains("/Subtype /Square"));
        assert!(has_square);
    }

    #[test]
    fn case_insensitive_blank_preserves_length() {
        let out = case_insensitive_blank(b"SeCrEt data", "secret");
        assert_eq!(out.len(), "SeCrEt data".len());
        assert!(!String::from_utf8_lossy(&out).to_lowercase().contains("secret"));
    }

    #[test]
    fn tj_array_strings_are_blanked_but_kerning_numbers_survive() {
        let content = b"BT /F1 12 Tf [(top secret) -20 (other)] TJ ET";
        let out = blank_text_operators(content, "secret").unwrap();
        let text = String::from_utf8_lossy(&out).to_lowercase();
        assert!(!text.contains("secret"));
        assert!(text.contains("-20"));
    }
}
