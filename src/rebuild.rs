//! Shared machinery for the three operations that start from an existing,
//! externally-supplied PDF rather than building one from scratch: decrypt,
//! redact and form-fill all parse the file into an object map, mutate some
//! object bodies in place, and then reuse [`crate::emitter::Emitter`] for a
//! single rebuild pass — the generator's own byte-exact emitter, not a
//! second implementation.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Object, StringFormat};

use crate::emitter::Emitter;
use crate::error::Result;
use crate::lexer::{self, Tokenizer, Value};

pub struct ParsedObject {
    pub gen: u16,
    pub body: Vec<u8>,
}

pub struct ParsedPdf {
    pub objects: BTreeMap<u32, ParsedObject>,
    pub trailer: Value,
}

/// Scans `pdf` for every `N G obj ... endobj` region (the non-greedy scan
/// described in the design document §4.3 step 2) and the last `trailer`
/// dictionary in the file.
pub fn parse(pdf: &[u8]) -> Result<ParsedPdf> {
    let mut objects = BTreeMap::new();
    for region in lexer::scan_objects(pdf) {
        objects.insert(
            region.id,
            ParsedObject {
                gen: region.gen,
                body: pdf[region.body].to_vec(),
            },
        );
    }
    let trailer = parse_last_trailer(pdf)?;
    Ok(ParsedPdf { objects, trailer })
}

fn parse_last_trailer(pdf: &[u8]) -> Result<Value> {
    let mut search_from = 0usize;
    let mut last_pos = None;
    while let Some(rel) = lexer::find_bytes(&pdf[search_from..], b"trailer") {
        last_pos = Some(search_from + rel);
        search_from += rel + 1;
        if search_from >= pdf.len() {
            break;
        }
    }
    let Some(pos) = last_pos else {
        return Ok(Value::Dict(Default::default()));
    };
    let mut tok = Tokenizer::new(&pdf[pos + "trailer".len()..]);
    lexer::parse_value(&mut tok)
}

/// Converts a parsed [`Value`] into the [`lopdf::Object`] the emitter's
/// dictionary writer already knows how to serialize.
pub fn value_to_object(v: &Value) -> Object {
    match v {
        Value::Null => Object::Null,
        Value::Bool(b) => Object::Boolean(*b),
        Value::Int(i) => Object::Integer(*i),
        Value::Real(r) => Object::Real(*r as f32),
        Value::Name(n) => Object::Name(n.as_bytes().to_vec()),
        Value::String(s) => Object::String(s.clone(), StringFormat::Literal),
        Value::Array(items) => Object::Array(items.iter().map(value_to_object).collect()),
        Value::Dict(map) => {
            let mut dict = Dictionary::new();
            for (k, v) in map {
                dict.set(k.clone(), value_to_object(v));
            }
            Object::Dictionary(dict)
        }
        Value::Reference(id, gen) => Object::Reference((*id, *gen)),
    }
}

/// Parses a single object body as a dictionary, as needed to inspect a
/// Catalog, Pages node, or AcroForm field outside the trailer itself.
pub fn parse_dict(body: &[u8]) -> Result<std::collections::HashMap<String, Value>> {
    let mut tok = Tokenizer::new(body);
    match lexer::parse_value(&mut tok)? {
        Value::Dict(map) => Ok(map),
        _ => Err(crate::error::PdfCraftError::Parse {
            offset: 0,
            message: "expected a dictionary".into(),
        }),
    }
}

/// Last occurrence of `needle` in `haystack`, used to find a dictionary's
/// own closing `>>` (the last one in a well-formed, single top-level-dict
/// object body, since any nested dict's `>>` closes earlier in the byte
/// stream).
pub fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).rev().find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Splices `insertion` immediately before a dictionary body's closing `>>`.
pub fn insert_before_dict_close(body: &mut Vec<u8>, insertion: &[u8]) {
    match rfind_bytes(body, b">>") {
        Some(pos) => {
            body.splice(pos..pos, insertion.iter().copied());
        }
        None => body.extend_from_slice(insertion),
    }
}

/// Resolves the trailer's `/Root` reference to a catalog object number.
pub fn root_id(parsed: &ParsedPdf) -> Result<u32> {
    let Value::Dict(trailer) = &parsed.trailer else {
        return Err(crate::error::PdfCraftError::Parse { offset: 0, message: "trailer is not a dictionary".into() });
    };
    match trailer.get("Root") {
        Some(Value::Reference(id, _)) => Ok(*id),
        _ => Err(crate::error::PdfCraftError::Parse { offset: 0, message: "trailer missing /Root".into() }),
    }
}

/// Walks Root -> Pages -> Kids to find the page object ID for a 1-based
/// page number, out-of-range numbers clamp to the nearest valid index.
/// Only plain (non-inherited, non-nested) page trees are supported, which
/// is all this crate's own generator ever produces.
pub fn resolve_page_id(parsed: &ParsedPdf, page_number: u32) -> Result<u32> {
    let catalog_id = root_id(parsed)?;
    let catalog_body = parsed
        .objects
        .get(&catalog_id)
        .map(|o| o.body.clone())
        .ok_or_else(|| crate::error::PdfCraftError::Parse { offset: 0, message: "catalog object not found".into() })?;
    let catalog_dict = parse_dict(&catalog_body)?;
    let pages_id = match catalog_dict.get("Pages") {
        Some(Value::Reference(id, _)) => *id,
        _ => return Err(crate::error::PdfCraftError::Parse { offset: 0, message: "catalog missing /Pages".into() }),
    };
    let pages_body = parsed
        .objects
        .get(&pages_id)
        .map(|o| o.body.clone())
        .ok_or_else(|| crate::error::PdfCraftError::Parse { offset: 0, message: "pages object not found".into() })?;
    let pages_dict = parse_dict(&pages_body)?;
    let kids = pages_dict
        .get("Kids")
        .and_then(Value::as_array)
        .ok_or_else(|| crate::error::PdfCraftError::Parse { offset: 0, message: "pages missing /Kids".into() })?;
    let index = (page_number.saturating_sub(1) as usize).min(kids.len().saturating_sub(1));
    match kids.get(index) {
        Some(Value::Reference(id, _)) => Ok(*id),
        _ => Err(crate::error::PdfCraftError::Parse { offset: 0, message: "malformed /Kids entry".into() }),
    }
}

/// Appends `widget_id` to a page body's `/Annots` array, creating the array
/// if the page doesn't already have one. Shared by the signer (widget
/// annotations) and the redactor (square annotations backing a blanked run).
pub fn splice_annot_into_page(body: &mut Vec<u8>, widget_id: u32) {
    let dict = parse_dict(body).unwrap_or_default();
    if dict.contains_key("Annots") {
        if let Some(array_close) = rfind_bytes(body, b"]") {
            let insertion = format!(" {widget_id} 0 R");
            body.splice(array_close..array_close, insertion.bytes());
            return;
        }
    }
    insert_before_dict_close(body, format!("/Annots [{widget_id} 0 R] ").as_bytes());
}

impl ParsedPdf {
    /// Re-emits every object, ascending by object number, through the
    /// byte-exact emitter, and writes a trailer built from the original
    /// trailer with `strip` keys removed and `extra` keys added (used to
    /// drop `/Encrypt` after decryption, for instance).
    pub fn reemit(&self, strip: &[&str], extra: &[(&str, Object)]) -> Vec<u8> {
        let mut emitter = Emitter::new("1.7");
        for (&id, obj) in &self.objects {
            emitter.write_indirect_raw(id, &obj.body);
        }
        let max_id = self.objects.keys().copied().max().unwrap_or(0);

        let mut trailer_dict = match &self.trailer {
            Value::Dict(map) => {
                let mut d = Dictionary::new();
                for (k, v) in map {
                    if strip.contains(&k.as_str()) {
                        continue;
                    }
                    d.set(k.clone(), value_to_object(v));
                }
                d
            }
            _ => Dictionary::new(),
        };
        trailer_dict.set("Size", Object::Integer(max_id as i64 + 1));
        for (k, v) in extra {
            trailer_dict.set(*k, v.clone());
        }
        emitter.finish(&trailer_dict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_objects_and_trailer() {
        let pdf = b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
                    2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n\
                    trailer\n<< /Root 1 0 R /Size 3 >>\n%%EOF";
        let parsed = parse(pdf).unwrap();
        assert_eq!(parsed.objects.len(), 2);
        let Value::Dict(trailer) = &parsed.trailer else { panic!("expected dict") };
        assert_eq!(trailer.get("Root").unwrap(), &Value::Reference(1, 0));
    }

    #[test]
    fn reemit_strips_and_adds_trailer_keys() {
        let pdf = b"1 0 obj\n<< /Type /Catalog >>\nendobj\n\
                    trailer\n<< /Root 1 0 R /Encrypt 9 0 R /Size 2 >>\n%%EOF";
        let parsed = parse(pdf).unwrap();
        let out = parsed.reemit(&["Encrypt"], &[("Info", Object::Reference((5, 0)))]);
        let text = String::from_utf8_lossy(&out);
        assert!(!text.contains("/Encrypt"));
        assert!(text.contains("/Info 5 0 R"));
    }

    #[test]
    fn insert_before_dict_close_splices_before_outer_closer() {
        let mut body = b"<< /Type /Catalog /Pages 2 0 R >>".to_vec();
        insert_before_dict_close(&mut body, b"/AcroForm 9 0 R ");
        assert_eq!(&body, b"<< /Type /Catalog /Pages 2 0 R /AcroForm 9 0 R >>");
    }

    #[test]
    fn insert_before_dict_close_targets_outer_dict_with_nested_array() {
        let mut body = b"<< /Type /Page /Annots [ << /Type /Annot >> ] >>".to_vec();
        insert_before_dict_close(&mut body, b"/Extra 1 0 R ");
        let text = String::from_utf8_lossy(&body);
        assert!(text.trim_end().ends_with("/Extra 1 0 R >>"));
    }

    #[test]
    fn parse_dict_reads_nested_values() {
        let dict = parse_dict(b"<< /Type /Pages /Kids [1 0 R 2 0 R] /Count 2 >>").unwrap();
        assert_eq!(dict.get("Count").unwrap().as_int(), Some(2));
        assert_eq!(dict.get("Kids").unwrap().as_array().unwrap().len(), 2);
    }
}
