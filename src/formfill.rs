//! XFDF form-filling: parses `<field>`/`<value>` elements and rewrites the
//! matching AcroForm field's `/V`.
//!
//! XML parsing uses the same `quick_xml::Reader` event-loop idiom the
//! pack's invoice parsers use for their own inbound XML (start/text/end
//! events tracked against a path stack) rather than a DOM tree, since XFDF
//! documents this crate reads are a flat `<fields><field name="…"><value>`
//! list with no need for random access.

use std::collections::{HashMap, HashSet};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{PdfCraftError, Result};
use crate::lexer::{self, Token, Tokenizer, Value};
use crate::rebuild::{self, ParsedPdf};
use crate::util::text::escape_literal_str;

/// Fills every AcroForm field named in `xfdf` with its paired value and
/// returns the rewritten document. Field names are matched case-sensitively
/// against the AcroForm's `/T` entries; a name present in `xfdf` but absent
/// from the form is reported as [`PdfCraftError::FieldNotFound`].
pub fn fill(pdf: &[u8], xfdf: &str) -> Result<Vec<u8>> {
    let updates = parse_xfdf(xfdf)?;

    let parsed = rebuild::parse(pdf)?;
    let mut rebuilt = ParsedPdf {
        objects: parsed.objects,
        trailer: parsed.trailer,
    };

    let mut matched: HashSet<&str> = HashSet::new();
    for field_id in acroform_field_ids(&rebuilt)? {
        let Some(obj) = rebuilt.objects.get(&field_id) else { continue };
        let dict = rebuild::parse_dict(&obj.body)?;
        let Some(name) = field_name(&dict) else { continue };
        if let Some((key, new_value)) = updates.get_key_value(&name) {
            let mut body = obj.body.clone();
            set_field_value(&mut body, new_value);
            rebuilt.objects.get_mut(&field_id).unwrap().body = body;
            matched.insert(key.as_str());
        }
    }

    if let Some(missing) = updates.keys().find(|name| !matched.contains(name.as_str())) {
        return Err(PdfCraftError::FieldNotFound(missing.clone()));
    }

    Ok(rebuilt.reemit(&[], &[]))
}

fn field_name(dict: &HashMap<String, Value>) -> Option<String> {
    dict.get("T").and_then(Value::as_string).map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}

/// Walks `Root -> AcroForm -> Fields` to collect every field object's ID.
/// A document with no `/AcroForm` simply has no fields to fill.
fn acroform_field_ids(parsed: &ParsedPdf) -> Result<Vec<u32>> {
    let catalog_id = rebuild::root_id(parsed)?;
    let catalog_body = parsed
        .objects
        .get(&catalog_id)
        .map(|o| o.body.clone())
        .ok_or_else(|| PdfCraftError::Parse { offset: 0, message: "catalog object not found".into() })?;
    let catalog_dict = rebuild::parse_dict(&catalog_body)?;

    let acroform_id = match catalog_dict.get("AcroForm") {
        Some(Value::Reference(id, _)) => *id,
        _ => return Ok(Vec::new()),
    };
    let acroform_body = parsed
        .objects
        .get(&acroform_id)
        .map(|o| o.body.clone())
        .ok_or_else(|| PdfCraftError::Parse { offset: 0, message: "AcroForm object not found".into() })?;
    let acroform_dict = rebuild::parse_dict(&acroform_body)?;

    Ok(acroform_dict
        .get("Fields")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| match v {
                    Value::Reference(id, _) => Some(*id),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default())
}

/// Rewrites a field object body's `/V` entry, padding the new literal
/// string with trailing spaces to the old value's byte length when it fits
/// (byte-length-preserving in place); otherwise splices in a literal string
/// of whatever length the new value needs.
fn set_field_value(body: &mut Vec<u8>, new_value: &str) {
    let Some(tag_pos) = lexer::find_bytes(body, b"/V") else {
        rebuild::insert_before_dict_close(body, format!("/V ({}) ", escape_literal_str(new_value)).as_bytes());
        return;
    };
    let escaped = escape_literal_str(new_value);

    let mut tok = Tokenizer::new(&body[tag_pos + 2..]);
    tok.skip_ws();
    let value_start = tag_pos + 2 + tok.pos();
    let Ok(Some(token)) = tok.next_token() else {
        rebuild::insert_before_dict_close(body, format!("/V ({escaped}) ").as_bytes());
        return;
    };
    let value_end = tag_pos + 2 + tok.pos();

    let replacement = match token {
        Token::LiteralString(old) if escaped.len() <= old.len() => {
            let mut padded = escaped.into_bytes();
            padded.resize(old.len(), b' ');
            let mut out = Vec::with_capacity(padded.len() + 2);
            out.push(b'(');
            out.extend_from_slice(&padded);
            out.push(b')');
            out
        }
        _ => format!("({escaped})").into_bytes(),
    };
    body.splice(value_start..value_end, replacement);
}

/// Parses `<field name="...">  <value>...</value>  </field>` elements into
/// a name -> value map, ignoring everything else in the document (XFDF
/// also carries page content and annotation markup this crate has no use
/// for when only filling text/choice fields).
fn parse_xfdf(xfdf: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xfdf);
    reader.config_mut().trim_text(true);

    let mut fields = HashMap::new();
    let mut path: Vec<String> = Vec::new();
    let mut current_name: Option<String> = None;
    let mut current_value: Option<String> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| PdfCraftError::Parse { offset: 0, message: format!("invalid XFDF: {e}") })?;
        match event {
            Event::Start(ref e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "field" {
                    current_name = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"name")
                        .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                    current_value = None;
                }
                path.push(name);
            }
            Event::Text(ref e) => {
                if path.last().map(String::as_str) == Some("value") {
                    let text = e
                        .unescape()
                        .map_err(|e| PdfCraftError::Parse { offset: 0, message: format!("invalid XFDF text: {e}") })?;
                    current_value = Some(text.into_owned());
                }
            }
            Event::End(_) => {
                if path.pop().as_deref() == Some("field") {
                    if let (Some(name), Some(value)) = (current_name.take(), current_value.take()) {
                        fields.insert(name, value);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_form_pdf(field_value: &str) -> Vec<u8> {
        let field_dict = format!("<< /Type /Annot /Subtype /Widget /FT /Tx /T (FirstName) /V ({field_value}) /Rect [0 0 100 20] /P 3 0 R >>");
        let mut pdf = Vec::new();
        pdf.extend_from_slice(b"%PDF-1.7\n");
        pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R /AcroForm 5 0 R >>\nendobj\n");
        pdf.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n");
        pdf.extend_from_slice(b"3 0 obj\n<< /Type /Page /Parent 2 0 R /Annots [4 0 R] >>\nendobj\n");
        pdf.extend_from_slice(format!("4 0 obj\n{field_dict}\nendobj\n").as_bytes());
        pdf.extend_from_slice(b"5 0 obj\n<< /Fields [4 0 R] >>\nendobj\n");
        pdf.extend_from_slice(b"trailer\n<< /Root 1 0 R /Size 6 >>\n%%EOF");
        pdf
    }

    #[test]
    fn fills_matching_field_padding_in_place() {
        let pdf = build_form_pdf("          ");
        let xfdf = r#"<?xml version="1.0"?><xfdf xmlns="http://ns.adobe.com/xfdf/"><fields><field name="FirstName"><value>Jane</value></field></fields></xfdf>"#;
        let out = fill(&pdf, xfdf).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("/V (Jane"));
        assert!(!text.contains("FieldNotFound"));
    }

    #[test]
    fn unknown_field_is_an_error() {
        let pdf = build_form_pdf("x");
        let xfdf = r#"<xfdf xmlns="http://ns.adobe.com/xfdf/"><fields><field name="NoSuchField"><value>1</value></field></fields></xfdf>"#;
        let err = fill(&pdf, xfdf).unwrap_err();
        assert!(matches!(err, PdfCraftError::FieldNotFound(name) if name == "NoSuchField"));
    }

    #[test]
    fn longer_value_grows_the_field_body() {
        let pdf = build_form_pdf("x");
        let xfdf = r#"<xfdf xmlns="http://ns.adobe.com/xfdf/"><fields><field name="FirstName"><value>A much longer replacement value</value></field></fields></xfdf>"#;
        let out = fill(&pdf, xfdf).unwrap();
        assert!(String::from_utf8_lossy(&out).contains("A much longer replacement value"));
    }
}
