//! Byte-exact object graph emission: indirect objects, the classical
//! cross-reference table, and the trailer.
//!
//! `lopdf`'s [`Dictionary`]/[`Object`]/content-stream types are reused here
//! to build object bodies — that's the teacher crate's own idiom for
//! assembling dictionary values — but [`lopdf::Document::save`] is never
//! called. Offsets need to be tracked exactly as bytes are written, and
//! the xref table, encryption dictionary and `/ByteRange` signature
//! placeholder all need control over the literal byte layout that
//! `Document::save` doesn't give us.

pub mod outline;

use std::collections::BTreeMap;

use lopdf::{Dictionary, Object};

/// Serializes a [`lopdf::Object`] to PDF syntax. `lopdf` doesn't expose its
/// internal writer publicly, so object bodies are written out by hand; this
/// covers every variant the rest of the crate constructs.
pub fn write_object(out: &mut Vec<u8>, obj: &Object) {
    match obj {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Object::Real(r) => out.extend_from_slice(crate::util::num::format_real(*r).as_bytes()),
        Object::Name(name) => {
            out.push(b'/');
            out.extend_from_slice(name);
        }
        Object::String(bytes, _fmt) => {
            out.push(b'(');
            out.extend_from_slice(&crate::util::text::escape_literal(bytes));
            out.push(b')');
        }
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item);
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => write_dictionary(out, dict),
        Object::Stream(stream) => {
            write_dictionary(out, &stream.dict);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&stream.content);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Reference(id) => {
            out.extend_from_slice(format!("{} {} R", id.0, id.1).as_bytes());
        }
    }
}

fn write_dictionary(out: &mut Vec<u8>, dict: &Dictionary) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        out.push(b'/');
        out.extend_from_slice(key.as_bytes());
        out.push(b' ');
        write_object(out, value);
        out.push(b' ');
    }
    out.extend_from_slice(b">>");
}

pub fn object_to_bytes(obj: &Object) -> Vec<u8> {
    let mut out = Vec::new();
    write_object(&mut out, obj);
    out
}

/// Accumulates the byte-exact body of a PDF file: header, indirect
/// objects with tracked offsets, a classical xref table, and a trailer.
pub struct Emitter {
    buf: Vec<u8>,
    offsets: BTreeMap<u32, usize>,
}

impl Emitter {
    pub fn new(version: &str) -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(format!("%PDF-{version}\n").as_bytes());
        buf.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Emitter {
            buf,
            offsets: BTreeMap::new(),
        }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn write_indirect(&mut self, id: u32, obj: &Object) {
        self.offsets.insert(id, self.buf.len());
        self.buf.extend_from_slice(format!("{id} 0 obj\n").as_bytes());
        write_object(&mut self.buf, obj);
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    /// Writes an already fully-serialized object body (used for objects
    /// assembled outside the `lopdf::Object` model, e.g. the signature
    /// dictionary with its `/Contents` hex placeholder and `/ByteRange`
    /// integer placeholders that must land at known byte offsets).
    pub fn write_indirect_raw(&mut self, id: u32, body: &[u8]) {
        self.offsets.insert(id, self.buf.len());
        self.buf.extend_from_slice(format!("{id} 0 obj\n").as_bytes());
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn append_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes the classical cross-reference table, trailer, and
    /// `startxref` footer, then returns the finished document bytes.
    ///
    /// Every ID from 1 up to the highest allocated object must have an
    /// entry; any gap is emitted as a free entry so the xref subsection
    /// stays contiguous, per ISO 32000 §7.5.4.
    pub fn finish(mut self, trailer: &Dictionary) -> Vec<u8> {
        let max_id = self.offsets.keys().copied().max().unwrap_or(0);
        let xref_offset = self.buf.len();

        self.buf.extend_from_slice(b"xref\n");
        self.buf
            .extend_from_slice(format!("0 {}\n", max_id + 1).as_bytes());
        self.buf.extend_from_slice(b"0000000000 65535 f \n");
        for id in 1..=max_id {
            match self.offsets.get(&id) {
                Some(&offset) => {
                    self.buf.extend_from_slice(
                        format!("{} 00000 n \n", crate::util::num::pad_decimal(offset as u64, 10)).as_bytes(),
                    );
                }
                None => self.buf.extend_from_slice(b"0000000000 65535 f \n"),
            }
        }

        self.buf.extend_from_slice(b"trailer\n");
        write_dictionary(&mut self.buf, trailer);
        self.buf.extend_from_slice(b"\nstartxref\n");
        self.buf
            .extend_from_slice(xref_offset.to_string().as_bytes());
        self.buf.extend_from_slice(b"\n%%EOF\n");
        self.buf
    }

    pub fn offset_of(&self, id: u32) -> Option<usize> {
        self.offsets.get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn xref_entries_are_twenty_bytes() {
        let mut e = Emitter::new("1.5");
        e.write_indirect(1, &Object::Dictionary(dictionary! {"Type" => "Catalog"}));
        let trailer = dictionary! {"Root" => (1, 0)};
        let out = e.finish(&trailer);
        let xref_start = out.windows(4).position(|w| w == b"xref").unwrap();
        let line_start = xref_start + "xref\n0 2\n".len();
        let entry = &out[line_start..line_start + 20];
        assert_eq!(entry.len(), 20);
        assert_eq!(entry[19], b'\n');
    }
}
