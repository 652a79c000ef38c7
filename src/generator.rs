//! Top-level document assembly: turns a [`crate::model::Document`] template
//! into a complete PDF byte stream.
//!
//! Emission follows the order the emitter module's own doc comment
//! describes: IDs 1/2 reserved for Catalog/Pages, shared resources and
//! per-page content next, then the outline tree and AcroForm (both of
//! which need IDs reserved up front for forward references), and finally
//! the Pages tree, Catalog, xref and trailer.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use lopdf::content::Operation;
use lopdf::{dictionary, Object, StringFormat};

use crate::draw;
use crate::emitter::{self, outline, Emitter};
use crate::error::{PdfCraftError, Result};
use crate::font;
use crate::model::{Block, Bookmark, Document, FieldKind};
use crate::page::{PageManager, CATALOG_ID, PAGES_ID};
use crate::util::zlib;

const FONT_NAME: &str = "F1";

pub struct Generator;

impl Generator {
    /// Builds a complete PDF from `doc`. Signing is a separate pass
    /// ([`crate::sign::sign_in_place`]) over the resulting bytes — this
    /// function never embeds cryptographic material.
    pub fn build(doc: &Document) -> Result<Vec<u8>> {
        let (page_width, page_height) = doc.page_size.dimensions();
        let page_count = doc.blocks_per_page.len().max(1);
        log::debug!("building {page_count}-page document ({page_width}x{page_height})");
        let mut pages = PageManager::new(page_count, page_height);

        let font_obj_id = Self::embed_font(&mut pages, doc)?;

        // The resources dictionary is inlined directly into each page
        // rather than broken out into its own indirect object: nothing
        // else ever needs to reference it, so giving it an object ID would
        // only inflate the xref for no benefit. The `/ExtGState` entry is
        // the one sub-dictionary that isn't always needed, so it's built
        // conditionally — a document with no watermark block never pays
        // for it.
        let has_watermark = doc.blocks_per_page.iter().flatten().any(|b| matches!(b, Block::Watermark(_)));
        let mut resources = dictionary! {
            "Font" => dictionary! { FONT_NAME => Object::Reference((font_obj_id, 0)) },
        };
        if has_watermark {
            resources.set(
                "ExtGState",
                dictionary! { "GS_Watermark" => dictionary! { "Type" => "ExtGState", "ca" => Object::Real(0.3) } },
            );
        }

        Self::render_pages(&mut pages, doc, page_width, page_height);

        let field_ids_by_page = Self::build_fields(&mut pages, doc);
        let all_field_ids: Vec<u32> = field_ids_by_page.values().flatten().copied().collect();
        let acroform_id = if all_field_ids.is_empty() {
            None
        } else {
            Some(pages.alloc_extra(object_to_bytes(dictionary! {
                "Fields" => Object::Array(all_field_ids.iter().map(|&id| Object::Reference((id, 0))).collect()),
                "DR" => dictionary! { "Font" => dictionary! { FONT_NAME => Object::Reference((font_obj_id, 0)) } },
                "NeedAppearances" => Object::Boolean(true),
            })));
        };

        let page_ids = pages.page_ids().to_vec();
        let outline_id = outline::emit_outline(&mut pages, &doc.bookmarks, &page_ids);

        let mut objects: BTreeMap<u32, Vec<u8>> = BTreeMap::new();

        for &page_id in &page_ids {
            let content = pages.page(page_id).expect("page id was just allocated").content.clone();
            let compressed = zlib::deflate(&content);
            let content_id = pages.alloc_extra(stream_body(
                &[("Filter", Object::Name(b"FlateDecode".to_vec()))],
                &compressed,
            ));

            let mut dict = dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference((PAGES_ID, 0)),
                "MediaBox" => Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(page_width as f32),
                    Object::Real(page_height as f32),
                ]),
                "Resources" => Object::Dictionary(resources.clone()),
                "Contents" => Object::Reference((content_id, 0)),
            };
            if let Some(annots) = field_ids_by_page.get(&page_id) {
                dict.set(
                    "Annots",
                    Object::Array(annots.iter().map(|&id| Object::Reference((id, 0))).collect()),
                );
            }
            objects.insert(page_id, object_to_bytes(dict));
        }

        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => Object::Array(page_ids.iter().map(|&id| Object::Reference((id, 0))).collect()),
            "Count" => Object::Integer(page_ids.len() as i64),
        };
        objects.insert(PAGES_ID, object_to_bytes(pages_dict));

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference((PAGES_ID, 0)),
        };
        if let Some(id) = outline_id {
            catalog.set("Outlines", Object::Reference((id, 0)));
        }
        if let Some(id) = acroform_id {
            catalog.set("AcroForm", Object::Reference((id, 0)));
        }
        objects.insert(CATALOG_ID, object_to_bytes(catalog));

        for (id, body) in pages.extras() {
            objects.insert(id, body.clone());
        }

        let mut emitter = Emitter::new("1.7");
        for (&id, body) in &objects {
            emitter.write_indirect_raw(id, body);
        }
        let max_id = objects.keys().copied().max().unwrap_or(0);
        let trailer = dictionary! {
            "Root" => Object::Reference((CATALOG_ID, 0)),
            "Size" => Object::Integer(max_id as i64 + 1),
        };
        Ok(emitter.finish(&trailer))
    }

    fn embed_font(pages: &mut PageManager, doc: &Document) -> Result<u32> {
        match doc.fonts.first() {
            Some(selection) => {
                let ttf = match &selection.path {
                    Some(path) => font::registry::load(&selection.name, path)?,
                    None => font::registry::get(&selection.name)
                        .ok_or_else(|| PdfCraftError::Unsupported(format!("font {:?} is not registered", selection.name)))?,
                };
                let used = collect_codepoints(doc);
                let embedded = font::embed::embed(pages, &ttf, &used)?;
                Ok(embedded.font_obj_id)
            }
            None => Ok(pages.alloc_extra(object_to_bytes(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            }))),
        }
    }

    fn render_pages(pages: &mut PageManager, doc: &Document, page_width: f64, page_height: f64) {
        let page_ids = pages.page_ids().to_vec();
        for (i, &page_id) in page_ids.iter().enumerate() {
            let Some(blocks) = doc.blocks_per_page.get(i) else { continue };
            let mut ops: Vec<Operation> = Vec::new();
            let mut cursor_y = pages.page(page_id).map(|p| p.cursor_y).unwrap_or(page_height);
            for block in blocks {
                match block {
                    Block::Title(text) => cursor_y = draw::draw_title(&mut ops, FONT_NAME, page_width, cursor_y, text),
                    Block::Table(grid) => cursor_y = draw::draw_table(&mut ops, FONT_NAME, page_width, cursor_y, grid),
                    Block::Footer(text) => draw::draw_footer(&mut ops, FONT_NAME, text),
                    Block::Watermark(text) => draw::draw_watermark(&mut ops, FONT_NAME, page_width, page_height, text),
                }
            }
            let encoded = draw::encode(ops).unwrap_or_default();
            if let Some(state) = pages.page_mut(page_id) {
                state.cursor_y = cursor_y;
                state.content = encoded;
            }
        }
    }

    fn build_fields(pages: &mut PageManager, doc: &Document) -> HashMap<u32, Vec<u32>> {
        let mut by_page: HashMap<u32, Vec<u32>> = HashMap::new();
        let page_count = pages.page_ids().len();
        for field in &doc.fields {
            let index = (field.page.saturating_sub(1) as usize).min(page_count.saturating_sub(1));
            let Some(page_id) = pages.page_id(index) else { continue };

            let ft = match field.kind {
                FieldKind::Text | FieldKind::Number => "Tx",
                FieldKind::Choice(_) => "Ch",
            };
            let mut dict = dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "FT" => ft,
                "T" => Object::String(field.name.as_bytes().to_vec(), StringFormat::Literal),
                "V" => Object::String(field.value.as_bytes().to_vec(), StringFormat::Literal),
                "Rect" => Object::Array(field.rect.iter().map(|&v| Object::Real(v as f32)).collect()),
                "P" => Object::Reference((page_id, 0)),
                "DA" => Object::String(format!("/{FONT_NAME} 11 Tf 0 g").into_bytes(), StringFormat::Literal),
            };
            if let FieldKind::Choice(options) = &field.kind {
                dict.set(
                    "Opt",
                    Object::Array(options.iter().map(|o| Object::String(o.as_bytes().to_vec(), StringFormat::Literal)).collect()),
                );
            }
            let id = pages.alloc_extra(object_to_bytes(dict));
            by_page.entry(page_id).or_default().push(id);
        }
        by_page
    }
}

fn object_to_bytes(dict: lopdf::Dictionary) -> Vec<u8> {
    emitter::object_to_bytes(&Object::Dictionary(dict))
}

fn stream_body(dict_extra: &[(&str, Object)], raw: &[u8]) -> Vec<u8> {
    let mut dict = lopdf::Dictionary::new();
    dict.set("Length", Object::Integer(raw.len() as i64));
    for (k, v) in dict_extra {
        dict.set(*k, v.clone());
    }
    let mut out = Vec::new();
    emitter::write_object(&mut out, &Object::Dictionary(dict));
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(raw);
    out.extend_from_slice(b"\nendstream");
    out
}

fn collect_codepoints(doc: &Document) -> BTreeSet<u32> {
    let mut set: BTreeSet<u32> = (32u32..127).collect();
    for blocks in &doc.blocks_per_page {
        for block in blocks {
            match block {
                Block::Title(t) | Block::Footer(t) | Block::Watermark(t) => push_chars(t, &mut set),
                Block::Table(grid) => {
                    for row in &grid.rows {
                        for cell in row {
                            push_chars(cell, &mut set);
                        }
                    }
                }
            }
        }
    }
    for bookmark in &doc.bookmarks {
        walk_bookmark(bookmark, &mut set);
    }
    for field in &doc.fields {
        push_chars(&field.name, &mut set);
        push_chars(&field.value, &mut set);
    }
    set
}

fn walk_bookmark(bookmark: &Bookmark, set: &mut BTreeSet<u32>) {
    push_chars(&bookmark.title, set);
    for child in &bookmark.children {
        walk_bookmark(child, set);
    }
}

fn push_chars(s: &str, set: &mut BTreeSet<u32>) {
    for c in s.chars() {
        set.insert(c as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PageSize, TableGrid};

    fn simple_doc() -> Document {
        Document {
            page_size: PageSize::A4,
            blocks_per_page: vec![vec![
                Block::Title("Report".into()),
                Block::Table(TableGrid { rows: vec![vec!["a".into(), "b".into()]] }),
                Block::Footer("Page 1".into()),
            ]],
            bookmarks: vec![Bookmark { title: "Report".into(), page: 1, children: vec![] }],
            fields: vec![],
            signature: None,
            fonts: vec![],
        }
    }

    #[test]
    fn builds_a_well_formed_single_page_pdf() {
        let pdf = Generator::build(&simple_doc()).unwrap();
        let text = String::from_utf8_lossy(&pdf);
        assert!(text.starts_with("%PDF-1.7"));
        assert!(text.contains("/Type /Catalog"));
        assert!(text.contains("/Type /Pages"));
        assert!(text.contains("trailer"));
        assert!(text.trim_end().ends_with("%%EOF"));
    }

    #[test]
    fn watermark_and_table_blocks_do_not_panic() {
        let mut doc = simple_doc();
        doc.blocks_per_page[0].push(Block::Watermark("DRAFT".into()));
        let pdf = Generator::build(&doc).unwrap();
        assert!(!pdf.is_empty());
    }
}
