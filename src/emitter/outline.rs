//! Bookmark (outline) tree emission.
//!
//! Every node needs to know its own ID, its parent's ID, and its
//! previous/next sibling's ID before any of those dictionaries can be
//! serialized, so IDs are reserved for the whole tree in a pre-order pass
//! before any node dictionary is written.

use lopdf::{dictionary, Object};

use crate::model::Bookmark;
use crate::page::PageManager;

struct Node<'a> {
    id: u32,
    bookmark: &'a Bookmark,
    children: Vec<Node<'a>>,
}

fn reserve(pages: &mut PageManager, bookmark: &Bookmark) -> Node<'_> {
    let id = pages.reserve_extra();
    let children = bookmark.children.iter().map(|c| reserve(pages, c)).collect();
    Node { id, bookmark, children }
}

/// Returns `(total descendant count)` and writes every node's dictionary
/// via `pages.set_extra`, wiring `/Parent`, `/Prev`, `/Next`, `/First`,
/// `/Last` and `/Count` per ISO 32000 §12.3.3.
fn emit_siblings(pages: &mut PageManager, nodes: &[Node<'_>], parent_id: u32, page_ids: &[u32]) -> u32 {
    let mut total = 0u32;
    for (i, node) in nodes.iter().enumerate() {
        let prev = if i > 0 { Some(nodes[i - 1].id) } else { None };
        let next = nodes.get(i + 1).map(|n| n.id);
        let child_count = emit_siblings(pages, &node.children, node.id, page_ids);

        let dest_page_index = (node.bookmark.page.saturating_sub(1) as usize).min(page_ids.len().saturating_sub(1));
        let dest_page = page_ids.get(dest_page_index).copied().unwrap_or(0);

        let mut dict = dictionary! {
            "Title" => Object::String(
                crate::util::text::utf16be_with_bom(&node.bookmark.title),
                lopdf::StringFormat::Hexadecimal,
            ),
            "Parent" => (parent_id, 0),
            "Dest" => Object::Array(vec![Object::Reference((dest_page, 0u16)), "Fit".into()]),
        };
        if let Some(p) = prev {
            dict.set("Prev", Object::Reference((p, 0)));
        }
        if let Some(n) = next {
            dict.set("Next", Object::Reference((n, 0)));
        }
        if !node.children.is_empty() {
            dict.set("First", Object::Reference((node.children[0].id, 0)));
            dict.set("Last", Object::Reference((node.children.last().unwrap().id, 0)));
            // All items are treated as open: /Count is the positive
            // descendant count, never the negated collapsed form.
            dict.set("Count", Object::Integer(child_count as i64));
        }

        pages.set_extra(node.id, crate::emitter::object_to_bytes(&Object::Dictionary(dict)));
        total += 1 + child_count;
    }
    total
}

/// Builds the `/Outlines` dictionary and every descendant bookmark
/// dictionary, returning the outline root's object ID (or `None` if there
/// are no bookmarks).
pub fn emit_outline(pages: &mut PageManager, bookmarks: &[Bookmark], page_ids: &[u32]) -> Option<u32> {
    if bookmarks.is_empty() {
        return None;
    }
    let roots: Vec<Node<'_>> = bookmarks.iter().map(|b| reserve(pages, b)).collect();
    let root_id = pages.reserve_extra();
    let total = emit_siblings(pages, &roots, root_id, page_ids);

    let mut dict = dictionary! {
        "Type" => "Outlines",
        "Count" => Object::Integer(total as i64),
    };
    dict.set("First", Object::Reference((roots[0].id, 0)));
    dict.set("Last", Object::Reference((roots.last().unwrap().id, 0)));
    pages.set_extra(root_id, crate::emitter::object_to_bytes(&Object::Dictionary(dict)));
    Some(root_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_bookmarks_get_sibling_links() {
        let mut pages = PageManager::new(2, 841.89);
        let bookmarks = vec![
            Bookmark { title: "One".into(), page: 1, children: vec![] },
            Bookmark { title: "Two".into(), page: 2, children: vec![] },
        ];
        let root = emit_outline(&mut pages, &bookmarks, pages.page_ids().to_vec().as_slice());
        assert!(root.is_some());
    }

    #[test]
    fn nested_bookmark_produces_first_last_on_parent() {
        let mut pages = PageManager::new(1, 841.89);
        let bookmarks = vec![Bookmark {
            title: "Parent".into(),
            page: 1,
            children: vec![Bookmark { title: "Child".into(), page: 1, children: vec![] }],
        }];
        let root = emit_outline(&mut pages, &bookmarks, pages.page_ids().to_vec().as_slice());
        assert!(root.is_some());
    }
}
