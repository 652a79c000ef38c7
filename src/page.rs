//! Object ID allocation and per-page state.
//!
//! IDs 1 and 2 are reserved for the Catalog and Pages tree. Page objects
//! are allocated starting at 3, in page order. IDs from 2000 upward are
//! reserved for everything else the emitter needs mid-build — fonts,
//! annotation dictionaries, XObjects, the signature field — so that page
//! IDs stay contiguous and predictable regardless of how many extra
//! objects a document ends up needing.
use std::collections::BTreeMap;

pub const CATALOG_ID: u32 = 1;
pub const PAGES_ID: u32 = 2;
const FIRST_PAGE_ID: u32 = 3;
const FIRST_EXTRA_ID: u32 = 2000;

#[derive(Debug, Clone, Default)]
pub struct PageState {
    pub content: Vec<u8>,
    /// Object IDs of annotation dictionaries (links, widgets, signature
    /// appearance) placed on this page.
    pub annotations: Vec<u32>,
    /// Current text cursor, top-down from the page's content origin.
    pub cursor_y: f64,
}

pub struct PageManager {
    page_ids: Vec<u32>,
    pages: BTreeMap<u32, PageState>,
    extras: BTreeMap<u32, Vec<u8>>,
    next_extra: u32,
    current: usize,
}

impl PageManager {
    pub fn new(page_count: usize, page_height: f64) -> Self {
        let mut page_ids = Vec::with_capacity(page_count);
        let mut pages = BTreeMap::new();
        for i in 0..page_count {
            let id = FIRST_PAGE_ID + i as u32;
            page_ids.push(id);
            pages.insert(
                id,
                PageState {
                    content: Vec::new(),
                    annotations: Vec::new(),
                    cursor_y: page_height,
                },
            );
        }
        PageManager {
            page_ids,
            pages,
            extras: BTreeMap::new(),
            next_extra: FIRST_EXTRA_ID,
            current: 0,
        }
    }

    pub fn page_ids(&self) -> &[u32] {
        &self.page_ids
    }

    pub fn page_id(&self, index: usize) -> Option<u32> {
        self.page_ids.get(index).copied()
    }

    pub fn page_mut(&mut self, id: u32) -> Option<&mut PageState> {
        self.pages.get_mut(&id)
    }

    pub fn page(&self, id: u32) -> Option<&PageState> {
        self.pages.get(&id)
    }

    pub fn current_page_id(&self) -> u32 {
        self.page_ids[self.current]
    }

    pub fn advance_page(&mut self) {
        if self.current + 1 < self.page_ids.len() {
            self.current += 1;
        }
    }

    /// Allocates a fresh object ID for an object outside the page tree
    /// (font, annotation, XObject, signature field, ...) and stashes its
    /// already-serialized body for the emitter to place verbatim.
    pub fn alloc_extra(&mut self, body: Vec<u8>) -> u32 {
        let id = self.next_extra;
        self.next_extra += 1;
        self.extras.insert(id, body);
        id
    }

    /// Reserves an ID without a body yet, for forward references (e.g. an
    /// outline node that must know its own ID before its siblings are
    /// built). The body is filled in later via [`PageManager::set_extra`].
    pub fn reserve_extra(&mut self) -> u32 {
        let id = self.next_extra;
        self.next_extra += 1;
        id
    }

    pub fn set_extra(&mut self, id: u32, body: Vec<u8>) {
        self.extras.insert(id, body);
    }

    pub fn extras(&self) -> impl Iterator<Item = (u32, &Vec<u8>)> {
        self.extras.iter().map(|(&id, body)| (id, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserves_catalog_and_pages_ids() {
        let mgr = PageManager::new(2, 841.89);
        assert_eq!(mgr.page_ids(), &[3, 4]);
        assert_ne!(CATALOG_ID, PAGES_ID);
    }

    #[test]
    fn extra_ids_start_at_2000_and_increment() {
        let mut mgr = PageManager::new(1, 841.89);
        let a = mgr.alloc_extra(vec![1]);
        let b = mgr.alloc_extra(vec![2]);
        assert_eq!(a, 2000);
        assert_eq!(b, 2001);
    }

    #[test]
    fn reserve_then_set_extra_keeps_same_id() {
        let mut mgr = PageManager::new(1, 841.89);
        let id = mgr.reserve_extra();
        mgr.set_extra(id, vec![9, 9]);
        assert_eq!(mgr.extras().find(|&(i, _)| i == id).map(|(_, b)| b.clone()), Some(vec![9, 9]));
    }
}
