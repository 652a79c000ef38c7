//! Process-wide font cache.
//!
//! Fonts are parsed once per path and kept for the lifetime of the
//! process; the registry never evicts. Populate-on-first-use, read-only
//! after insert, safe to call from any thread.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use crate::error::Result;
use crate::font::truetype::TrueTypeFont;

static REGISTRY: OnceCell<Mutex<HashMap<String, Arc<TrueTypeFont>>>> = OnceCell::new();

fn registry() -> &'static Mutex<HashMap<String, Arc<TrueTypeFont>>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Loads and parses the font at `path` on first use; subsequent calls with
/// the same path return the cached, shared instance.
pub fn load(name: &str, path: &Path) -> Result<Arc<TrueTypeFont>> {
    if let Some(font) = registry().lock().unwrap().get(name) {
        return Ok(Arc::clone(font));
    }
    let bytes = std::fs::read(path)?;
    let font = Arc::new(TrueTypeFont::parse(&bytes)?);
    registry()
        .lock()
        .unwrap()
        .insert(name.to_string(), Arc::clone(&font));
    Ok(font)
}

/// Inserts an already-parsed font under `name`, overwriting nothing if one
/// is already registered.
pub fn register(name: &str, font: Arc<TrueTypeFont>) {
    registry()
        .lock()
        .unwrap()
        .entry(name.to_string())
        .or_insert(font);
}

pub fn get(name: &str) -> Option<Arc<TrueTypeFont>> {
    registry().lock().unwrap().get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_font_bytes() -> Vec<u8> {
        // sfntVersion + numTables=0, enough for `parse` to fail fast, but we
        // only exercise the registry's insert/get path here via `register`.
        vec![0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
    }

    #[test]
    fn register_and_get_round_trip() {
        let _ = tiny_font_bytes();
        let font = Arc::new(TrueTypeFont {
            raw: Vec::new(),
            tables: Default::default(),
            units_per_em: 1000,
            ascent: 0,
            descent: 0,
            italic_angle: 0.0,
            is_fixed_pitch: false,
            bbox: Default::default(),
            index_to_loc_format: 0,
            num_glyphs: 1,
            number_of_h_metrics: 1,
            h_metrics: vec![(0, 0)],
            cmap: Default::default(),
            family_name: "Stub".into(),
            full_name: "Stub".into(),
            postscript_name: "Stub".into(),
        });
        register("stub-registry-test", Arc::clone(&font));
        assert!(get("stub-registry-test").is_some());
    }
}
