#![no_main]

use libfuzzer_sys::fuzz_target;
use pdfcraft::font::truetype::TrueTypeFont;

/// Arbitrary bytes claiming to be a TTF. Parsing must reject malformed
/// table directories cleanly; anything that does parse is then run through
/// the subsetter with a handful of glyph IDs derived from the input's
/// length, which must never panic regardless of how short `glyf`/`loca`
/// turn out to be relative to `maxp.numGlyphs`.
fuzz_target!(|data: &[u8]| {
    let Ok(font) = TrueTypeFont::parse(data) else { return };
    let used: std::collections::BTreeSet<u16> =
        (0..font.num_glyphs.min(8)).collect();
    let _ = pdfcraft::font::subset::subset(&font, &used);
});
