//! Thin local exerciser for the library, not a supported public interface —
//! the HTTP/CLI layer remains an external collaborator (see lib.rs).
//!
//! `pdfcraft <output.pdf>` builds a small demo document (a title, a table,
//! a footer and a single top-level bookmark) and writes it to `output.pdf`.

use pdfcraft::model::{Block, Bookmark, Document, PageSize, TableGrid};
use pdfcraft::Generator;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let Some(out_path) = args.get(1) else {
        eprintln!("usage: pdfcraft <output.pdf>");
        std::process::exit(2);
    };

    let doc = Document {
        page_size: PageSize::Letter,
        blocks_per_page: vec![vec![
            Block::Title("Demo Report".into()),
            Block::Table(TableGrid {
                rows: vec![
                    vec!["Column A".into(), "Column B".into()],
                    vec!["1".into(), "2".into()],
                ],
            }),
            Block::Footer("Page 1".into()),
        ]],
        bookmarks: vec![Bookmark { title: "Demo Report".into(), page: 1, children: vec![] }],
        fields: vec![],
        signature: None,
        fonts: vec![],
    };

    let pdf = Generator::build(&doc).expect("building the demo document failed");
    std::fs::write(out_path, pdf).expect("writing output file failed");
}
