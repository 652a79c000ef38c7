//! Content-stream drawing primitives for the four block kinds a page can
//! hold. Each function appends PDF content-stream operators (built with
//! [`lopdf::content::Operation`], the same building block the teacher crate
//! uses for its own text stream) and advances the page's vertical cursor.

use lopdf::content::{Content, Operation};
use lopdf::{Object, StringFormat};

use crate::model::TableGrid;
use crate::util::text::escape_literal;

const MARGIN: f64 = 36.0;
const TITLE_SIZE: f64 = 18.0;
const BODY_SIZE: f64 = 11.0;
const FOOTER_SIZE: f64 = 9.0;
const WATERMARK_SIZE: f64 = 72.0;
const LINE_GAP: f64 = 4.0;
const ROW_HEIGHT: f64 = BODY_SIZE + 2.0 * LINE_GAP;

fn text_op(font: &str, size: f64, x: f64, y: f64, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.into(), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new(
            "Tj",
            vec![Object::String(escape_literal(text.as_bytes()), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
    ]
}

/// Draws a page title at the top of the content area and returns the new
/// cursor Y.
pub fn draw_title(ops: &mut Vec<Operation>, font: &str, page_width: f64, cursor_y: f64, text: &str) -> f64 {
    let y = cursor_y - TITLE_SIZE;
    ops.extend(text_op(font, TITLE_SIZE, MARGIN, y, text));
    let _ = page_width;
    y - TITLE_SIZE * 0.5
}

/// Draws a footer anchored near the bottom margin; does not move the
/// cursor, since footers are placed independently of body flow.
pub fn draw_footer(ops: &mut Vec<Operation>, font: &str, text: &str) {
    ops.extend(text_op(font, FOOTER_SIZE, MARGIN, MARGIN * 0.5, text));
}

/// Draws a large, light diagonal watermark across the page and returns the
/// operators unmodified by cursor state (watermarks don't consume flow
/// space).
pub fn draw_watermark(ops: &mut Vec<Operation>, font: &str, page_width: f64, page_height: f64, text: &str) {
    let cx = page_width / 2.0;
    let cy = page_height / 2.0;
    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new("gs", vec!["GS_Watermark".into()]));
    ops.push(Operation::new(
        "cm",
        vec![
            0.7071.into(),
            0.7071.into(),
            (-0.7071).into(),
            0.7071.into(),
            cx.into(),
            cy.into(),
        ],
    ));
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), WATERMARK_SIZE.into()]));
    let half_width = (text.len() as f64) * WATERMARK_SIZE * 0.28;
    ops.push(Operation::new("Td", vec![(-half_width).into(), 0.into()]));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(escape_literal(text.as_bytes()), StringFormat::Literal)],
    ));
    ops.push(Operation::new("ET", vec![]));
    ops.push(Operation::new("Q", vec![]));
}

/// Draws a simple ruled table (no column width negotiation beyond an even
/// split) and returns the new cursor Y after the last row.
pub fn draw_table(ops: &mut Vec<Operation>, font: &str, page_width: f64, cursor_y: f64, grid: &TableGrid) -> f64 {
    let usable_width = page_width - 2.0 * MARGIN;
    let cols = grid.rows.iter().map(|r| r.len()).max().unwrap_or(0).max(1);
    let col_width = usable_width / cols as f64;

    let mut y = cursor_y;
    for row in &grid.rows {
        y -= ROW_HEIGHT;
        for (i, cell) in row.iter().enumerate() {
            let x = MARGIN + i as f64 * col_width + LINE_GAP;
            ops.extend(text_op(font, BODY_SIZE, x, y, cell));
        }
        draw_horizontal_rule(ops, MARGIN, page_width - MARGIN, y - LINE_GAP);
    }
    y - LINE_GAP
}

fn draw_horizontal_rule(ops: &mut Vec<Operation>, x0: f64, x1: f64, y: f64) {
    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new("w", vec![0.5.into()]));
    ops.push(Operation::new("m", vec![x0.into(), y.into()]));
    ops.push(Operation::new("l", vec![x1.into(), y.into()]));
    ops.push(Operation::new("S", vec![]));
    ops.push(Operation::new("Q", vec![]));
}

/// Draws an opaque rectangle used to blank out redacted regions.
pub fn draw_redaction_box(ops: &mut Vec<Operation>, rect: [f64; 4]) {
    let [x0, y0, x1, y1] = rect;
    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new("rg", vec![0.into(), 0.into(), 0.into()]));
    ops.push(Operation::new(
        "re",
        vec![x0.into(), y0.into(), (x1 - x0).into(), (y1 - y0).into()],
    ));
    ops.push(Operation::new("f", vec![]));
    ops.push(Operation::new("Q", vec![]));
}

pub fn encode(ops: Vec<Operation>) -> crate::error::Result<Vec<u8>> {
    Content { operations: ops }
        .encode()
        .map_err(|e| crate::error::PdfCraftError::Unsupported(format!("content stream encoding failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_moves_cursor_down() {
        let mut ops = Vec::new();
        let y = draw_title(&mut ops, "F1", 595.28, 800.0, "Report");
        assert!(y < 800.0);
        assert!(!ops.is_empty());
    }

    #[test]
    fn table_emits_one_rule_per_row() {
        let mut ops = Vec::new();
        let grid = TableGrid {
            rows: vec![vec!["a".into(), "b".into()], vec!["c".into(), "d".into()]],
        };
        draw_table(&mut ops, "F1", 595.28, 700.0, &grid);
        let rules = ops.iter().filter(|o| o.operator == "S").count();
        assert_eq!(rules, 2);
    }
}
