//! Table structure: insertion, rows, columns, and column widths.
//!
//! Topology is read from the DOM every time. Row and column indices count the
//! preceding siblings with the same tag. Column widths keep whatever sizing
//! mode the first row uses: pixel tables are rebalanced so the total width
//! stays put, percentage tables are left to the renderer.

use inkpad_dom::{Document, NodeId, Position, format_px, parse_px};
use serde::{Deserialize, Serialize};

use super::{closest, current_range, place_caret};
use crate::error::{EditorError, Result};

pub const CELL_STYLE: &str = "border: 1px solid rgb(219, 219, 219); padding: 10px; margin: 0px;";
const TABLE_STYLE: &str = "border-collapse: collapse; margin-left: 0px; table-layout: fixed;";
const EMPTY_CELL: &str = "\u{a0}";

/// Requested width of a new table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableWidth {
    /// Percent of the page width.
    Relative(u32),
    /// Pixels.
    Fixed(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizing {
    Pixels,
    Percent,
    Unknown,
}

/// Where the caret sits inside a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPosition {
    pub table: NodeId,
    pub row: NodeId,
    pub cell: NodeId,
    pub row_index: usize,
    pub column_index: usize,
}

fn number(value: f64) -> String {
    format_px(value).trim_end_matches("px").to_string()
}

fn same_tag_index(doc: &Document, node: NodeId) -> usize {
    let tag = doc.tag_name(node).unwrap_or_default().to_string();
    let Some(parent) = doc.parent(node) else {
        return 0;
    };
    doc.children(parent)
        .iter()
        .take_while(|&&c| c != node)
        .filter(|&&c| doc.has_tag(c, &tag))
        .count()
}

pub fn locate_cell(doc: &Document, node: NodeId) -> Result<CellPosition> {
    let not_in_table = || EditorError::InvalidArgument("selection is not inside a table cell".into());
    let cell = closest(doc, node, &["td", "th"]).ok_or_else(not_in_table)?;
    let row = doc.parent(cell).filter(|&r| doc.has_tag(r, "tr")).ok_or_else(not_in_table)?;
    let table = closest(doc, row, &["table"]).ok_or_else(not_in_table)?;
    Ok(CellPosition {
        table,
        row,
        cell,
        row_index: same_tag_index(doc, row),
        column_index: same_tag_index(doc, cell),
    })
}

/// Rows that belong to `table` itself, not to tables nested in it.
pub fn rows_of(doc: &Document, table: NodeId) -> Vec<NodeId> {
    doc.find_all(table, |d, n| {
        d.has_tag(n, "tr") && d.parent(n).and_then(|p| closest(d, p, &["table"])) == Some(table)
    })
}

pub fn cells_of(doc: &Document, row: NodeId) -> Vec<NodeId> {
    doc.children(row)
        .iter()
        .copied()
        .filter(|&c| doc.has_tag(c, "td") || doc.has_tag(c, "th"))
        .collect()
}

fn cell_width(doc: &Document, cell: NodeId) -> Option<f64> {
    doc.style_property(cell, "width").as_deref().and_then(|w| {
        if w.trim_end().ends_with('%') { None } else { parse_px(w) }
    })
}

/// Sizing mode declared by the first row's cells.
pub fn sizing(doc: &Document, table: NodeId) -> Sizing {
    let Some(&first) = rows_of(doc, table).first() else {
        return Sizing::Unknown;
    };
    let widths: Vec<String> = cells_of(doc, first)
        .into_iter()
        .filter_map(|c| doc.style_property(c, "width"))
        .collect();
    if widths.iter().any(|w| w.trim_end().ends_with('%')) {
        Sizing::Percent
    } else if !widths.is_empty() && widths.iter().all(|w| w.trim_end().ends_with("px")) {
        Sizing::Pixels
    } else {
        Sizing::Unknown
    }
}

/// `width * factor`, snapped to the shortest decimal that scales back to the
/// same stored width. Undoes the rounding of an earlier rescale by `1 / factor`.
fn unscale(width: f64, factor: f64) -> f64 {
    let exact = width * factor;
    let stored = format_px(width);
    (0..=3)
        .map(|digits| {
            let scale = 10f64.powi(digits);
            (exact * scale).round() / scale
        })
        .find(|&candidate| format_px(candidate / factor) == stored)
        .unwrap_or(exact)
}

fn set_cell_width(doc: &mut Document, cell: NodeId, width: f64) -> Result<()> {
    doc.set_style_property(cell, "width", &format_px(width))?;
    Ok(())
}

/// Markup for an empty `rows` x `columns` table.
pub fn table_markup(rows: usize, columns: usize, width: TableWidth) -> Result<String> {
    if rows == 0 || columns == 0 {
        return Err(EditorError::InvalidArgument(format!(
            "table needs at least one row and column, got {rows}x{columns}"
        )));
    }
    let (table_width, cell_width) = match width {
        TableWidth::Relative(percent) => {
            let percent = f64::from(percent.clamp(1, 100));
            (format!("{}%", number(percent)), format!("{}%", number(100.0 / columns as f64)))
        }
        TableWidth::Fixed(px) if px > 0.0 => (format_px(px), format_px(px / columns as f64)),
        TableWidth::Fixed(px) => {
            return Err(EditorError::InvalidArgument(format!("table width must be positive, got {px}")));
        }
    };
    let mut html = format!(r#"<table style="{TABLE_STYLE} width: {table_width};"><tbody>"#);
    for _ in 0..rows {
        html.push_str("<tr>");
        for _ in 0..columns {
            html.push_str(&format!(r#"<td style="{CELL_STYLE} width: {cell_width};">&nbsp;</td>"#));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    Ok(html)
}

/// Insert a new table in place of the selection, caret in its first cell.
pub fn insert_table(doc: &mut Document, rows: usize, columns: usize, width: TableWidth) -> Result<NodeId> {
    let html = table_markup(rows, columns, width)?;
    let range = current_range(doc)?;
    let at = doc.delete_range_contents(&range)?;
    let nodes = doc.parse_fragment(&html);
    doc.insert_nodes_at(at, &nodes)?;
    let table = nodes
        .into_iter()
        .find(|&n| doc.has_tag(n, "table"))
        .ok_or_else(|| EditorError::InvalidArgument("table markup produced no table".into()))?;
    if let Some(&first) = doc.text_nodes(table).first() {
        place_caret(doc, Position::new(first, 0));
    }
    tracing::debug!(target: "inkpad::commands", rows, columns, ?width, "table inserted");
    Ok(table)
}

fn new_cell_like(doc: &mut Document, reference: NodeId) -> Result<NodeId> {
    let cell = doc.clone_node(reference, false);
    let filler = doc.create_text(EMPTY_CELL);
    doc.append_child(cell, filler)?;
    Ok(cell)
}

fn caret_into(doc: &mut Document, node: NodeId) {
    let pos = match doc.text_nodes(node).first() {
        Some(&t) => Position::new(t, 0),
        None => Position::new(node, 0),
    };
    place_caret(doc, pos);
}

/// The cell the caret is in.
pub fn current_cell(doc: &Document) -> Result<CellPosition> {
    let range = current_range(doc)?;
    locate_cell(doc, range.anchor.node)
}

/// Add a row under the caret's row, with one cell per cell in that row.
pub fn insert_row(doc: &mut Document) -> Result<NodeId> {
    let pos = current_cell(doc)?;
    let row = doc.clone_node(pos.row, false);
    for cell in cells_of(doc, pos.row) {
        let copy = new_cell_like(doc, cell)?;
        doc.append_child(row, copy)?;
    }
    let parent = doc.parent(pos.row).ok_or(inkpad_dom::DomError::NoParent(pos.row))?;
    let next = doc.next_sibling(pos.row);
    doc.insert_before(parent, row, next)?;
    tracing::debug!(target: "inkpad::commands", after = pos.row_index, "table row inserted");
    Ok(row)
}

/// Add a column right of the caret's column in every row.
pub fn insert_column(doc: &mut Document) -> Result<()> {
    let pos = current_cell(doc)?;
    let mode = sizing(doc, pos.table);
    for row in rows_of(doc, pos.table) {
        let cells = cells_of(doc, row);
        let Some(&reference) = cells.get(pos.column_index).or(cells.last()) else {
            continue;
        };
        let cell = new_cell_like(doc, reference)?;
        let next = doc.next_sibling(reference);
        doc.insert_before(row, cell, next)?;

        let widths: Vec<f64> = cells.iter().filter_map(|&c| cell_width(doc, c)).collect();
        if mode == Sizing::Pixels && widths.len() == cells.len() {
            let n = cells.len() as f64;
            let total: f64 = widths.iter().sum();
            for (&c, &w) in cells.iter().zip(&widths) {
                set_cell_width(doc, c, w * n / (n + 1.0))?;
            }
            set_cell_width(doc, cell, total / (n + 1.0))?;
        } else {
            doc.remove_style_property(cell, "width")?;
        }
    }
    tracing::debug!(target: "inkpad::commands", after = pos.column_index, ?mode, "table column inserted");
    Ok(())
}

pub fn remove_row(doc: &mut Document) -> Result<()> {
    let pos = current_cell(doc)?;
    let rows = rows_of(doc, pos.table);
    if rows.len() <= 1 {
        return Err(EditorError::InvalidArgument("cannot remove the only row of a table".into()));
    }
    let neighbour = doc.next_sibling(pos.row).or_else(|| doc.previous_sibling(pos.row));
    doc.remove(pos.row);
    if let Some(n) = neighbour {
        caret_into(doc, n);
    }
    Ok(())
}

pub fn remove_column(doc: &mut Document) -> Result<()> {
    let pos = current_cell(doc)?;
    if cells_of(doc, pos.row).len() <= 1 {
        return Err(EditorError::InvalidArgument("cannot remove the only column of a table".into()));
    }
    let mode = sizing(doc, pos.table);
    let neighbour = doc.next_sibling(pos.cell).or_else(|| doc.previous_sibling(pos.cell));
    for row in rows_of(doc, pos.table) {
        let cells = cells_of(doc, row);
        let Some(&doomed) = cells.get(pos.column_index) else {
            continue;
        };
        let widths: Vec<f64> = cells.iter().filter_map(|&c| cell_width(doc, c)).collect();
        doc.remove(doomed);
        if mode == Sizing::Pixels && widths.len() == cells.len() && cells.len() > 1 {
            let total: f64 = widths.iter().sum();
            let remaining = total - widths[pos.column_index];
            if remaining > 0.0 {
                for (i, (&c, &w)) in cells.iter().zip(&widths).enumerate() {
                    if i != pos.column_index {
                        set_cell_width(doc, c, unscale(w, total / remaining))?;
                    }
                }
            }
        }
    }
    if let Some(n) = neighbour {
        caret_into(doc, n);
    }
    Ok(())
}

/// Give `column` a new pixel width in every row. The neighbouring column
/// absorbs the difference so the table keeps its width.
pub fn resize_column(doc: &mut Document, table: NodeId, column: usize, width: f64) -> Result<()> {
    if width <= 0.0 {
        return Err(EditorError::InvalidArgument(format!("column width must be positive, got {width}")));
    }
    for row in rows_of(doc, table) {
        let cells = cells_of(doc, row);
        let Some(&cell) = cells.get(column) else {
            continue;
        };
        let old = cell_width(doc, cell);
        set_cell_width(doc, cell, width)?;
        let neighbour = cells.get(column + 1).or_else(|| column.checked_sub(1).and_then(|i| cells.get(i)));
        if let (Some(old), Some(&n)) = (old, neighbour) {
            if let Some(nw) = cell_width(doc, n) {
                set_cell_width(doc, n, (nw - (width - old)).max(1.0))?;
            }
        }
    }
    Ok(())
}

/// Column resize handles, one set per table, bound to the first row's cells.
/// Any change that rebuilds a table's markup invalidates them; call
/// [`rebind`](Self::rebind) afterwards.
#[derive(Debug, Default, Clone)]
pub struct ColumnResizeBindings {
    tables: Vec<NodeId>,
    handles: Vec<Vec<NodeId>>,
}

impl ColumnResizeBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebind(&mut self, doc: &Document) {
        self.tables = doc.find_all(doc.body(), |d, n| d.has_tag(n, "table"));
        self.handles = self
            .tables
            .iter()
            .map(|&t| {
                rows_of(doc, t)
                    .first()
                    .map(|&r| cells_of(doc, r))
                    .unwrap_or_default()
            })
            .collect();
        tracing::trace!(target: "inkpad::table", tables = self.tables.len(), "resize handles rebound");
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, index: usize) -> Option<NodeId> {
        self.tables.get(index).copied()
    }

    pub fn handle(&self, index: usize, column: usize) -> Option<NodeId> {
        self.handles.get(index)?.get(column).copied()
    }

    /// Every bound table and handle.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.tables.iter().chain(self.handles.iter().flatten()).copied()
    }

    /// Whether every bound handle still sits in the document.
    pub fn is_current(&self, doc: &Document) -> bool {
        self.tables.iter().all(|&t| doc.is_connected(t))
            && self.handles.iter().flatten().all(|&h| doc.is_connected(h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection_codec::{SelectionSpan, restore};

    fn widths(doc: &Document, table: NodeId) -> Vec<Vec<String>> {
        rows_of(doc, table)
            .into_iter()
            .map(|r| {
                cells_of(doc, r)
                    .into_iter()
                    .map(|c| doc.style_property(c, "width").unwrap_or_default())
                    .collect()
            })
            .collect()
    }

    fn fixed_table(columns: usize, rows: usize) -> (Document, NodeId) {
        let mut doc = Document::from_html("<p>x</p>");
        restore(&mut doc, Some(SelectionSpan::collapsed(1)));
        let table = insert_table(&mut doc, rows, columns, TableWidth::Fixed(120.0 * columns as f64)).unwrap();
        (doc, table)
    }

    #[test]
    fn test_table_markup() {
        insta::assert_snapshot!(table_markup(1, 2, TableWidth::Fixed(240.0)).unwrap(), @r#"<table style="border-collapse: collapse; margin-left: 0px; table-layout: fixed; width: 240px;"><tbody><tr><td style="border: 1px solid rgb(219, 219, 219); padding: 10px; margin: 0px; width: 120px;">&nbsp;</td><td style="border: 1px solid rgb(219, 219, 219); padding: 10px; margin: 0px; width: 120px;">&nbsp;</td></tr></tbody></table>"#);
        assert!(table_markup(0, 2, TableWidth::Relative(100)).is_err());
    }

    #[test]
    fn test_column_insert_and_remove_keep_total_width() {
        let (mut doc, table) = fixed_table(3, 2);
        // Caret in the middle column of the first row.
        let cells = cells_of(&doc, rows_of(&doc, table)[0]);
        caret_into(&mut doc, cells[1]);
        assert_eq!(current_cell(&doc).unwrap().column_index, 1);

        insert_column(&mut doc).unwrap();
        assert_eq!(widths(&doc, table), vec![vec!["90px"; 4], vec!["90px"; 4]]);

        remove_column(&mut doc).unwrap();
        assert_eq!(widths(&doc, table), vec![vec!["120px"; 3], vec!["120px"; 3]]);
    }

    #[test]
    fn test_column_round_trip_restores_unequal_widths() {
        let mut doc = Document::from_html(
            r#"<table><tbody><tr><td style="width: 100px;">a</td><td style="width: 200px;">b</td></tr></tbody></table>"#,
        );
        let table = doc.first_child(doc.body()).unwrap();
        let first = cells_of(&doc, rows_of(&doc, table)[0])[0];
        caret_into(&mut doc, first);

        insert_column(&mut doc).unwrap();
        assert_eq!(widths(&doc, table), vec![vec!["66.667px", "100px", "133.333px"]]);

        let inserted = cells_of(&doc, rows_of(&doc, table)[0])[1];
        caret_into(&mut doc, inserted);
        remove_column(&mut doc).unwrap();
        assert_eq!(widths(&doc, table), vec![vec!["100px", "200px"]]);
    }

    #[test]
    fn test_unscale_keeps_real_precision() {
        assert_eq!(unscale(66.667, 1.5), 100.0);
        assert_eq!(unscale(70.5, 1.5), 105.75);
        assert_eq!(unscale(10.0, 2.0), 20.0);
    }

    #[test]
    fn test_percent_tables_are_not_rebalanced() {
        let mut doc = Document::from_html("<p>x</p>");
        restore(&mut doc, Some(SelectionSpan::collapsed(0)));
        let table = insert_table(&mut doc, 1, 2, TableWidth::Relative(100)).unwrap();
        assert_eq!(sizing(&doc, table), Sizing::Percent);
        insert_column(&mut doc).unwrap();
        assert_eq!(widths(&doc, table), vec![vec!["50%".to_string(), String::new(), "50%".to_string()]]);
    }

    #[test]
    fn test_row_insert_and_indices() {
        let (mut doc, table) = fixed_table(2, 2);
        let second_row = rows_of(&doc, table)[1];
        caret_into(&mut doc, second_row);
        let pos = current_cell(&doc).unwrap();
        assert_eq!((pos.row_index, pos.column_index), (1, 0));

        let row = insert_row(&mut doc).unwrap();
        let rows = rows_of(&doc, table);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], row);
        assert_eq!(cells_of(&doc, row).len(), 2);
        assert_eq!(doc.text_content(row), "\u{a0}\u{a0}");
        assert_eq!(doc.style_property(cells_of(&doc, row)[0], "width").as_deref(), Some("120px"));
    }

    #[test]
    fn test_cannot_remove_last_row_or_column() {
        let (mut doc, _) = fixed_table(1, 1);
        assert!(matches!(remove_row(&mut doc), Err(EditorError::InvalidArgument(_))));
        assert!(matches!(remove_column(&mut doc), Err(EditorError::InvalidArgument(_))));
    }

    #[test]
    fn test_resize_column_moves_neighbour() {
        let (mut doc, table) = fixed_table(3, 1);
        resize_column(&mut doc, table, 2, 150.0).unwrap();
        assert_eq!(widths(&doc, table), vec![vec!["120px", "90px", "150px"]]);
    }

    #[test]
    fn test_bindings_follow_rebuilt_tables() {
        let (mut doc, table) = fixed_table(2, 1);
        let mut bindings = ColumnResizeBindings::new();
        bindings.rebind(&doc);
        assert_eq!(bindings.table(0), Some(table));
        assert!(bindings.handle(0, 1).is_some());
        assert!(bindings.is_current(&doc));

        let markup = doc.inner_html(table);
        doc.set_inner_html(table, &markup).unwrap();
        assert!(!bindings.is_current(&doc));
        bindings.rebind(&doc);
        assert!(bindings.is_current(&doc));
    }
}
