//! Table suggestions.
//!
//! Table changes are recorded with markers: every affected cell gets a marker
//! as the first child of its first block, all sharing one id. Removing
//! structure that is itself an unresolved local insertion drops it outright.

use tracing::debug;

use super::{insert_marker, SuggestionSink};
use crate::doc::{Document, NodeKey, NodeKind};
use crate::error::{EngineError, Result};
use crate::suggestion::{SuggestionId, SuggestionMark, SuggestionType};

const ROW_INSERTIONS: [SuggestionType; 3] =
    [SuggestionType::InsertTable, SuggestionType::InsertTableRow, SuggestionType::DuplicateTableRow];
const COLUMN_INSERTIONS: [SuggestionType; 3] =
    [SuggestionType::InsertTable, SuggestionType::InsertTableColumn, SuggestionType::DuplicateTableColumn];

fn is_kind(doc: &Document, key: NodeKey, pred: impl Fn(&NodeKind) -> bool) -> bool {
    doc.kind(key).is_some_and(pred)
}

fn new_cell(doc: &mut Document, header: bool) -> Result<NodeKey> {
    let cell = doc.create(NodeKind::TableCell { header });
    let block = doc.create(NodeKind::paragraph());
    doc.append(cell, block)?;
    Ok(cell)
}

fn cells_of_row(doc: &Document, row: NodeKey) -> Vec<NodeKey> {
    doc.children(row).iter().copied().filter(|&k| is_kind(doc, k, |n| matches!(n, NodeKind::TableCell { .. }))).collect()
}

fn rows_of(doc: &Document, table: NodeKey) -> Vec<NodeKey> {
    doc.children(table).iter().copied().filter(|&k| is_kind(doc, k, |n| matches!(n, NodeKind::TableRow))).collect()
}

fn cells_of_table(doc: &Document, table: NodeKey) -> Vec<NodeKey> {
    rows_of(doc, table).into_iter().flat_map(|r| cells_of_row(doc, r)).collect()
}

/// First block of a cell, created when the cell is empty.
fn cell_block(doc: &mut Document, cell: NodeKey) -> Result<NodeKey> {
    let existing = doc.children(cell).iter().copied().find(|&k| is_kind(doc, k, NodeKind::is_text_container));
    match existing {
        Some(block) => Ok(block),
        None => {
            let block = doc.create(NodeKind::paragraph());
            doc.insert_at(cell, 0, block)?;
            Ok(block)
        }
    }
}

/// Marker kinds sitting at the start of a cell.
fn cell_markers(doc: &Document, cell: NodeKey) -> Vec<(SuggestionType, SuggestionId)> {
    let Some(&block) = doc.children(cell).iter().find(|&&k| is_kind(doc, k, NodeKind::is_text_container)) else {
        return Vec::new();
    };
    doc.children(block).iter().filter_map(|&k| doc.mark(k)).map(|m| (m.kind, m.id.clone())).collect()
}

fn has_marker(doc: &Document, cell: NodeKey, kind: SuggestionType) -> bool {
    cell_markers(doc, cell).iter().any(|(k, _)| *k == kind)
}

/// Whether the cell belongs to structure inserted in this session.
fn locally_inserted(doc: &Document, cell: NodeKey, kinds: &[SuggestionType], sink: &dyn SuggestionSink) -> bool {
    cell_markers(doc, cell).iter().any(|(k, id)| kinds.contains(k) && sink.is_local(id))
}

fn mark_cells(doc: &mut Document, cells: &[NodeKey], mark: &SuggestionMark) -> Result<()> {
    if cells.is_empty() {
        return Err(EngineError::InvariantViolation(format!("no table cells found for {}", mark.kind)));
    }
    for &cell in cells {
        let block = cell_block(doc, cell)?;
        insert_marker(doc, block, mark.clone())?;
    }
    Ok(())
}

fn enclosing_of(doc: &Document, cell: NodeKey) -> Option<(NodeKey, NodeKey)> {
    let row = doc.parent(cell).filter(|&r| is_kind(doc, r, |n| matches!(n, NodeKind::TableRow)))?;
    let table = doc.parent(row).filter(|&t| is_kind(doc, t, |n| matches!(n, NodeKind::Table)))?;
    Some((row, table))
}

fn containing_cell(doc: &Document, key: NodeKey) -> Option<NodeKey> {
    doc.closest(key, |n| matches!(n.kind, NodeKind::TableCell { .. }))
}

pub fn insert_table(
    doc: &mut Document,
    after: NodeKey,
    rows: usize,
    cols: usize,
    sink: &mut dyn SuggestionSink,
) -> Result<bool> {
    let root = doc.root();
    let Some(anchor) = doc.child_containing(root, after) else { return Ok(false) };
    if rows == 0 || cols == 0 {
        debug!(rows, cols, "empty table requested");
        return Ok(false);
    }
    let table = doc.create(NodeKind::Table);
    let mut cells = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        let row = doc.create(NodeKind::TableRow);
        doc.append(table, row)?;
        for _ in 0..cols {
            let cell = new_cell(doc, r == 0)?;
            doc.append(row, cell)?;
            cells.push(cell);
        }
    }
    doc.insert_after(anchor, table)?;

    let id = SuggestionId::generate();
    mark_cells(doc, &cells_of_table(doc, table), &SuggestionMark::new(id.clone(), SuggestionType::InsertTable))?;
    sink.on_created(&id);
    Ok(true)
}

pub fn delete_table(doc: &mut Document, table: NodeKey, sink: &mut dyn SuggestionSink) -> Result<bool> {
    if !is_kind(doc, table, |n| matches!(n, NodeKind::Table)) {
        return Ok(false);
    }
    let cells = cells_of_table(doc, table);
    if cells.iter().any(|&c| locally_inserted(doc, c, &[SuggestionType::InsertTable], sink)) {
        doc.remove(table)?;
        return Ok(true);
    }
    if !cells.is_empty() && cells.iter().all(|&c| has_marker(doc, c, SuggestionType::DeleteTable)) {
        return Ok(true);
    }
    let id = SuggestionId::generate();
    mark_cells(doc, &cells, &SuggestionMark::new(id.clone(), SuggestionType::DeleteTable))?;
    sink.on_created(&id);
    Ok(true)
}

/// Insert (`duplicate == false`) or duplicate the row holding `cell`.
fn add_row(doc: &mut Document, cell: NodeKey, below: bool, duplicate: bool, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let Some(cell) = containing_cell(doc, cell) else { return Ok(false) };
    let Some((row, _)) = enclosing_of(doc, cell) else { return Ok(false) };
    let new_row = if duplicate {
        doc.clone_content(row)?
    } else {
        let width = cells_of_row(doc, row).len();
        let new_row = doc.create(NodeKind::TableRow);
        for _ in 0..width {
            let c = new_cell(doc, false)?;
            doc.append(new_row, c)?;
        }
        new_row
    };
    if below {
        doc.insert_after(row, new_row)?;
    } else {
        doc.insert_before(row, new_row)?;
    }
    let kind = if duplicate { SuggestionType::DuplicateTableRow } else { SuggestionType::InsertTableRow };
    let id = SuggestionId::generate();
    mark_cells(doc, &cells_of_row(doc, new_row), &SuggestionMark::new(id.clone(), kind))?;
    sink.on_created(&id);
    Ok(true)
}

pub fn insert_table_row(doc: &mut Document, cell: NodeKey, below: bool, sink: &mut dyn SuggestionSink) -> Result<bool> {
    add_row(doc, cell, below, false, sink)
}

pub fn duplicate_table_row(doc: &mut Document, cell: NodeKey, sink: &mut dyn SuggestionSink) -> Result<bool> {
    add_row(doc, cell, true, true, sink)
}

fn add_column(doc: &mut Document, cell: NodeKey, right: bool, duplicate: bool, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let Some(cell) = containing_cell(doc, cell) else { return Ok(false) };
    let Some((row, table)) = enclosing_of(doc, cell) else { return Ok(false) };
    let Some(col) = cells_of_row(doc, row).iter().position(|&c| c == cell) else { return Ok(false) };

    let mut added = Vec::new();
    for r in rows_of(doc, table) {
        let cells = cells_of_row(doc, r);
        let source = cells.get(col).or(cells.last()).copied();
        let new = match (duplicate, source) {
            (true, Some(src)) => doc.clone_content(src)?,
            _ => {
                let header = source.is_some_and(|s| matches!(doc.kind(s), Some(NodeKind::TableCell { header: true })));
                new_cell(doc, header)?
            }
        };
        match source {
            Some(src) if right => doc.insert_after(src, new)?,
            Some(src) => doc.insert_before(src, new)?,
            None => doc.append(r, new)?,
        }
        added.push(new);
    }
    let kind = if duplicate { SuggestionType::DuplicateTableColumn } else { SuggestionType::InsertTableColumn };
    let id = SuggestionId::generate();
    mark_cells(doc, &added, &SuggestionMark::new(id.clone(), kind))?;
    sink.on_created(&id);
    Ok(true)
}

pub fn insert_table_column(doc: &mut Document, cell: NodeKey, right: bool, sink: &mut dyn SuggestionSink) -> Result<bool> {
    add_column(doc, cell, right, false, sink)
}

pub fn duplicate_table_column(doc: &mut Document, cell: NodeKey, sink: &mut dyn SuggestionSink) -> Result<bool> {
    add_column(doc, cell, true, true, sink)
}

pub fn delete_table_row(doc: &mut Document, cell: NodeKey, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let Some(cell) = containing_cell(doc, cell) else { return Ok(false) };
    let Some((row, _)) = enclosing_of(doc, cell) else { return Ok(false) };
    let cells = cells_of_row(doc, row);
    if !cells.is_empty() && cells.iter().all(|&c| locally_inserted(doc, c, &ROW_INSERTIONS, sink)) {
        doc.remove(row)?;
        return Ok(true);
    }
    if !cells.is_empty() && cells.iter().all(|&c| has_marker(doc, c, SuggestionType::DeleteTableRow)) {
        return Ok(true);
    }
    let id = SuggestionId::generate();
    mark_cells(doc, &cells, &SuggestionMark::new(id.clone(), SuggestionType::DeleteTableRow))?;
    sink.on_created(&id);
    Ok(true)
}

pub fn delete_table_column(doc: &mut Document, cell: NodeKey, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let Some(cell) = containing_cell(doc, cell) else { return Ok(false) };
    let Some((row, table)) = enclosing_of(doc, cell) else { return Ok(false) };
    let Some(col) = cells_of_row(doc, row).iter().position(|&c| c == cell) else { return Ok(false) };
    let column: Vec<NodeKey> = rows_of(doc, table).into_iter().filter_map(|r| cells_of_row(doc, r).get(col).copied()).collect();

    if column.iter().all(|&c| locally_inserted(doc, c, &COLUMN_INSERTIONS, sink)) {
        for c in column {
            doc.remove(c)?;
        }
        return Ok(true);
    }
    if column.iter().all(|&c| has_marker(doc, c, SuggestionType::DeleteTableColumn)) {
        return Ok(true);
    }
    let id = SuggestionId::generate();
    mark_cells(doc, &column, &SuggestionMark::new(id.clone(), SuggestionType::DeleteTableColumn))?;
    sink.on_created(&id);
    Ok(true)
}
