//! Accepting and rejecting suggestions in the document tree.
//!
//! Accept makes a suggested change permanent; reject reverts it using the
//! pre-edit values stored on the range. Either way every range of the id is
//! gone afterwards.

use tracing::debug;

use crate::builders::list::{lift_list_item, wrap_block_in_list};
use crate::doc::{BlockType, Document, NodeKey, NodeKind};
use crate::error::Result;
use crate::store::ThreadStatus;
use crate::suggestion::{SuggestionId, SuggestionMark, SuggestionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Accept,
    Reject,
}

impl Resolution {
    /// Thread status recorded once the tree half is done.
    pub fn thread_status(self) -> ThreadStatus {
        match self {
            Resolution::Accept => ThreadStatus::Accepted,
            Resolution::Reject => ThreadStatus::Rejected,
        }
    }
}

pub fn accept_suggestion(doc: &mut Document, id: &SuggestionId) -> Result<bool> {
    resolve(doc, id, Resolution::Accept)
}

pub fn reject_suggestion(doc: &mut Document, id: &SuggestionId) -> Result<bool> {
    resolve(doc, id, Resolution::Reject)
}

/// Reject every suggestion in the document. Returns how many were rejected.
pub fn reject_all(doc: &mut Document) -> Result<usize> {
    let mut count = 0;
    for id in doc.suggestion_ids() {
        if reject_suggestion(doc, &id)? {
            count += 1;
        }
    }
    Ok(count)
}

/// Apply `resolution` to every range of `id`. `Ok(false)` when the id has no
/// ranges left in the tree.
pub fn resolve(doc: &mut Document, id: &SuggestionId, resolution: Resolution) -> Result<bool> {
    let ranges = doc.suggestion_nodes(id);
    resolve_ranges(doc, id, ranges, resolution)
}

/// Like [`resolve`], over range keys the caller already looked up.
pub fn resolve_ranges(doc: &mut Document, id: &SuggestionId, ranges: Vec<NodeKey>, resolution: Resolution) -> Result<bool> {
    if ranges.is_empty() {
        debug!(%id, "no ranges to resolve");
        return Ok(false);
    }
    for key in ranges {
        // Earlier ranges may have taken this one with them.
        let Some(mark) = doc.mark(key).cloned() else { continue };
        match resolution {
            Resolution::Accept => accept_range(doc, key, &mark)?,
            Resolution::Reject => reject_range(doc, key, &mark)?,
        }
    }
    doc.normalize();
    Ok(true)
}

fn remove_closest(doc: &mut Document, key: NodeKey, pred: impl Fn(&NodeKind) -> bool) -> Result<()> {
    match doc.closest(key, |n| pred(&n.kind)) {
        Some(target) => doc.remove(target),
        None => doc.remove(key),
    }
}

fn is_table(kind: &NodeKind) -> bool {
    matches!(kind, NodeKind::Table)
}

fn is_row(kind: &NodeKind) -> bool {
    matches!(kind, NodeKind::TableRow)
}

fn is_cell(kind: &NodeKind) -> bool {
    matches!(kind, NodeKind::TableCell { .. })
}

fn accept_range(doc: &mut Document, key: NodeKey, mark: &SuggestionMark) -> Result<()> {
    use SuggestionType::*;
    match mark.kind {
        Insert | InsertImage | InsertDivider => doc.unwrap(key),
        Delete | DeleteImage | DeleteDivider => doc.remove(key),
        PropertyChange | StyleChange | ClearFormatting | ImageChange => doc.unwrap(key),
        LinkChange => {
            let removed = mark.changed().and_then(|c| c.link.as_ref()).is_some_and(|l| l.next.is_none());
            if removed {
                unwrap_links(doc, key)?;
            }
            doc.unwrap(key)
        }
        Split | AlignChange | IndentChange | BlockTypeChange => doc.remove(key),
        Join => {
            let host = doc.parent(key);
            doc.remove(key)?;
            match host.and_then(|h| doc.prev_sibling(h).map(|p| (p, h))) {
                Some((prev, host)) if doc.get(prev).is_some_and(|n| n.kind.is_text_container()) => {
                    doc.merge_blocks(prev, host)
                }
                _ => Ok(()),
            }
        }
        InsertTable | InsertTableRow | InsertTableColumn | DuplicateTableRow | DuplicateTableColumn => {
            doc.remove(key)
        }
        DeleteTable => remove_closest(doc, key, is_table),
        DeleteTableRow => remove_closest(doc, key, is_row),
        DeleteTableColumn => remove_closest(doc, key, is_cell),
    }
}

fn reject_range(doc: &mut Document, key: NodeKey, mark: &SuggestionMark) -> Result<()> {
    use SuggestionType::*;
    let changed = mark.changed().cloned().unwrap_or_default();
    match mark.kind {
        Insert | InsertImage | InsertDivider => doc.remove(key),
        Delete | DeleteImage | DeleteDivider => doc.unwrap(key),
        PropertyChange | StyleChange | ClearFormatting => {
            for text in doc.text_nodes(key) {
                if let Some(format) = changed.format {
                    doc.set_format(text, format)?;
                }
                if let Some(style) = &changed.style {
                    doc.set_style(text, style)?;
                }
            }
            doc.unwrap(key)
        }
        ImageChange => {
            if let Some(snapshot) = changed.image {
                for k in doc.descendants(key) {
                    if let Some(NodeKind::Image(props)) = doc.node_mut(k).ok().map(|n| &mut n.kind) {
                        snapshot.apply_to(props);
                    }
                }
            }
            doc.unwrap(key)
        }
        LinkChange => {
            match changed.link.and_then(|l| l.previous) {
                Some(previous) => {
                    for k in doc.descendants(key) {
                        if let Some(NodeKind::Link { url }) = doc.node_mut(k).ok().map(|n| &mut n.kind) {
                            *url = previous.clone();
                        }
                    }
                }
                None => unwrap_links(doc, key)?,
            }
            doc.unwrap(key)
        }
        AlignChange | IndentChange => {
            if let Some(host) = doc.parent(key) {
                let node = doc.node_mut(host)?;
                if let Some(align) = changed.align {
                    node.align = align;
                }
                if let Some(indent) = changed.indent {
                    node.indent = indent;
                }
            }
            doc.remove(key)
        }
        Split => {
            let host = doc.parent(key);
            doc.remove(key)?;
            match host.and_then(|h| doc.next_sibling(h).map(|n| (h, n))) {
                Some((host, next)) if doc.get(next).is_some_and(|n| n.kind.is_text_container()) => {
                    doc.merge_blocks(host, next)
                }
                _ => Ok(()),
            }
        }
        Join => doc.remove(key),
        InsertTable => remove_closest(doc, key, is_table),
        InsertTableRow | DuplicateTableRow => remove_closest(doc, key, is_row),
        InsertTableColumn | DuplicateTableColumn => remove_closest(doc, key, is_cell),
        DeleteTable | DeleteTableRow | DeleteTableColumn => doc.remove(key),
        BlockTypeChange => restore_block_type(doc, key, mark),
    }
}

fn unwrap_links(doc: &mut Document, key: NodeKey) -> Result<()> {
    let links: Vec<NodeKey> =
        doc.descendants(key).into_iter().filter(|&k| matches!(doc.kind(k), Some(NodeKind::Link { .. }))).collect();
    for link in links {
        doc.unwrap(link)?;
    }
    Ok(())
}

/// Put a block back the way it was before a block-type or list change.
fn restore_block_type(doc: &mut Document, marker: NodeKey, mark: &SuggestionMark) -> Result<()> {
    let Some(host) = doc.parent(marker) else { return doc.remove(marker) };
    let changed = mark.changed().cloned().unwrap_or_default();
    doc.remove(marker)?;
    let initial = changed.block_type.unwrap_or(BlockType::Paragraph);
    let in_list = matches!(doc.kind(host), Some(NodeKind::ListItem { .. }));

    let restored = match (in_list, initial.list_type()) {
        (true, Some(list_type)) => {
            if let Some(list) = doc.parent(host) {
                if let NodeKind::List { list_type: current, start } = &mut doc.node_mut(list)?.kind {
                    let info = changed.list_info;
                    *current = info.map(|i| i.list_type).unwrap_or(list_type);
                    if let Some(info) = info {
                        *start = info.start;
                    }
                }
            }
            host
        }
        (true, None) => lift_list_item(doc, host, initial)?,
        (false, Some(list_type)) => {
            let start = changed.list_info.map(|i| i.start).unwrap_or(1);
            wrap_block_in_list(doc, host, list_type, start)?
        }
        (false, None) => {
            if let NodeKind::Block { block_type } = &mut doc.node_mut(host)?.kind {
                *block_type = initial;
            }
            host
        }
    };

    let node = doc.node_mut(restored)?;
    if let Some(align) = changed.align {
        node.align = align;
    }
    if let Some(indent) = changed.indent {
        node.indent = indent;
    }
    Ok(())
}
