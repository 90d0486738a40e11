//! List suggestions: turning blocks into list items and relabelling lists.
//!
//! Every affected item gets a `block-type-change` marker as its first child
//! recording how it looked before, so a reject can put it back. An item that
//! already carries a marker keeps it; going back to the marker's initial type
//! drops the marker instead.

use std::collections::HashSet;

use tracing::debug;

use super::{block_marker, insert_marker, SuggestionSink};
use crate::doc::{BlockType, Document, ListType, NodeKey, NodeKind};
use crate::error::{EngineError, Result};
use crate::suggestion::{ChangedProperties, ListInfo, SuggestionId, SuggestionMark, SuggestionType};

/// Initial block type stored on a `block-type-change` marker.
pub(crate) fn marker_initial(doc: &Document, marker: NodeKey) -> Option<BlockType> {
    doc.mark(marker).and_then(|m| m.changed()).and_then(|c| c.block_type)
}

pub fn insert_list(
    doc: &mut Document,
    blocks: &[NodeKey],
    list_type: ListType,
    sink: &mut dyn SuggestionSink,
) -> Result<bool> {
    let id = SuggestionId::generate();
    let mut created = false;
    let mut handled = false;
    let mut relabelled = HashSet::new();

    for &key in blocks {
        let target = doc.closest(key, |n| n.kind.is_text_container() || matches!(n.kind, NodeKind::List { .. }));
        let Some(target) = target else { continue };
        let list = match doc.kind(target) {
            Some(NodeKind::List { .. }) => target,
            Some(NodeKind::ListItem { .. }) => match doc.parent(target) {
                Some(list) => list,
                None => continue,
            },
            Some(NodeKind::Block { .. }) => {
                created |= block_to_list(doc, target, list_type, &id)?;
                handled = true;
                continue;
            }
            _ => continue,
        };
        if relabelled.insert(list) {
            created |= relabel_list(doc, list, list_type, &id)?;
            handled = true;
        }
    }

    if created {
        sink.on_created(&id);
    }
    if !handled {
        debug!("no blocks to turn into a list");
    }
    Ok(handled)
}

fn block_to_list(doc: &mut Document, block: NodeKey, list_type: ListType, id: &SuggestionId) -> Result<bool> {
    let node = doc.node(block)?;
    let NodeKind::Block { block_type } = node.kind else { return Ok(false) };
    let (align, indent) = (node.align, node.indent);
    let existing = block_marker(doc, block, SuggestionType::BlockTypeChange);
    let item = wrap_block_in_list(doc, block, list_type, 1)?;

    match existing {
        Some(marker) => {
            if marker_initial(doc, marker) == Some(list_type.block_type()) {
                doc.remove(marker)?;
            }
            Ok(false)
        }
        None => {
            let changed =
                ChangedProperties { block_type: Some(block_type), align: Some(align), indent: Some(indent), ..Default::default() };
            insert_marker(doc, item, SuggestionMark::with_changes(id.clone(), SuggestionType::BlockTypeChange, changed))?;
            Ok(true)
        }
    }
}

fn relabel_list(doc: &mut Document, list: NodeKey, list_type: ListType, id: &SuggestionId) -> Result<bool> {
    let NodeKind::List { list_type: old, start } = doc.node(list)?.kind else { return Ok(false) };
    if old == list_type {
        return Ok(false);
    }
    let mut created = false;
    for item in doc.children(list).to_vec() {
        let Some(node) = doc.get(item) else { continue };
        if !matches!(node.kind, NodeKind::ListItem { .. }) {
            continue;
        }
        let (align, indent) = (node.align, node.indent);
        match block_marker(doc, item, SuggestionType::BlockTypeChange) {
            Some(marker) => {
                if marker_initial(doc, marker) == Some(list_type.block_type()) {
                    doc.remove(marker)?;
                }
            }
            None => {
                let changed = ChangedProperties {
                    block_type: Some(old.block_type()),
                    align: Some(align),
                    indent: Some(indent),
                    list_info: Some(ListInfo { list_type: old, start }),
                    ..Default::default()
                };
                insert_marker(doc, item, SuggestionMark::with_changes(id.clone(), SuggestionType::BlockTypeChange, changed))?;
                created = true;
            }
        }
    }
    if let NodeKind::List { list_type: current, .. } = &mut doc.node_mut(list)?.kind {
        *current = list_type;
    }
    Ok(created)
}

/// Turn a block into a list item, joining a neighbouring list of the same
/// type when there is one. Returns the new item.
pub fn wrap_block_in_list(doc: &mut Document, block: NodeKey, list_type: ListType, start: u32) -> Result<NodeKey> {
    let node = doc.node(block)?;
    let (align, indent) = (node.align, node.indent);
    let same_type = |doc: &Document, k: NodeKey| matches!(doc.kind(k), Some(NodeKind::List { list_type: t, .. }) if *t == list_type);

    let item = doc.create(NodeKind::ListItem { checked: false });
    {
        let n = doc.node_mut(item)?;
        n.align = align;
        n.indent = indent;
    }
    let list = match doc.prev_sibling(block).filter(|&k| same_type(doc, k)) {
        Some(list) => list,
        None => {
            let list = doc.create(NodeKind::List { list_type, start });
            doc.insert_before(block, list)?;
            list
        }
    };
    doc.append(list, item)?;
    doc.move_children(block, item)?;
    doc.remove(block)?;
    if let Some(next) = doc.next_sibling(list).filter(|&k| same_type(doc, k)) {
        doc.merge_blocks(list, next)?;
    }
    Ok(item)
}

/// Take an item out of its list as a block of `block_type`, splitting the
/// list around it. Returns the new block.
pub fn lift_list_item(doc: &mut Document, item: NodeKey, block_type: BlockType) -> Result<NodeKey> {
    let list = doc.parent(item).ok_or(EngineError::NodeNotFound(item))?;
    if !matches!(doc.kind(list), Some(NodeKind::List { .. })) {
        return Err(EngineError::InvalidTarget { key: item, expected: "list item" });
    }
    let idx = doc.index_in_parent(item).ok_or(EngineError::NodeNotFound(item))?;
    let following = doc.children(list)[idx + 1..].to_vec();
    let node = doc.node(item)?;
    let (align, indent) = (node.align, node.indent);

    let block = doc.create(NodeKind::Block { block_type });
    {
        let n = doc.node_mut(block)?;
        n.align = align;
        n.indent = indent;
    }
    doc.insert_after(list, block)?;
    doc.move_children(item, block)?;
    if !following.is_empty() {
        let tail = doc.clone_shallow(list)?;
        doc.insert_after(block, tail)?;
        for k in following {
            doc.append(tail, k)?;
        }
    }
    doc.remove(item)?;
    if doc.children(list).is_empty() {
        doc.remove(list)?;
    }
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::testing::Fixture;
    use crate::resolve::{accept_suggestion, reject_suggestion};

    #[test]
    fn test_paragraphs_become_one_list_and_reject_restores() {
        let mut fx = Fixture::new();
        let (a, _) = fx.doc.append_paragraph("one");
        let (b, _) = fx.doc.append_paragraph("two");
        let original = fx.finish();

        assert!(insert_list(&mut fx.doc, &[a, b], ListType::Bullet, &mut fx.sink).unwrap());
        let id = fx.only_id();
        let root = fx.doc.root();
        assert_eq!(fx.doc.children(root).len(), 1);
        let list = fx.doc.children(root)[0];
        assert_eq!(fx.doc.children(list).len(), 2);
        assert_eq!(fx.doc.suggestion_nodes(&id).len(), 2);

        reject_suggestion(&mut fx.doc, &id).unwrap();
        assert_eq!(fx.finish(), original);
    }

    #[test]
    fn test_relabel_list_records_list_info() {
        let mut fx = Fixture::new();
        let (a, _) = fx.doc.append_paragraph("one");
        let mut setup = crate::builders::CollectingSink::default();
        insert_list(&mut fx.doc, &[a], ListType::Bullet, &mut setup).unwrap();
        accept_suggestion(&mut fx.doc, &setup.created[0]).unwrap();
        let original = fx.finish();

        let list = fx.doc.children(fx.doc.root())[0];
        insert_list(&mut fx.doc, &[list], ListType::Number, &mut fx.sink).unwrap();
        let id = fx.only_id();
        let marker = fx.doc.suggestion_nodes(&id)[0];
        let info = fx.doc.mark(marker).unwrap().changed().unwrap().list_info.unwrap();
        assert_eq!(info.list_type, ListType::Bullet);

        reject_suggestion(&mut fx.doc, &id).unwrap();
        assert_eq!(fx.finish(), original);
    }

    #[test]
    fn test_returning_to_initial_list_type_drops_marker() {
        let mut fx = Fixture::new();
        let (a, _) = fx.doc.append_paragraph("one");
        let mut setup = crate::builders::CollectingSink::default();
        insert_list(&mut fx.doc, &[a], ListType::Check, &mut setup).unwrap();
        accept_suggestion(&mut fx.doc, &setup.created[0]).unwrap();
        let original = fx.finish();

        let list = fx.doc.children(fx.doc.root())[0];
        insert_list(&mut fx.doc, &[list], ListType::Number, &mut fx.sink).unwrap();
        insert_list(&mut fx.doc, &[list], ListType::Check, &mut fx.sink).unwrap();
        assert_eq!(fx.finish(), original);
    }
}
