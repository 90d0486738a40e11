//! Block type suggestions (paragraph, headings, quote, code).

use tracing::debug;

use super::list::{insert_list, lift_list_item, marker_initial};
use super::{block_marker, insert_marker, SuggestionSink};
use crate::doc::{BlockType, Document, NodeKey, NodeKind};
use crate::error::Result;
use crate::suggestion::{ChangedProperties, ListInfo, SuggestionId, SuggestionMark, SuggestionType};

pub fn set_block_type(
    doc: &mut Document,
    blocks: &[NodeKey],
    block_type: BlockType,
    sink: &mut dyn SuggestionSink,
) -> Result<bool> {
    if let Some(list_type) = block_type.list_type() {
        return insert_list(doc, blocks, list_type, sink);
    }

    let id = SuggestionId::generate();
    let mut created = false;
    let mut handled = false;
    for &key in blocks {
        let Some(host) = doc.closest_block(key) else { continue };
        let Some(node) = doc.get(host) else { continue };
        let (align, indent, kind) = (node.align, node.indent, node.kind.clone());
        let existing = block_marker(doc, host, SuggestionType::BlockTypeChange);

        match kind {
            NodeKind::Block { block_type: current } => {
                handled = true;
                if current == block_type {
                    continue;
                }
                if let NodeKind::Block { block_type: t } = &mut doc.node_mut(host)?.kind {
                    *t = block_type;
                }
                match existing {
                    Some(marker) if marker_initial(doc, marker) == Some(block_type) => doc.remove(marker)?,
                    Some(_) => {}
                    None => {
                        let changed = ChangedProperties {
                            block_type: Some(current),
                            align: Some(align),
                            indent: Some(indent),
                            ..Default::default()
                        };
                        insert_marker(doc, host, SuggestionMark::with_changes(id.clone(), SuggestionType::BlockTypeChange, changed))?;
                        created = true;
                    }
                }
            }
            NodeKind::ListItem { .. } => {
                let Some(NodeKind::List { list_type, start }) = doc.parent(host).and_then(|l| doc.kind(l)).cloned() else {
                    continue;
                };
                handled = true;
                let block = lift_list_item(doc, host, block_type)?;
                match existing {
                    Some(marker) if marker_initial(doc, marker) == Some(block_type) => doc.remove(marker)?,
                    Some(_) => {}
                    None => {
                        let changed = ChangedProperties {
                            block_type: Some(list_type.block_type()),
                            align: Some(align),
                            indent: Some(indent),
                            list_info: Some(ListInfo { list_type, start }),
                            ..Default::default()
                        };
                        insert_marker(doc, block, SuggestionMark::with_changes(id.clone(), SuggestionType::BlockTypeChange, changed))?;
                        created = true;
                    }
                }
            }
            _ => {}
        }
    }

    if created {
        sink.on_created(&id);
    }
    if !handled {
        debug!(%block_type, "no block to retype");
    }
    Ok(handled)
}
