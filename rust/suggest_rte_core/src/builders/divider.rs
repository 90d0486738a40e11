//! Horizontal rule suggestions.

use tracing::debug;

use super::SuggestionSink;
use crate::doc::{Document, NodeKey, NodeKind};
use crate::error::Result;
use crate::suggestion::{SuggestionId, SuggestionMark, SuggestionType};

/// Insert a divider after the top-level block containing `after`.
pub fn insert_divider(doc: &mut Document, after: NodeKey, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let root = doc.root();
    let Some(anchor) = doc.child_containing(root, after) else {
        debug!(key = %after, "divider anchor is not in the document");
        return Ok(false);
    };
    let id = SuggestionId::generate();
    let divider = doc.create(NodeKind::Divider);
    let wrapper = doc.create_suggestion(SuggestionMark::new(id.clone(), SuggestionType::InsertDivider));
    doc.append(wrapper, divider)?;
    doc.insert_after(anchor, wrapper)?;
    sink.on_created(&id);
    Ok(true)
}

pub fn delete_divider(doc: &mut Document, divider: NodeKey, sink: &mut dyn SuggestionSink) -> Result<bool> {
    if !matches!(doc.kind(divider), Some(NodeKind::Divider)) {
        return Ok(false);
    }
    let parent_kind = doc.parent(divider).and_then(|p| doc.mark(p)).map(|m| m.kind);
    match parent_kind {
        Some(SuggestionType::InsertDivider) => {
            if let Some(wrapper) = doc.parent(divider) {
                doc.remove(wrapper)?;
            }
            Ok(true)
        }
        Some(SuggestionType::DeleteDivider) => Ok(true),
        _ => {
            let id = SuggestionId::generate();
            doc.wrap_in_suggestion(divider, SuggestionMark::new(id.clone(), SuggestionType::DeleteDivider))?;
            sink.on_created(&id);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::testing::Fixture;
    use crate::resolve::{accept_suggestion, reject_suggestion};

    #[test]
    fn test_insert_divider_reject_restores() {
        let mut fx = Fixture::new();
        let (_, text) = fx.doc.append_paragraph("above");
        fx.doc.append_paragraph("below");
        let original = fx.finish();
        insert_divider(&mut fx.doc, text, &mut fx.sink).unwrap();
        let id = fx.only_id();
        assert_eq!(fx.doc.children(fx.doc.root()).len(), 3);
        reject_suggestion(&mut fx.doc, &id).unwrap();
        assert_eq!(fx.finish(), original);
    }

    #[test]
    fn test_delete_inserted_divider_removes_it() {
        let mut fx = Fixture::new();
        let (block, _) = fx.doc.append_paragraph("x");
        let original = fx.finish();
        insert_divider(&mut fx.doc, block, &mut fx.sink).unwrap();
        let wrapper = fx.doc.children(fx.doc.root())[1];
        let divider = fx.doc.children(wrapper)[0];
        delete_divider(&mut fx.doc, divider, &mut fx.sink).unwrap();
        assert_eq!(fx.finish(), original);
    }

    #[test]
    fn test_delete_existing_divider_accepts() {
        let mut fx = Fixture::new();
        let divider = fx.doc.create(NodeKind::Divider);
        let root = fx.doc.root();
        fx.doc.append(root, divider).unwrap();
        delete_divider(&mut fx.doc, divider, &mut fx.sink).unwrap();
        let id = fx.only_id();
        accept_suggestion(&mut fx.doc, &id).unwrap();
        assert!(fx.doc.children(root).is_empty());
    }
}
