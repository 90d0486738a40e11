//! Link suggestions.

use std::collections::HashSet;

use tracing::debug;

use super::{enclosing, SuggestionSink};
use crate::doc::{Document, NodeKey, NodeKind};
use crate::error::Result;
use crate::selection::TextRange;
use crate::suggestion::{ChangedProperties, LinkChange, SuggestionId, SuggestionMark, SuggestionType};

fn link_url(doc: &Document, key: NodeKey) -> Option<String> {
    match doc.kind(key) {
        Some(NodeKind::Link { url }) => Some(url.clone()),
        _ => None,
    }
}

fn set_url(doc: &mut Document, link: NodeKey, new: &str) -> Result<()> {
    if let NodeKind::Link { url } = &mut doc.node_mut(link)?.kind {
        *url = new.to_string();
    }
    Ok(())
}

/// Link the range to `url`, or unlink it when `url` is `None`.
pub fn set_link(doc: &mut Document, range: TextRange, url: Option<&str>, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let Some(texts) = range.isolate(doc)? else {
        debug!("link range does not resolve to one block");
        return Ok(false);
    };
    let id = SuggestionId::generate();
    let next = url.map(str::to_string);
    let mut created = false;
    let mut seen = HashSet::new();

    for text in texts {
        let Some(block) = doc.closest_block(text) else { continue };
        if enclosing(doc, text, block, SuggestionType::Delete).is_some() {
            continue;
        }
        let link = doc.closest(text, |n| matches!(n.kind, NodeKind::Link { .. })).filter(|&l| l != block);
        match link {
            Some(link) => {
                if !seen.insert(link) {
                    continue;
                }
                let wrapper = doc.parent(link).filter(|&p| doc.mark(p).is_some_and(|m| m.kind == SuggestionType::LinkChange));
                if let Some(wrapper) = wrapper {
                    revise_link_change(doc, wrapper, link, next.clone())?;
                    continue;
                }
                let previous = link_url(doc, link);
                if previous == next {
                    continue;
                }
                let changed = ChangedProperties {
                    link: Some(LinkChange { previous, next: next.clone() }),
                    ..Default::default()
                };
                doc.wrap_in_suggestion(link, SuggestionMark::with_changes(id.clone(), SuggestionType::LinkChange, changed))?;
                if let Some(u) = url {
                    set_url(doc, link, u)?;
                }
                created = true;
            }
            None => {
                let Some(u) = url else { continue };
                let link = doc.create(NodeKind::Link { url: u.to_string() });
                doc.wrap(&[text], link)?;
                let changed = ChangedProperties {
                    link: Some(LinkChange { previous: None, next: next.clone() }),
                    ..Default::default()
                };
                doc.wrap_in_suggestion(link, SuggestionMark::with_changes(id.clone(), SuggestionType::LinkChange, changed))?;
                created = true;
            }
        }
    }

    if created {
        sink.on_created(&id);
    }
    Ok(true)
}

/// A link that is already suggested: move its target, and drop the
/// suggestion when it lands back on where it started.
fn revise_link_change(doc: &mut Document, wrapper: NodeKey, link: NodeKey, next: Option<String>) -> Result<()> {
    if let Some(u) = next.as_deref() {
        set_url(doc, link, u)?;
    }
    let previous = match doc.mark_mut(wrapper).and_then(|m| m.changed.as_mut()).and_then(|c| c.link.as_mut()) {
        Some(change) => {
            change.next = next.clone();
            change.previous.clone()
        }
        None => return Ok(()),
    };
    if previous == next {
        if previous.is_none() {
            doc.unwrap(link)?;
        }
        doc.unwrap(wrapper)?;
    }
    Ok(())
}
