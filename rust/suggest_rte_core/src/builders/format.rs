//! Inline formatting and block layout suggestions.
//!
//! Inline changes wrap each affected text run and store the run's prior
//! value, so toggling the change back leaves the range equal to its snapshot
//! and the range is dropped. Block layout changes (alignment, indent) use a
//! marker at the start of the block instead.

use std::collections::BTreeSet;

use tracing::debug;

use super::{block_marker, enclosing, insert_marker, local_insert, SuggestionSink};
use crate::doc::{Align, Document, NodeKey, TextFormat, TextFormatType};
use crate::error::Result;
use crate::selection::TextRange;
use crate::suggestion::{ChangedProperties, SuggestionId, SuggestionMark, SuggestionType};

/// Isolate a range and drop the runs that are pending deletion.
fn live_texts(doc: &mut Document, range: TextRange) -> Result<Option<Vec<NodeKey>>> {
    let Some(texts) = range.isolate(doc)? else { return Ok(None) };
    let live = texts
        .into_iter()
        .filter(|&k| match doc.closest_block(k) {
            Some(block) => enclosing(doc, k, block, SuggestionType::Delete).is_none(),
            None => false,
        })
        .collect::<Vec<_>>();
    Ok(Some(live))
}

/// What an inline change does to a run, and how to spot that it was undone.
trait InlineChange {
    const KIND: SuggestionType;
    /// Snapshot of the run before the change.
    fn capture(doc: &Document, text: NodeKey) -> ChangedProperties;
    fn apply(&self, doc: &mut Document, text: NodeKey) -> Result<()>;
    /// Whether `text` currently matches the snapshot.
    fn matches(doc: &Document, text: NodeKey, snapshot: &ChangedProperties) -> bool;
}

struct Toggle {
    ty: TextFormatType,
    on: bool,
}

impl InlineChange for Toggle {
    const KIND: SuggestionType = SuggestionType::PropertyChange;

    fn capture(doc: &Document, text: NodeKey) -> ChangedProperties {
        ChangedProperties { format: doc.format_of(text).map(|(f, _)| f), ..Default::default() }
    }

    fn apply(&self, doc: &mut Document, text: NodeKey) -> Result<()> {
        let mut format = doc.format_of(text).map(|(f, _)| f).unwrap_or_default();
        format.set(self.ty, self.on);
        doc.set_format(text, format)
    }

    fn matches(doc: &Document, text: NodeKey, snapshot: &ChangedProperties) -> bool {
        doc.format_of(text).map(|(f, _)| f) == snapshot.format
    }
}

struct Style<'a>(&'a str);

impl InlineChange for Style<'_> {
    const KIND: SuggestionType = SuggestionType::StyleChange;

    fn capture(doc: &Document, text: NodeKey) -> ChangedProperties {
        ChangedProperties { style: doc.format_of(text).map(|(_, s)| s.to_string()), ..Default::default() }
    }

    fn apply(&self, doc: &mut Document, text: NodeKey) -> Result<()> {
        doc.set_style(text, self.0)
    }

    fn matches(doc: &Document, text: NodeKey, snapshot: &ChangedProperties) -> bool {
        doc.format_of(text).map(|(_, s)| s) == snapshot.style.as_deref()
    }
}

fn apply_inline<C: InlineChange>(
    doc: &mut Document,
    range: TextRange,
    change: &C,
    sink: &mut dyn SuggestionSink,
) -> Result<bool> {
    let Some(texts) = live_texts(doc, range)? else {
        debug!(kind = %C::KIND, "range does not resolve to one block");
        return Ok(false);
    };
    if texts.is_empty() {
        return Ok(false);
    }
    let id = SuggestionId::generate();
    let mut created = false;
    let mut absorbed = BTreeSet::new();

    for text in texts {
        let Some(block) = doc.closest_block(text) else { continue };
        if local_insert(doc, text, block, sink).is_some() {
            change.apply(doc, text)?;
            continue;
        }
        if let Some(existing) = enclosing(doc, text, block, C::KIND) {
            change.apply(doc, text)?;
            absorbed.insert(existing);
            continue;
        }
        let snapshot = C::capture(doc, text);
        change.apply(doc, text)?;
        if C::matches(doc, text, &snapshot) {
            continue;
        }
        doc.wrap_in_suggestion(text, SuggestionMark::with_changes(id.clone(), C::KIND, snapshot))?;
        created = true;
    }

    for range in absorbed {
        let Some(snapshot) = doc.mark(range).and_then(|m| m.changed()).cloned() else { continue };
        let settled = doc
            .text_nodes(range)
            .into_iter()
            .filter(|&t| doc.get(t).and_then(|n| n.text()).is_some_and(|s| !s.is_empty()))
            .all(|t| C::matches(doc, t, &snapshot));
        if settled {
            doc.unwrap(range)?;
        }
    }
    if created {
        sink.on_created(&id);
    }
    Ok(true)
}

/// Toggle one text format over a range. The range turns the format on unless
/// every run already has it.
pub fn format_text(
    doc: &mut Document,
    range: TextRange,
    ty: TextFormatType,
    sink: &mut dyn SuggestionSink,
) -> Result<bool> {
    let Some((ordered, block)) = range.ordered(doc) else { return Ok(false) };
    let texts = doc.text_nodes(block);
    let from = texts.iter().position(|&k| k == ordered.start.key);
    let to = texts.iter().position(|&k| k == ordered.end.key);
    let all_on = match (from, to) {
        (Some(f), Some(t)) => texts[f..=t].iter().all(|&k| doc.format_of(k).is_some_and(|(fmt, _)| fmt.has(ty))),
        _ => false,
    };
    apply_inline(doc, ordered, &Toggle { ty, on: !all_on }, sink)
}

pub fn set_text_style(doc: &mut Document, range: TextRange, style: &str, sink: &mut dyn SuggestionSink) -> Result<bool> {
    apply_inline(doc, range, &Style(style), sink)
}

/// Remove every format and style from a range, remembering both.
pub fn clear_formatting(doc: &mut Document, range: TextRange, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let Some(texts) = live_texts(doc, range)? else { return Ok(false) };
    let id = SuggestionId::generate();
    let mut created = false;
    for text in texts {
        let Some((format, style)) = doc.format_of(text).map(|(f, s)| (f, s.to_string())) else { continue };
        if format.is_plain() && style.is_empty() {
            continue;
        }
        let Some(block) = doc.closest_block(text) else { continue };
        let inserted = local_insert(doc, text, block, sink).is_some();
        doc.set_format(text, TextFormat::default())?;
        doc.set_style(text, "")?;
        if inserted {
            continue;
        }
        let changed = ChangedProperties { format: Some(format), style: Some(style), ..Default::default() };
        doc.wrap_in_suggestion(text, SuggestionMark::with_changes(id.clone(), SuggestionType::ClearFormatting, changed))?;
        created = true;
    }
    if created {
        sink.on_created(&id);
    }
    Ok(true)
}

fn layout_host(doc: &Document, block: NodeKey) -> Option<NodeKey> {
    doc.closest_block(block)
}

pub fn set_alignment(doc: &mut Document, block: NodeKey, align: Align, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let Some(host) = layout_host(doc, block) else {
        debug!(key = %block, "alignment needs a block");
        return Ok(false);
    };
    let current = doc.node(host)?.align;
    if let Some(marker) = block_marker(doc, host, SuggestionType::AlignChange) {
        doc.node_mut(host)?.align = align;
        let initial = doc.mark(marker).and_then(|m| m.changed()).and_then(|c| c.align);
        if initial == Some(align) {
            doc.remove(marker)?;
        }
        return Ok(true);
    }
    if current == align {
        return Ok(true);
    }
    let id = SuggestionId::generate();
    let changed = ChangedProperties { align: Some(current), ..Default::default() };
    insert_marker(doc, host, SuggestionMark::with_changes(id.clone(), SuggestionType::AlignChange, changed))?;
    doc.node_mut(host)?.align = align;
    sink.on_created(&id);
    Ok(true)
}

/// Indent (`delta > 0`) or outdent a block by one level.
pub fn change_indent(doc: &mut Document, block: NodeKey, delta: i32, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let Some(host) = layout_host(doc, block) else { return Ok(false) };
    let current = doc.node(host)?.indent;
    let next = current.saturating_add_signed(delta.signum());
    if next == current {
        debug!(key = %host, "block is already at the outermost level");
        return Ok(false);
    }
    doc.node_mut(host)?.indent = next;
    if let Some(marker) = block_marker(doc, host, SuggestionType::IndentChange) {
        let initial = doc.mark(marker).and_then(|m| m.changed()).and_then(|c| c.indent);
        if initial == Some(next) {
            doc.remove(marker)?;
        }
        return Ok(true);
    }
    let id = SuggestionId::generate();
    let changed = ChangedProperties { indent: Some(current), ..Default::default() };
    insert_marker(doc, host, SuggestionMark::with_changes(id.clone(), SuggestionType::IndentChange, changed))?;
    sink.on_created(&id);
    Ok(true)
}
