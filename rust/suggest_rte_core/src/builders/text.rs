//! Text suggestions: typing, deleting, replacing, paragraph split and join.

use tracing::debug;

use super::{block_marker, enclosing, insert_marker, local_insert, SuggestionSink};
use crate::doc::{char_len, Document, NodeKey, Point};
use crate::error::{EngineError, Result};
use crate::selection::TextRange;
use crate::suggestion::{SuggestionId, SuggestionMark, SuggestionType};

fn is_local_insert(doc: &Document, key: NodeKey, sink: &dyn SuggestionSink) -> bool {
    doc.mark(key).is_some_and(|m| m.kind == SuggestionType::Insert && sink.is_local(&m.id))
}

fn append_to_range(doc: &mut Document, range: NodeKey, chars: &str) -> Result<()> {
    match doc.children(range).last().copied() {
        Some(last) if doc.get(last).and_then(|n| n.text()).is_some() => {
            let len = doc.get(last).and_then(|n| n.text()).map(char_len).unwrap_or(0);
            doc.insert_chars(last, len, chars)
        }
        _ => {
            let text = doc.create_text(chars, Default::default(), "");
            doc.append(range, text)
        }
    }
}

fn prepend_to_range(doc: &mut Document, range: NodeKey, chars: &str) -> Result<()> {
    match doc.children(range).first().copied() {
        Some(first) if doc.get(first).and_then(|n| n.text()).is_some() => doc.insert_chars(first, 0, chars),
        _ => {
            let text = doc.create_text(chars, Default::default(), "");
            doc.insert_at(range, 0, text)
        }
    }
}

fn outermost(doc: &Document, key: NodeKey, block: NodeKey, kind: SuggestionType) -> Option<NodeKey> {
    let mut found = None;
    for ancestor in doc.ancestors(key) {
        if ancestor == block {
            break;
        }
        if doc.mark(ancestor).is_some_and(|m| m.kind == kind) {
            found = Some(ancestor);
        }
    }
    found
}

/// Type `text` at `at` as an insertion suggestion.
pub fn insert_text(doc: &mut Document, at: Point, text: &str, sink: &mut dyn SuggestionSink) -> Result<bool> {
    if text.is_empty() {
        return Ok(false);
    }
    let Some(node) = doc.get(at.key) else {
        debug!(key = %at.key, "insert target missing");
        return Ok(false);
    };
    let Some(current) = node.text() else {
        return insert_into_element(doc, at, text, sink);
    };
    let len = char_len(current);
    let offset = at.offset.min(len);
    let Some(block) = doc.closest_block(at.key) else { return Ok(false) };

    if enclosing(doc, at.key, block, SuggestionType::Insert).is_some() {
        doc.insert_chars(at.key, offset, text)?;
        return Ok(true);
    }
    if offset == len {
        if let Some(next) = doc.next_sibling(at.key).filter(|&k| is_local_insert(doc, k, sink)) {
            prepend_to_range(doc, next, text)?;
            return Ok(true);
        }
    }
    if offset == 0 {
        if let Some(prev) = doc.prev_sibling(at.key).filter(|&k| is_local_insert(doc, k, sink)) {
            append_to_range(doc, prev, text)?;
            return Ok(true);
        }
    }

    let (format, style) = doc.format_of(at.key).map(|(f, s)| (f, s.to_string())).unwrap_or_default();
    let id = SuggestionId::generate();
    let wrapper = doc.create_suggestion(SuggestionMark::new(id.clone(), SuggestionType::Insert));
    let content = doc.create_text(text, format, style);
    doc.append(wrapper, content)?;

    // New text never lands inside a pending deletion.
    match outermost(doc, at.key, block, SuggestionType::Delete) {
        Some(deleted) if offset == 0 => doc.insert_before(deleted, wrapper)?,
        Some(deleted) => doc.insert_after(deleted, wrapper)?,
        None => {
            doc.split_text(at.key, offset)?;
            doc.insert_after(at.key, wrapper)?;
        }
    }
    sink.on_created(&id);
    Ok(true)
}

fn insert_into_element(doc: &mut Document, at: Point, text: &str, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let Some(node) = doc.get(at.key) else { return Ok(false) };
    if !node.kind.is_text_container() {
        debug!(key = %at.key, "caret is not inside a text container");
        return Ok(false);
    }
    let idx = at.offset.min(node.children.len());
    if let Some(prev) = idx.checked_sub(1).map(|i| doc.children(at.key)[i]) {
        if is_local_insert(doc, prev, sink) {
            append_to_range(doc, prev, text)?;
            return Ok(true);
        }
    }
    let id = SuggestionId::generate();
    let wrapper = doc.create_suggestion(SuggestionMark::new(id.clone(), SuggestionType::Insert));
    let content = doc.create_text(text, Default::default(), "");
    doc.append(wrapper, content)?;
    doc.insert_at(at.key, idx, wrapper)?;
    sink.on_created(&id);
    Ok(true)
}

/// Id of a session `delete` range directly adjacent to the run, if any.
fn adjacent_local_delete(doc: &Document, texts: &[NodeKey], sink: &dyn SuggestionSink) -> Option<SuggestionId> {
    let is_delete = |k: NodeKey| {
        doc.mark(k).filter(|m| m.kind == SuggestionType::Delete && sink.is_local(&m.id)).map(|m| m.id.clone())
    };
    let is_empty_text = |k: NodeKey| doc.get(k).and_then(|n| n.text()).is_some_and(str::is_empty);
    let mut before = texts.first().and_then(|&k| doc.prev_sibling(k));
    while let Some(k) = before.filter(|&k| is_empty_text(k)) {
        before = doc.prev_sibling(k);
    }
    let mut after = texts.last().and_then(|&k| doc.next_sibling(k));
    while let Some(k) = after.filter(|&k| is_empty_text(k)) {
        after = doc.next_sibling(k);
    }
    before.and_then(is_delete).or_else(|| after.and_then(is_delete))
}

/// Mark whole text nodes as deleted under `id`. Text the session inserted is
/// dropped outright; already-deleted text is skipped. Returns whether any
/// `delete` range was created.
fn delete_nodes(doc: &mut Document, texts: &[NodeKey], id: &SuggestionId, sink: &dyn SuggestionSink) -> Result<bool> {
    let mut wrapped = false;
    for &key in texts {
        let Some(block) = doc.closest_block(key) else { continue };
        if enclosing(doc, key, block, SuggestionType::Delete).is_some() {
            continue;
        }
        if local_insert(doc, key, block, sink).is_some() {
            doc.remove(key)?;
            continue;
        }
        doc.wrap_in_suggestion(key, SuggestionMark::new(id.clone(), SuggestionType::Delete))?;
        wrapped = true;
    }
    Ok(wrapped)
}

pub fn delete_text(doc: &mut Document, range: TextRange, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let Some(texts) = range.isolate(doc)? else {
        debug!("delete range does not resolve to one block");
        return Ok(false);
    };
    if texts.is_empty() {
        return Ok(false);
    }
    let (id, fresh) = match adjacent_local_delete(doc, &texts, sink) {
        Some(id) => (id, false),
        None => (SuggestionId::generate(), true),
    };
    if delete_nodes(doc, &texts, &id, sink)? && fresh {
        sink.on_created(&id);
    }
    Ok(true)
}

/// Backspace (`backward`) or forward delete of one character at the caret.
/// At a block boundary this becomes a join suggestion.
pub fn delete_character(doc: &mut Document, at: Point, backward: bool, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let Some(block) = doc.closest_block(at.key) else { return Ok(false) };
    let live = |doc: &Document, k: NodeKey| enclosing(doc, k, block, SuggestionType::Delete).is_none();
    let texts = doc.text_nodes(block);
    let len_of = |doc: &Document, k: NodeKey| doc.get(k).and_then(|n| n.text()).map(char_len).unwrap_or(0);

    // Caret expressed as an index into `texts`.
    let (caret_idx, offset) = if at.key == block {
        if at.offset == 0 {
            (None, 0)
        } else if at.offset >= doc.children(block).len() {
            (texts.len().checked_sub(1), texts.last().map(|&k| len_of(doc, k)).unwrap_or(0))
        } else {
            debug!("element caret inside a block is not supported for deletion");
            return Ok(false);
        }
    } else {
        match texts.iter().position(|&k| k == at.key) {
            Some(i) => (Some(i), at.offset.min(len_of(doc, at.key))),
            None => return Ok(false),
        }
    };

    let target = if backward {
        match caret_idx {
            Some(i) if offset > 0 && live(doc, texts[i]) => Some((texts[i], offset - 1)),
            Some(i) => texts[..i]
                .iter()
                .rev()
                .find(|&&k| live(doc, k) && len_of(doc, k) > 0)
                .map(|&k| (k, len_of(doc, k) - 1)),
            None => None,
        }
    } else {
        let start = match caret_idx {
            Some(i) if offset < len_of(doc, texts[i]) && live(doc, texts[i]) => {
                return delete_text(doc, TextRange::new(Point::new(texts[i], offset), Point::new(texts[i], offset + 1)), sink);
            }
            Some(i) => i + 1,
            None => 0,
        };
        texts[start.min(texts.len())..].iter().find(|&&k| live(doc, k) && len_of(doc, k) > 0).map(|&k| (k, 0))
    };

    match target {
        Some((key, idx)) => delete_text(doc, TextRange::new(Point::new(key, idx), Point::new(key, idx + 1)), sink),
        None if backward => join_with_previous(doc, block, sink),
        None => match doc.next_sibling(block) {
            Some(next) => join_with_previous(doc, next, sink),
            None => Ok(false),
        },
    }
}

/// Record joining `block` into its predecessor. A session split right at that
/// boundary is undone instead.
fn join_with_previous(doc: &mut Document, block: NodeKey, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let Some(prev) = doc.prev_sibling(block) else { return Ok(false) };
    if !doc.get(prev).is_some_and(|n| n.kind.is_text_container()) {
        return Ok(false);
    }
    let split = doc
        .children(prev)
        .last()
        .copied()
        .filter(|&k| doc.mark(k).is_some_and(|m| m.kind == SuggestionType::Split && sink.is_local(&m.id)));
    if let Some(split) = split {
        doc.remove(split)?;
        doc.merge_blocks(prev, block)?;
        return Ok(true);
    }
    if block_marker(doc, block, SuggestionType::Join).is_some() {
        return Ok(true);
    }
    let id = SuggestionId::generate();
    insert_marker(doc, block, SuggestionMark::new(id.clone(), SuggestionType::Join))?;
    sink.on_created(&id);
    Ok(true)
}

/// Replace a range with new text: one delete and one insert sharing an id.
pub fn replace_text(doc: &mut Document, range: TextRange, text: &str, sink: &mut dyn SuggestionSink) -> Result<bool> {
    if range.is_collapsed() {
        return insert_text(doc, range.start, text, sink);
    }
    let Some(texts) = range.isolate(doc)? else { return Ok(false) };
    let Some(&last) = texts.last() else { return insert_text(doc, range.start, text, sink) };
    let Some(block) = doc.closest_block(last) else { return Ok(false) };
    let (format, style) = doc.format_of(last).map(|(f, s)| (f, s.to_string())).unwrap_or_default();
    let fallback = doc.child_containing(block, last).and_then(|k| doc.index_in_parent(k)).unwrap_or(0) + 1;

    let id = SuggestionId::generate();
    let mut created = delete_nodes(doc, &texts, &id, sink)?;
    if !text.is_empty() {
        let wrapper = doc.create_suggestion(SuggestionMark::new(id.clone(), SuggestionType::Insert));
        let content = doc.create_text(text, format, style);
        doc.append(wrapper, content)?;
        match doc.contains(last).then(|| doc.child_containing(block, last)).flatten() {
            Some(anchor) => doc.insert_after(anchor, wrapper)?,
            None => doc.insert_at(block, fallback, wrapper)?,
        }
        created = true;
    }
    if created {
        sink.on_created(&id);
    }
    Ok(true)
}

/// Enter: split the block at the caret and leave a `split` marker at the end
/// of the first half.
pub fn insert_paragraph(doc: &mut Document, at: Point, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let Some(block) = doc.closest_block(at.key) else { return Ok(false) };
    if at.key != block && doc.get(at.key).and_then(|n| n.text()).is_none() {
        debug!(key = %at.key, "paragraph split needs a text or block caret");
        return Ok(false);
    }
    split_block_at(doc, block, at)?;
    let id = SuggestionId::generate();
    let marker = doc.create_suggestion(SuggestionMark::new(id.clone(), SuggestionType::Split));
    doc.append(block, marker)?;
    sink.on_created(&id);
    Ok(true)
}

/// Move everything after `at` into a new sibling block, cloning the inline
/// ancestors the caret sits in. Returns the new block.
pub(crate) fn split_block_at(doc: &mut Document, block: NodeKey, at: Point) -> Result<NodeKey> {
    let tail_start = if at.key == block {
        doc.children(block).get(at.offset).copied()
    } else {
        let mut current = doc.split_text(at.key, at.offset)?;
        loop {
            let parent = doc.parent(current).ok_or(EngineError::NodeNotFound(current))?;
            if parent == block {
                break;
            }
            let copy = doc.clone_shallow(parent)?;
            doc.insert_after(parent, copy)?;
            let idx = doc.index_in_parent(current).ok_or(EngineError::NodeNotFound(current))?;
            for k in doc.children(parent)[idx..].to_vec() {
                doc.append(copy, k)?;
            }
            current = copy;
        }
        Some(current)
    };

    let new_block = doc.clone_shallow(block)?;
    doc.insert_after(block, new_block)?;
    if let Some(start) = tail_start {
        let idx = doc.index_in_parent(start).ok_or(EngineError::NodeNotFound(start))?;
        for k in doc.children(block)[idx..].to_vec() {
            doc.append(new_block, k)?;
        }
    }
    Ok(new_block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::testing::Fixture;
    use crate::resolve::{accept_suggestion, reject_suggestion};

    fn first_text(doc: &Document, id: &SuggestionId) -> NodeKey {
        let range = doc.suggestion_nodes(id)[0];
        doc.text_nodes(range)[0]
    }

    #[test]
    fn test_insert_then_reject_restores_document() {
        let mut fx = Fixture::new();
        let (_, text) = fx.doc.append_paragraph("hello");
        let original = fx.finish();

        assert!(insert_text(&mut fx.doc, Point::new(text, 5), " world", &mut fx.sink).unwrap());
        let id = fx.only_id();
        fx.doc.normalize();
        assert_eq!(fx.doc.text_content(fx.doc.root()), "hello world");

        reject_suggestion(&mut fx.doc, &id).unwrap();
        assert_eq!(fx.finish(), original);
    }

    #[test]
    fn test_typing_extends_the_session_insertion() {
        let mut fx = Fixture::new();
        let (_, text) = fx.doc.append_paragraph("ab");
        insert_text(&mut fx.doc, Point::new(text, 1), "x", &mut fx.sink).unwrap();
        let id = fx.only_id();
        let typed = first_text(&fx.doc, &id);
        insert_text(&mut fx.doc, Point::new(typed, 1), "y", &mut fx.sink).unwrap();
        // Caret right after the range, in the following text.
        let tail = fx.doc.next_sibling(fx.doc.suggestion_nodes(&id)[0]).unwrap();
        insert_text(&mut fx.doc, Point::new(tail, 0), "z", &mut fx.sink).unwrap();
        fx.doc.normalize();

        assert_eq!(fx.sink.created.len(), 1);
        assert_eq!(fx.doc.text_content(fx.doc.suggestion_nodes(&id)[0]), "xyz");
        assert_eq!(fx.doc.text_content(fx.doc.root()), "axyzb");
    }

    #[test]
    fn test_deleting_own_insertion_cancels_it() {
        let mut fx = Fixture::new();
        let (_, text) = fx.doc.append_paragraph("ab");
        let original = fx.finish();
        insert_text(&mut fx.doc, Point::new(text, 1), "xyz", &mut fx.sink).unwrap();
        let id = fx.only_id();
        let typed = first_text(&fx.doc, &id);
        let range = TextRange::of_text(&fx.doc, typed);
        delete_text(&mut fx.doc, range, &mut fx.sink).unwrap();

        assert_eq!(fx.sink.created.len(), 1);
        assert_eq!(fx.finish(), original);
        assert!(fx.doc.suggestion_ids().is_empty());
    }

    #[test]
    fn test_backspace_walks_over_deleted_text() {
        let mut fx = Fixture::new();
        let (block, text) = fx.doc.append_paragraph("abc");
        delete_character(&mut fx.doc, Point::new(text, 3), true, &mut fx.sink).unwrap();
        fx.doc.normalize();
        let first = fx.doc.text_nodes(block)[0];
        delete_character(&mut fx.doc, Point::new(first, 2), true, &mut fx.sink).unwrap();
        fx.doc.normalize();

        let id = fx.only_id();
        let ranges = fx.doc.suggestion_nodes(&id);
        assert_eq!(ranges.len(), 1);
        assert_eq!(fx.doc.text_content(ranges[0]), "bc");
        assert_eq!(fx.doc.text_content(block), "abc");

        accept_suggestion(&mut fx.doc, &id).unwrap();
        assert_eq!(fx.doc.text_content(block), "a");
    }

    #[test]
    fn test_split_then_backspace_cancels() {
        let mut fx = Fixture::new();
        let (_, text) = fx.doc.append_paragraph("hello");
        let original = fx.finish();
        insert_paragraph(&mut fx.doc, Point::new(text, 2), &mut fx.sink).unwrap();
        fx.doc.normalize();
        let root = fx.doc.root();
        assert_eq!(fx.doc.children(root).len(), 2);

        let second = fx.doc.children(root)[1];
        delete_character(&mut fx.doc, Point::new(second, 0), true, &mut fx.sink).unwrap();
        assert_eq!(fx.finish(), original);
    }

    #[test]
    fn test_split_reject_merges_blocks_back() {
        let mut fx = Fixture::new();
        let (_, text) = fx.doc.append_paragraph("hello");
        let original = fx.finish();
        insert_paragraph(&mut fx.doc, Point::new(text, 3), &mut fx.sink).unwrap();
        let id = fx.only_id();
        reject_suggestion(&mut fx.doc, &id).unwrap();
        assert_eq!(fx.finish(), original);
    }

    #[test]
    fn test_backspace_at_block_start_records_join() {
        let mut fx = Fixture::new();
        fx.doc.append_paragraph("one");
        let (second, text) = fx.doc.append_paragraph("two");
        delete_character(&mut fx.doc, Point::new(text, 0), true, &mut fx.sink).unwrap();
        let id = fx.only_id();
        assert_eq!(fx.doc.mark(fx.doc.children(second)[0]).unwrap().kind, SuggestionType::Join);

        accept_suggestion(&mut fx.doc, &id).unwrap();
        let root = fx.doc.root();
        assert_eq!(fx.doc.children(root).len(), 1);
        assert_eq!(fx.doc.text_content(root), "onetwo");
    }

    #[test]
    fn test_replace_shares_one_id() {
        let mut fx = Fixture::new();
        let (block, text) = fx.doc.append_paragraph("say bar now");
        let range = TextRange::new(Point::new(text, 4), Point::new(text, 7));
        replace_text(&mut fx.doc, range, "foo", &mut fx.sink).unwrap();
        fx.doc.normalize();
        let id = fx.only_id();
        let kinds: Vec<_> = fx.doc.suggestion_nodes(&id).iter().map(|&k| fx.doc.mark(k).unwrap().kind).collect();
        assert_eq!(kinds, vec![SuggestionType::Delete, SuggestionType::Insert]);

        accept_suggestion(&mut fx.doc, &id).unwrap();
        assert_eq!(fx.doc.text_content(block), "say foo now");
    }
}
