//! Human-readable summaries of a suggestion, stored on its thread.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::doc::{Document, NodeKey, NodeKind};
use crate::error::Result;
use crate::suggestion::{SuggestionId, SuggestionType};

/// Default cap on the characters kept per fragment.
pub const DEFAULT_CHAR_CAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    Suggestion(SuggestionType),
    /// A deletion and an insertion that read as one replacement.
    Replace,
}

impl fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryKind::Suggestion(kind) => write!(f, "{kind}"),
            SummaryKind::Replace => f.write_str("replace"),
        }
    }
}

impl Serialize for SummaryKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryFragment {
    #[serde(rename = "type")]
    pub kind: SummaryKind,
    pub content: String,
    #[serde(rename = "replaceWith", skip_serializing_if = "Option::is_none")]
    pub replace_with: Option<String>,
}

fn cap(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn is_plain(kind: SummaryKind) -> bool {
    matches!(kind, SummaryKind::Suggestion(SuggestionType::Insert | SuggestionType::Delete))
}

fn is_structural(kind: SummaryKind) -> bool {
    matches!(kind, SummaryKind::Suggestion(k) if k.is_structural())
}

/// What a single range contributes to the summary.
fn range_content(doc: &Document, key: NodeKey, kind: SuggestionType) -> String {
    use SuggestionType::*;
    let host = doc.parent(key);
    match kind {
        Split | Join => String::new(),
        BlockTypeChange => match host.and_then(|h| doc.kind(h)) {
            Some(NodeKind::Block { block_type }) => block_type.to_string(),
            Some(NodeKind::ListItem { .. }) => host
                .and_then(|h| doc.parent(h))
                .and_then(|l| match doc.kind(l) {
                    Some(NodeKind::List { list_type, .. }) => Some(list_type.to_string()),
                    _ => None,
                })
                .unwrap_or_default(),
            _ => String::new(),
        },
        AlignChange => host.and_then(|h| doc.get(h)).map(|n| n.align.to_string()).unwrap_or_default(),
        IndentChange => host.and_then(|h| doc.get(h)).map(|n| n.indent.to_string()).unwrap_or_default(),
        InsertImage | DeleteImage | ImageChange => doc
            .descendants(key)
            .into_iter()
            .find_map(|k| match doc.kind(k) {
                Some(NodeKind::Image(props)) => Some(if props.alt.is_empty() { props.src.clone() } else { props.alt.clone() }),
                _ => None,
            })
            .unwrap_or_default(),
        _ => doc.text_content(key),
    }
}

/// Build the summary for `id` from its ranges in document order.
pub fn generate_summary(doc: &Document, id: &SuggestionId, char_cap: usize) -> Vec<SummaryFragment> {
    summarize_ranges(doc, &doc.suggestion_nodes(id), char_cap)
}

/// Summary over range keys already in document order.
pub fn summarize_ranges(doc: &Document, ranges: &[NodeKey], char_cap: usize) -> Vec<SummaryFragment> {
    let mut fragments: Vec<SummaryFragment> = Vec::new();
    for &key in ranges {
        let Some(mark) = doc.mark(key) else { continue };
        let fragment = SummaryFragment {
            kind: SummaryKind::Suggestion(mark.kind),
            content: cap(&range_content(doc, key, mark.kind), char_cap),
            replace_with: None,
        };
        push_fragment(&mut fragments, fragment, char_cap);
    }
    fragments
}

fn push_fragment(fragments: &mut Vec<SummaryFragment>, next: SummaryFragment, char_cap: usize) {
    use SuggestionType::{Delete, Insert};
    let Some(last) = fragments.last_mut() else {
        fragments.push(next);
        return;
    };
    match (last.kind, next.kind) {
        (a, b) if a == b => {
            if !is_structural(a) {
                last.content = cap(&format!("{}{}", last.content, next.content), char_cap);
            }
        }
        (a, b) if is_structural(a) && is_plain(b) => {}
        (a, b) if is_plain(a) && is_structural(b) => *last = next,
        (SummaryKind::Suggestion(Insert), SummaryKind::Suggestion(Delete)) => {
            let inserted = std::mem::take(&mut last.content);
            *last = SummaryFragment { kind: SummaryKind::Replace, content: next.content, replace_with: Some(inserted) };
        }
        (SummaryKind::Suggestion(Delete), SummaryKind::Suggestion(Insert)) => {
            last.kind = SummaryKind::Replace;
            last.replace_with = Some(next.content);
        }
        (SummaryKind::Replace, SummaryKind::Suggestion(Insert)) => {
            let with = last.replace_with.take().unwrap_or_default();
            last.replace_with = Some(cap(&format!("{with}{}", next.content), char_cap));
        }
        (SummaryKind::Replace, SummaryKind::Suggestion(Delete)) => {
            last.content = cap(&format!("{}{}", last.content, next.content), char_cap);
        }
        _ => fragments.push(next),
    }
}

/// JSON array stored as the thread's summary content.
pub fn summary_json(fragments: &[SummaryFragment]) -> Result<String> {
    Ok(serde_json::to_string(fragments)?)
}

/// Type label for the thread: the first fragment's type.
pub fn summary_type(fragments: &[SummaryFragment]) -> String {
    fragments.first().map(|f| f.kind.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggestion::SuggestionMark;

    fn wrap_text(doc: &mut Document, block: NodeKey, text: &str, id: &str, kind: SuggestionType) {
        let t = doc.create_text(text, Default::default(), "");
        doc.append(block, t).unwrap();
        doc.wrap_in_suggestion(t, SuggestionMark::new(id.into(), kind)).unwrap();
    }

    #[test]
    fn test_insert_then_delete_collapses_to_replace() {
        let mut doc = Document::new();
        let (block, _) = doc.append_paragraph("");
        wrap_text(&mut doc, block, "foo", "r", SuggestionType::Insert);
        wrap_text(&mut doc, block, "bar", "r", SuggestionType::Delete);
        let fragments = generate_summary(&doc, &SuggestionId::from("r"), DEFAULT_CHAR_CAP);
        assert_eq!(
            fragments,
            vec![SummaryFragment {
                kind: SummaryKind::Replace,
                content: "bar".into(),
                replace_with: Some("foo".into())
            }]
        );
        let json = summary_json(&fragments).unwrap();
        assert_eq!(json, r#"[{"type":"replace","content":"bar","replaceWith":"foo"}]"#);
    }

    #[test]
    fn test_content_is_capped() {
        let mut doc = Document::new();
        let (block, _) = doc.append_paragraph("");
        let long = "x".repeat(80);
        wrap_text(&mut doc, block, &long, "i", SuggestionType::Insert);
        let fragments = generate_summary(&doc, &SuggestionId::from("i"), DEFAULT_CHAR_CAP);
        assert_eq!(fragments[0].content.chars().count(), 50);
        assert_eq!(summary_type(&fragments), "insert");
    }

    #[test]
    fn test_structural_kind_wins_and_split_is_empty() {
        let mut doc = Document::new();
        let (block, _) = doc.append_paragraph("");
        wrap_text(&mut doc, block, "typed", "s", SuggestionType::Insert);
        let marker = doc.create_suggestion(SuggestionMark::new("s".into(), SuggestionType::Split));
        doc.append(block, marker).unwrap();
        let fragments = generate_summary(&doc, &SuggestionId::from("s"), DEFAULT_CHAR_CAP);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].kind, SummaryKind::Suggestion(SuggestionType::Split));
        assert_eq!(fragments[0].content, "");
    }
}
