//! Selection model: carets and single-block text ranges.

use serde::{Deserialize, Serialize};

pub use crate::doc::Point;
use crate::doc::{char_len, Document, NodeKey};
use crate::error::Result;

/// A text range restricted to one block. `start` and `end` must point into
/// text nodes; they may be given in either order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start: Point,
    pub end: Point,
}

impl TextRange {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// Range covering a whole text node.
    pub fn of_text(doc: &Document, key: NodeKey) -> Self {
        let len = doc.get(key).and_then(|n| n.text()).map(char_len).unwrap_or(0);
        Self { start: Point::new(key, 0), end: Point::new(key, len) }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Put start before end in document order. `None` when the endpoints are
    /// not text nodes of one block.
    pub fn ordered(&self, doc: &Document) -> Option<(TextRange, NodeKey)> {
        let block = doc.closest_block(self.start.key)?;
        if doc.closest_block(self.end.key)? != block {
            return None;
        }
        let texts = doc.text_nodes(block);
        let pos = |p: &Point| texts.iter().position(|&k| k == p.key).map(|i| (i, p.offset));
        let (s, e) = (pos(&self.start)?, pos(&self.end)?);
        let range = if s <= e { *self } else { TextRange { start: self.end, end: self.start } };
        Some((range, block))
    }

    /// Split text at both ends so the range covers whole text nodes, and return
    /// those nodes in document order. `None` when the range is not usable.
    pub fn isolate(&self, doc: &mut Document) -> Result<Option<Vec<NodeKey>>> {
        let Some((range, block)) = self.ordered(doc) else { return Ok(None) };
        let clamp = |doc: &Document, p: Point| {
            let len = doc.get(p.key).and_then(|n| n.text()).map(char_len).unwrap_or(0);
            p.offset.min(len)
        };
        let (so, eo) = (clamp(doc, range.start), clamp(doc, range.end));

        if range.start.key == range.end.key {
            if so >= eo {
                return Ok(Some(Vec::new()));
            }
            doc.split_text(range.start.key, eo)?;
            let middle = doc.split_text(range.start.key, so)?;
            return Ok(Some(vec![middle]));
        }

        doc.split_text(range.end.key, eo)?;
        let first = doc.split_text(range.start.key, so)?;
        let texts = doc.text_nodes(block);
        let from = texts.iter().position(|&k| k == first);
        let to = texts.iter().position(|&k| k == range.end.key);
        match (from, to) {
            (Some(from), Some(to)) if from <= to => Ok(Some(texts[from..=to].to_vec())),
            _ => Ok(Some(Vec::new())),
        }
    }
}
