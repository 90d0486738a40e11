//! Document tree: an arena of nodes addressed by stable keys.
//!
//! The tree is a stand-in for the host editor's node tree. It carries just
//! enough structure for suggestion builders to work on (blocks, lists, tables,
//! inline text, links, images, dividers) plus the suggestion range node
//! itself. Every attach/removal of a suggestion node is recorded in a mutation
//! log that the tracker drains after each update.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::{EngineError, Result};
use crate::suggestion::{SuggestionId, SuggestionMark};

/// Stable node identity. Keys are never reused within one document lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(u32);

impl NodeKey {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for NodeKey {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ListType {
    Bullet,
    Number,
    Check,
}

impl ListType {
    pub fn block_type(self) -> BlockType {
        match self {
            ListType::Bullet => BlockType::Bullet,
            ListType::Number => BlockType::Number,
            ListType::Check => BlockType::Check,
        }
    }
}

/// Block kinds as the toolbar names them. List kinds describe a list item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BlockType {
    Paragraph,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Quote,
    Code,
    Bullet,
    Number,
    Check,
}

impl BlockType {
    pub fn list_type(self) -> Option<ListType> {
        match self {
            BlockType::Bullet => Some(ListType::Bullet),
            BlockType::Number => Some(ListType::Number),
            BlockType::Check => Some(ListType::Check),
            _ => None,
        }
    }

    pub fn is_list(self) -> bool {
        self.list_type().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TextFormatType {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
}

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TextFormat {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strikethrough: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
}

impl TextFormat {
    pub fn has(&self, ty: TextFormatType) -> bool {
        match ty {
            TextFormatType::Bold => self.bold,
            TextFormatType::Italic => self.italic,
            TextFormatType::Underline => self.underline,
            TextFormatType::Strikethrough => self.strikethrough,
            TextFormatType::Code => self.code,
        }
    }

    pub fn set(&mut self, ty: TextFormatType, on: bool) {
        match ty {
            TextFormatType::Bold => self.bold = on,
            TextFormatType::Italic => self.italic = on,
            TextFormatType::Underline => self.underline = on,
            TextFormatType::Strikethrough => self.strikethrough = on,
            TextFormatType::Code => self.code = on,
        }
    }

    pub fn is_plain(&self) -> bool {
        *self == TextFormat::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageProps {
    pub src: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub show_caption: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    Block {
        block_type: BlockType,
    },
    List {
        list_type: ListType,
        #[serde(default = "default_list_start")]
        start: u32,
    },
    ListItem {
        #[serde(default, skip_serializing_if = "is_false")]
        checked: bool,
    },
    Table,
    TableRow,
    TableCell {
        #[serde(default, skip_serializing_if = "is_false")]
        header: bool,
    },
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "TextFormat::is_plain")]
        format: TextFormat,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        style: String,
    },
    LineBreak,
    Link {
        url: String,
    },
    Image(ImageProps),
    Divider,
    Suggestion(SuggestionMark),
}

fn default_list_start() -> u32 {
    1
}

impl NodeKind {
    pub fn text(text: impl Into<String>) -> Self {
        NodeKind::Text { text: text.into(), format: TextFormat::default(), style: String::new() }
    }

    pub fn paragraph() -> Self {
        NodeKind::Block { block_type: BlockType::Paragraph }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeKind::Text { .. } | NodeKind::LineBreak | NodeKind::Image(_) | NodeKind::Divider)
    }

    /// Elements that own a run of inline content.
    pub fn is_text_container(&self) -> bool {
        matches!(self, NodeKind::Block { .. } | NodeKind::ListItem { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub key: NodeKey,
    pub parent: Option<NodeKey>,
    pub children: Vec<NodeKey>,
    pub kind: NodeKind,
    pub align: Align,
    pub indent: u32,
}

impl Node {
    pub fn mark(&self) -> Option<&SuggestionMark> {
        match &self.kind {
            NodeKind::Suggestion(mark) => Some(mark),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// Create/destroy events for suggestion nodes, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionMutation {
    Created { key: NodeKey, id: SuggestionId },
    Destroyed { key: NodeKey },
}

impl SuggestionMutation {
    pub fn key(&self) -> NodeKey {
        match self {
            SuggestionMutation::Created { key, .. } | SuggestionMutation::Destroyed { key } => *key,
        }
    }
}

/// A caret position: a char offset in a text node, or a child index in an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub key: NodeKey,
    pub offset: usize,
}

impl Point {
    pub fn new(key: NodeKey, offset: usize) -> Self {
        Self { key, offset }
    }
}

pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

pub(crate) fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: HashMap<NodeKey, Node>,
    root: NodeKey,
    next_key: u32,
    mutations: Vec<SuggestionMutation>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document: a root with no children.
    pub fn new() -> Self {
        let root = NodeKey(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node { key: root, parent: None, children: Vec::new(), kind: NodeKind::Root, align: Align::Left, indent: 0 },
        );
        Self { nodes, root, next_key: 1, mutations: Vec::new() }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(&key)
    }

    pub fn node(&self, key: NodeKey) -> Result<&Node> {
        self.nodes.get(&key).ok_or(EngineError::NodeNotFound(key))
    }

    pub fn node_mut(&mut self, key: NodeKey) -> Result<&mut Node> {
        self.nodes.get_mut(&key).ok_or(EngineError::NodeNotFound(key))
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn kind(&self, key: NodeKey) -> Option<&NodeKind> {
        self.nodes.get(&key).map(|n| &n.kind)
    }

    pub fn mark(&self, key: NodeKey) -> Option<&SuggestionMark> {
        self.nodes.get(&key).and_then(Node::mark)
    }

    pub fn mark_mut(&mut self, key: NodeKey) -> Option<&mut SuggestionMark> {
        match self.nodes.get_mut(&key).map(|n| &mut n.kind) {
            Some(NodeKind::Suggestion(mark)) => Some(mark),
            _ => None,
        }
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(&key).and_then(|n| n.parent)
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.nodes.get(&key).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn index_in_parent(&self, key: NodeKey) -> Option<usize> {
        let parent = self.parent(key)?;
        self.children(parent).iter().position(|&k| k == key)
    }

    pub fn prev_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let idx = self.index_in_parent(key)?;
        idx.checked_sub(1).map(|i| self.children(parent)[i])
    }

    pub fn next_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let idx = self.index_in_parent(key)?;
        self.children(parent).get(idx + 1).copied()
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut current = self.parent(key);
        while let Some(k) = current {
            out.push(k);
            current = self.parent(k);
        }
        out
    }

    pub fn is_attached(&self, key: NodeKey) -> bool {
        key == self.root || self.ancestors(key).last() == Some(&self.root)
    }

    /// Pre-order listing of `key` and everything below it.
    pub fn descendants(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            if !self.contains(k) {
                continue;
            }
            out.push(k);
            for &child in self.children(k).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    pub fn text_content(&self, key: NodeKey) -> String {
        self.descendants(key)
            .into_iter()
            .filter_map(|k| self.get(k).and_then(Node::text).map(str::to_owned))
            .collect()
    }

    /// Text nodes below `key`, in document order.
    pub fn text_nodes(&self, key: NodeKey) -> Vec<NodeKey> {
        self.descendants(key).into_iter().filter(|&k| self.get(k).and_then(Node::text).is_some()).collect()
    }

    /// Nearest ancestor (or self) matching `pred`.
    pub fn closest(&self, key: NodeKey, pred: impl Fn(&Node) -> bool) -> Option<NodeKey> {
        let mut current = Some(key);
        while let Some(k) = current {
            let node = self.get(k)?;
            if pred(node) {
                return Some(k);
            }
            current = node.parent;
        }
        None
    }

    /// Nearest block-level text container (paragraph, heading, list item, ...).
    pub fn closest_block(&self, key: NodeKey) -> Option<NodeKey> {
        self.closest(key, |n| n.kind.is_text_container())
    }

    /// Nearest suggestion ancestor of `key` (excluding `key`) below `stop`.
    pub fn enclosing_suggestion(
        &self,
        key: NodeKey,
        stop: NodeKey,
        pred: impl Fn(&SuggestionMark) -> bool,
    ) -> Option<NodeKey> {
        for ancestor in self.ancestors(key) {
            if ancestor == stop {
                return None;
            }
            if self.mark(ancestor).is_some_and(&pred) {
                return Some(ancestor);
            }
        }
        None
    }

    /// The ancestor of `key` (or `key`) that is a direct child of `parent`.
    pub fn child_containing(&self, parent: NodeKey, key: NodeKey) -> Option<NodeKey> {
        let mut current = key;
        loop {
            let p = self.parent(current)?;
            if p == parent {
                return Some(current);
            }
            current = p;
        }
    }

    /// Every suggestion node carrying `id`, in document order.
    pub fn suggestion_nodes(&self, id: &SuggestionId) -> Vec<NodeKey> {
        self.descendants(self.root)
            .into_iter()
            .filter(|&k| self.mark(k).is_some_and(|m| &m.id == id))
            .collect()
    }

    /// The attached keys among `keys`, sorted into document order.
    pub fn in_document_order(&self, keys: impl IntoIterator<Item = NodeKey>) -> Vec<NodeKey> {
        let mut placed: Vec<(Vec<usize>, NodeKey)> =
            keys.into_iter().filter_map(|key| self.path(key).map(|path| (path, key))).collect();
        placed.sort();
        placed.into_iter().map(|(_, key)| key).collect()
    }

    /// Child indices from the root down to `key`; `None` when detached.
    fn path(&self, key: NodeKey) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = key;
        while current != self.root {
            path.push(self.index_in_parent(current)?);
            current = self.parent(current)?;
        }
        path.reverse();
        Some(path)
    }

    /// Ids of every suggestion currently present in the tree.
    pub fn suggestion_ids(&self) -> BTreeSet<SuggestionId> {
        self.descendants(self.root).into_iter().filter_map(|k| self.mark(k).map(|m| m.id.clone())).collect()
    }

    // =========================================================================
    // Construction & structural edits
    // =========================================================================

    /// Allocate a detached node. Callers attach it in the same update.
    pub fn create(&mut self, kind: NodeKind) -> NodeKey {
        let key = NodeKey(self.next_key);
        self.next_key += 1;
        if let NodeKind::Suggestion(mark) = &kind {
            self.mutations.push(SuggestionMutation::Created { key, id: mark.id.clone() });
        }
        self.nodes.insert(key, Node { key, parent: None, children: Vec::new(), kind, align: Align::Left, indent: 0 });
        key
    }

    pub fn create_text(&mut self, text: impl Into<String>, format: TextFormat, style: impl Into<String>) -> NodeKey {
        self.create(NodeKind::Text { text: text.into(), format, style: style.into() })
    }

    pub fn create_suggestion(&mut self, mark: SuggestionMark) -> NodeKey {
        self.create(NodeKind::Suggestion(mark))
    }

    /// Shallow copy of an element: same kind and block props, no children.
    pub fn clone_shallow(&mut self, key: NodeKey) -> Result<NodeKey> {
        let node = self.node(key)?;
        let (kind, align, indent) = (node.kind.clone(), node.align, node.indent);
        let copy = self.create(kind);
        let n = self.node_mut(copy)?;
        n.align = align;
        n.indent = indent;
        Ok(copy)
    }

    /// Deep copy of a subtree with suggestion wrappers unwrapped and markers dropped.
    pub fn clone_content(&mut self, key: NodeKey) -> Result<NodeKey> {
        let copy = self.clone_shallow(key)?;
        let children = self.children(key).to_vec();
        for child in children {
            self.clone_content_into(child, copy)?;
        }
        Ok(copy)
    }

    fn clone_content_into(&mut self, key: NodeKey, parent: NodeKey) -> Result<()> {
        if self.mark(key).is_some() {
            let children = self.children(key).to_vec();
            for child in children {
                self.clone_content_into(child, parent)?;
            }
            return Ok(());
        }
        let copy = self.clone_content(key)?;
        self.append(parent, copy)
    }

    pub fn insert_at(&mut self, parent: NodeKey, index: usize, child: NodeKey) -> Result<()> {
        if child == parent || self.ancestors(parent).contains(&child) {
            return Err(EngineError::InvariantViolation(format!("cannot insert {child} below itself")));
        }
        self.detach(child)?;
        let p = self.node_mut(parent)?;
        let index = index.min(p.children.len());
        p.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    pub fn append(&mut self, parent: NodeKey, child: NodeKey) -> Result<()> {
        let len = self.node(parent)?.children.len();
        self.insert_at(parent, len, child)
    }

    pub fn insert_before(&mut self, reference: NodeKey, child: NodeKey) -> Result<()> {
        let parent = self.parent(reference).ok_or(EngineError::NodeNotFound(reference))?;
        self.detach(child)?;
        let idx = self.index_in_parent(reference).ok_or(EngineError::NodeNotFound(reference))?;
        self.insert_at(parent, idx, child)
    }

    pub fn insert_after(&mut self, reference: NodeKey, child: NodeKey) -> Result<()> {
        let parent = self.parent(reference).ok_or(EngineError::NodeNotFound(reference))?;
        self.detach(child)?;
        let idx = self.index_in_parent(reference).ok_or(EngineError::NodeNotFound(reference))?;
        self.insert_at(parent, idx + 1, child)
    }

    /// Unlink a node from its parent; the node stays in the arena.
    pub fn detach(&mut self, key: NodeKey) -> Result<()> {
        let parent = self.node(key)?.parent;
        if let Some(parent) = parent {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|&k| k != key);
            }
            self.node_mut(key)?.parent = None;
        }
        Ok(())
    }

    /// Remove a node and its whole subtree from the arena.
    pub fn remove(&mut self, key: NodeKey) -> Result<()> {
        if key == self.root {
            return Err(EngineError::InvariantViolation("cannot remove the root".into()));
        }
        self.detach(key)?;
        for k in self.descendants(key) {
            if let Some(node) = self.nodes.remove(&k) {
                if node.mark().is_some() {
                    self.mutations.push(SuggestionMutation::Destroyed { key: k });
                }
            }
        }
        Ok(())
    }

    /// Move `from`'s children to the end of `to`.
    pub fn move_children(&mut self, from: NodeKey, to: NodeKey) -> Result<()> {
        for child in self.children(from).to_vec() {
            self.append(to, child)?;
        }
        Ok(())
    }

    /// Replace a node by its children, in place.
    pub fn unwrap(&mut self, key: NodeKey) -> Result<()> {
        let parent = self.parent(key).ok_or(EngineError::NodeNotFound(key))?;
        let mut idx = self.index_in_parent(key).ok_or(EngineError::NodeNotFound(key))?;
        for child in self.children(key).to_vec() {
            self.insert_at(parent, idx, child)?;
            idx += 1;
        }
        self.remove(key)
    }

    /// Wrap a run of contiguous siblings in `wrapper`.
    pub fn wrap(&mut self, nodes: &[NodeKey], wrapper: NodeKey) -> Result<()> {
        let first = *nodes.first().ok_or_else(|| EngineError::InvariantViolation("nothing to wrap".into()))?;
        self.insert_before(first, wrapper)?;
        for &k in nodes {
            self.append(wrapper, k)?;
        }
        Ok(())
    }

    /// Wrap a single node in a fresh suggestion range.
    pub fn wrap_in_suggestion(&mut self, key: NodeKey, mark: SuggestionMark) -> Result<NodeKey> {
        let wrapper = self.create_suggestion(mark);
        self.wrap(&[key], wrapper)?;
        Ok(wrapper)
    }

    /// Append `from`'s content to `into` and drop `from`.
    pub fn merge_blocks(&mut self, into: NodeKey, from: NodeKey) -> Result<()> {
        self.move_children(from, into)?;
        self.remove(from)
    }

    // =========================================================================
    // Text
    // =========================================================================

    /// Split a text node at a char offset. The original keeps `[0, offset)`;
    /// the returned new sibling holds the rest (possibly empty).
    pub fn split_text(&mut self, key: NodeKey, offset: usize) -> Result<NodeKey> {
        let (right, format, style) = match &mut self.node_mut(key)?.kind {
            NodeKind::Text { text, format, style } => {
                let at = byte_offset(text, offset);
                (text.split_off(at), *format, style.clone())
            }
            _ => return Err(EngineError::InvalidTarget { key, expected: "text" }),
        };
        let new = self.create_text(right, format, style);
        self.insert_after(key, new)?;
        Ok(new)
    }

    pub fn insert_chars(&mut self, key: NodeKey, offset: usize, chars: &str) -> Result<()> {
        match &mut self.node_mut(key)?.kind {
            NodeKind::Text { text, .. } => {
                let at = byte_offset(text, offset);
                text.insert_str(at, chars);
                Ok(())
            }
            _ => Err(EngineError::InvalidTarget { key, expected: "text" }),
        }
    }

    pub fn set_format(&mut self, key: NodeKey, new: TextFormat) -> Result<()> {
        match &mut self.node_mut(key)?.kind {
            NodeKind::Text { format, .. } => {
                *format = new;
                Ok(())
            }
            _ => Err(EngineError::InvalidTarget { key, expected: "text" }),
        }
    }

    pub fn set_style(&mut self, key: NodeKey, new: &str) -> Result<()> {
        match &mut self.node_mut(key)?.kind {
            NodeKind::Text { style, .. } => {
                *style = new.to_string();
                Ok(())
            }
            _ => Err(EngineError::InvalidTarget { key, expected: "text" }),
        }
    }

    pub fn format_of(&self, key: NodeKey) -> Option<(TextFormat, &str)> {
        match self.kind(key)? {
            NodeKind::Text { format, style, .. } => Some((*format, style.as_str())),
            _ => None,
        }
    }

    /// Plain typing, as the host does it outside suggestion mode. A caret at
    /// the edge of a suggestion range types outside the range.
    pub fn insert_text(&mut self, at: Point, chars: &str) -> Result<NodeKey> {
        let node = self.node(at.key)?;
        if let Some(text) = node.text() {
            let len = char_len(text);
            let parent = node.parent;
            let parent_mark = parent.and_then(|p| self.mark(p));
            if let (Some(parent), Some(mark)) = (parent, parent_mark) {
                let children = self.children(parent);
                let at_start = at.offset == 0 && children.first() == Some(&at.key) && !mark.can_insert_text_before();
                let at_end = at.offset >= len && children.last() == Some(&at.key) && !mark.can_insert_text_after();
                if at_start || at_end {
                    let (format, style) = self.format_of(at.key).map(|(f, s)| (f, s.to_string())).unwrap_or_default();
                    let new = self.create_text(chars, format, style);
                    if at_start {
                        self.insert_before(parent, new)?;
                    } else {
                        self.insert_after(parent, new)?;
                    }
                    return Ok(new);
                }
            }
            self.insert_chars(at.key, at.offset.min(len), chars)?;
            return Ok(at.key);
        }
        if node.kind.is_leaf() {
            return Err(EngineError::InvalidTarget { key: at.key, expected: "text or element" });
        }
        let new = self.create_text(chars, TextFormat::default(), "");
        self.insert_at(at.key, at.offset, new)?;
        Ok(new)
    }

    // =========================================================================
    // Mutation log & snapshots
    // =========================================================================

    /// Drain the suggestion mutation log. A node created and destroyed within
    /// the same batch cancels out.
    pub fn take_mutations(&mut self) -> Vec<SuggestionMutation> {
        let log = std::mem::take(&mut self.mutations);
        let mut out: Vec<Option<SuggestionMutation>> = Vec::with_capacity(log.len());
        let mut created_at: HashMap<NodeKey, usize> = HashMap::new();
        for m in log {
            match m {
                SuggestionMutation::Created { key, .. } => {
                    created_at.insert(key, out.len());
                    out.push(Some(m));
                }
                SuggestionMutation::Destroyed { key } => match created_at.remove(&key) {
                    Some(idx) => out[idx] = None,
                    None => out.push(Some(m)),
                },
            }
        }
        out.into_iter().flatten().collect()
    }

    pub fn has_pending_mutations(&self) -> bool {
        !self.mutations.is_empty()
    }

    /// Copy without the pending mutation log, for undo history.
    pub fn snapshot(&self) -> Document {
        Document { nodes: self.nodes.clone(), root: self.root, next_key: self.next_key, mutations: Vec::new() }
    }

    fn suggestion_keys(&self) -> BTreeMap<NodeKey, SuggestionId> {
        self.nodes.values().filter_map(|n| n.mark().map(|m| (n.key, m.id.clone()))).collect()
    }

    /// Swap in a snapshot, logging the suggestion nodes that appear or vanish.
    pub fn restore(&mut self, snapshot: Document) {
        let before = self.suggestion_keys();
        let after = snapshot.suggestion_keys();
        let mut log = std::mem::take(&mut self.mutations);
        for key in before.keys().filter(|k| !after.contains_key(k)) {
            log.push(SuggestionMutation::Destroyed { key: *key });
        }
        for (key, id) in after.iter().filter(|(k, _)| !before.contains_key(k)) {
            log.push(SuggestionMutation::Created { key: *key, id: id.clone() });
        }
        let next_key = self.next_key.max(snapshot.next_key);
        *self = snapshot;
        self.next_key = next_key;
        self.mutations = log;
    }

    /// Throw away a failed edit. Its mutations were never observed, so
    /// nothing is logged; keys stay unique.
    pub fn rollback(&mut self, snapshot: Document) {
        let next_key = self.next_key.max(snapshot.next_key);
        *self = snapshot;
        self.next_key = next_key;
    }

    // =========================================================================
    // Normalization
    // =========================================================================

    /// Bring the tree back to canonical form after an edit: prune empty
    /// ranges, merge identical neighbours, drop empty text and structure.
    pub fn normalize(&mut self) {
        self.normalize_children(self.root);
    }

    fn normalize_children(&mut self, parent: NodeKey) {
        for child in self.children(parent).to_vec() {
            self.normalize_children(child);
        }

        let mut i = 0;
        while i < self.children(parent).len() {
            let key = self.children(parent)[i];
            if self.is_prunable(key) {
                let _ = self.remove(key);
                // The previous sibling may now be mergeable with the next one.
                i = i.saturating_sub(1);
                continue;
            }
            if let Some(&next) = self.children(parent).get(i + 1) {
                if self.merge_siblings(key, next) {
                    continue;
                }
            }
            i += 1;
        }
    }

    fn is_prunable(&self, key: NodeKey) -> bool {
        let Some(node) = self.get(key) else { return false };
        let empty = node.children.is_empty();
        match &node.kind {
            NodeKind::Text { text, .. } => text.is_empty(),
            NodeKind::Suggestion(mark) => empty && !mark.kind.may_be_empty(),
            NodeKind::Link { .. } | NodeKind::List { .. } | NodeKind::TableRow | NodeKind::Table => empty,
            _ => false,
        }
    }

    /// Merge `b` into `a` when they are equivalent neighbours. Returns true on merge.
    fn merge_siblings(&mut self, a: NodeKey, b: NodeKey) -> bool {
        let (Some(na), Some(nb)) = (self.get(a), self.get(b)) else { return false };
        match (&na.kind, &nb.kind) {
            (
                NodeKind::Text { format: fa, style: sa, .. },
                NodeKind::Text { text: tb, format: fb, style: sb },
            ) if fa == fb && sa == sb => {
                let tail = tb.clone();
                if let Some(NodeKind::Text { text, .. }) = self.nodes.get_mut(&a).map(|n| &mut n.kind) {
                    text.push_str(&tail);
                }
                let _ = self.remove(b);
                true
            }
            (NodeKind::Suggestion(ma), NodeKind::Suggestion(mb)) if ma == mb && !ma.kind.may_be_empty() => {
                self.merge_elements(a, b)
            }
            (NodeKind::Link { url: ua }, NodeKind::Link { url: ub }) if ua == ub => self.merge_elements(a, b),
            _ => false,
        }
    }

    fn merge_elements(&mut self, a: NodeKey, b: NodeKey) -> bool {
        if self.merge_blocks(a, b).is_err() {
            return false;
        }
        self.normalize_children(a);
        true
    }

    // =========================================================================
    // Convenience builders (used by hosts and tests)
    // =========================================================================

    /// Append a paragraph holding one plain text node. Returns (block, text).
    pub fn append_paragraph(&mut self, text: &str) -> (NodeKey, NodeKey) {
        self.append_block(BlockType::Paragraph, text)
    }

    pub fn append_block(&mut self, block_type: BlockType, text: &str) -> (NodeKey, NodeKey) {
        let block = self.create(NodeKind::Block { block_type });
        let text = self.create_text(text, TextFormat::default(), "");
        let root = self.root;
        // Freshly created nodes under the root cannot fail to attach.
        let _ = self.append(root, block);
        let _ = self.append(block, text);
        (block, text)
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    pub fn to_json(&self) -> String {
        serde_json::to_string(&SerializedDocument { root: self.serialize_node(self.root) })
            .unwrap_or_else(|_| "{}".to_string())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: SerializedDocument = serde_json::from_str(json)?;
        let mut doc = Document::new();
        let root = doc.root;
        for child in parsed.root.children {
            doc.deserialize_into(child, root)?;
        }
        Ok(doc)
    }

    fn serialize_node(&self, key: NodeKey) -> SerializedNode {
        let node = &self.nodes[&key];
        SerializedNode {
            kind: node.kind.clone(),
            align: node.align,
            indent: node.indent,
            children: node.children.iter().map(|&c| self.serialize_node(c)).collect(),
        }
    }

    fn deserialize_into(&mut self, node: SerializedNode, parent: NodeKey) -> Result<()> {
        if matches!(node.kind, NodeKind::Root) {
            return Err(EngineError::InvariantViolation("nested root node".into()));
        }
        let key = self.create(node.kind);
        {
            let n = self.node_mut(key)?;
            n.align = node.align;
            n.indent = node.indent;
        }
        self.append(parent, key)?;
        for child in node.children {
            self.deserialize_into(child, key)?;
        }
        Ok(())
    }
}

fn is_left(a: &Align) -> bool {
    *a == Align::Left
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

#[derive(Serialize, Deserialize)]
struct SerializedNode {
    #[serde(flatten)]
    kind: NodeKind,
    #[serde(default, skip_serializing_if = "is_left")]
    align: Align,
    #[serde(default, skip_serializing_if = "is_zero")]
    indent: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<SerializedNode>,
}

#[derive(Serialize, Deserialize)]
struct SerializedDocument {
    root: SerializedNode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggestion::SuggestionType;

    fn mark(id: &str, kind: SuggestionType) -> SuggestionMark {
        SuggestionMark::new(SuggestionId::from(id), kind)
    }

    #[test]
    fn test_split_and_normalize_merges_text_back() {
        let mut doc = Document::new();
        let (block, text) = doc.append_paragraph("hello");
        let right = doc.split_text(text, 2).unwrap();
        assert_eq!(doc.get(text).unwrap().text(), Some("he"));
        assert_eq!(doc.get(right).unwrap().text(), Some("llo"));
        doc.normalize();
        assert_eq!(doc.children(block).len(), 1);
        assert_eq!(doc.text_content(block), "hello");
    }

    #[test]
    fn test_document_order_drops_detached_keys() {
        let mut doc = Document::new();
        let (first, a) = doc.append_paragraph("a");
        let (_, b) = doc.append_paragraph("b");
        let loose = doc.create_text("loose", TextFormat::default(), "");
        assert_eq!(doc.in_document_order([b, loose, first, a]), vec![first, a, b]);
    }

    #[test]
    fn test_split_text_counts_chars_not_bytes() {
        let mut doc = Document::new();
        let (_, text) = doc.append_paragraph("héllo");
        let right = doc.split_text(text, 2).unwrap();
        assert_eq!(doc.get(text).unwrap().text(), Some("hé"));
        assert_eq!(doc.get(right).unwrap().text(), Some("llo"));
    }

    #[test]
    fn test_empty_non_marker_suggestion_is_pruned() {
        let mut doc = Document::new();
        let (block, _) = doc.append_paragraph("x");
        let empty = doc.create_suggestion(mark("a", SuggestionType::Insert));
        let marker = doc.create_suggestion(mark("b", SuggestionType::IndentChange));
        doc.append(block, empty).unwrap();
        doc.insert_at(block, 0, marker).unwrap();
        doc.normalize();
        assert!(!doc.contains(empty));
        assert!(doc.contains(marker));
    }

    #[test]
    fn test_mutation_log_coalesces_create_then_destroy() {
        let mut doc = Document::new();
        let (block, text) = doc.append_paragraph("abc");
        let kept = doc.wrap_in_suggestion(text, mark("a", SuggestionType::Delete)).unwrap();
        let transient = doc.create_suggestion(mark("b", SuggestionType::Insert));
        doc.append(block, transient).unwrap();
        doc.remove(transient).unwrap();
        let log = doc.take_mutations();
        assert_eq!(log, vec![SuggestionMutation::Created { key: kept, id: SuggestionId::from("a") }]);
        assert!(!doc.has_pending_mutations());
    }

    #[test]
    fn test_insert_text_at_range_edge_goes_outside() {
        let mut doc = Document::new();
        let (block, text) = doc.append_paragraph("mid");
        let wrapper = doc.wrap_in_suggestion(text, mark("a", SuggestionType::Insert)).unwrap();
        let before = doc.insert_text(Point::new(text, 0), "<").unwrap();
        let after = doc.insert_text(Point::new(text, 3), ">").unwrap();
        assert_eq!(doc.parent(before), Some(block));
        assert_eq!(doc.parent(after), Some(block));
        assert_eq!(doc.text_content(wrapper), "mid");
        assert_eq!(doc.text_content(block), "<mid>");
    }

    #[test]
    fn test_unwrap_keeps_children_in_place() {
        let mut doc = Document::new();
        let (block, text) = doc.append_paragraph("abc");
        let wrapper = doc.wrap_in_suggestion(text, mark("a", SuggestionType::Insert)).unwrap();
        doc.unwrap(wrapper).unwrap();
        assert_eq!(doc.children(block), &[text]);
        assert!(!doc.contains(wrapper));
    }

    #[test]
    fn test_restore_reports_suggestion_diff() {
        let mut doc = Document::new();
        let (_, text) = doc.append_paragraph("abc");
        let before = doc.snapshot();
        let wrapper = doc.wrap_in_suggestion(text, mark("a", SuggestionType::Delete)).unwrap();
        let after = doc.snapshot();
        doc.take_mutations();

        doc.restore(before);
        assert_eq!(doc.take_mutations(), vec![SuggestionMutation::Destroyed { key: wrapper }]);
        doc.restore(after);
        assert_eq!(
            doc.take_mutations(),
            vec![SuggestionMutation::Created { key: wrapper, id: SuggestionId::from("a") }]
        );
    }

    #[test]
    fn test_json_round_trip_preserves_structure() {
        let mut doc = Document::new();
        let (block, text) = doc.append_block(BlockType::H2, "title");
        doc.node_mut(block).unwrap().align = Align::Center;
        doc.wrap_in_suggestion(text, mark("s1", SuggestionType::Insert)).unwrap();
        let json = doc.to_json();
        let parsed = Document::from_json(&json).unwrap();
        assert_eq!(parsed.to_json(), json);
        assert!(json.contains("\"block_type\":\"h2\""));
        assert!(json.contains("\"align\":\"center\""));
        assert!(json.contains("\"kind\":\"insert\""));
        assert_eq!(parsed.suggestion_ids().len(), 1);
    }
}
