//! Editing commands routed to the suggestion builders.
//!
//! Commands are plain serde data so hosts on the other side of a wasm or FFI
//! boundary can send them as JSON.

use serde::{Deserialize, Serialize};

use crate::builders::{block_type, divider, format, image, link, list, table, text, SuggestionSink};
use crate::doc::{Align, BlockType, Document, ImageProps, ListType, NodeKey, Point, TextFormatType};
use crate::error::Result;
use crate::selection::TextRange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    InsertText { at: Point, text: String },
    DeleteText { range: TextRange },
    DeleteCharacter { at: Point, backward: bool },
    ReplaceText { range: TextRange, text: String },
    InsertParagraph { at: Point },
    FormatText { range: TextRange, format: TextFormatType },
    SetTextStyle { range: TextRange, style: String },
    ClearFormatting { range: TextRange },
    SetAlignment { block: NodeKey, align: Align },
    Indent { block: NodeKey },
    Outdent { block: NodeKey },
    SetLink { range: TextRange, url: Option<String> },
    InsertImage { at: Point, image: ImageProps },
    ResizeImage { image: NodeKey, width: Option<u32>, height: Option<u32> },
    SetImageCaption { image: NodeKey, show: bool },
    DeleteImage { image: NodeKey },
    MoveImage { image: NodeKey, to: Point },
    InsertTable { after: NodeKey, rows: usize, cols: usize },
    DeleteTable { table: NodeKey },
    InsertTableRow { cell: NodeKey, below: bool },
    DeleteTableRow { cell: NodeKey },
    InsertTableColumn { cell: NodeKey, right: bool },
    DeleteTableColumn { cell: NodeKey },
    DuplicateTableRow { cell: NodeKey },
    DuplicateTableColumn { cell: NodeKey },
    InsertList { blocks: Vec<NodeKey>, list_type: ListType },
    SetBlockType { blocks: Vec<NodeKey>, block_type: BlockType },
    InsertDivider { after: NodeKey },
    DeleteDivider { divider: NodeKey },
}

impl Command {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Run the command as a suggestion. `Ok(false)` when it does not apply.
    pub fn apply(&self, doc: &mut Document, sink: &mut dyn SuggestionSink) -> Result<bool> {
        match self {
            Command::InsertText { at, text: t } => text::insert_text(doc, *at, t, sink),
            Command::DeleteText { range } => text::delete_text(doc, *range, sink),
            Command::DeleteCharacter { at, backward } => text::delete_character(doc, *at, *backward, sink),
            Command::ReplaceText { range, text: t } => text::replace_text(doc, *range, t, sink),
            Command::InsertParagraph { at } => text::insert_paragraph(doc, *at, sink),
            Command::FormatText { range, format: ty } => format::format_text(doc, *range, *ty, sink),
            Command::SetTextStyle { range, style } => format::set_text_style(doc, *range, style, sink),
            Command::ClearFormatting { range } => format::clear_formatting(doc, *range, sink),
            Command::SetAlignment { block, align } => format::set_alignment(doc, *block, *align, sink),
            Command::Indent { block } => format::change_indent(doc, *block, 1, sink),
            Command::Outdent { block } => format::change_indent(doc, *block, -1, sink),
            Command::SetLink { range, url } => link::set_link(doc, *range, url.as_deref(), sink),
            Command::InsertImage { at, image: props } => image::insert_image(doc, *at, props.clone(), sink),
            Command::ResizeImage { image: key, width, height } => image::resize_image(doc, *key, *width, *height, sink),
            Command::SetImageCaption { image: key, show } => image::set_image_caption(doc, *key, *show, sink),
            Command::DeleteImage { image: key } => image::delete_image(doc, *key, sink),
            Command::MoveImage { image: key, to } => image::move_image(doc, *key, *to, sink),
            Command::InsertTable { after, rows, cols } => table::insert_table(doc, *after, *rows, *cols, sink),
            Command::DeleteTable { table: key } => table::delete_table(doc, *key, sink),
            Command::InsertTableRow { cell, below } => table::insert_table_row(doc, *cell, *below, sink),
            Command::DeleteTableRow { cell } => table::delete_table_row(doc, *cell, sink),
            Command::InsertTableColumn { cell, right } => table::insert_table_column(doc, *cell, *right, sink),
            Command::DeleteTableColumn { cell } => table::delete_table_column(doc, *cell, sink),
            Command::DuplicateTableRow { cell } => table::duplicate_table_row(doc, *cell, sink),
            Command::DuplicateTableColumn { cell } => table::duplicate_table_column(doc, *cell, sink),
            Command::InsertList { blocks, list_type } => list::insert_list(doc, blocks, *list_type, sink),
            Command::SetBlockType { blocks, block_type: bt } => block_type::set_block_type(doc, blocks, *bt, sink),
            Command::InsertDivider { after } => divider::insert_divider(doc, *after, sink),
            Command::DeleteDivider { divider: key } => divider::delete_divider(doc, *key, sink),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::CollectingSink;

    #[test]
    fn test_commands_parse_from_json() {
        let cmd = Command::from_json(r#"{"command":"insert_text","at":{"key":3,"offset":1},"text":"hi"}"#).unwrap();
        assert_eq!(cmd, Command::InsertText { at: Point::new(NodeKey::from(3), 1), text: "hi".into() });

        let cmd = Command::from_json(r#"{"command":"set_block_type","blocks":[1],"block_type":"h2"}"#).unwrap();
        assert!(matches!(cmd, Command::SetBlockType { block_type: BlockType::H2, .. }));
    }

    #[test]
    fn test_unknown_target_falls_through() {
        let mut doc = Document::new();
        let mut sink = CollectingSink::default();
        let cmd = Command::Indent { block: NodeKey::from(99) };
        assert!(!cmd.apply(&mut doc, &mut sink).unwrap());
        assert!(sink.created.is_empty());
    }
}
