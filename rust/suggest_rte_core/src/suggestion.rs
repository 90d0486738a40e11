//! Suggestion range model: the metadata carried by a suggestion node.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::doc::{Align, BlockType, ImageProps, ListType, TextFormat};

/// Opaque, stable suggestion identifier. Doubles as the thread `mark_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuggestionId(String);

impl SuggestionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SuggestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SuggestionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SuggestionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Every kind of edit the engine can express as a suggestion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SuggestionType {
    Insert,
    Delete,
    PropertyChange,
    Split,
    Join,
    LinkChange,
    StyleChange,
    ImageChange,
    IndentChange,
    InsertTable,
    DeleteTable,
    InsertTableRow,
    DeleteTableRow,
    InsertTableColumn,
    DeleteTableColumn,
    DuplicateTableRow,
    DuplicateTableColumn,
    BlockTypeChange,
    ClearFormatting,
    AlignChange,
    InsertImage,
    DeleteImage,
    InsertDivider,
    DeleteDivider,
}

impl SuggestionType {
    /// Marker kinds record a structural change and carry no content, so
    /// normalization must not prune them when they are empty.
    pub fn may_be_empty(self) -> bool {
        use SuggestionType::*;
        matches!(
            self,
            Split
                | Join
                | IndentChange
                | AlignChange
                | BlockTypeChange
                | InsertTable
                | DeleteTable
                | InsertTableRow
                | DeleteTableRow
                | InsertTableColumn
                | DeleteTableColumn
                | DuplicateTableRow
                | DuplicateTableColumn
        )
    }

    /// Kinds that take display priority over a plain insert/delete in summaries.
    pub fn is_structural(self) -> bool {
        use SuggestionType::*;
        matches!(
            self,
            Split
                | Join
                | IndentChange
                | AlignChange
                | BlockTypeChange
                | InsertTable
                | DeleteTable
                | InsertTableRow
                | DeleteTableRow
                | InsertTableColumn
                | DeleteTableColumn
                | DuplicateTableRow
                | DuplicateTableColumn
        )
    }

    /// Kinds whose content is removed when the suggestion is accepted.
    pub fn is_removal(self) -> bool {
        matches!(
            self,
            SuggestionType::Delete | SuggestionType::DeleteImage | SuggestionType::DeleteDivider
        )
    }

    /// Kinds whose content is removed when the suggestion is rejected.
    pub fn is_insertion(self) -> bool {
        matches!(
            self,
            SuggestionType::Insert | SuggestionType::InsertImage | SuggestionType::InsertDivider
        )
    }
}

/// Link target before and after a link edit. `None` means "no link".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkChange {
    pub previous: Option<String>,
    pub next: Option<String>,
}

/// Image geometry/caption state captured before an image edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSnapshot {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub show_caption: bool,
}

impl ImageSnapshot {
    pub fn of(props: &ImageProps) -> Self {
        Self { width: props.width, height: props.height, show_caption: props.show_caption }
    }

    pub fn apply_to(&self, props: &mut ImageProps) {
        props.width = self.width;
        props.height = self.height;
        props.show_caption = self.show_caption;
    }
}

/// Structure of a list that was converted to another list type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListInfo {
    pub list_type: ListType,
    pub start: u32,
}

/// Pre-edit values needed to revert a suggestion on reject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<TextFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_info: Option<ListInfo>,
}

/// Data carried by a suggestion range node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionMark {
    pub id: SuggestionId,
    pub kind: SuggestionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<ChangedProperties>,
}

impl SuggestionMark {
    pub fn new(id: SuggestionId, kind: SuggestionType) -> Self {
        Self { id, kind, changed: None }
    }

    pub fn with_changes(id: SuggestionId, kind: SuggestionType, changed: ChangedProperties) -> Self {
        Self { id, kind, changed: Some(changed) }
    }

    pub fn id(&self) -> &SuggestionId {
        &self.id
    }

    pub fn kind(&self) -> SuggestionType {
        self.kind
    }

    pub fn changed(&self) -> Option<&ChangedProperties> {
        self.changed.as_ref()
    }

    /// Typing directly before a range must never be absorbed into it.
    pub fn can_insert_text_before(&self) -> bool {
        false
    }

    /// Typing directly after a range must never be absorbed into it.
    pub fn can_insert_text_after(&self) -> bool {
        false
    }
}
