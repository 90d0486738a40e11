//! Engine configuration.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::Result;
use crate::session::EditorMode;
use crate::summary::DEFAULT_CHAR_CAP;

/// What the current user may do with the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Comment,
    #[default]
    Edit,
    Admin,
}

impl AccessLevel {
    /// Mode the editor opens in.
    pub fn initial_mode(self) -> EditorMode {
        match self {
            AccessLevel::Edit | AccessLevel::Admin => EditorMode::Edit,
            AccessLevel::Comment => EditorMode::Suggest,
            AccessLevel::Read => EditorMode::Preview,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Characters kept per summary fragment.
    pub summary_char_cap: usize,
    /// Undo steps kept.
    pub history_limit: usize,
    pub access_level: AccessLevel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { summary_char_cap: DEFAULT_CHAR_CAP, history_limit: 200, access_level: AccessLevel::default() }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
