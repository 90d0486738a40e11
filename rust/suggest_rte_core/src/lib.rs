//! Suggestion-mode (track changes) engine for a collaborative rich-text editor.
//!
//! Edits made in suggest mode become suggestion ranges inside the document
//! tree. [`SuggestionEngine`] keeps those ranges and the threads of an
//! external [`ThreadStore`] in step, and implements accept, reject, undo and
//! redo on top of them.

pub mod builders;
pub mod command;
pub mod config;
pub mod doc;
pub mod engine;
pub mod error;
pub mod export;
pub mod history;
pub mod resolve;
pub mod selection;
pub mod session;
pub mod store;
pub mod suggestion;
pub mod summary;
pub mod tracker;

pub use builders::{CollectingSink, SuggestionSink};
pub use command::Command;
pub use config::{AccessLevel, EngineConfig};
pub use doc::{Align, BlockType, Document, ImageProps, ListType, NodeKey, NodeKind, Point, TextFormat, TextFormatType};
pub use engine::{ModeChange, SuggestionEngine, COMPOSITION_NOTICE};
pub use error::{EngineError, ErrorReporter, Result, SharedReporter, TracingReporter};
pub use export::{discard_suggestions, discard_suggestions_html, to_html, to_markdown};
pub use resolve::Resolution;
pub use selection::TextRange;
pub use session::{EditorMode, Session};
pub use store::{MemoryThreadStore, StoreError, StoreEvent, ThreadInfo, ThreadStatus, ThreadStore};
pub use suggestion::{SuggestionId, SuggestionMark, SuggestionType};
pub use summary::{generate_summary, SummaryFragment, SummaryKind, DEFAULT_CHAR_CAP as DEFAULT_SUMMARY_CHAR_CAP};
pub use tracker::{MutationTracker, TrackerOutcome, UpdateTag};
