//! Plain-function surface for hosts that only need headless transforms.
//! Functions take and return strings so bridge generators can wrap them.

use serde::Serialize;
use suggest_rte_core::{export, generate_summary, Document, SuggestionId, DEFAULT_SUMMARY_CHAR_CAP};

#[derive(Serialize)]
struct FfiError {
    error: String,
}

fn error_json(e: impl std::fmt::Display) -> String {
    serde_json::to_string(&FfiError { error: e.to_string() }).unwrap_or_else(|_| "{}".to_string())
}

/// Document JSON with every suggestion rejected, or `{"error": ...}`.
pub fn discard_suggestions(doc_json: String) -> String {
    export::discard_suggestions(&doc_json).unwrap_or_else(error_json)
}

/// HTML of the document as it stands, suggestions marked up.
pub fn export_html(doc_json: String) -> String {
    match Document::from_json(&doc_json) {
        Ok(doc) => export::to_html(&doc),
        Err(e) => error_json(e),
    }
}

pub fn export_markdown(doc_json: String) -> String {
    match Document::from_json(&doc_json) {
        Ok(doc) => export::to_markdown(&doc),
        Err(e) => error_json(e),
    }
}

/// Summary fragments of one suggestion as a JSON array.
pub fn summarize(doc_json: String, suggestion_id: String) -> String {
    let doc = match Document::from_json(&doc_json) {
        Ok(doc) => doc,
        Err(e) => return error_json(e),
    };
    let fragments = generate_summary(&doc, &SuggestionId::from(suggestion_id), DEFAULT_SUMMARY_CHAR_CAP);
    serde_json::to_string(&fragments).unwrap_or_else(error_json)
}
