use serde_json::json;
use suggest_rte_core::{
    export, Command, Document, EngineConfig, Resolution, Session, SuggestionId, TrackerOutcome,
};
use wasm_bindgen::prelude::*;

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Browser-side editor handle. The host owns the thread store: it drains
/// thread requests after each call and reports back with `thread_created`.
#[wasm_bindgen]
pub struct Editor {
    session: Session,
    thread_requests: Vec<SuggestionId>,
    vanished: Vec<SuggestionId>,
}

#[wasm_bindgen]
impl Editor {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Editor {
        Self::with_session(Session::new(Document::new(), EngineConfig::default()))
    }

    pub fn from_json(json: String) -> Editor {
        let doc = Document::from_json(&json).unwrap_or_default();
        Self::with_session(Session::new(doc, EngineConfig::default()))
    }

    /// Document JSON plus an `EngineConfig` JSON; missing config fields take defaults.
    pub fn with_config(json: String, config_json: String) -> Result<Editor, JsValue> {
        let doc = Document::from_json(&json).map_err(js_error)?;
        let config = EngineConfig::from_json(&config_json).map_err(js_error)?;
        Ok(Self::with_session(Session::new(doc, config)))
    }

    fn with_session(session: Session) -> Editor {
        Editor { session, thread_requests: Vec::new(), vanished: Vec::new() }
    }

    pub fn to_json(&self) -> String { self.session.document().to_json() }
    pub fn to_html(&self) -> String { export::to_html(self.session.document()) }
    pub fn to_markdown(&self) -> String { export::to_markdown(self.session.document()) }

    pub fn discard_suggestions_html(&self) -> String {
        export::discard_suggestions_html(&self.to_json()).unwrap_or_default()
    }

    // Suggesting
    pub fn dispatch(&mut self, command_json: String) -> Result<bool, JsValue> {
        let command = Command::from_json(&command_json).map_err(js_error)?;
        let (handled, outcome) = self.session.dispatch(&command).map_err(js_error)?;
        self.absorb(outcome);
        Ok(handled)
    }

    pub fn accept(&mut self, id: String) -> Result<bool, JsValue> { self.resolve(id, Resolution::Accept) }
    pub fn reject(&mut self, id: String) -> Result<bool, JsValue> { self.resolve(id, Resolution::Reject) }

    fn resolve(&mut self, id: String, resolution: Resolution) -> Result<bool, JsValue> {
        let (changed, outcome) = self.session.resolve(&SuggestionId::from(id), resolution).map_err(js_error)?;
        self.absorb(outcome);
        Ok(changed)
    }

    // History
    pub fn undo(&mut self) -> bool {
        let outcome = self.session.undo();
        self.absorb_some(outcome)
    }

    pub fn redo(&mut self) -> bool {
        let outcome = self.session.redo();
        self.absorb_some(outcome)
    }

    // Modes
    pub fn mode(&self) -> String { self.session.mode().to_string() }

    pub fn toggle_suggestion_mode(&mut self) -> String { self.session.toggle_mode().to_string() }

    /// Returns true when the editor had to leave suggest mode.
    pub fn composition_start(&mut self) -> bool { self.session.start_composition() }

    // Threads
    pub fn suggestion_ids(&self) -> String {
        let ids: Vec<String> = self.session.document().suggestion_ids().iter().map(|id| id.to_string()).collect();
        json!(ids).to_string()
    }

    pub fn summary(&self, id: String) -> String {
        serde_json::to_string(&self.session.summary(&SuggestionId::from(id))).unwrap_or_else(|_| "[]".to_string())
    }

    /// Threads the host should create: `[{suggestionId, summaryContent, summaryType}]`.
    pub fn take_thread_requests(&mut self) -> String {
        let requests: Vec<_> = std::mem::take(&mut self.thread_requests)
            .into_iter()
            .map(|id| {
                let fragments = self.session.summary(&id);
                json!({
                    "suggestionId": id.as_str(),
                    "summaryContent": serde_json::to_string(&fragments).unwrap_or_default(),
                    "summaryType": fragments.first().map(|f| f.kind.to_string()).unwrap_or_default(),
                })
            })
            .collect();
        json!(requests).to_string()
    }

    /// Ids whose last range went away since the previous call.
    pub fn take_vanished(&mut self) -> String {
        let ids: Vec<String> = std::mem::take(&mut self.vanished).iter().map(|id| id.to_string()).collect();
        json!(ids).to_string()
    }

    pub fn thread_created(&mut self, id: String) {
        self.session.tracker_mut().thread_created(&SuggestionId::from(id));
    }
}

impl Editor {
    fn absorb(&mut self, outcome: TrackerOutcome) {
        for id in outcome.to_create {
            if !self.thread_requests.contains(&id) {
                self.thread_requests.push(id);
            }
        }
        self.thread_requests.retain(|id| !outcome.vanished.contains(id));
        self.vanished.extend(outcome.vanished);
    }

    fn absorb_some(&mut self, outcome: Option<TrackerOutcome>) -> bool {
        match outcome {
            Some(outcome) => {
                self.absorb(outcome);
                true
            }
            None => false,
        }
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn wasm_sanity() {
        let json = r#"{"root":{"type":"root","children":[{"type":"block","block_type":"paragraph","children":[{"type":"text","text":"abc"}]}]}}"#;
        let mut e = Editor::with_config(json.to_string(), r#"{"access_level":"comment"}"#.to_string()).unwrap();
        assert_eq!(e.mode(), "suggest");
        let doc = Document::from_json(json).unwrap();
        let text = doc.text_nodes(doc.root())[0];
        let command = json!({"command": "insert_text", "at": {"key": text, "offset": 3}, "text": "d"});
        assert!(e.dispatch(command.to_string()).unwrap());
        assert!(e.take_thread_requests().contains("\"summaryType\":\"insert\""));
        assert!(e.to_html().contains("data-suggestion-type=\"insert\""));
        assert_eq!(e.discard_suggestions_html(), "<div class=\"doc\">\n  <p>abc</p>\n</div>");
    }
}
