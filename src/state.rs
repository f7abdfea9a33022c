use crate::chat::{Document, DocumentInfo, Message, Session};
use crate::completion::CompletionError;
use crate::history::{self, Upsert};
use crate::session::build_session;
use chrono::TimeZone;
use serde::Serialize;

pub const FALLBACK_ANSWER: &str =
    "Sorry, I encountered an error while processing your question. Please try again.";

/// Everything the conversation controller tracks between user actions.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub loading: bool,
    pub document: Option<Document>,
    pub session_id: Option<String>,
    pub history: Vec<Session>,
}

/// A question accepted by [`ConversationState::begin_send`], waiting for an answer.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub message: Message,
    pub question: String,
    pub context: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Ready,
    Processing,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub message_count: usize,
    pub document_loaded: bool,
    pub status: Status,
    pub total_sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub messages: Vec<Message>,
    pub loading: bool,
    pub document: Option<DocumentInfo>,
    pub session_id: Option<String>,
    pub stats: Stats,
}

impl ConversationState {
    pub fn with_history(history: Vec<Session>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn upload_document(&mut self, document: Document) {
        self.document = Some(document);
        self.messages.clear();
        self.session_id = None;
    }

    pub fn clear_document(&mut self) {
        self.document = None;
        self.messages.clear();
        self.session_id = None;
    }

    /// Append the user's question and mark a request as in flight.
    ///
    /// Returns `None` without touching state when there is no document,
    /// a request is already running, or the text is blank.
    pub fn begin_send(&mut self, text: &str) -> Option<PendingRequest> {
        let question = text.trim();
        if question.is_empty() || self.loading {
            return None;
        }
        let context = self.document.as_ref()?.extracted_text.clone();

        let message = Message::user(question);
        self.messages.push(message.clone());
        self.loading = true;

        Some(PendingRequest {
            message,
            question: question.to_string(),
            context,
        })
    }

    /// Record the outcome of the in-flight request as an assistant message.
    pub fn finish_send(&mut self, outcome: Result<String, CompletionError>) -> Message {
        let text = outcome.unwrap_or_else(|_| FALLBACK_ANSWER.to_string());
        let message = Message::assistant(text);
        self.messages.push(message.clone());
        self.loading = false;
        message
    }

    pub fn load_session(&mut self, session: &Session) {
        self.messages = session.messages.clone();
        self.session_id = Some(session.id.clone());

        let keep = matches!(
            (&self.document, &session.document_name),
            (Some(doc), Some(name)) if &doc.name == name
        );
        if !keep {
            self.document = None;
        }
    }

    pub fn new_chat(&mut self) {
        self.messages.clear();
        self.session_id = None;
    }

    /// Fold the active conversation into history.
    ///
    /// Does nothing while the conversation is empty, a request is running,
    /// or no document is active. A session not yet in history is inserted
    /// first and its id becomes the active session id.
    pub fn sync_history<Tz: TimeZone>(&mut self, tz: &Tz) -> Option<Upsert> {
        if self.messages.is_empty() || self.loading {
            return None;
        }
        let document = self.document.as_ref()?;

        let mut session = build_session(&self.messages, Some(&document.name), tz);
        if let Some(id) = &self.session_id {
            if self.history.iter().any(|s| &s.id == id) {
                session = session.with_id(id.clone());
            }
        }

        let id = session.id.clone();
        let outcome = history::upsert(&mut self.history, session);
        if outcome == Upsert::Inserted {
            self.session_id = Some(id);
        }
        Some(outcome)
    }

    pub fn active_session(&self) -> Option<&Session> {
        let id = self.session_id.as_ref()?;
        self.history.iter().find(|s| &s.id == id)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            messages: self.messages.clone(),
            loading: self.loading,
            document: self.document.as_ref().map(Document::info),
            session_id: self.session_id.clone(),
            stats: Stats {
                message_count: self.messages.len(),
                document_loaded: self.document.is_some(),
                status: if self.loading {
                    Status::Processing
                } else {
                    Status::Ready
                },
                total_sessions: self.history.len(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;
    use chrono::Utc;

    fn with_document(name: &str) -> ConversationState {
        let mut state = ConversationState::default();
        state.upload_document(Document::new(name, "Submissions close June 1."));
        state
    }

    fn exchange(state: &mut ConversationState, question: &str, answer: &str) {
        state.begin_send(question).unwrap();
        state.finish_send(Ok(answer.to_string()));
        state.sync_history(&Utc);
    }

    #[test]
    fn send_without_document_is_noop() {
        let mut state = ConversationState::default();
        assert!(state.begin_send("What is the deadline?").is_none());
        assert!(state.messages.is_empty());
        assert!(!state.loading);
    }

    #[test]
    fn send_while_loading_is_noop() {
        let mut state = with_document("spec.pdf");
        assert!(state.begin_send("first").is_some());
        assert!(state.begin_send("second").is_none());
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn blank_input_is_ignored() {
        let mut state = with_document("spec.pdf");
        assert!(state.begin_send("   ").is_none());
        assert!(state.messages.is_empty());
    }

    #[test]
    fn begin_send_is_optimistic() {
        let mut state = with_document("spec.pdf");
        let pending = state.begin_send("  What is the deadline?  ").unwrap();

        assert_eq!(pending.question, "What is the deadline?");
        assert_eq!(pending.context, "Submissions close June 1.");
        assert!(state.loading);
        assert_eq!(state.messages, vec![pending.message]);
        // Nothing is saved mid-request.
        assert_eq!(state.sync_history(&Utc), None);
        assert!(state.history.is_empty());
    }

    #[test]
    fn first_exchange_creates_session() {
        let mut state = with_document("spec.pdf");
        state.begin_send("What is the deadline?").unwrap();
        state.finish_send(Ok("The deadline is June 1.".into()));

        assert_eq!(state.sync_history(&Utc), Some(Upsert::Inserted));

        let roles: Vec<_> = state.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(state.messages[1].text, "The deadline is June 1.");

        let session = state.active_session().unwrap();
        assert_eq!(session.document_name.as_deref(), Some("spec.pdf"));
        assert_eq!(session.topic, "What is the deadline?");
        assert_eq!(session.messages.len(), 2);
        assert_eq!(state.history.len(), 1);
    }

    #[test]
    fn later_exchanges_amend_same_session() {
        let mut state = with_document("spec.pdf");
        exchange(&mut state, "What is the deadline?", "June 1.");
        let id = state.session_id.clone().unwrap();

        exchange(&mut state, "Who signs it?", "The director.");

        assert_eq!(state.history.len(), 1);
        assert_eq!(state.session_id.as_deref(), Some(id.as_str()));
        assert_eq!(state.history[0].messages.len(), 4);
    }

    #[test]
    fn failed_completion_appends_fallback() {
        let mut state = with_document("spec.pdf");
        state.begin_send("What is the deadline?").unwrap();
        let reply = state.finish_send(Err(CompletionError::InvalidResponse("boom".into())));

        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.text, FALLBACK_ANSWER);
        assert_eq!(state.messages.len(), 2);
        assert!(!state.loading);
    }

    #[test]
    fn new_chat_starts_fresh_session() {
        let mut state = with_document("spec.pdf");
        exchange(&mut state, "What is the deadline?", "June 1.");
        let first = state.session_id.clone().unwrap();

        state.new_chat();
        assert!(state.messages.is_empty());
        assert!(state.session_id.is_none());
        assert!(state.document.is_some());

        exchange(&mut state, "Summarize it", "Short.");
        assert_eq!(state.history.len(), 2);
        assert_ne!(state.history[0].id, first);
        assert_eq!(state.history[0].topic, "Summary Request");
    }

    #[test]
    fn upload_and_clear_reset_conversation() {
        let mut state = with_document("spec.pdf");
        exchange(&mut state, "What is the deadline?", "June 1.");

        state.upload_document(Document::new("other.pdf", "text"));
        assert!(state.messages.is_empty());
        assert!(state.session_id.is_none());
        assert_eq!(state.document.as_ref().unwrap().name, "other.pdf");

        exchange(&mut state, "What?", "Nothing.");
        state.clear_document();
        assert!(state.document.is_none());
        assert!(state.messages.is_empty());
        assert!(state.session_id.is_none());
        assert_eq!(state.history.len(), 2);
    }

    #[test]
    fn load_session_keeps_matching_document() {
        let mut state = with_document("spec.pdf");
        exchange(&mut state, "What is the deadline?", "June 1.");
        let saved = state.history[0].clone();

        state.new_chat();
        state.load_session(&saved);

        assert_eq!(state.messages, saved.messages);
        assert_eq!(state.session_id.as_deref(), Some(saved.id.as_str()));
        assert!(state.document.is_some());

        // Reloading amends rather than duplicates.
        assert_eq!(state.sync_history(&Utc), Some(Upsert::Replaced));
        assert_eq!(state.history.len(), 1);
    }

    #[test]
    fn load_session_drops_other_document() {
        let mut state = with_document("spec.pdf");
        exchange(&mut state, "What is the deadline?", "June 1.");
        let saved = state.history[0].clone();

        state.upload_document(Document::new("other.pdf", "text"));
        state.load_session(&saved);

        assert!(state.document.is_none());
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.sync_history(&Utc), None);
    }

    #[test]
    fn unknown_active_id_inserts_new_session() {
        let mut state = with_document("spec.pdf");
        state.session_id = Some("ses_missing".into());
        exchange(&mut state, "What is the deadline?", "June 1.");

        assert_eq!(state.history.len(), 1);
        assert_ne!(state.history[0].id, "ses_missing");
        assert_eq!(state.session_id.as_deref(), Some(state.history[0].id.as_str()));
    }

    #[test]
    fn snapshot_reports_stats() {
        let mut state = with_document("spec.pdf");
        state.begin_send("What is the deadline?").unwrap();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.stats.message_count, 1);
        assert!(snapshot.stats.document_loaded);
        assert_eq!(snapshot.stats.status, Status::Processing);
        assert_eq!(snapshot.stats.total_sessions, 0);
        assert_eq!(snapshot.document.unwrap().name, "spec.pdf");
    }
}
