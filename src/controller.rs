use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{error, info, warn};

use crate::bus::{Event, EventBus};
use crate::chat::{DocumentInfo, Message, Session};
use crate::completion::CompletionClient;
use crate::document::{self, DocumentExtractor, UploadError};
use crate::history::{self, HistoryStore};
use crate::state::{ConversationState, PendingRequest, Snapshot};

/// The question and reply produced by one accepted send.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub question: Message,
    pub reply: Message,
    pub failed: bool,
}

/// Owns the conversation and applies user actions to it.
///
/// Every transition runs under one lock, including the history write that
/// follows it. The lock is released while a completion request is in
/// flight; the loading flag keeps a second send out in the meantime.
pub struct Controller {
    state: Mutex<ConversationState>,
    completion: Arc<dyn CompletionClient>,
    extractor: Arc<dyn DocumentExtractor>,
    history: HistoryStore,
    event_bus: Arc<EventBus>,
    max_upload_bytes: usize,
}

impl Controller {
    pub async fn new(
        completion: Arc<dyn CompletionClient>,
        extractor: Arc<dyn DocumentExtractor>,
        history: HistoryStore,
        event_bus: Arc<EventBus>,
        max_upload_bytes: usize,
    ) -> Self {
        let sessions = history.load().await;
        info!("Loaded {} saved sessions", sessions.len());

        Self {
            state: Mutex::new(ConversationState::with_history(sessions)),
            completion,
            extractor,
            history,
            event_bus,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn upload_document(
        &self,
        name: &str,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<DocumentInfo, UploadError> {
        let doc = document::ingest(
            self.extractor.as_ref(),
            name,
            content_type,
            bytes,
            self.max_upload_bytes,
        )
        .await?;
        let doc_info = doc.info();

        let mut state = self.state.lock().await;
        state.upload_document(doc);
        info!(document = %doc_info.name, characters = doc_info.characters, "Document loaded");

        self.event_bus
            .publish(Event::DocumentChanged(Some(doc_info.clone())));
        self.publish_reset(&state);

        Ok(doc_info)
    }

    pub async fn clear_document(&self) {
        let mut state = self.state.lock().await;
        state.clear_document();

        self.event_bus.publish(Event::DocumentChanged(None));
        self.publish_reset(&state);
    }

    /// Ask a question about the active document.
    ///
    /// Returns `None` when the send was ignored (no document, blank text, or
    /// a request already running). Completion failures come back as an
    /// exchange whose reply is the fallback apology.
    ///
    /// Once accepted, the request runs on its own task. Dropping the returned
    /// future (a client hanging up, say) does not stop the reply from being
    /// appended or the loading flag from clearing.
    pub async fn send_message(self: &Arc<Self>, text: &str) -> Option<Exchange> {
        let pending = {
            let mut state = self.state.lock().await;
            let pending = state.begin_send(text)?;
            self.event_bus
                .publish(Event::MessageAppended(pending.message.clone()));
            self.event_bus
                .publish(Event::LoadingChanged { loading: true });
            pending
        };

        let controller = Arc::clone(self);
        let handle = task::spawn(async move { controller.complete_pending(pending).await });

        match handle.await {
            Ok(exchange) => Some(exchange),
            Err(e) => {
                error!("Completion task failed: {}", e);
                None
            }
        }
    }

    async fn complete_pending(&self, pending: PendingRequest) -> Exchange {
        let outcome = self
            .completion
            .complete(&pending.question, &pending.context)
            .await;

        let failed = match &outcome {
            Ok(_) => false,
            Err(e) => {
                warn!(retryable = e.is_retryable(), "Completion request failed: {}", e);
                true
            }
        };

        let mut state = self.state.lock().await;
        let reply = state.finish_send(outcome);
        self.event_bus.publish(Event::MessageAppended(reply.clone()));
        self.event_bus
            .publish(Event::LoadingChanged { loading: false });
        self.persist(&mut state).await;

        Exchange {
            question: pending.message,
            reply,
            failed,
        }
    }

    /// Reopen a saved session. Returns `None` for an unknown id.
    pub async fn load_session(&self, id: &str) -> Option<Snapshot> {
        let mut state = self.state.lock().await;
        let session = state.history.iter().find(|s| s.id == id)?.clone();

        let had_document = state.document.is_some();
        state.load_session(&session);
        if had_document && state.document.is_none() {
            self.event_bus.publish(Event::DocumentChanged(None));
        }
        self.publish_reset(&state);
        self.persist(&mut state).await;

        Some(state.snapshot())
    }

    pub async fn new_chat(&self) {
        let mut state = self.state.lock().await;
        state.new_chat();
        self.publish_reset(&state);
    }

    pub async fn sessions(&self, date: Option<NaiveDate>) -> Vec<Session> {
        let state = self.state.lock().await;
        history::sessions_on(&state.history, date)
    }

    pub async fn available_dates(&self) -> Vec<NaiveDate> {
        let state = self.state.lock().await;
        history::available_dates(&state.history)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_bus.subscribe()
    }

    async fn persist(&self, state: &mut ConversationState) {
        if state.sync_history(&Local).is_none() {
            return;
        }
        self.history.save(&state.history).await;

        if let Some(session) = state.active_session() {
            self.event_bus.publish(Event::SessionSaved {
                id: session.id.clone(),
                topic: session.topic.clone(),
                total: state.history.len(),
            });
        }
    }

    fn publish_reset(&self, state: &ConversationState) {
        self.event_bus.publish(Event::ConversationReset {
            session_id: state.session_id.clone(),
            messages: state.messages.clone(),
        });
    }
}
