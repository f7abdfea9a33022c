use crate::chat::{DocumentInfo, Message};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// A message was appended to the active conversation
    MessageAppended(Message),

    /// A completion request started or finished
    LoadingChanged { loading: bool },

    /// The active document was replaced or cleared
    DocumentChanged(Option<DocumentInfo>),

    /// The active message list was replaced wholesale (new chat, session load)
    ConversationReset {
        session_id: Option<String>,
        messages: Vec<Message>,
    },

    /// A session was created or amended in history
    SessionSaved { id: String, topic: String, total: usize },
}

pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // We ignore the error if there are no receivers
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
