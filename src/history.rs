use crate::chat::Session;
use crate::store::SlotStore;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const HISTORY_SLOT: &str = "pdf-qa-chat-history";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Replaced,
    Inserted,
}

/// Replace the session with the same id in place, or put it first.
pub fn upsert(history: &mut Vec<Session>, session: Session) -> Upsert {
    match history.iter_mut().find(|s| s.id == session.id) {
        Some(existing) => {
            *existing = session;
            Upsert::Replaced
        }
        None => {
            history.insert(0, session);
            Upsert::Inserted
        }
    }
}

pub fn group_by_date(history: &[Session]) -> BTreeMap<NaiveDate, Vec<Session>> {
    let mut grouped: BTreeMap<NaiveDate, Vec<Session>> = BTreeMap::new();
    for session in history {
        grouped.entry(session.date).or_default().push(session.clone());
    }
    grouped
}

/// Distinct session dates, newest first.
pub fn available_dates(history: &[Session]) -> Vec<NaiveDate> {
    group_by_date(history).into_keys().rev().collect()
}

pub fn sessions_on(history: &[Session], date: Option<NaiveDate>) -> Vec<Session> {
    match date {
        Some(date) => history.iter().filter(|s| s.date == date).cloned().collect(),
        None => history.to_vec(),
    }
}

/// Persists the session list as a single JSON blob in a slot.
#[derive(Clone)]
pub struct HistoryStore {
    slots: Arc<dyn SlotStore>,
    key: String,
}

impl HistoryStore {
    pub fn new(slots: Arc<dyn SlotStore>) -> Self {
        Self {
            slots,
            key: HISTORY_SLOT.to_string(),
        }
    }

    /// Failures are logged and dropped; the in-memory list stays authoritative.
    pub async fn save(&self, sessions: &[Session]) {
        let blob = match serde_json::to_string(sessions) {
            Ok(blob) => blob,
            Err(e) => {
                error!("Failed to serialize chat history: {}", e);
                return;
            }
        };

        match self.slots.write_slot(&self.key, &blob).await {
            Ok(()) => debug!(sessions = sessions.len(), "Chat history saved"),
            Err(e) => error!("Failed to save chat history: {:#}", e),
        }
    }

    /// Missing or unreadable history loads as an empty list.
    pub async fn load(&self) -> Vec<Session> {
        match self.slots.read_slot(&self.key).await {
            Ok(Some(blob)) => decode_history(&blob),
            Ok(None) => Vec::new(),
            Err(e) => {
                error!("Failed to load chat history: {:#}", e);
                Vec::new()
            }
        }
    }
}

/// Parse a stored history blob, keeping only well-formed sessions.
pub fn decode_history(blob: &str) -> Vec<Session> {
    let entries: Vec<Value> = match serde_json::from_str(blob) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Discarding corrupt chat history: {}", e);
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut sessions = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<Session>(entry) {
            Ok(session) => {
                if seen.insert(session.id.clone()) {
                    sessions.push(session);
                } else {
                    warn!(id = %session.id, "Skipping duplicate session");
                }
            }
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed session");
            }
        }
    }

    sessions
}
