use crate::chat::{Message, Role, Session};
use chrono::{NaiveDate, TimeZone, Utc};

const TOPIC_WORDS: usize = 5;
const FALLBACK_WORDS: usize = 4;
const PREFIX_CHARS: usize = 30;

/// Builds a session record from the current conversation.
///
/// The session gets a fresh id; callers amending an existing session swap it
/// with [`Session::with_id`]. `tz` decides which calendar day a timestamp
/// falls on.
pub fn build_session<Tz: TimeZone>(
    messages: &[Message],
    document_name: Option<&str>,
    tz: &Tz,
) -> Session {
    Session {
        id: Session::new_id(),
        date: session_date(messages, tz),
        topic: derive_topic(messages),
        messages: messages.to_vec(),
        document_name: document_name.map(str::to_string),
    }
}

/// Calendar day of the first message, or today for an empty conversation.
pub fn session_date<Tz: TimeZone>(messages: &[Message], tz: &Tz) -> NaiveDate {
    let first = messages.first().map(|m| m.created_at).unwrap_or_else(Utc::now);
    first.with_timezone(tz).date_naive()
}

/// Best-effort label for a conversation, taken from its first question.
pub fn derive_topic(messages: &[Message]) -> String {
    let Some(first) = messages.iter().find(|m| m.role == Role::User) else {
        return "New Chat".to_string();
    };

    let text = first.text.as_str();
    let lowered = text.to_lowercase();

    if lowered.contains("what") || lowered.contains("explain") {
        return leading_words(text, TOPIC_WORDS);
    }

    if lowered.contains("how") {
        return format!("How-to: {}...", leading_chars(text, PREFIX_CHARS));
    }

    if lowered.contains("summary") || lowered.contains("summarize") {
        return "Summary Request".to_string();
    }

    if lowered.contains("find") || lowered.contains("search") {
        return format!("Search: {}...", leading_chars(text, PREFIX_CHARS));
    }

    leading_words(text, FALLBACK_WORDS)
}

fn leading_words(text: &str, count: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let head = words.iter().take(count).copied().collect::<Vec<_>>().join(" ");
    if words.len() > count {
        format!("{}...", head)
    } else {
        head
    }
}

fn leading_chars(text: &str, count: usize) -> String {
    text.chars().take(count).collect()
}
