use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "ai")]
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self::at(role, text, Utc::now())
    }

    pub fn at(role: Role, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            role,
            text: text.into(),
            created_at,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// The PDF currently used as context for questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub extracted_text: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    pub fn new(name: impl Into<String>, extracted_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extracted_text: extracted_text.into(),
            uploaded_at: Utc::now(),
        }
    }

    /// Public view of the document; the extracted text stays on the server.
    pub fn info(&self) -> DocumentInfo {
        DocumentInfo {
            name: self.name.clone(),
            uploaded_at: self.uploaded_at,
            characters: self.extracted_text.chars().count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
    pub characters: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub date: NaiveDate,
    pub topic: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,
}

impl Session {
    pub fn new_id() -> String {
        format!("ses_{}", Uuid::new_v4().simple())
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Short excerpt of the opening question, as shown in history listings.
    pub fn preview(&self) -> String {
        match self.messages.iter().find(|m| m.role == Role::User) {
            Some(first) => {
                let head: String = first.text.chars().take(50).collect();
                format!("{}...", head)
            }
            None => "No messages".to_string(),
        }
    }
}
