use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// System label ids understood by Gmail
pub const INBOX_LABEL: &str = "INBOX";
pub const UNREAD_LABEL: &str = "UNREAD";

/// A fetched mailbox message, reduced to what the triage pipeline needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    /// RFC 5322 `Message-ID` header, used for reply threading when present
    pub message_id_header: Option<String>,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub unread: bool,
}

impl Message {
    /// Identifier to put in `In-Reply-To` / `References`
    pub fn thread_reference(&self) -> &str {
        self.message_id_header.as_deref().unwrap_or(&self.id)
    }
}

/// Closed set of classification outcomes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    Interested,
    NotInterested,
    MoreInformation,
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Interested,
        Category::NotInterested,
        Category::MoreInformation,
        Category::Other,
    ];

    /// Mailbox label a message of this category is filed under
    pub fn label_name(&self) -> &'static str {
        match self {
            Category::Interested => "Interested",
            Category::NotInterested => "Not Interested",
            Category::MoreInformation => "More Information",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label_name())
    }
}

/// Label info returned from the mail provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// Access credential handed out by an authenticator
#[derive(Clone)]
pub struct Credential {
    pub access_token: String,
    pub obtained_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            obtained_at: Utc::now(),
        }
    }

    /// An empty token cannot authorize any request
    pub fn is_usable(&self) -> bool {
        !self.access_token.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// Result of one side effect performed for a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Done,
    Failed(String),
    Skipped,
}

impl StepOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, StepOutcome::Done)
    }
}

impl<E: fmt::Display> From<std::result::Result<(), E>> for StepOutcome {
    fn from(result: std::result::Result<(), E>) -> Self {
        match result {
            Ok(()) => StepOutcome::Done,
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }
}

/// A message that made it through classification, with what happened next
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEmail {
    pub message: Message,
    pub category: Category,
    pub reply: StepOutcome,
    pub label: StepOutcome,
    pub mark_read: StepOutcome,
}
