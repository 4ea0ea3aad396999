//! Gmail transport client with bounded concurrency and per-call timeouts

use async_trait::async_trait;
use google_gmail1::api::{self, Label, MessagePart, ModifyMessageRequest};
use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::auth::{GmailHub, LABELS_SCOPE, MODIFY_SCOPE};
use crate::error::{Result, TriageError};
use crate::models::{LabelInfo, Message, UNREAD_LABEL};
use crate::reply::RawMessage;

/// Operations the triage pipeline needs from a mailbox
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// List ids of unread messages, at most `max`
    async fn list_unread(&self, max: u32) -> Result<Vec<String>>;

    /// Fetch a message with headers and body
    async fn get_message(&self, id: &str) -> Result<Message>;

    /// Send a raw RFC 822 message inside an existing thread
    async fn send_raw(&self, message: &RawMessage, thread_id: &str) -> Result<()>;

    /// Add and remove label ids on a message
    async fn modify_labels(&self, id: &str, add: &[String], remove: &[String]) -> Result<()>;

    /// List all labels in the mailbox
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a label visible in both the label list and the message list
    async fn create_label(&self, name: &str) -> Result<LabelInfo>;
}

#[async_trait]
impl<T: MailTransport + ?Sized> MailTransport for Arc<T> {
    async fn list_unread(&self, max: u32) -> Result<Vec<String>> {
        self.as_ref().list_unread(max).await
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        self.as_ref().get_message(id).await
    }

    async fn send_raw(&self, message: &RawMessage, thread_id: &str) -> Result<()> {
        self.as_ref().send_raw(message, thread_id).await
    }

    async fn modify_labels(&self, id: &str, add: &[String], remove: &[String]) -> Result<()> {
        self.as_ref().modify_labels(id, add, remove).await
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.as_ref().list_labels().await
    }

    async fn create_label(&self, name: &str) -> Result<LabelInfo> {
        self.as_ref().create_label(name).await
    }
}

/// Production Gmail transport
///
/// Bounds in-flight requests with a semaphore and fails any call that exceeds the
/// configured timeout with a `NetworkError`. Nothing is retried here.
pub struct GmailTransport {
    hub: GmailHub,
    rate_limiter: Arc<Semaphore>,
    timeout: Duration,
}

impl GmailTransport {
    /// Create a new Gmail transport
    ///
    /// # Arguments
    /// * `hub` - Gmail API hub instance
    /// * `max_concurrent` - Maximum concurrent requests
    /// * `timeout` - Upper bound for a single API call
    pub fn new(hub: GmailHub, max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            hub,
            rate_limiter: Arc::new(Semaphore::new(max_concurrent)),
            timeout,
        }
    }

    /// Run one API call under a rate-limit permit and the call timeout
    async fn call<T, F>(&self, operation_name: &str, api_call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        let _permit = self.rate_limiter.acquire().await.map_err(|e| {
            TriageError::Unknown(format!("Failed to acquire rate limit permit: {}", e))
        })?;

        debug!("Calling Gmail API: {}", operation_name);
        match tokio::time::timeout(self.timeout, api_call).await {
            Ok(result) => result.map_err(TriageError::from),
            Err(_) => {
                warn!("Gmail API {} call timed out after {:?}", operation_name, self.timeout);
                Err(TriageError::NetworkError(format!(
                    "API call timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl MailTransport for GmailTransport {
    async fn list_unread(&self, max: u32) -> Result<Vec<String>> {
        let (_, response) = self
            .call("messages.list", async {
                self.hub
                    .users()
                    .messages_list("me")
                    .add_label_ids(UNREAD_LABEL)
                    .max_results(max)
                    .add_scope(MODIFY_SCOPE)
                    .doit()
                    .await
            })
            .await?;

        Ok(response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        let (_, msg) = self
            .call("messages.get", async {
                self.hub
                    .users()
                    .messages_get("me", id)
                    .format("full")
                    .add_scope(MODIFY_SCOPE)
                    .doit()
                    .await
            })
            .await?;

        parse_message(msg)
    }

    async fn send_raw(&self, message: &RawMessage, thread_id: &str) -> Result<()> {
        let metadata = api::Message {
            thread_id: Some(thread_id.to_string()),
            ..Default::default()
        };
        let mime_type: mime::Mime = "message/rfc822"
            .parse()
            .map_err(|e| TriageError::Unknown(format!("Invalid MIME type: {}", e)))?;
        let content = message.rfc822().as_bytes().to_vec();

        self.call("messages.send", async {
            self.hub
                .users()
                .messages_send(metadata, "me")
                .add_scope(MODIFY_SCOPE)
                .upload(Cursor::new(content), mime_type)
                .await
        })
        .await?;

        Ok(())
    }

    async fn modify_labels(&self, id: &str, add: &[String], remove: &[String]) -> Result<()> {
        let request = ModifyMessageRequest {
            add_label_ids: (!add.is_empty()).then(|| add.to_vec()),
            remove_label_ids: (!remove.is_empty()).then(|| remove.to_vec()),
        };

        self.call("messages.modify", async {
            self.hub
                .users()
                .messages_modify(request, "me", id)
                .add_scope(MODIFY_SCOPE)
                .doit()
                .await
        })
        .await?;

        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let (_, response) = self
            .call("labels.list", async {
                self.hub
                    .users()
                    .labels_list("me")
                    .add_scope(LABELS_SCOPE)
                    .doit()
                    .await
            })
            .await?;

        let labels: Vec<LabelInfo> = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                _ => None,
            })
            .collect();

        debug!("Successfully parsed {} labels", labels.len());
        Ok(labels)
    }

    async fn create_label(&self, name: &str) -> Result<LabelInfo> {
        let label = Label {
            name: Some(name.to_string()),
            message_list_visibility: Some("show".to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            ..Default::default()
        };

        let (_, created) = self
            .call("labels.create", async {
                self.hub
                    .users()
                    .labels_create(label, "me")
                    .add_scope(LABELS_SCOPE)
                    .doit()
                    .await
            })
            .await?;

        let id = created
            .id
            .ok_or_else(|| TriageError::LabelError("Created label has no ID".to_string()))?;
        Ok(LabelInfo {
            id,
            name: created.name.unwrap_or_else(|| name.to_string()),
        })
    }
}

/// Parse a Gmail API message into our Message structure
pub fn parse_message(msg: api::Message) -> Result<Message> {
    let id = msg
        .id
        .ok_or_else(|| TriageError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let thread_id = msg
        .thread_id
        .ok_or_else(|| TriageError::InvalidMessageFormat("Missing thread ID".to_string()))?;

    let payload = msg
        .payload
        .ok_or_else(|| TriageError::InvalidMessageFormat("Missing payload".to_string()))?;

    let subject = header_value(&payload, "Subject").unwrap_or_else(|| "No Subject".to_string());
    let from = header_value(&payload, "From").unwrap_or_else(|| "Unknown Sender".to_string());
    let message_id_header = header_value(&payload, "Message-ID");
    let unread = msg
        .label_ids
        .map(|labels| labels.iter().any(|l| l == UNREAD_LABEL))
        .unwrap_or(false);

    Ok(Message {
        id,
        thread_id,
        message_id_header,
        from,
        subject,
        body: extract_plain_text(&payload),
        unread,
    })
}

/// Look up a header by name (case-insensitive)
pub fn header_value(part: &MessagePart, name: &str) -> Option<String> {
    part.headers
        .as_ref()?
        .iter()
        .find(|h| {
            h.name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|h| h.value.clone())
}

/// Plain-text body of a message payload
///
/// Multipart payloads yield their first `text/plain` part (searched depth-first);
/// single-part payloads yield their body data. Anything else is empty.
pub fn extract_plain_text(payload: &MessagePart) -> String {
    let data = match payload.parts.as_deref() {
        Some(parts) if !parts.is_empty() => first_plain_text_part(parts),
        _ => payload.body.as_ref().and_then(|b| b.data.as_deref()),
    };

    data.map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default()
}

fn first_plain_text_part(parts: &[MessagePart]) -> Option<&[u8]> {
    parts.iter().find_map(|part| {
        let is_plain = part
            .mime_type
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("text/plain"));
        if is_plain {
            if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
                return Some(data);
            }
        }
        part.parts.as_deref().and_then(first_plain_text_part)
    })
}
