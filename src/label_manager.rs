//! Label resolution and application
//!
//! Label names are matched case-insensitively, as Gmail does. Creation is serialized
//! per name so concurrent callers resolving the same label never create it twice
//! within this process; a creation race with another client is absorbed by treating
//! "already exists" as success and re-listing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::client::MailTransport;
use crate::error::{Result, TriageError};
use crate::models::INBOX_LABEL;

/// Resolves label names to ids and files messages under them
pub struct LabelManager {
    client: Arc<dyn MailTransport>,
    label_cache: Mutex<HashMap<String, String>>, // label_key(name) -> id
    creation_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Cache and comparison key for a label name
fn label_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl LabelManager {
    pub fn new(client: Arc<dyn MailTransport>) -> Self {
        Self {
            client,
            label_cache: Mutex::new(HashMap::new()),
            creation_locks: Mutex::new(HashMap::new()),
        }
    }

    fn cache_get(&self, name: &str) -> Option<String> {
        self.label_cache.lock().ok()?.get(&label_key(name)).cloned()
    }

    fn cache_insert(&self, name: &str, id: String) {
        if let Ok(mut cache) = self.label_cache.lock() {
            cache.insert(label_key(name), id);
        }
    }

    /// Forget a cached id so the next use resolves the name again
    pub fn invalidate(&self, name: &str) {
        if let Ok(mut cache) = self.label_cache.lock() {
            cache.remove(&label_key(name));
        }
    }

    fn creation_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .creation_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(label_key(name)).or_default())
    }

    /// Look up a label id by name from the mailbox
    async fn find_remote(&self, name: &str) -> Result<Option<String>> {
        let key = label_key(name);
        let labels = self.client.list_labels().await?;
        Ok(labels
            .into_iter()
            .find(|label| label_key(&label.name) == key)
            .map(|label| label.id))
    }

    /// Returns the id of the label called `name`, creating it if it does not exist
    pub async fn ensure_label(&self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TriageError::LabelError("Label name cannot be empty".to_string()));
        }

        if let Some(id) = self.cache_get(name) {
            return Ok(id);
        }

        let lock = self.creation_lock(name);
        let _guard = lock.lock().await;

        // Another task may have resolved it while we waited
        if let Some(id) = self.cache_get(name) {
            return Ok(id);
        }

        if let Some(id) = self.find_remote(name).await? {
            debug!("Label '{}' already exists with ID: {}", name, id);
            self.cache_insert(name, id.clone());
            return Ok(id);
        }

        info!("Creating label: {}", name);
        let id = match self.client.create_label(name).await {
            Ok(label) => {
                info!("Successfully created label '{}' with ID: {}", name, label.id);
                label.id
            }
            Err(e) if e.is_already_exists() => {
                debug!("Label '{}' was created concurrently, re-reading", name);
                self.find_remote(name).await?.ok_or_else(|| {
                    TriageError::LabelError(format!(
                        "Label '{}' reported as existing but not listed",
                        name
                    ))
                })?
            }
            Err(e) => return Err(e),
        };

        self.cache_insert(name, id.clone());
        Ok(id)
    }

    /// File a message under `label_name` and remove it from the inbox
    pub async fn apply_label(&self, message_id: &str, label_name: &str) -> Result<()> {
        let label_id = self.ensure_label(label_name).await?;

        let result = self
            .client
            .modify_labels(message_id, &[label_id], &[INBOX_LABEL.to_string()])
            .await;

        match result {
            Ok(()) => {
                info!("Moved message {} to label: {}", message_id, label_name);
                Ok(())
            }
            Err(e) => {
                // The cached id may be stale (label deleted remotely)
                debug!("Evicting cached id for label '{}' after failed modify", label_name);
                self.invalidate(label_name);
                Err(e)
            }
        }
    }
}
