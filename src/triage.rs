//! Triage orchestrator: one fetch → classify → reply → label → mark-read cycle
//!
//! A cycle lists up to `batch_size` unread messages and fetches each one. Failures are
//! scoped as narrowly as possible:
//!
//! - a message whose details cannot be fetched is dropped from the cycle
//! - a classifier failure degrades to [`Category::Other`]
//! - reply and label run side by side, and either may fail without affecting the other
//! - a message is marked read only once its label has been applied
//!
//! The one exception is an authorization failure while listing or fetching. That aborts the
//! attempt, forces a credential refresh, and retries the whole cycle exactly once.
//! Nothing here returns an error to the caller; a failed cycle yields an empty report.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::auth::Authenticator;
use crate::classifier::Classifier;
use crate::client::MailTransport;
use crate::error::{Result, TriageError};
use crate::label_manager::LabelManager;
use crate::models::{Category, Credential, Message, ProcessedEmail, StepOutcome, UNREAD_LABEL};
use crate::reply::ReplyComposer;

/// Attempts per cycle: the first try plus one retry after a credential refresh
const MAX_ATTEMPTS: usize = 2;

/// Outcome of one cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Messages that made it through classification, in listing order
    pub processed: Vec<ProcessedEmail>,
    /// Messages listed but dropped because their details could not be fetched
    pub fetch_failures: usize,
}

impl CycleReport {
    pub(crate) fn new(cycle_id: Uuid) -> Self {
        Self {
            cycle_id,
            started_at: Utc::now(),
            processed: Vec::new(),
            fetch_failures: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    /// `(message, category)` pairs for every processed message
    pub fn classified(&self) -> impl Iterator<Item = (&Message, Category)> {
        self.processed.iter().map(|p| (&p.message, p.category))
    }

    pub fn replies_sent(&self) -> usize {
        self.processed.iter().filter(|p| p.reply.is_done()).count()
    }

    pub fn labeled(&self) -> usize {
        self.processed.iter().filter(|p| p.label.is_done()).count()
    }

    pub fn marked_read(&self) -> usize {
        self.processed.iter().filter(|p| p.mark_read.is_done()).count()
    }
}

/// Drives the triage pipeline against a mailbox
pub struct TriageOrchestrator {
    authenticator: Arc<dyn Authenticator>,
    client: Arc<dyn MailTransport>,
    classifier: Arc<dyn Classifier>,
    labels: LabelManager,
    composer: ReplyComposer,
    batch_size: u32,
    concurrency: usize,
}

impl TriageOrchestrator {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        client: Arc<dyn MailTransport>,
        classifier: Arc<dyn Classifier>,
        composer: ReplyComposer,
    ) -> Self {
        Self {
            authenticator,
            labels: LabelManager::new(Arc::clone(&client)),
            client,
            classifier,
            composer,
            batch_size: 10,
            concurrency: 10,
        }
    }

    /// Maximum number of unread messages handled per cycle
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Number of messages worked on concurrently within a phase
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Run one cycle
    ///
    /// Never fails: every error is logged and degrades to a smaller (possibly empty) report.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", %cycle_id);
        self.run_cycle_inner(cycle_id).instrument(span).await
    }

    async fn run_cycle_inner(&self, cycle_id: Uuid) -> CycleReport {
        let mut report = CycleReport::new(cycle_id);

        match self.load_usable_credentials().await {
            Ok(credential) => {
                debug!(obtained_at = %credential.obtained_at, "Using stored credentials");
            }
            Err(e) => {
                warn!("Stored credentials unusable ({}), refreshing", e);
                if !self.refresh_credentials().await {
                    return report;
                }
            }
        }

        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(&mut report).await {
                Ok(()) => {
                    info!(
                        "Cycle complete: {} processed, {} replied, {} labeled, {} marked read, {} fetch failures",
                        report.len(),
                        report.replies_sent(),
                        report.labeled(),
                        report.marked_read(),
                        report.fetch_failures
                    );
                    return report;
                }
                Err(e) if e.is_auth_failure() && attempt < MAX_ATTEMPTS => {
                    warn!("Authorization rejected ({}), refreshing credentials and retrying", e);
                    if !self.refresh_credentials().await {
                        return report;
                    }
                }
                Err(e) if e.is_auth_failure() => {
                    error!("Authorization rejected again after refresh, giving up on cycle: {}", e);
                    return report;
                }
                Err(e) => {
                    error!("Cycle failed: {}", e);
                    return report;
                }
            }
        }

        report
    }

    async fn load_usable_credentials(&self) -> Result<Credential> {
        let credential = self.authenticator.load_credentials().await?;
        if credential.is_usable() {
            Ok(credential)
        } else {
            Err(TriageError::AuthError("Stored access token is empty".to_string()))
        }
    }

    /// Returns false when no usable credential could be obtained
    async fn refresh_credentials(&self) -> bool {
        match self.authenticator.refresh().await {
            Ok(credential) if credential.is_usable() => {
                debug!(obtained_at = %credential.obtained_at, "Refreshed credentials");
                true
            }
            Ok(_) => {
                error!("Credential refresh returned an empty token, skipping cycle");
                false
            }
            Err(e) => {
                error!("Credential refresh failed, skipping cycle: {}", e);
                false
            }
        }
    }

    /// One pass over the pipeline; only listing or fetch errors escape
    async fn attempt(&self, report: &mut CycleReport) -> Result<()> {
        report.processed.clear();
        report.fetch_failures = 0;

        let ids = self.client.list_unread(self.batch_size).await?;
        if ids.is_empty() {
            debug!("No unread messages");
            return Ok(());
        }
        info!("Found {} unread messages", ids.len());

        let (messages, fetch_failures) = self.fetch_all(ids).await?;
        report.fetch_failures = fetch_failures;

        let classified = self.classify_all(messages).await;

        let mut processed: Vec<ProcessedEmail> = stream::iter(classified)
            .map(|(message, category)| self.reply_and_label(message, category))
            .buffered(self.concurrency)
            .collect()
            .await;

        self.mark_all_read(&mut processed).await;

        report.processed = processed;
        Ok(())
    }

    /// Fetch details for every id
    ///
    /// Non-auth failures drop only the affected message. An auth failure aborts the fetch
    /// phase so the whole cycle can be retried.
    async fn fetch_all(&self, ids: Vec<String>) -> Result<(Vec<Message>, usize)> {
        let results: Vec<(String, Result<Message>)> = stream::iter(ids)
            .map(|id| async move {
                let result = self.client.get_message(&id).await;
                (id, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut messages = Vec::with_capacity(results.len());
        let mut failures = 0;

        for (id, result) in results {
            match result {
                Ok(message) => messages.push(message),
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => {
                    warn!(message_id = %id, "Failed to fetch message, skipping: {}", e);
                    failures += 1;
                }
            }
        }

        if failures > 0 {
            warn!("Failed to fetch {} messages", failures);
        }
        debug!("Fetched {} messages", messages.len());
        Ok((messages, failures))
    }

    async fn classify_all(&self, messages: Vec<Message>) -> Vec<(Message, Category)> {
        stream::iter(messages)
            .map(|message| async move {
                let category = self.classify(&message).await;
                info!(message_id = %message.id, category = %category, "Classified message");
                (message, category)
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn classify(&self, message: &Message) -> Category {
        if message.body.trim().is_empty() {
            debug!(message_id = %message.id, "Empty body, classifying as Other");
            return Category::Other;
        }

        match self.classifier.classify(&message.body).await {
            Ok(category) => category,
            Err(e) => {
                warn!(message_id = %message.id, "Classification failed, using Other: {}", e);
                Category::Other
            }
        }
    }

    /// Send the reply and apply the label concurrently; neither outcome affects the other
    async fn reply_and_label(&self, message: Message, category: Category) -> ProcessedEmail {
        let (reply, label) = tokio::join!(
            self.send_reply(&message, category),
            self.apply_label(&message, category)
        );

        ProcessedEmail {
            message,
            category,
            reply,
            label,
            mark_read: StepOutcome::Skipped,
        }
    }

    async fn send_reply(&self, message: &Message, category: Category) -> StepOutcome {
        let raw = self.composer.compose(message, category);
        match self.client.send_raw(&raw, &message.thread_id).await {
            Ok(()) => {
                info!(message_id = %message.id, category = %category, "Sent reply to {}", message.from);
                StepOutcome::Done
            }
            Err(e) => {
                warn!(message_id = %message.id, "Failed to send reply: {}", e);
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    async fn apply_label(&self, message: &Message, category: Category) -> StepOutcome {
        match self.labels.apply_label(&message.id, category.label_name()).await {
            Ok(()) => StepOutcome::Done,
            Err(e) => {
                warn!(message_id = %message.id, category = %category, "Failed to label message: {}", e);
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    /// Remove the unread marker from every message whose label was applied
    async fn mark_all_read(&self, processed: &mut [ProcessedEmail]) {
        let pending: Vec<(String, bool)> = processed
            .iter()
            .map(|p| (p.message.id.clone(), p.label.is_done()))
            .collect();

        let outcomes: Vec<StepOutcome> = stream::iter(pending)
            .map(|(id, labeled)| async move {
                if !labeled {
                    debug!(message_id = %id, "Label not applied, leaving unread");
                    return StepOutcome::Skipped;
                }
                self.mark_read(&id).await
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        for (p, outcome) in processed.iter_mut().zip(outcomes) {
            p.mark_read = outcome;
        }
    }

    async fn mark_read(&self, message_id: &str) -> StepOutcome {
        let result = self
            .client
            .modify_labels(message_id, &[], &[UNREAD_LABEL.to_string()])
            .await;

        match result {
            Ok(()) => {
                debug!(message_id = %message_id, "Marked as read");
                StepOutcome::Done
            }
            Err(e) => {
                warn!(message_id = %message_id, "Failed to mark as read: {}", e);
                StepOutcome::Failed(e.to_string())
            }
        }
    }
}
