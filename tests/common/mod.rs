//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use gmail_triage::auth::Authenticator;
use gmail_triage::classifier::Classifier;
use gmail_triage::client::MailTransport;
use gmail_triage::error::{Result, TriageError};
use gmail_triage::models::{Category, Credential, LabelInfo, Message, INBOX_LABEL, UNREAD_LABEL};
use gmail_triage::reply::RawMessage;
use mockall::mock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// Create a test message with default values
pub fn create_test_message(id: &str, from: &str, subject: &str, body: &str) -> Message {
    Message {
        id: id.to_string(),
        thread_id: format!("thread_{}", id),
        message_id_header: Some(format!("<{}@mail.example.com>", id)),
        from: from.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        unread: true,
    }
}

/// Kinds of failure the fake mailbox can inject
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Auth,
    Server,
    Network,
}

impl Fault {
    pub fn to_error(self) -> TriageError {
        match self {
            Fault::Auth => TriageError::AuthError("HTTP 401: invalid credentials".to_string()),
            Fault::Server => TriageError::ServerError {
                status: 500,
                message: "backend error".to_string(),
            },
            Fault::Network => TriageError::NetworkError("connection reset".to_string()),
        }
    }
}

#[derive(Default)]
struct MailboxState {
    order: Vec<String>,
    messages: HashMap<String, Message>,
    message_labels: HashMap<String, HashSet<String>>,
    labels: Vec<LabelInfo>,
    sent: Vec<(String, String)>,
    modifications: Vec<(String, Vec<String>, Vec<String>)>,
}

#[derive(Default)]
struct Faults {
    list: VecDeque<Fault>,
    list_labels: Option<Fault>,
    get: HashMap<String, (Fault, usize)>,
    send_threads: HashSet<String>,
    label_messages: HashSet<String>,
    mark_read_messages: HashSet<String>,
}

/// In-memory mailbox implementing the transport trait
///
/// Counts every call and lets tests inject failures per operation.
#[derive(Default)]
pub struct FakeMailbox {
    state: Mutex<MailboxState>,
    faults: Mutex<Faults>,
    next_label: AtomicUsize,
    last_list_max: AtomicU32,
    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub modify_calls: AtomicUsize,
    pub list_label_calls: AtomicUsize,
    pub create_label_calls: AtomicUsize,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unread inbox message
    pub fn with_unread(self, message: Message) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.order.push(message.id.clone());
            state.message_labels.insert(
                message.id.clone(),
                [INBOX_LABEL.to_string(), UNREAD_LABEL.to_string()]
                    .into_iter()
                    .collect(),
            );
            state.messages.insert(message.id.clone(), message);
        }
        self
    }

    /// Pre-create a user label
    pub fn with_label(self, id: &str, name: &str) -> Self {
        self.state.lock().unwrap().labels.push(LabelInfo {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Fail the next `list_unread` calls, one fault per call
    pub fn fail_list(&self, faults: impl IntoIterator<Item = Fault>) {
        self.faults.lock().unwrap().list.extend(faults);
    }

    /// Fail every `list_labels` call
    pub fn fail_list_labels(&self, fault: Fault) {
        self.faults.lock().unwrap().list_labels = Some(fault);
    }

    /// Fail `get_message` for `id` the next `times` calls
    pub fn fail_get(&self, id: &str, fault: Fault, times: usize) {
        self.faults
            .lock()
            .unwrap()
            .get
            .insert(id.to_string(), (fault, times));
    }

    /// Fail every send into `thread_id`
    pub fn fail_send(&self, thread_id: &str) {
        self.faults
            .lock()
            .unwrap()
            .send_threads
            .insert(thread_id.to_string());
    }

    /// Fail label changes that add a label to `message_id`
    pub fn fail_label(&self, message_id: &str) {
        self.faults
            .lock()
            .unwrap()
            .label_messages
            .insert(message_id.to_string());
    }

    /// Fail label changes that remove UNREAD from `message_id`
    pub fn fail_mark_read(&self, message_id: &str) {
        self.faults
            .lock()
            .unwrap()
            .mark_read_messages
            .insert(message_id.to_string());
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn last_list_max(&self) -> u32 {
        self.last_list_max.load(Ordering::SeqCst)
    }

    /// `(rfc822, thread_id)` of every reply sent
    pub fn sent(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn modifications(&self) -> Vec<(String, Vec<String>, Vec<String>)> {
        self.state.lock().unwrap().modifications.clone()
    }

    pub fn labels(&self) -> Vec<LabelInfo> {
        self.state.lock().unwrap().labels.clone()
    }

    pub fn label_id(&self, name: &str) -> Option<String> {
        self.labels()
            .into_iter()
            .find(|l| l.name == name)
            .map(|l| l.id)
    }

    pub fn labels_of(&self, message_id: &str) -> HashSet<String> {
        self.state
            .lock()
            .unwrap()
            .message_labels
            .get(message_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_unread(&self, message_id: &str) -> bool {
        self.labels_of(message_id).contains(UNREAD_LABEL)
    }
}

#[async_trait]
impl MailTransport for FakeMailbox {
    async fn list_unread(&self, max: u32) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.last_list_max.store(max, Ordering::SeqCst);

        if let Some(fault) = self.faults.lock().unwrap().list.pop_front() {
            return Err(fault.to_error());
        }

        let state = self.state.lock().unwrap();
        Ok(state
            .order
            .iter()
            .filter(|id| {
                state
                    .message_labels
                    .get(*id)
                    .map_or(false, |labels| labels.contains(UNREAD_LABEL))
            })
            .take(max as usize)
            .cloned()
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        {
            let mut faults = self.faults.lock().unwrap();
            if let Some((fault, remaining)) = faults.get.get_mut(id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(fault.to_error());
                }
            }
        }

        self.state
            .lock()
            .unwrap()
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| TriageError::MessageNotFound(id.to_string()))
    }

    async fn send_raw(&self, message: &RawMessage, thread_id: &str) -> Result<()> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);

        if self.faults.lock().unwrap().send_threads.contains(thread_id) {
            return Err(Fault::Server.to_error());
        }

        self.state
            .lock()
            .unwrap()
            .sent
            .push((message.rfc822().to_string(), thread_id.to_string()));
        Ok(())
    }

    async fn modify_labels(&self, id: &str, add: &[String], remove: &[String]) -> Result<()> {
        self.modify_calls.fetch_add(1, Ordering::SeqCst);

        {
            let faults = self.faults.lock().unwrap();
            if !add.is_empty() && faults.label_messages.contains(id) {
                return Err(Fault::Server.to_error());
            }
            if remove.iter().any(|l| l == UNREAD_LABEL) && faults.mark_read_messages.contains(id) {
                return Err(Fault::Network.to_error());
            }
        }

        let mut state = self.state.lock().unwrap();
        for label_id in add {
            if !state.labels.iter().any(|l| &l.id == label_id) {
                return Err(TriageError::BadRequest(format!("Invalid label: {}", label_id)));
            }
        }

        state
            .modifications
            .push((id.to_string(), add.to_vec(), remove.to_vec()));

        let labels = state
            .message_labels
            .get_mut(id)
            .ok_or_else(|| TriageError::MessageNotFound(id.to_string()))?;
        labels.extend(add.iter().cloned());
        for label in remove {
            labels.remove(label);
        }
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.list_label_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.faults.lock().unwrap().list_labels {
            return Err(fault.to_error());
        }
        // Yield so concurrent resolutions genuinely interleave
        tokio::task::yield_now().await;
        Ok(self.labels())
    }

    async fn create_label(&self, name: &str) -> Result<LabelInfo> {
        self.create_label_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        if state.labels.iter().any(|l| l.name.to_lowercase() == name.to_lowercase()) {
            return Err(TriageError::Conflict(format!("Label name exists: {}", name)));
        }

        let label = LabelInfo {
            id: format!("Label_{}", self.next_label.fetch_add(1, Ordering::SeqCst) + 1),
            name: name.to_string(),
        };
        state.labels.push(label.clone());
        Ok(label)
    }
}

/// Captures formatted tracing output for assertions
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Install as the thread's default subscriber until the guard drops
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    /// Lines logged at WARN or ERROR
    pub fn problems(&self) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|l| l.contains(" WARN ") || l.contains("ERROR"))
            .map(str::to_string)
            .collect()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// Mock implementation of Authenticator for testing
mock! {
    pub Auth {}

    #[async_trait]
    impl Authenticator for Auth {
        async fn load_credentials(&self) -> Result<Credential>;
        async fn refresh(&self) -> Result<Credential>;
    }
}

// Mock implementation of Classifier for testing
mock! {
    pub Classify {}

    #[async_trait]
    impl Classifier for Classify {
        async fn classify(&self, text: &str) -> Result<Category>;
    }
}

/// Authenticator whose stored token is always valid and never needs a refresh
pub fn valid_auth() -> MockAuth {
    let mut auth = MockAuth::new();
    auth.expect_load_credentials()
        .returning(|| Ok(Credential::new("token")));
    auth.expect_refresh().never();
    auth
}

/// Classifier that always answers `category`
pub fn fixed_classifier(category: Category) -> MockClassify {
    let mut classifier = MockClassify::new();
    classifier
        .expect_classify()
        .returning(move |_| Ok(category));
    classifier
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_mailbox_lists_only_unread() {
        let mailbox = FakeMailbox::new()
            .with_unread(create_test_message("m1", "a@x.com", "Hi", "body"))
            .with_unread(create_test_message("m2", "b@x.com", "Yo", "body"));

        mailbox
            .modify_labels("m1", &[], &[UNREAD_LABEL.to_string()])
            .await
            .unwrap();

        assert_eq!(mailbox.list_unread(10).await.unwrap(), vec!["m2".to_string()]);
    }

    #[tokio::test]
    async fn test_fake_mailbox_rejects_duplicate_label() {
        let mailbox = FakeMailbox::new().with_label("Label_0", "Interested");
        let err = mailbox.create_label("interested").await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_fake_mailbox_injected_get_fault_is_consumed() {
        let mailbox =
            FakeMailbox::new().with_unread(create_test_message("m1", "a@x.com", "Hi", "body"));
        mailbox.fail_get("m1", Fault::Auth, 1);

        assert!(mailbox.get_message("m1").await.unwrap_err().is_auth_failure());
        assert_eq!(mailbox.get_message("m1").await.unwrap().id, "m1");
    }
}
