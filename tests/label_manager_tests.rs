//! Label resolution against the in-memory mailbox

mod common;

use common::{create_test_message, FakeMailbox};
use futures::future::join_all;
use gmail_triage::label_manager::LabelManager;
use gmail_triage::models::INBOX_LABEL;
use std::sync::Arc;

#[tokio::test]
async fn test_ensure_label_is_idempotent() {
    let mailbox = Arc::new(FakeMailbox::new());
    let manager = LabelManager::new(mailbox.clone());

    let first = manager.ensure_label("Interested").await.unwrap();
    let second = manager.ensure_label("Interested").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(FakeMailbox::calls(&mailbox.create_label_calls), 1);
    assert_eq!(mailbox.labels().len(), 1);
}

#[tokio::test]
async fn test_concurrent_resolution_creates_one_label() {
    let mailbox = Arc::new(FakeMailbox::new());
    let manager = Arc::new(LabelManager::new(mailbox.clone()));

    let ids = join_all((0..8).map(|i| {
        let manager = Arc::clone(&manager);
        // Mix the casing; Gmail label names are case-insensitive
        let name = if i % 2 == 0 { "More Information" } else { "more information" };
        async move { manager.ensure_label(name).await.unwrap() }
    }))
    .await;

    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(FakeMailbox::calls(&mailbox.create_label_calls), 1);
}

#[tokio::test]
async fn test_label_created_elsewhere_is_adopted() {
    let mailbox = Arc::new(FakeMailbox::new());
    let first = LabelManager::new(mailbox.clone());
    let second = LabelManager::new(mailbox.clone());

    let id = first.ensure_label("Other").await.unwrap();
    // A second process with a cold cache finds the existing label
    assert_eq!(second.ensure_label("other").await.unwrap(), id);
    assert_eq!(FakeMailbox::calls(&mailbox.create_label_calls), 1);
}

#[tokio::test]
async fn test_apply_label_moves_message_out_of_inbox() {
    let mailbox = Arc::new(
        FakeMailbox::new().with_unread(create_test_message("m1", "a@x.com", "Hi", "body")),
    );
    let manager = LabelManager::new(mailbox.clone());

    manager.apply_label("m1", "Not Interested").await.unwrap();

    let label_id = mailbox.label_id("Not Interested").unwrap();
    let labels = mailbox.labels_of("m1");
    assert!(labels.contains(&label_id));
    assert!(!labels.contains(INBOX_LABEL));
    // Labeling alone does not mark the message read
    assert!(mailbox.is_unread("m1"));
}

#[tokio::test]
async fn test_apply_label_to_unknown_message_fails() {
    let mailbox = Arc::new(FakeMailbox::new());
    let manager = LabelManager::new(mailbox.clone());

    assert!(manager.apply_label("missing", "Interested").await.is_err());
}
