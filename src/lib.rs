//! Gmail Triage
//!
//! Polls a Gmail inbox for unread messages, classifies each one, sends a templated
//! reply in the same thread, files it under a category label and marks it read.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed-app flow with an on-disk token cache
//! - **Transport**: Gmail API client with bounded concurrency and per-call timeouts
//! - **Classification**: Gemini `generateContent` or an offline keyword classifier
//! - **Replies**: category-keyed templates rendered as RFC 822 replies
//! - **Labels**: case-insensitive label resolution with create-on-demand
//! - **Triage**: the per-cycle pipeline with a single re-authentication retry
//! - **Polling**: fixed-interval scheduling that skips ticks while a cycle is running
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_triage::{cli::{build_orchestrator, Cli}, config::Config};
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cli = Cli::parse();
//!     let config = Config::load(&cli.config).await?;
//!
//!     let orchestrator = build_orchestrator(&cli, &config).await?;
//!     let report = orchestrator.run_cycle().await;
//!
//!     for (message, category) in report.classified() {
//!         println!("{} -> {}", message.subject, category);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`client`] - Mail transport trait, Gmail implementation and message parsing
//! - [`classifier`] - Classifier trait, Gemini and keyword classifiers
//! - [`cli`] - Command-line interface and pipeline wiring
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`label_manager`] - Label resolution and application
//! - [`models`] - Core data structures
//! - [`poller`] - Fixed-interval cycle scheduling
//! - [`reply`] - Reply templates and composition
//! - [`triage`] - The triage cycle

pub mod auth;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod label_manager;
pub mod models;
pub mod poller;
pub mod reply;
pub mod triage;

// Re-export commonly used types for convenience
pub use error::{Result, TriageError};

// Core data models
pub use models::{Category, LabelInfo, Message, ProcessedEmail, StepOutcome};

// Collaborator traits
pub use auth::Authenticator;
pub use classifier::{Classifier, GeminiClassifier, KeywordClassifier};
pub use client::{GmailTransport, MailTransport};

// Config types
pub use config::{ClassificationConfig, ClassifierMode, Config, PollConfig, ReplyConfig};

// Pipeline
pub use label_manager::LabelManager;
pub use poller::{CycleRunner, Poller, PollerHandle};
pub use reply::{RawMessage, ReplyComposer, ReplyTemplates};
pub use triage::{CycleReport, TriageOrchestrator};

// CLI types (for binary usage)
pub use cli::{Cli, Commands};
