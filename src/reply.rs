//! Reply composition: category-keyed reply text rendered as a raw RFC 822 message

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::HashMap;

use crate::config::ReplyConfig;
use crate::models::{Category, Message};

/// Mapping from category to reply body, with a fallback for unmapped categories
#[derive(Debug, Clone)]
pub struct ReplyTemplates {
    by_category: HashMap<Category, String>,
    default: String,
}

impl ReplyTemplates {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            by_category: HashMap::new(),
            default: default.into(),
        }
    }

    pub fn with(mut self, category: Category, text: impl Into<String>) -> Self {
        self.by_category.insert(category, text.into());
        self
    }

    /// Reply body for a category; unmapped categories get the default text
    pub fn text_for(&self, category: Category) -> &str {
        self.by_category
            .get(&category)
            .map(String::as_str)
            .unwrap_or(&self.default)
    }
}

impl From<&ReplyConfig> for ReplyTemplates {
    fn from(config: &ReplyConfig) -> Self {
        Category::ALL
            .iter()
            .fold(ReplyTemplates::new(config.default.clone()), |templates, &category| {
                match config.text_for(category) {
                    Some(text) => templates.with(category, text),
                    None => templates,
                }
            })
    }
}

impl Default for ReplyTemplates {
    fn default() -> Self {
        Self::from(&ReplyConfig::default())
    }
}

/// A composed reply ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    rfc822: String,
}

impl RawMessage {
    /// The RFC 822 text
    pub fn rfc822(&self) -> &str {
        &self.rfc822
    }
}

/// Builds replies from the configured templates
#[derive(Debug, Clone, Default)]
pub struct ReplyComposer {
    templates: ReplyTemplates,
}

impl ReplyComposer {
    pub fn new(templates: ReplyTemplates) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &ReplyTemplates {
        &self.templates
    }

    /// Compose the reply to `message` for `category`
    pub fn compose(&self, message: &Message, category: Category) -> RawMessage {
        let reference = single_line(message.thread_reference());
        let subject = format!("Re: {}", single_line(&message.subject));

        let rfc822 = [
            format!("To: {}", single_line(&message.from)),
            format!("Subject: {}", encode_header_value(&subject)),
            format!("In-Reply-To: {}", reference),
            format!("References: {}", reference),
            "MIME-Version: 1.0".to_string(),
            "Content-Type: text/plain; charset=UTF-8".to_string(),
            String::new(),
            self.templates.text_for(category).to_string(),
        ]
        .join("\r\n");

        RawMessage { rfc822 }
    }
}

/// Fold CR/LF so a header value cannot start a new header
fn single_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// RFC 2047 encoded-word for non-ASCII header values
fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}
