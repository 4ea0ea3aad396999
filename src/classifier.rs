//! Email body classification into the triage categories

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{ClassificationConfig, ClassifierMode};
use crate::error::{Result, TriageError};
use crate::models::Category;

/// Maps free text to one of the closed set of categories
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a message body. Empty input must yield `Category::Other`.
    async fn classify(&self, text: &str) -> Result<Category>;
}

/// Normalize free-form classifier output to a category
///
/// Unrecognized output maps to `Other`. Negative labels are checked first so that
/// "Not Interested" never reads as "Interested".
pub fn parse_category(output: &str) -> Category {
    let normalized: String = output
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();

    if normalized.is_empty() {
        return Category::Other;
    }
    if normalized.starts_with("notinterested") || normalized.starts_with("uninterested") {
        Category::NotInterested
    } else if normalized.starts_with("moreinformation") || normalized.starts_with("moreinfo") {
        Category::MoreInformation
    } else if normalized.starts_with("interested") {
        Category::Interested
    } else {
        Category::Other
    }
}

struct KeywordPatterns {
    not_interested: Regex,
    more_information: Regex,
    interested: Regex,
}

static KEYWORD_PATTERNS: Lazy<KeywordPatterns> = Lazy::new(|| KeywordPatterns {
    not_interested: Regex::new(
        r"(?i)(not interested|uninterested|no longer interested|no,? thanks|not a (good )?fit|unsubscribe|remove me|decline|pass on this|not at this time)"
    )
    .unwrap(),

    more_information: Regex::new(
        r"(?i)(more (info|information|details)|can you (share|send|tell|explain)|could you (share|send|tell|explain)|what (is|are) the|how (does|much|many)|\?\s*$)"
    )
    .unwrap(),

    interested: Regex::new(
        r"(?i)(interested|next steps?|looking forward|sounds (good|great)|let'?s (talk|chat|meet|schedule)|happy to|count me in|\bi'?m in\b)"
    )
    .unwrap(),
});

/// Offline rule-based classifier
#[derive(Debug, Default, Clone)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn detect_category(&self, text: &str) -> Category {
        let text = text.trim();
        if text.is_empty() {
            return Category::Other;
        }

        // Order matters: "not interested" also matches the interested pattern
        if KEYWORD_PATTERNS.not_interested.is_match(text) {
            Category::NotInterested
        } else if KEYWORD_PATTERNS.interested.is_match(text) {
            Category::Interested
        } else if KEYWORD_PATTERNS.more_information.is_match(text) {
            Category::MoreInformation
        } else {
            Category::Other
        }
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<Category> {
        Ok(self.detect_category(text))
    }
}

const CLASSIFICATION_PROMPT: &str = "Categorize the following email reply into exactly one of these labels: \
Interested, Not Interested, More Information. \
Answer with the label only and nothing else.\n\nEmail:\n";

/// Inputs longer than this are truncated before being sent to the model
const MAX_INPUT_CHARS: usize = 8_000;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
            reqwest::Client::new()
        })
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Classifier backed by the Gemini `generateContent` API
pub struct GeminiClassifier {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl GeminiClassifier {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: http_client(DEFAULT_TIMEOUT),
        }
    }

    /// Fail a classification request that takes longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Build from config, reading the API key from the configured environment variable
    pub fn from_config(config: &ClassificationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            TriageError::ConfigError(format!("{} not set", config.api_key_env))
        })?;
        if api_key.trim().is_empty() {
            return Err(TriageError::ConfigError(format!("{} is empty", config.api_key_env)));
        }
        Ok(Self::new(api_key, &config.model, &config.endpoint)
            .with_timeout(Duration::from_secs(config.timeout_secs)))
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, text: &str) -> Result<Category> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Category::Other);
        }

        let truncated: String = text.chars().take(MAX_INPUT_CHARS).collect();
        let prompt = format!("{}{}", CLASSIFICATION_PROMPT, truncated);
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: 10,
            },
        };

        let response = self
            .client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TriageError::ClassificationError(format!(
                "Gemini returned HTTP {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let answer = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or_else(|| {
                TriageError::ClassificationError("Gemini response had no text candidate".to_string())
            })?;

        let category = parse_category(&answer);
        debug!("Gemini answered {:?} -> {}", answer.trim(), category);
        Ok(category)
    }
}

/// Build the classifier selected in config
pub fn from_config(config: &ClassificationConfig) -> Result<Box<dyn Classifier>> {
    match config.mode {
        ClassifierMode::Gemini => Ok(Box::new(GeminiClassifier::from_config(config)?)),
        ClassifierMode::Keywords => Ok(Box::new(KeywordClassifier::new())),
    }
}
