//! Summarizer adapter: prompt construction, the external model seam, output
//! sanitization, and the deterministic fallback.
//!
//! The adapter never fails. Any model problem - transport error, non-2xx
//! status, empty body, timeout - degrades to a fallback summary built from
//! locally available data, and is logged rather than propagated.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::FixedOffset;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::types::{SummaryCategory, SummaryOptions};
use crate::chatty::error::ChattyError;
use crate::chatty::messages::{MarkedMessage, TRIGGER_TOKEN};

#[derive(Debug, thiserror::Error)]
pub enum SummaryModelError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Model returned status {0}")]
    Status(u16),

    #[error("Model returned an empty response")]
    Empty,

    #[error("Model request timed out")]
    Timeout,
}

/// The external text-summarization model, reduced to a single fallible
/// call. Kept as a trait so tests can substitute stubs for the real HTTP
/// client.
#[async_trait]
pub trait SummaryModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, SummaryModelError>;
}

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Google Gemini `generateContent` client.
pub struct GeminiModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiModel {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Builds a model client from the environment:
    /// `CHATTY_GEMINI_API_KEY` (required), `CHATTY_GEMINI_BASE_URL` and
    /// `CHATTY_GEMINI_MODEL` (optional overrides).
    pub fn from_env() -> Result<Self, ChattyError> {
        dotenvy::dotenv().ok();

        let api_key = std::env::var("CHATTY_GEMINI_API_KEY").map_err(|_| {
            ChattyError::Configuration("CHATTY_GEMINI_API_KEY is not set".to_string())
        })?;
        let base_url = std::env::var("CHATTY_GEMINI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model =
            std::env::var("CHATTY_GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self::new(&base_url, &api_key, &model))
    }
}

#[async_trait]
impl SummaryModel for GeminiModel {
    async fn generate(&self, prompt: &str) -> Result<String, SummaryModelError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SummaryModelError::Status(status.as_u16()));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(SummaryModelError::Empty)?;

        Ok(text)
    }
}

/// Wraps a [`SummaryModel`] with formatting, sanitization, a call timeout,
/// and the fallback path.
pub struct SummarizerAdapter {
    model: Arc<dyn SummaryModel>,
    options: SummaryOptions,
}

impl SummarizerAdapter {
    pub fn new(model: Arc<dyn SummaryModel>, options: SummaryOptions) -> Self {
        Self { model, options }
    }

    /// Summarizes a batch of marked messages. Infallible by design: model
    /// failures degrade to [`fallback_summary`].
    pub async fn summarize(
        &self,
        messages: &[MarkedMessage],
        conversation_name: &str,
        category: SummaryCategory,
    ) -> String {
        let lines = format_messages(messages, self.options.timezone());
        let prompt = build_prompt(&lines, conversation_name, category);

        let outcome =
            tokio::time::timeout(self.options.model_timeout, self.model.generate(&prompt)).await;

        let raw = match outcome {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(
                    target: "chatty::summarizer",
                    "Model call failed for '{}' ({}): {}",
                    conversation_name,
                    category,
                    e
                );
                return fallback_summary(&lines);
            }
            Err(_) => {
                tracing::warn!(
                    target: "chatty::summarizer",
                    "Model call timed out for '{}' ({})",
                    conversation_name,
                    category
                );
                return fallback_summary(&lines);
            }
        };

        let cleaned = sanitize_summary(&raw);
        if cleaned.is_empty() {
            tracing::warn!(
                target: "chatty::summarizer",
                "Model returned only formatting noise for '{}' ({})",
                conversation_name,
                category
            );
            return fallback_summary(&lines);
        }
        cleaned
    }
}

static TRIGGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)!chatty\s*").expect("static regex"));

/// Formats messages as `[timestamp] sender: text` lines with the trigger
/// token stripped, in the order given (callers pass creation order).
pub(crate) fn format_messages(messages: &[MarkedMessage], tz: FixedOffset) -> Vec<String> {
    messages
        .iter()
        .map(|message| {
            let timestamp = message
                .created_at
                .with_timezone(&tz)
                .format("%Y-%m-%d %H:%M");
            let text = TRIGGER_RE.replace_all(&message.text, "");
            format!("[{}] {}: {}", timestamp, message.sender_name, text.trim())
        })
        .collect()
}

pub(crate) fn build_prompt(
    lines: &[String],
    conversation_name: &str,
    category: SummaryCategory,
) -> String {
    format!(
        "You are a helpful AI assistant that summarizes group chat conversations.\n\n\
         Provide a clean, professional summary of the following {token} messages {period} \
         from the group \"{name}\".\n\n\
         IMPORTANT FORMATTING RULES:\n\
         - Do NOT start with \"Here's a summary...\" or similar phrases\n\
         - Do NOT use asterisks (*) or bold formatting\n\
         - Do NOT use markdown formatting\n\
         - Use simple bullet points with dashes (-)\n\
         - Keep the language conversational and easy to read\n\
         - Structure the content with clear paragraphs\n\n\
         Focus on:\n\
         - Key topics and decisions discussed\n\
         - Important information shared\n\
         - Action items or tasks mentioned\n\
         - Any urgent matters or deadlines\n\
         - Main themes of the conversation\n\n\
         Messages to summarize:\n\
         {messages}\n\n\
         Provide a direct, clean summary without any prefixes:",
        token = TRIGGER_TOKEN,
        period = category.period_description(),
        name = conversation_name,
        messages = lines.join("\n"),
    )
}

static PREAMBLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*here'?s\s+a\s+summary[^:\n]*:\s*").expect("static regex"));
static SUMMARY_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*summary[^:\n]*:\s*").expect("static regex"));
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(\s*)\*\s+").expect("static regex"));
static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("static regex"));
static ITALIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\n]+)\*").expect("static regex"));
static MIXED_BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*-\s*\*\*\s*").expect("static regex"));
static TRAILING_BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)\*\*\s*$").expect("static regex"));

/// Strips the formatting artifacts models produce despite instructions:
/// "here's a summary" preambles, bold/italic markers, asterisk bullets,
/// trailing emphasis. Bullets are normalized before emphasis is stripped so
/// a line-leading asterisk is never mistaken for an italic marker.
pub(crate) fn sanitize_summary(raw: &str) -> String {
    let text = PREAMBLE_RE.replace(raw, "");
    let text = SUMMARY_PREFIX_RE.replace(&text, "");
    let text = BULLET_RE.replace_all(&text, "${1}- ");
    let text = BOLD_RE.replace_all(&text, "$1");
    let text = ITALIC_RE.replace_all(&text, "$1");
    let text = MIXED_BULLET_RE.replace_all(&text, "- ");
    let text = TRAILING_BOLD_RE.replace_all(&text, "");
    text.trim().to_string()
}

/// Deterministic summary used when the model is unavailable. Built purely
/// from the formatted lines: the message count, plus the distinct sender
/// names when they can be parsed back out of the `sender:` pattern.
pub(crate) fn fallback_summary(lines: &[String]) -> String {
    let count = lines.len();

    let mut senders: Vec<String> = Vec::new();
    for line in lines {
        if let Some(rest) = line.split_once("] ").map(|(_, rest)| rest) {
            if let Some((sender, _)) = rest.split_once(": ") {
                let sender = sender.trim();
                if !sender.is_empty() && !senders.iter().any(|s| s == sender) {
                    senders.push(sender.to_string());
                }
            }
        }
    }

    let plural = if count == 1 { "message" } else { "messages" };
    if senders.is_empty() {
        format!(
            "The AI summary service is currently unavailable. \
             {count} marked {plural} are waiting to be summarized - check the conversation for details."
        )
    } else {
        format!(
            "The AI summary service is currently unavailable. \
             {count} marked {plural} from {} are waiting to be summarized - check the conversation for details.",
            senders.join(", ")
        )
    }
}
