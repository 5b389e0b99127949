use super::{GeneratorError, PromptInput, SummaryGenerator};
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const MESSAGES_API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";
const MAX_TOKENS: u32 = 600;
// Stays well inside the queue visibility timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

const SYSTEM_PROMPT: &str = "You maintain a short running summary of what players say about a \
cosmetic skin. Merge the current summary with the new comments into one updated summary of at \
most five sentences. Keep points that are still relevant, add what is new, and drop anything \
the new comments contradict. Reply with the summary text only.";

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

// ============================================================================
// AnthropicGenerator — Messages API implementation
// ============================================================================

pub struct AnthropicGenerator {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl AnthropicGenerator {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            api_key,
            model,
            endpoint: MESSAGES_API_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }
}

impl SummaryGenerator for AnthropicGenerator {
    async fn generate(
        &self,
        previous_summary: &str,
        new_comments: &[String],
    ) -> Result<String, GeneratorError> {
        let input = PromptInput::prepare(previous_summary, new_comments)?;

        let request = MessageRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: user_message(&input),
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| GeneratorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GeneratorError::Transport(e.to_string()))?;
        let summary = summary_from_body(&body)?;

        debug!(
            model = %self.model,
            summary_chars = summary.chars().count(),
            "Summary generated"
        );
        Ok(summary)
    }
}

fn user_message(input: &PromptInput) -> String {
    let previous = if input.previous_summary.is_empty() {
        "(no summary yet)"
    } else {
        input.previous_summary.as_str()
    };
    format!(
        "Current summary:\n{}\n\nNew comments:\n{}",
        previous, input.comment_text
    )
}

fn classify_failure(status: StatusCode, body: &str) -> GeneratorError {
    let detail = format!("HTTP {}: {}", status.as_u16(), body.trim());
    match status.as_u16() {
        401 | 403 => GeneratorError::PermissionDenied(detail),
        // 529 is the service's "overloaded" status.
        429 | 529 => GeneratorError::RateLimited(detail),
        _ => GeneratorError::Transport(detail),
    }
}

fn summary_from_body(body: &str) -> Result<String, GeneratorError> {
    let response: MessageResponse = serde_json::from_str(body)
        .map_err(|e| GeneratorError::MalformedResponse(e.to_string()))?;

    let summary = response
        .content
        .into_iter()
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("\n");

    let summary = summary.trim();
    if summary.is_empty() {
        return Err(GeneratorError::MalformedResponse(
            "response contained no text".to_string(),
        ));
    }
    Ok(summary.to_string())
}
