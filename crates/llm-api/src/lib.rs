//! Chat-completions client shared by the SKU matcher and the pattern
//! suggester.
//!
//! Retry policy: 429/5xx and timeouts get a short exponential backoff
//! with jitter; a 400 is a permanent request defect and is never
//! retried; a 200 with empty content is a failure too (reasoning
//! models occasionally spend the whole token budget on hidden
//! reasoning).

pub mod matcher;

use {
    rand::Rng,
    regex::Regex,
    reqwest::{Client, StatusCode},
    serde_json::{Value, json},
    std::{sync::LazyLock, time::Duration},
    url::Url,
};

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);
const BACKOFF_SECONDS: &[u64] = &[0, 1, 2, 4];

#[derive(clap::Parser)]
pub struct Arguments {
    /// Master switch for both the candidate matcher and the pattern
    /// suggester.
    #[clap(long, env)]
    pub llm_enabled: bool,

    /// API key for the chat-completions endpoint.
    #[clap(long, env, default_value = "")]
    pub llm_api_key: String,

    /// Base URL of the chat-completions API.
    #[clap(long, env, default_value = "https://api.openai.com/v1/")]
    pub llm_base_url: Url,

    /// Model used for parsing and suggestions.
    #[clap(long, env, default_value = "gpt-5-mini")]
    pub llm_model: String,
}

impl Arguments {
    /// Whether calls can actually be made.
    pub fn usable(&self) -> bool {
        self.llm_enabled && !self.llm_api_key.is_empty()
    }
}

impl std::fmt::Display for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "llm_enabled: {}", self.llm_enabled)?;
        writeln!(f, "llm_api_key: SECRET")?;
        writeln!(f, "llm_base_url: {}", self.llm_base_url)?;
        writeln!(f, "llm_model: {}", self.llm_model)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm is not enabled/configured")]
    Disabled,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("upstream returned empty content")]
    EmptyContent,
}

/// One completion request. `json_response` asks for
/// `response_format = json_object` (supported models only).
#[derive(Clone, Debug, Default)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f64,
    pub max_completion_tokens: Option<u32>,
    pub json_response: bool,
    /// Overrides the default 30s upstream timeout.
    pub timeout: Option<Duration>,
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(client: Client, args: &Arguments) -> Self {
        Self {
            client,
            base_url: args.llm_base_url.clone(),
            api_key: args.llm_api_key.clone(),
            model: args.llm_model.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Runs a completion and returns the assistant text content.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::Disabled);
        }

        let url = self
            .base_url
            .join("chat/completions")
            .expect("unexpectedly invalid URL segment");
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.user}));
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
        });
        if let Some(max) = request.max_completion_tokens {
            body["max_completion_tokens"] = json!(max);
        }
        if request.json_response {
            body["response_format"] = json!({"type": "json_object"});
        }

        let mut last_error = LlmError::EmptyContent;
        for (attempt, &delay) in BACKOFF_SECONDS.iter().enumerate() {
            if delay > 0 {
                let jitter = rand::thread_rng().gen_range(0..250);
                tokio::time::sleep(Duration::from_secs(delay) + Duration::from_millis(jitter))
                    .await;
            }
            let timeout = request.timeout.unwrap_or(UPSTREAM_TIMEOUT);
            match self.complete_once(url.clone(), &body, timeout).await {
                Ok(content) => return Ok(content),
                Err(error) if is_retryable(&error) => {
                    tracing::warn!(attempt, ?error, "llm call failed, retrying");
                    last_error = error;
                }
                Err(error) => return Err(error),
            }
        }
        Err(last_error)
    }

    async fn complete_once(
        &self,
        url: Url,
        body: &Value,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status,
                body: body.chars().take(500).collect(),
            });
        }
        let data: Value = response.json().await?;
        let content = extract_message_content(&data);
        if content.trim().is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(content)
    }
}

fn is_retryable(error: &LlmError) -> bool {
    match error {
        LlmError::Http(error) => error.is_timeout() || error.is_connect(),
        LlmError::Status { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }
        LlmError::Disabled | LlmError::EmptyContent => false,
    }
}

/// Pulls the assistant text out of `choices[0].message.content`, which
/// may be a plain string or a list of text parts.
pub fn extract_message_content(data: &Value) -> String {
    let Some(message) = data
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
    else {
        return String::new();
    };
    match message.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").unwrap());

/// Best-effort extraction of the first JSON object from model output
/// that may be wrapped in prose or code fences.
pub fn extract_first_json_object(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.starts_with('{')
        && text.ends_with('}')
        && let Ok(value) = serde_json::from_str::<Value>(text)
    {
        return value.is_object().then_some(value);
    }
    let candidate = JSON_OBJECT.find(text)?;
    serde_json::from_str::<Value>(candidate.as_str())
        .ok()
        .filter(Value::is_object)
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn extracts_string_content() {
        let data = json!({
            "choices": [{"message": {"content": "{\"ok\": true}"}}],
        });
        assert_eq!(extract_message_content(&data), "{\"ok\": true}");
    }

    #[test]
    fn extracts_text_part_content() {
        let data = json!({
            "choices": [{"message": {"content": [
                {"type": "text", "text": "part one"},
                {"type": "text", "text": "part two"},
            ]}}],
        });
        assert_eq!(extract_message_content(&data), "part one\npart two");
    }

    #[test]
    fn missing_content_is_empty() {
        assert_eq!(extract_message_content(&json!({})), "");
        assert_eq!(extract_message_content(&json!({"choices": []})), "");
    }

    #[test]
    fn finds_the_first_json_object() {
        let value = extract_first_json_object("Sure! Here you go:\n{\"a\": 1}\nanything else?")
            .unwrap();
        assert_eq!(value, json!({"a": 1}));

        assert_eq!(extract_first_json_object(""), None);
        assert_eq!(extract_first_json_object("no json here"), None);
        assert_eq!(extract_first_json_object("[1, 2, 3]"), None);
    }

    #[test]
    fn fast_path_for_bare_objects() {
        let value = extract_first_json_object(r#"{"match": {"sku_key": "x"}}"#).unwrap();
        assert_eq!(value["match"]["sku_key"], "x");
    }

    #[test]
    fn retryability() {
        assert!(is_retryable(&LlmError::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        }));
        assert!(is_retryable(&LlmError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: String::new(),
        }));
        assert!(!is_retryable(&LlmError::Status {
            status: StatusCode::BAD_REQUEST,
            body: String::new(),
        }));
        assert!(!is_retryable(&LlmError::EmptyContent));
    }
}
