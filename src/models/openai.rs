use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::TextGenerator;
use crate::error::ServiceError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout: Duration,
    /// Extra attempts after the first one, for 429/5xx and connect/timeout failures.
    pub max_retries: usize,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 2,
        }
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatClient {
    client: Client,
    endpoint: String,
    api_key: String,
    max_retries: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatClient {
    /// Reads the API key from the configured environment variable.
    pub fn from_env(cfg: &OpenAiConfig) -> Result<Self, ServiceError> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ServiceError::MissingApiKey(cfg.api_key_env.clone()))?;
        Self::new(cfg, api_key)
    }

    pub fn new(cfg: &OpenAiConfig, api_key: String) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self {
            client,
            endpoint: chat_endpoint(&cfg.base_url),
            api_key,
            max_retries: cfg.max_retries,
        })
    }

    fn send_once(&self, body: &ChatRequest<'_>) -> Result<String, Attempt> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    Attempt::Retry(ServiceError::Transport(e))
                } else {
                    Attempt::Fatal(ServiceError::Transport(e))
                }
            })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Attempt::Fatal(ServiceError::Auth(status.as_u16())));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Attempt::Retry(ServiceError::RateLimited(0)));
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            let err = ServiceError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            };
            return Err(if status.is_server_error() {
                Attempt::Retry(err)
            } else {
                Attempt::Fatal(err)
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .map_err(|e| Attempt::Fatal(ServiceError::MalformedResponse(e.to_string())))?;
        extract_content(parsed).map_err(Attempt::Fatal)
    }
}

enum Attempt {
    Retry(ServiceError),
    Fatal(ServiceError),
}

impl TextGenerator for OpenAiChatClient {
    fn generate(
        &mut self,
        model: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, ServiceError> {
        let body = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
        };

        let attempts = self.max_retries + 1;
        let mut delay_ms = 750u64;
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let started = Instant::now();
            match self.send_once(&body) {
                Ok(text) => {
                    debug!(
                        model,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "completion received"
                    );
                    return Ok(text);
                }
                Err(Attempt::Fatal(err)) => return Err(err),
                Err(Attempt::Retry(err)) => {
                    if attempt >= attempts {
                        return Err(match err {
                            ServiceError::RateLimited(_) => ServiceError::RateLimited(attempt),
                            other => other,
                        });
                    }
                    warn!(attempt, delay_ms, error = %err, "transient service failure, retrying");
                    std::thread::sleep(Duration::from_millis(delay_ms));
                    delay_ms = next_delay_ms(delay_ms);
                }
            }
        }
    }
}

fn next_delay_ms(delay_ms: u64) -> u64 {
    ((delay_ms as f64) * 1.75).min(5000.0) as u64
}

fn chat_endpoint(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

fn extract_content(resp: ChatResponse) -> Result<String, ServiceError> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ServiceError::MalformedResponse("no message content in choices".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_derived_from_base_url() {
        assert_eq!(
            chat_endpoint("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_endpoint("http://localhost:1234/v1/chat/completions"),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(next_delay_ms(750), 1312);
        assert_eq!(next_delay_ms(4000), 5000);
        assert_eq!(next_delay_ms(5000), 5000);
    }

    #[test]
    fn request_body_has_zero_temperature_and_single_user_message() {
        let body = ChatRequest {
            model: "gpt-4o",
            messages: [ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.0,
        };
        let v = serde_json::to_value(&body).expect("serialize");
        assert_eq!(v["model"], "gpt-4o");
        assert_eq!(v["temperature"], 0.0);
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"], "hi");
    }

    #[test]
    fn content_is_taken_from_first_choice() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"brand\nDior"}}]}"#,
        )
        .expect("parse");
        assert_eq!(extract_content(resp).expect("content"), "brand\nDior");
    }

    #[test]
    fn missing_content_is_malformed() {
        let resp: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).expect("parse");
        assert!(matches!(
            extract_content(resp),
            Err(ServiceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn missing_key_is_reported_with_variable_name() {
        let cfg = OpenAiConfig {
            api_key_env: "FRAGRANCE_CORRECTOR_TEST_UNSET_KEY".to_string(),
            ..OpenAiConfig::default()
        };
        match OpenAiChatClient::from_env(&cfg) {
            Err(ServiceError::MissingApiKey(name)) => {
                assert_eq!(name, "FRAGRANCE_CORRECTOR_TEST_UNSET_KEY")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected missing key"),
        }
    }
}
