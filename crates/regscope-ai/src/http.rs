//! HTTP oracle speaking the Anthropic Messages API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::oracle::{Completion, CompletionRequest, Oracle, OracleError};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    block_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Oracle backed by a Messages-compatible HTTP endpoint.
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpOracle {
    /// `base_url` is like `https://api.anthropic.com` (trailing slash optional).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, OracleError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, OracleError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system_prompt.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let url = self.messages_url();
        debug!(url = %url, model = %self.model, max_tokens = request.max_tokens, "oracle request");
        let mut builder = self
            .client
            .post(&url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await?;
        let completion = parse_messages_response(&text)?;
        info!(model = %self.model, tokens = completion.tokens_used, "oracle completion");
        Ok(completion)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Join the text blocks of a Messages response.
fn parse_messages_response(body: &str) -> Result<Completion, OracleError> {
    let resp: MessagesResponse = serde_json::from_str(body)?;
    let content = resp
        .content
        .iter()
        .filter(|b| b.block_type.is_empty() || b.block_type == "text")
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join("");
    if content.trim().is_empty() {
        return Err(OracleError::Empty);
    }
    let tokens_used = resp
        .usage
        .map(|u| u.input_tokens + u.output_tokens)
        .unwrap_or(0);
    Ok(Completion {
        content,
        tokens_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_trims_trailing_slash() {
        let oracle = HttpOracle::new("http://localhost:8080/", DEFAULT_MODEL);
        assert_eq!(oracle.base_url, "http://localhost:8080");
        assert_eq!(oracle.messages_url(), "http://localhost:8080/v1/messages");
    }

    #[test]
    fn request_omits_missing_system_prompt() {
        let body = MessagesRequest {
            model: "m",
            max_tokens: 10,
            temperature: 0.1,
            system: None,
            messages: vec![Message {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn parses_text_blocks_and_usage() {
        let body = r#"{
            "content": [{"type": "text", "text": "ACTION_TYPE: "}, {"type": "text", "text": "FINALIZE"}],
            "usage": {"input_tokens": 100, "output_tokens": 7}
        }"#;
        let completion = parse_messages_response(body).unwrap();
        assert_eq!(completion.content, "ACTION_TYPE: FINALIZE");
        assert_eq!(completion.tokens_used, 107);
    }

    #[test]
    fn empty_content_is_an_error() {
        let body = r#"{"content": []}"#;
        assert!(matches!(
            parse_messages_response(body),
            Err(OracleError::Empty)
        ));
    }

    #[test]
    fn malformed_body_is_json_error() {
        assert!(matches!(
            parse_messages_response("<html>"),
            Err(OracleError::Json(_))
        ));
    }
}
