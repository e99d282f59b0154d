//! Telegram Bot API HTTP client.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Hard per-attempt network timeout.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

/// Wire body for `sendMessage`.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageParams {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Classified result of one send attempt.
///
/// Transport-level failures (connect errors, timeouts) surface as `Err`
/// from [`Transport::send`], not as a variant here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// HTTP 400, a parse-mode rejection when a rich format was requested.
    BadRequest(String),
    /// Any other non-retryable client-side rejection.
    Rejected { status: u16, description: String },
    /// 5xx-class failure, retryable.
    ServerError(u16),
}

/// One network call to the chat transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, params: &SendMessageParams) -> anyhow::Result<SendOutcome>;
}

/// HTTP client for the Telegram Bot API.
///
/// A fresh `reqwest::Client` is built for every attempt so no connection
/// state carries over between attempts.
pub struct TelegramApi {
    base_url: String,
}

impl TelegramApi {
    /// Create a new API client with the given bot token.
    pub fn new(bot_token: &str) -> Self {
        Self {
            base_url: format!("https://api.telegram.org/bot{bot_token}"),
        }
    }
}

#[async_trait]
impl Transport for TelegramApi {
    async fn send(&self, params: &SendMessageParams) -> anyhow::Result<SendOutcome> {
        let client = Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        let resp = client
            .post(format!("{}/sendMessage", self.base_url))
            .json(params)
            .send()
            .await
            .context("sendMessage request failed")?;

        let status = resp.status();
        let body = resp.json::<ApiResponse>().await.unwrap_or(ApiResponse {
            ok: false,
            description: None,
        });
        let description = body
            .description
            .unwrap_or_else(|| "unknown error".to_string());

        if status.is_success() && body.ok {
            return Ok(SendOutcome::Delivered);
        }
        if status.as_u16() == 400 {
            return Ok(SendOutcome::BadRequest(description));
        }
        if status.is_server_error() {
            return Ok(SendOutcome::ServerError(status.as_u16()));
        }
        Ok(SendOutcome::Rejected {
            status: status.as_u16(),
            description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let api = TelegramApi::new("123:ABC");
        assert_eq!(api.base_url, "https://api.telegram.org/bot123:ABC");
    }

    #[test]
    fn test_parse_mode_omitted_when_plain() {
        let params = SendMessageParams {
            chat_id: 7,
            text: "hi".into(),
            parse_mode: None,
        };
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"chat_id":7,"text":"hi"}"#);

        let params = SendMessageParams {
            parse_mode: Some("Markdown".into()),
            ..params
        };
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains(r#""parse_mode":"Markdown""#));
    }
}
