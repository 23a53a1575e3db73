//! OpenAI-compatible HTTP gateway.
//!
//! Works with any `/chat/completions`-shaped API (OpenAI, vLLM, Ollama).
//! One blocking request per task; the request timeout is the only
//! suspension point of a task attempt.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::io::config::GatewayConfig;
use crate::io::gateway::{GatewayRequest, GatewayResponse, ModelGateway, parse_response, render_prompt};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "\
You are an autonomous software engineer.
You receive a single task (JSON with id/title/description/type).
- Output two top-level keys: \"operations\" and \"notes\".
- \"operations\" MUST be a JSON array of file-edit ops: {action, path, content}.
  Actions: \"write\" (full file), \"append\" (add to end), or \"patch\" (unified diff).
  Only create/modify files necessary for the task. Keep changes minimal but working.
- Keep content self-contained and buildable.
- Use forward slashes in paths. Paths are relative to the project root.
";

/// Gateway backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiGateway {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    max_output_tokens: u32,
}

impl OpenAiGateway {
    /// Build a gateway from config, with `OPENAI_MODEL` / `OPENAI_BASE_URL`
    /// environment overrides. The caller supplies the already-verified
    /// credential.
    pub fn new(cfg: &GatewayConfig, api_key: String) -> Result<Self> {
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| cfg.model.clone());
        let base_url = std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| (!cfg.base_url.trim().is_empty()).then(|| cfg.base_url.clone()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            max_output_tokens: cfg.max_output_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Cheap connectivity check before any task is attempted.
    #[instrument(skip_all)]
    pub fn preflight(&self) -> Result<()> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .with_context(|| format!("preflight request to {url}"))?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "preflight to {url} returned HTTP {}",
                response.status().as_u16()
            ));
        }
        info!(model = %self.model, "preflight succeeded");
        Ok(())
    }
}

impl ModelGateway for OpenAiGateway {
    #[instrument(skip_all, fields(task_id = %request.task.id, model = %self.model))]
    fn propose(&self, request: &GatewayRequest) -> Result<GatewayResponse> {
        let prompt = render_prompt(request)?;
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
            max_tokens: self.max_output_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .with_context(|| format!("model request to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(anyhow!(
                "model call failed: HTTP {} {}",
                status.as_u16(),
                detail.trim()
            ));
        }

        let reply: ChatResponse = response.json().context("parse chat completion body")?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("model returned no choices"))?;
        debug!(bytes = content.len(), "model reply received");
        parse_response(&content)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_falls_back_to_provider_default() {
        let cfg = GatewayConfig::default();
        // Guard against ambient overrides leaking into the assertion.
        if std::env::var("OPENAI_BASE_URL").is_ok() || std::env::var("OPENAI_MODEL").is_ok() {
            return;
        }
        let gateway = OpenAiGateway::new(&cfg, "sk-test".to_string()).expect("gateway");
        assert_eq!(gateway.base_url, DEFAULT_BASE_URL);
        assert_eq!(gateway.model(), "gpt-4o-mini");
    }

    #[test]
    fn config_base_url_is_trimmed() {
        if std::env::var("OPENAI_BASE_URL").is_ok() {
            return;
        }
        let cfg = GatewayConfig {
            base_url: "http://localhost:11434/v1/".to_string(),
            ..GatewayConfig::default()
        };
        let gateway = OpenAiGateway::new(&cfg, "sk-test".to_string()).expect("gateway");
        assert_eq!(gateway.base_url, "http://localhost:11434/v1");
    }
}
