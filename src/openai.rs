use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::llm::{LlmClient, SamplingParams};
use crate::model::{LlmMessage, LlmResponse, LlmUsage};

pub fn chat_completions_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/chat/completions")
}

/// `LlmClient` over the OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;

        tracing::info!(model = %config.model, base_url = %config.base_url, "openai chat client");

        Ok(Self {
            client,
            endpoint: chat_completions_endpoint(config.base_url.as_str()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn chat(
        &self,
        messages: &[LlmMessage],
        params: &SamplingParams,
    ) -> anyhow::Result<LlmResponse> {
        let body = request_body(&self.model, messages, params);
        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            "send chat completion"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().await.context("read OpenAI response body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            anyhow::bail!("OpenAI API error ({status}): {message}");
        }

        let value: serde_json::Value = serde_json::from_str(&raw).context("parse OpenAI response")?;
        let text = extract_message_text(&value).context("extract message text")?;
        let usage = extract_usage(&value);
        if let Some(usage) = &usage {
            tracing::info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "token usage"
            );
        }

        Ok(LlmResponse {
            text,
            usage,
            raw: Some(value),
        })
    }
}

fn request_body(
    model: &str,
    messages: &[LlmMessage],
    params: &SamplingParams,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
    });

    // NOTE: GPT-5 family models reject explicit sampling params; send only the token cap.
    if let Some(obj) = body.as_object_mut() {
        if !model.starts_with("gpt-5") {
            obj.insert("temperature".to_owned(), serde_json::json!(params.temperature));
            obj.insert("top_p".to_owned(), serde_json::json!(params.top_p));
            obj.insert(
                "frequency_penalty".to_owned(),
                serde_json::json!(params.frequency_penalty),
            );
            obj.insert(
                "presence_penalty".to_owned(),
                serde_json::json!(params.presence_penalty),
            );
        }
        if let Some(max_tokens) = params.max_tokens {
            obj.insert("max_tokens".to_owned(), serde_json::json!(max_tokens));
        }
    }

    body
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn extract_message_text(value: &serde_json::Value) -> anyhow::Result<String> {
    let content = value
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing `choices[0].message.content` in response"))?;

    let text = content.trim();
    if text.is_empty() {
        anyhow::bail!("OpenAI message content is empty");
    }
    Ok(text.to_owned())
}

fn extract_usage(value: &serde_json::Value) -> Option<LlmUsage> {
    let usage = value.get("usage")?;
    let field = |name: &str| usage.get(name).and_then(|v| v.as_u64());
    let prompt = field("prompt_tokens")?;
    let completion = field("completion_tokens")?;
    let total = match field("total_tokens") {
        Some(total) => total,
        None => {
            let Some(total) = prompt.checked_add(completion) else {
                tracing::warn!(prompt, completion, "ignoring token usage that overflows");
                return None;
            };
            total
        }
    };

    match LlmUsage::new(prompt, completion, total) {
        Ok(usage) => Some(usage),
        Err(err) => {
            tracing::warn!(%err, "ignoring inconsistent token usage");
            None
        }
    }
}
