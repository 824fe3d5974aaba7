//! OpenRouter chat-completions generator.
//!
//! Offers a single `update_sync` function tool backed by the runner's
//! pending set, loops tool call → tool result → re-prompt, and parses the
//! final message as an [`UpdateDigest`].

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::types::{
    pending_tool_payload, GeneratorError, SummarizeRequest, UpdateDigest, UpdateSummarizer,
};
use crate::config::SummarizerConfig;

pub const UPDATE_SYNC_TOOL: &str = "update_sync";

const MAX_TOOL_LIMIT: usize = 50;

const SYSTEM_PROMPT: &str = "You are the memory update summarizer.
Keep the user's overview change log tidy by digesting outstanding updates.

Process:
1. Call the update_sync tool before writing anything to retrieve unsummarized updates.
2. If the tool returns an empty array, respond with an empty items list and the digest \"No pending updates.\".
3. Group related updates and draft a concise digest of one or two sentences.
4. Add one items entry per update you covered with its id, kind, and a short summary. Set followUp to 'manual' if human review is needed, otherwise 'none'.
5. Put the id of any update you cannot summarize safely in leftoverIds.

Only rely on what update_sync returns. Do not mention internal tooling.
Respond with JSON that matches the provided schema exactly.";

pub struct OpenRouterSummarizer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key_env: String,
    max_tool_rounds: usize,
}

impl OpenRouterSummarizer {
    pub fn from_config(config: &SummarizerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            max_tool_rounds: config.max_tool_rounds.max(1),
        })
    }

    fn api_key(&self) -> Result<String, GeneratorError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(GeneratorError::MissingCredentials(format!(
                "OpenRouter API key not set ({})",
                self.api_key_env
            ))),
        }
    }

    async fn complete(&self, api_key: &str, payload: &Value) -> Result<Value, GeneratorError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .header("X-Title", "mdmemory")
            .json(payload)
            .send()
            .await
            .map_err(|e| GeneratorError::Generation(format!("OpenRouter request failed: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| GeneratorError::Generation(format!("OpenRouter response unreadable: {e}")))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GeneratorError::MissingCredentials(format!(
                "OpenRouter rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            return Err(GeneratorError::Generation(format!("OpenRouter error ({status}): {body}")));
        }
        Ok(body)
    }
}

fn update_sync_tool() -> Value {
    json!([{
        "type": "function",
        "function": {
            "name": UPDATE_SYNC_TOOL,
            "description": "Fetches outstanding memory updates that have not yet been summarized. Use before crafting a digest.",
            "parameters": {
                "type": "object",
                "properties": {
                    "userId": { "type": "string", "description": "User ID whose pending updates should be retrieved." },
                    "limit": { "type": "integer", "minimum": 1, "maximum": MAX_TOOL_LIMIT, "description": "Maximum number of updates to return." }
                }
            }
        }
    }])
}

fn response_format() -> Value {
    let schema = schemars::schema_for!(UpdateDigest);
    json!({
        "type": "json_schema",
        "json_schema": { "name": "update_digest", "schema": schema }
    })
}

/// Answer one tool call from the runner's pending set.
fn answer_tool_call(call: &Value, request: &SummarizeRequest) -> String {
    let name = call.pointer("/function/name").and_then(Value::as_str).unwrap_or("");
    if name != UPDATE_SYNC_TOOL {
        return json!({ "error": format!("unknown tool: {name}") }).to_string();
    }

    // Arguments arrive as a JSON-encoded string.
    let args: Value = call
        .pointer("/function/arguments")
        .and_then(Value::as_str)
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or(Value::Null);
    // Without an explicit limit the model sees the whole batch it was handed.
    let limit = args
        .get("limit")
        .and_then(Value::as_u64)
        .map(|l| (l as usize).clamp(1, MAX_TOOL_LIMIT))
        .unwrap_or(request.pending.len());

    if let Some(asked) = args.get("userId").and_then(Value::as_str) {
        if asked != request.user_id {
            tracing::warn!(user_id = %request.user_id, asked, "update_sync asked for another user");
        }
    }

    pending_tool_payload(&request.pending, limit).to_string()
}

/// Pull a JSON object out of model text: fenced ```json block first, then the
/// outermost braces.
pub fn extract_json_output<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    if let Some(fence_start) = response.find("```json") {
        let after_fence = &response[fence_start + "```json".len()..];
        if let Some(fence_end) = after_fence.find("```") {
            if let Ok(val) = serde_json::from_str(after_fence[..fence_end].trim()) {
                return Some(val);
            }
        }
    }

    let trimmed = response.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

#[async_trait]
impl UpdateSummarizer for OpenRouterSummarizer {
    async fn resolve_model(&self) -> Result<String, GeneratorError> {
        self.api_key()?;
        let model = self.model.trim();
        if model.is_empty() {
            return Err(GeneratorError::Model("no summarizer model configured".into()));
        }
        Ok(model.to_string())
    }

    async fn summarize(
        &self,
        model: &str,
        request: &SummarizeRequest,
    ) -> Result<Option<UpdateDigest>, GeneratorError> {
        let api_key = self.api_key()?;
        let tools = update_sync_tool();
        let format = response_format();
        let mut messages = vec![
            json!({ "role": "system", "content": SYSTEM_PROMPT }),
            json!({ "role": "user", "content": request.prompt }),
        ];

        // One extra round without tools forces a final answer.
        for round in 0..=self.max_tool_rounds {
            let mut payload = json!({
                "model": model,
                "messages": messages,
                "response_format": format,
            });
            if round < self.max_tool_rounds {
                payload["tools"] = tools.clone();
                payload["tool_choice"] = json!("auto");
            }

            let body = self.complete(&api_key, &payload).await?;
            let message = body
                .pointer("/choices/0/message")
                .cloned()
                .ok_or_else(|| GeneratorError::Generation("OpenRouter returned no choices".into()))?;

            let tool_calls = message
                .get("tool_calls")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            if tool_calls.is_empty() {
                let content = message.get("content").and_then(Value::as_str).unwrap_or("");
                let digest = extract_json_output::<UpdateDigest>(content);
                if digest.is_none() {
                    tracing::warn!(user_id = %request.user_id, round, "summarizer answer was not a digest");
                }
                return Ok(digest);
            }

            tracing::debug!(user_id = %request.user_id, round, count = tool_calls.len(), "summarizer requested tools");
            messages.push(message);
            for call in &tool_calls {
                let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": id,
                    "content": answer_tool_call(call, request),
                }));
            }
        }

        Err(GeneratorError::Generation(format!(
            "no final answer after {} tool rounds",
            self.max_tool_rounds
        )))
    }
}
