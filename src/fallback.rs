//! Automated replies for visitors when no operator is connected.
//!
//! One outbound call per message, no retries. The raw completion is cut at
//! the last `"{assistant}:"` marker so echoed prompts are stripped.

use std::future::Future;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::FallbackError;
use crate::prompting::FallbackContext;

pub const NOT_SURE_REPLY: &str = "I'm not sure how to answer that.";

/// Turns a visitor message into reply text. Implementations must never
/// return an empty reply.
pub trait Responder: Send + Sync + 'static {
    fn respond(&self, user_text: &str)
        -> impl Future<Output = Result<String, FallbackError>> + Send;
}

pub struct HttpResponder {
    client: reqwest::Client,
    provider: ProviderConfig,
    context: FallbackContext,
}

impl HttpResponder {
    pub fn new(provider: ProviderConfig, context: FallbackContext) -> Result<Self, FallbackError> {
        let client = reqwest::Client::builder()
            .timeout(provider.timeout)
            .build()?;
        Ok(Self {
            client,
            provider,
            context,
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        match self.provider.kind {
            ProviderKind::HfInference => json!({ "inputs": prompt }),
            ProviderKind::ChatCompletions => json!({
                "model": self.provider.model,
                "messages": [
                    { "role": "user", "content": prompt }
                ],
                "temperature": 0.3
            }),
        }
    }

    /// Raw generated text, trimmed. Empty when the body carried no text.
    async fn complete(&self, prompt: &str) -> Result<String, FallbackError> {
        let Some(api_key) = self.provider.api_key.as_deref() else {
            return Err(FallbackError::NotConfigured);
        };

        let response = self
            .client
            .post(&self.provider.endpoint)
            .bearer_auth(api_key)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "completion provider returned an error");
            return Err(FallbackError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(|err| FallbackError::Malformed(err.to_string()))?;

        let text = generated_text(&payload).map(str::trim).unwrap_or_default();
        if text.is_empty() {
            debug!("completion provider returned no text");
        }
        Ok(text.to_string())
    }
}

impl Responder for HttpResponder {
    fn respond(
        &self,
        user_text: &str,
    ) -> impl Future<Output = Result<String, FallbackError>> + Send {
        let prompt = self.context.render_prompt(user_text);
        async move {
            let raw = self.complete(&prompt).await?;
            let reply = extract_reply(&raw, self.context.assistant_name());
            if reply.is_empty() {
                return Ok(NOT_SURE_REPLY.to_string());
            }
            Ok(reply)
        }
    }
}

/// Accepts `{generated_text}`, `[{generated_text}, ..]` and chat-completions
/// `{choices: [{message: {content}}]}`.
pub fn generated_text(payload: &Value) -> Option<&str> {
    match payload {
        Value::Array(items) => items
            .first()
            .and_then(|item| item.get("generated_text"))
            .and_then(Value::as_str),
        _ => payload
            .get("generated_text")
            .and_then(Value::as_str)
            .or_else(|| {
                payload
                    .get("choices")
                    .and_then(Value::as_array)
                    .and_then(|choices| choices.first())
                    .and_then(|choice| choice.get("message"))
                    .and_then(|message| message.get("content"))
                    .and_then(Value::as_str)
            }),
    }
}

/// Text after the last `"{assistant}:"` marker, trimmed.
pub fn extract_reply(full_text: &str, assistant_name: &str) -> String {
    let marker = format!("{assistant_name}:");
    full_text
        .rsplit(marker.as_str())
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
