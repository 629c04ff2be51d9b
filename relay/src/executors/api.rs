//! Chat-completion executor for OpenAI-compatible providers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::cost::{Usage, cost_from_header, cost_from_usage};
use crate::executors::{ExecRequest, ExecResult, Executor, build_user_content};
use crate::io::config::ProviderConfig;
use crate::io::credentials::CredentialProvider;

/// Response header carrying the provider-computed cost in USD.
pub const COST_HEADER: &str = "x-openrouter-cost";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Posts `{system, user}` messages to `{endpoint}/chat/completions`.
pub struct ApiExecutor {
    endpoint: String,
    client: Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl ApiExecutor {
    pub fn new(provider: &ProviderConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(provider.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            endpoint: provider.endpoint.trim_end_matches('/').to_string(),
            client,
            credentials,
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }
}

impl Executor for ApiExecutor {
    #[instrument(skip_all, fields(step = %request.step.name, model = %request.model))]
    fn execute(&self, request: &ExecRequest) -> Result<ExecResult> {
        let start = Instant::now();
        if request.model.trim().is_empty() {
            return Err(anyhow!("step {:?} has no model", request.step.name));
        }
        let api_key = self.credentials.api_key()?;
        let user_content = build_user_content(&request.inputs);
        let payload = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &user_content,
                },
            ],
        };

        debug!(url = %self.url(), user_bytes = user_content.len(), "sending chat completion");
        let response = self
            .client
            .post(self.url())
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .context("API request")?;

        let status = response.status();
        let header_cost = response
            .headers()
            .get(COST_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| cost_from_header(Some(value)));
        let body = response.text().context("read API response")?;
        if status != reqwest::StatusCode::OK {
            return Err(anyhow!("API returned {}: {}", status.as_u16(), body.trim()));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).context("parse API response")?;
        let output = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("empty choices in API response"))?
            .message
            .content
            .unwrap_or_default();
        let usage = parsed.usage.unwrap_or_default();

        let cost = match header_cost {
            Some(cost) => cost,
            None if usage.prompt_tokens > 0 => {
                let usage = Usage {
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                };
                cost_from_usage(&request.model, usage).unwrap_or_else(|| {
                    warn!(
                        model = %request.model,
                        tokens_in = usage.prompt_tokens,
                        tokens_out = usage.completion_tokens,
                        "no pricing for model; recording zero cost"
                    );
                    0.0
                })
            }
            None => {
                warn!(model = %request.model, "could not determine cost for step");
                0.0
            }
        };

        Ok(ExecResult {
            output,
            cost,
            duration: start.elapsed(),
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
        })
    }
}
