use genie_llm::{CompletionRequest, CompletionService, ServiceError};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Where chat completions are sent and how the request is authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Azure OpenAI: the model id names the deployment, auth via `api-key`.
    Azure { base_url: String, api_version: String },
    /// Any OpenAI-compatible `/chat/completions` API with bearer auth.
    OpenAiCompatible { base_url: String },
}

impl Endpoint {
    pub fn completions_url(&self, model: &str) -> String {
        match self {
            Endpoint::Azure {
                base_url,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base_url.trim_end_matches('/'),
                model,
                api_version
            ),
            Endpoint::OpenAiCompatible { base_url } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
        }
    }
}

#[derive(Clone)]
pub struct ChatCompletionClient {
    pub endpoint: Endpoint,
    pub api_key: String,
    pub timeout: Duration,
}

impl ChatCompletionClient {
    pub fn from_parts(endpoint: Endpoint, api_key: String, timeout: Duration) -> Self {
        Self {
            endpoint,
            api_key,
            timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

fn request_body(req: &CompletionRequest) -> ChatRequest<'_> {
    ChatRequest {
        model: &req.sampling.model,
        temperature: req.sampling.temperature,
        max_tokens: req.sampling.max_tokens,
        messages: req
            .messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
    }
}

fn extract_content(parsed: ChatResponse) -> Result<String, ServiceError> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ServiceError::EmptyResponse)
}

impl CompletionService for ChatCompletionClient {
    fn complete(&self, req: &CompletionRequest) -> Result<String, ServiceError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|err| ServiceError::Transport(format!("failed to build HTTP client: {err}")))?;
        let url = self.endpoint.completions_url(&req.sampling.model);
        debug!(url = %url, messages = req.messages.len(), "sending completion request");

        let builder = client.post(url).json(&request_body(req));
        let builder = match &self.endpoint {
            Endpoint::Azure { .. } => builder.header("api-key", &self.api_key),
            Endpoint::OpenAiCompatible { .. } => builder.bearer_auth(&self.api_key),
        };

        let response = builder
            .send()
            .map_err(|err| ServiceError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_else(|_| "<unavailable>".to_string());
            return Err(ServiceError::Status { status, body });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|err| ServiceError::Decode(err.to_string()))?;
        extract_content(parsed)
    }
}
