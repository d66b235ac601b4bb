use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Model id and sampling knobs for one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub sampling: SamplingParams,
}

impl CompletionRequest {
    /// Single-turn request carrying one user message.
    pub fn single(prompt: impl Into<String>, sampling: &SamplingParams) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            sampling: sampling.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    MissingCredentials(String),
    #[error("failed calling completion endpoint: {0}")]
    Transport(String),
    #[error("completion request failed ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode completion response: {0}")]
    Decode(String),
    #[error("completion response had no content")]
    EmptyResponse,
}

/// Synchronous request/response access to a hosted text-generation model.
pub trait CompletionService {
    fn complete(&self, req: &CompletionRequest) -> Result<String, ServiceError>;
}

impl<T: CompletionService + ?Sized> CompletionService for &T {
    fn complete(&self, req: &CompletionRequest) -> Result<String, ServiceError> {
        (**self).complete(req)
    }
}

impl<T: CompletionService + ?Sized> CompletionService for Box<T> {
    fn complete(&self, req: &CompletionRequest) -> Result<String, ServiceError> {
        (**self).complete(req)
    }
}

/// Trims model output down to the script body, unwrapping a markdown fence
/// when the model added one despite being told not to.
pub fn normalize_script_output(raw: &str) -> Result<String, ServiceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::EmptyResponse);
    }

    if let Some(block) = extract_fenced_code(trimmed) {
        if block.trim().is_empty() {
            return Err(ServiceError::EmptyResponse);
        }
        return Ok(format!("{}\n", block.trim_end()));
    }

    Ok(format!("{trimmed}\n"))
}

fn extract_fenced_code(input: &str) -> Option<String> {
    let start = input.find("```")?;
    let remainder = &input[start + 3..];
    let body_start = remainder.find('\n')? + 1;
    let body = &remainder[body_start..];
    let end = body.find("```")?;
    Some(body[..end].to_string())
}
