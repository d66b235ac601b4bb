use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "genie.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSetting {
    Azure,
    Openai,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub provider: Option<ProviderSetting>,
    pub api_endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub chat_temperature: Option<f32>,
    pub chat_max_tokens: Option<u32>,
    pub max_retries: Option<u32>,
    pub interpreter: Option<String>,
    pub headless_env: Option<String>,
    pub exec_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub codegen_program: Option<String>,
    pub target_url: Option<String>,
    pub testcase_prompt: Option<String>,
    pub refactor_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvConfig {
    pub provider: Option<ProviderSetting>,
    pub api_endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub chat_max_tokens: Option<u32>,
    pub max_retries: Option<u32>,
    pub interpreter: Option<String>,
    pub headless_env: Option<String>,
    pub exec_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub codegen_program: Option<String>,
    pub target_url: Option<String>,
    pub testcase_prompt: Option<String>,
    pub refactor_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CliOverrides {
    pub provider: Option<ProviderSetting>,
    pub model: Option<String>,
    pub max_retries: Option<u32>,
    pub interpreter: Option<String>,
    pub target_url: Option<String>,
}

/// Fully resolved settings handed to the clients and the repair loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub provider: ProviderSetting,
    pub api_endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub chat_temperature: f32,
    pub chat_max_tokens: u32,
    pub max_retries: u32,
    pub interpreter: String,
    pub headless_env: String,
    pub exec_timeout: Duration,
    pub request_timeout: Duration,
    pub codegen_program: String,
    pub target_url: Option<String>,
    pub testcase_prompt: Option<String>,
    pub refactor_prompt: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderSetting::Azure,
            api_endpoint: None,
            api_key: None,
            api_version: "2024-06-01".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.5,
            max_tokens: 1500,
            chat_temperature: 0.5,
            chat_max_tokens: 16000,
            max_retries: 3,
            interpreter: "python".to_string(),
            headless_env: "PLAYWRIGHT_HEADLESS".to_string(),
            exec_timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(120),
            codegen_program: "playwright".to_string(),
            target_url: None,
            testcase_prompt: None,
            refactor_prompt: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(anyhow!("max_retries must be at least 1"));
        }
        for (name, value) in [
            ("temperature", self.temperature),
            ("chat_temperature", self.chat_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(anyhow!("{name} must be between 0.0 and 2.0, got {value}"));
            }
        }
        if self.max_tokens == 0 || self.chat_max_tokens == 0 {
            return Err(anyhow!("max_tokens and chat_max_tokens must be at least 1"));
        }
        for (name, value) in [
            ("exec_timeout_secs", self.exec_timeout),
            ("request_timeout_secs", self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(anyhow!("{name} must be at least 1"));
            }
        }
        Ok(())
    }
}

/// Loads `.env` from `dir` into the process environment. Variables that are
/// already set keep their values.
pub fn load_dotenv(dir: &Path) -> Result<bool> {
    let path = dir.join(".env");
    if !path.exists() {
        return Ok(false);
    }
    dotenvy::from_path(&path)
        .with_context(|| format!("failed loading environment file {}", path.display()))?;
    Ok(true)
}

pub fn load_file_config(explicit_path: Option<&Path>, cwd: &Path) -> Result<Option<FileConfig>> {
    let path = match explicit_path {
        Some(p) => p.to_path_buf(),
        None => match env::var_os("GENIE_CONFIG") {
            Some(p) => PathBuf::from(p),
            None => {
                let candidate = cwd.join(CONFIG_FILE_NAME);
                if !candidate.exists() {
                    return Ok(None);
                }
                candidate
            }
        },
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed reading config file {}", path.display()))?;
    let parsed: FileConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing config file {}", path.display()))?;
    Ok(Some(parsed))
}

impl EnvConfig {
    pub fn from_current_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            provider: non_empty("GENIE_PROVIDER").and_then(|v| parse_provider(&v)),
            api_endpoint: non_empty("API_ENDPOINT"),
            api_key: non_empty("API_KEY"),
            api_version: non_empty("API_VERSION"),
            model: non_empty("MODEL_TYPE"),
            temperature: non_empty("MODEL_TEMPERATURE").and_then(|v| v.trim().parse().ok()),
            max_tokens: non_empty("MODEL_MAX_TOKENS").and_then(|v| v.trim().parse().ok()),
            chat_max_tokens: non_empty("GENIE_CHAT_MAX_TOKENS").and_then(|v| v.trim().parse().ok()),
            max_retries: non_empty("GENIE_MAX_RETRIES").and_then(|v| v.trim().parse().ok()),
            interpreter: non_empty("GENIE_INTERPRETER"),
            headless_env: non_empty("GENIE_HEADLESS_ENV"),
            exec_timeout_secs: non_empty("GENIE_EXEC_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok()),
            request_timeout_secs: non_empty("GENIE_REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok()),
            codegen_program: non_empty("GENIE_CODEGEN"),
            target_url: non_empty("TARGET_URL"),
            testcase_prompt: non_empty("PROMPT_FUNCTIONAL_TESTCASE"),
            refactor_prompt: non_empty("PROMPT_GENERATE_UI_AUTO_SCRIPT"),
        }
    }
}

pub fn resolve_settings(
    cli: &CliOverrides,
    env_cfg: &EnvConfig,
    file_cfg: Option<&FileConfig>,
) -> Settings {
    let base = Settings::default();

    let provider = cli
        .provider
        .or(env_cfg.provider)
        .or(file_cfg.and_then(|c| c.provider))
        .unwrap_or(base.provider);

    let api_endpoint = env_cfg
        .api_endpoint
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.api_endpoint.clone()));

    let api_key = env_cfg
        .api_key
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.api_key.clone()));

    let api_version = env_cfg
        .api_version
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.api_version.clone()))
        .unwrap_or(base.api_version);

    let model = cli
        .model
        .clone()
        .or_else(|| env_cfg.model.clone())
        .or_else(|| file_cfg.and_then(|c| c.model.clone()))
        .unwrap_or(base.model);

    let temperature = env_cfg
        .temperature
        .or(file_cfg.and_then(|c| c.temperature))
        .unwrap_or(base.temperature);

    let max_tokens = env_cfg
        .max_tokens
        .or(file_cfg.and_then(|c| c.max_tokens))
        .unwrap_or(base.max_tokens);

    let chat_temperature = file_cfg
        .and_then(|c| c.chat_temperature)
        .unwrap_or(base.chat_temperature);

    let chat_max_tokens = env_cfg
        .chat_max_tokens
        .or(file_cfg.and_then(|c| c.chat_max_tokens))
        .unwrap_or(base.chat_max_tokens);

    let max_retries = cli
        .max_retries
        .or(env_cfg.max_retries)
        .or(file_cfg.and_then(|c| c.max_retries))
        .unwrap_or(base.max_retries);

    let interpreter = cli
        .interpreter
        .clone()
        .or_else(|| env_cfg.interpreter.clone())
        .or_else(|| file_cfg.and_then(|c| c.interpreter.clone()))
        .unwrap_or(base.interpreter);

    let headless_env = env_cfg
        .headless_env
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.headless_env.clone()))
        .unwrap_or(base.headless_env);

    let exec_timeout = env_cfg
        .exec_timeout_secs
        .or(file_cfg.and_then(|c| c.exec_timeout_secs))
        .map(Duration::from_secs)
        .unwrap_or(base.exec_timeout);

    let request_timeout = env_cfg
        .request_timeout_secs
        .or(file_cfg.and_then(|c| c.request_timeout_secs))
        .map(Duration::from_secs)
        .unwrap_or(base.request_timeout);

    let codegen_program = env_cfg
        .codegen_program
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.codegen_program.clone()))
        .unwrap_or(base.codegen_program);

    let target_url = cli
        .target_url
        .clone()
        .or_else(|| env_cfg.target_url.clone())
        .or_else(|| file_cfg.and_then(|c| c.target_url.clone()));

    let testcase_prompt = env_cfg
        .testcase_prompt
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.testcase_prompt.clone()));

    let refactor_prompt = env_cfg
        .refactor_prompt
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.refactor_prompt.clone()));

    Settings {
        provider,
        api_endpoint,
        api_key,
        api_version,
        model,
        temperature,
        max_tokens,
        chat_temperature,
        chat_max_tokens,
        max_retries,
        interpreter,
        headless_env,
        exec_timeout,
        request_timeout,
        codegen_program,
        target_url,
        testcase_prompt,
        refactor_prompt,
    }
}

pub fn parse_provider(input: &str) -> Option<ProviderSetting> {
    match input.trim().to_ascii_lowercase().as_str() {
        "azure" | "azure-openai" => Some(ProviderSetting::Azure),
        "openai" | "openai-compatible" => Some(ProviderSetting::Openai),
        _ => None,
    }
}
