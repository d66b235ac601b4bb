use crate::GlobalArgs;
use anyhow::{Context, Result};
use genie_config::{
    CliOverrides, EnvConfig, ProviderSetting, Settings, load_dotenv, load_file_config,
    resolve_settings,
};
use genie_core::{FsArtifactStore, GeneratorConfig, ProcessExecutor, RepairConfig};
use genie_llm::{CompletionRequest, CompletionService, SamplingParams, ServiceError};
use genie_llm_openai::{ChatCompletionClient, Endpoint};
use std::path::PathBuf;
use tracing::debug;

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Stands in for the HTTP client when credentials are missing, so commands
/// that never reach the model still work.
pub(crate) struct MaybeCompletionClient {
    inner: Result<ChatCompletionClient, String>,
}

impl CompletionService for MaybeCompletionClient {
    fn complete(&self, req: &CompletionRequest) -> Result<String, ServiceError> {
        match &self.inner {
            Ok(client) => client.complete(req),
            Err(reason) => Err(ServiceError::MissingCredentials(reason.clone())),
        }
    }
}

pub(crate) struct RuntimeContext {
    pub settings: Settings,
    pub store: FsArtifactStore,
}

impl RuntimeContext {
    pub(crate) fn completion(&self) -> MaybeCompletionClient {
        build_completion(&self.settings)
    }

    pub(crate) fn executor(&self) -> ProcessExecutor {
        ProcessExecutor::new(
            self.settings.interpreter.clone(),
            self.settings.headless_env.clone(),
        )
        .with_timeout(self.settings.exec_timeout)
    }

    pub(crate) fn generator_sampling(&self) -> SamplingParams {
        SamplingParams {
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        }
    }

    pub(crate) fn chat_sampling(&self) -> SamplingParams {
        SamplingParams {
            model: self.settings.model.clone(),
            temperature: self.settings.chat_temperature,
            max_tokens: self.settings.chat_max_tokens,
        }
    }

    pub(crate) fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig::new(
            self.generator_sampling(),
            self.settings.testcase_prompt.clone(),
            self.settings.refactor_prompt.clone(),
        )
    }

    pub(crate) fn repair_config(&self, reference_script: String) -> RepairConfig {
        RepairConfig {
            max_retries: self.settings.max_retries,
            sampling: self.generator_sampling(),
            reference_script,
        }
    }
}

pub(crate) fn build_completion(settings: &Settings) -> MaybeCompletionClient {
    let inner = match (&settings.api_key, settings.provider) {
        (None, _) => Err(
            "API_KEY is required for completion calls (set it in the environment, .env or genie.json)"
                .to_string(),
        ),
        (Some(api_key), ProviderSetting::Azure) => match &settings.api_endpoint {
            Some(base_url) => Ok(ChatCompletionClient::from_parts(
                Endpoint::Azure {
                    base_url: base_url.clone(),
                    api_version: settings.api_version.clone(),
                },
                api_key.clone(),
                settings.request_timeout,
            )),
            None => Err("API_ENDPOINT is required for the azure provider".to_string()),
        },
        (Some(api_key), ProviderSetting::Openai) => Ok(ChatCompletionClient::from_parts(
            Endpoint::OpenAiCompatible {
                base_url: settings
                    .api_endpoint
                    .clone()
                    .unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string()),
            },
            api_key.clone(),
            settings.request_timeout,
        )),
    };
    MaybeCompletionClient { inner }
}

pub(crate) fn resolve_context(
    global: &GlobalArgs,
    overrides: CliOverrides,
) -> Result<RuntimeContext> {
    let workdir = match &global.workdir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed resolving current directory")?,
    };
    load_dotenv(&workdir)?;

    let cli_overrides = CliOverrides {
        provider: global.provider.map(|p| p.as_setting()),
        model: global.model.clone(),
        ..overrides
    };
    let file_cfg = load_file_config(global.config.as_deref(), &workdir)?;
    let env_cfg = EnvConfig::from_current_env();
    let settings = resolve_settings(&cli_overrides, &env_cfg, file_cfg.as_ref());
    settings.validate().context("invalid configuration")?;
    debug!(
        provider = ?settings.provider,
        model = %settings.model,
        workdir = %workdir.display(),
        "resolved settings"
    );

    Ok(RuntimeContext {
        settings,
        store: FsArtifactStore::new(workdir),
    })
}

pub(crate) fn resolve_cli_path(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("failed resolving current directory")?;
    Ok(cwd.join(path))
}
