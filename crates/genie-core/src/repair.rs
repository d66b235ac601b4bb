//! Bounded, model-guided repair of a failing script.
//!
//! Each attempt asks the completion service for a fixed script, overwrites
//! the candidate file, runs it headless and stops at the first zero exit
//! code. A failed completion call or a failed write ends the loop at once;
//! a failed execution only feeds the next attempt.

use crate::executor::{ExecutorError, ScriptExecutor};
use crate::layout::AutofixLayout;
use crate::prompts::repair_prompt;
use crate::store::{ArtifactStore, PersistenceError};
use genie_llm::{CompletionRequest, CompletionService, SamplingParams, ServiceError, normalize_script_output};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RepairConfig {
    pub max_retries: u32,
    pub sampling: SamplingParams,
    /// Recorded script the model must take locators and helpers from.
    pub reference_script: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairJob {
    pub script_path: PathBuf,
    pub initial_script_code: String,
    pub initial_logs: String,
}

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("completion call failed on attempt {attempt}: {source}")]
    Service {
        attempt: u32,
        #[source]
        source: ServiceError,
    },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("failed executing candidate on attempt {attempt}: {source}")]
    Execution {
        attempt: u32,
        #[source]
        source: ExecutorError,
    },
}

#[derive(Debug)]
pub enum LoopResult {
    Success { attempts: u32, candidate: PathBuf },
    ExhaustedRetries { attempts: u32, candidate: PathBuf },
    FatalError(RepairError),
}

impl LoopResult {
    pub fn is_success(&self) -> bool {
        matches!(self, LoopResult::Success { .. })
    }
}

pub struct RepairLoop<C, E, S>
where
    C: CompletionService,
    E: ScriptExecutor,
    S: ArtifactStore,
{
    pub completion: C,
    pub executor: E,
    pub store: S,
    pub config: RepairConfig,
}

impl<C, E, S> RepairLoop<C, E, S>
where
    C: CompletionService,
    E: ScriptExecutor,
    S: ArtifactStore,
{
    pub fn new(completion: C, executor: E, store: S, config: RepairConfig) -> Self {
        Self {
            completion,
            executor,
            store,
            config,
        }
    }

    pub fn run(&self, job: &RepairJob) -> LoopResult {
        match self.attempt_repairs(job) {
            Ok(result) => result,
            Err(err) => {
                error!("repair loop aborted: {err}");
                LoopResult::FatalError(err)
            }
        }
    }

    fn attempt_repairs(&self, job: &RepairJob) -> Result<LoopResult, RepairError> {
        let layout = AutofixLayout::for_script(&job.script_path);
        info!(
            script = %job.script_path.display(),
            max_retries = self.config.max_retries,
            "starting repair loop"
        );

        self.store
            .write_text(&layout.initial_log(), &job.initial_logs)?;
        self.store
            .write_text(&layout.candidate_script(), &job.initial_script_code)?;
        let candidate = self.store.location(&layout.candidate_script());
        info!(candidate = %candidate.display(), "initial script and logs saved");

        let mut script = job.initial_script_code.clone();
        let mut logs = job.initial_logs.clone();

        for attempt in 1..=self.config.max_retries {
            info!(attempt, "requesting fix from model");
            let prompt = repair_prompt(&script, &logs, &self.config.reference_script);
            debug!(attempt, prompt_chars = prompt.len(), "built repair prompt");

            let reply = self
                .completion
                .complete(&CompletionRequest::single(prompt, &self.config.sampling))
                .and_then(|raw| normalize_script_output(&raw))
                .map_err(|source| RepairError::Service { attempt, source })?;
            script = reply;

            self.store.write_text(&layout.candidate_script(), &script)?;
            info!(attempt, "candidate updated from model fix, running headless");

            let outcome = self
                .executor
                .run(&candidate)
                .map_err(|source| RepairError::Execution { attempt, source })?;

            if outcome.succeeded() {
                info!(attempt, "candidate executed successfully");
                return Ok(LoopResult::Success {
                    attempts: attempt,
                    candidate,
                });
            }

            warn!(attempt, exit_code = ?outcome.exit_code, timed_out = outcome.timed_out, "candidate failed again");
            logs = outcome.log_text();
            let log_path = layout.attempt_log(attempt);
            self.store.write_text(&log_path, &logs)?;
            info!(attempt, log = %self.store.location(&log_path).display(), "saved failure log");
        }

        warn!(
            max_retries = self.config.max_retries,
            "candidate still failing after all retries"
        );
        Ok(LoopResult::ExhaustedRetries {
            attempts: self.config.max_retries,
            candidate,
        })
    }
}
