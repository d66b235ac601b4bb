//! Fixed relative paths shared by the generator, the repair loop and chat.
//!
//! Every path here is relative to the working directory the tool was started
//! in; an [`ArtifactStore`](crate::ArtifactStore) decides where that lives.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

pub const AUTOFIX_DIR: &str = "autofix_code_and_logs";
pub const INITIAL_LOG_FILE: &str = "refactored_script_execution.log";
pub const CANDIDATE_STEM: &str = "ai_fixed_script_attempt";
pub const RAW_SCRIPT: &str = "raw_script/generated_code.py";
pub const TESTCASES_DIR: &str = "ai_generated_tests/codeGenie_generated_testcases";
pub const REFACTORED_DIR: &str = "ai_generated_tests/codeGenie_generated_code";

const DEFAULT_SCRIPT_EXT: &str = "py";

/// Where the repair loop keeps its candidate script and failure logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutofixLayout {
    dir: PathBuf,
    script_ext: String,
}

impl AutofixLayout {
    /// Layout for repairing `script_path`; the candidate file keeps the
    /// script's extension.
    pub fn for_script(script_path: &Path) -> Self {
        let script_ext = script_path
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .unwrap_or(DEFAULT_SCRIPT_EXT)
            .to_string();
        Self {
            dir: PathBuf::from(AUTOFIX_DIR),
            script_ext,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Last failure log before retries begin. Overwritten every run.
    pub fn initial_log(&self) -> PathBuf {
        self.dir.join(INITIAL_LOG_FILE)
    }

    /// Current candidate script. Overwritten every attempt.
    pub fn candidate_script(&self) -> PathBuf {
        self.dir.join(format!("{CANDIDATE_STEM}.{}", self.script_ext))
    }

    /// Failure log of one attempt. One file per attempt number.
    pub fn attempt_log(&self, attempt: u32) -> PathBuf {
        self.dir.join(format!("retry_failure_attempt_{attempt}.log"))
    }
}

impl Default for AutofixLayout {
    fn default() -> Self {
        Self::for_script(Path::new(RAW_SCRIPT))
    }
}

/// Timestamped outputs of the artifact generator.
pub fn testcases_output(now: DateTime<Local>) -> PathBuf {
    Path::new(TESTCASES_DIR).join(format!(
        "ai_generated_ui_testcases_{}.txt",
        now.format("%Y%m%d_%H%M%S")
    ))
}

pub fn refactored_output(now: DateTime<Local>) -> PathBuf {
    Path::new(REFACTORED_DIR).join(format!(
        "ai_refactored_script_{}.py",
        now.format("%Y%m%d_%H%M%S")
    ))
}
