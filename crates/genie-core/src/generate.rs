use crate::layout::{self, RAW_SCRIPT};
use crate::prompts::{
    DEFAULT_REFACTOR_INSTRUCTIONS, DEFAULT_TESTCASE_INSTRUCTIONS, refactor_prompt,
    testcases_prompt,
};
use crate::store::ArtifactStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use genie_llm::{CompletionRequest, CompletionService, SamplingParams, normalize_script_output};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    TestCases,
    Refactor,
}

impl ArtifactKind {
    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::TestCases => "functional test cases",
            ArtifactKind::Refactor => "refactored script",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub sampling: SamplingParams,
    pub testcase_instructions: String,
    pub refactor_instructions: String,
}

impl GeneratorConfig {
    /// Falls back to the built-in instructions where none were configured.
    pub fn new(
        sampling: SamplingParams,
        testcase_instructions: Option<String>,
        refactor_instructions: Option<String>,
    ) -> Self {
        Self {
            sampling,
            testcase_instructions: testcase_instructions
                .unwrap_or_else(|| DEFAULT_TESTCASE_INSTRUCTIONS.to_string()),
            refactor_instructions: refactor_instructions
                .unwrap_or_else(|| DEFAULT_REFACTOR_INSTRUCTIONS.to_string()),
        }
    }
}

/// Sends the recorded script to the model and writes the reply to a new
/// timestamped file. Returns the location of that file.
pub fn generate_artifact<C, S>(
    completion: &C,
    store: &S,
    config: &GeneratorConfig,
    kind: ArtifactKind,
    now: DateTime<Local>,
) -> Result<PathBuf>
where
    C: CompletionService + ?Sized,
    S: ArtifactStore + ?Sized,
{
    let raw_script = store
        .read_text(Path::new(RAW_SCRIPT))
        .context("failed reading raw script; record one first")?;

    let (prompt, output) = match kind {
        ArtifactKind::TestCases => (
            testcases_prompt(&config.testcase_instructions, &raw_script),
            layout::testcases_output(now),
        ),
        ArtifactKind::Refactor => (
            refactor_prompt(&config.refactor_instructions, &raw_script),
            layout::refactored_output(now),
        ),
    };

    info!(kind = kind.label(), model = %config.sampling.model, "generating artifact");
    let reply = completion
        .complete(&CompletionRequest::single(prompt, &config.sampling))
        .with_context(|| format!("failed generating {}", kind.label()))?;
    let contents = match kind {
        ArtifactKind::TestCases => reply,
        ArtifactKind::Refactor => normalize_script_output(&reply)
            .with_context(|| format!("failed generating {}", kind.label()))?,
    };

    store.write_text(&output, &contents)?;
    let location = store.location(&output);
    info!(path = %location.display(), "generated output saved");
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::{ArtifactKind, GeneratorConfig, generate_artifact};
    use crate::layout::RAW_SCRIPT;
    use crate::store::{ArtifactStore, MemoryArtifactStore};
    use chrono::{Local, TimeZone};
    use genie_llm::{CompletionRequest, CompletionService, SamplingParams, ServiceError};
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    struct ScriptedModel {
        reply: Result<String, String>,
        prompts: RefCell<Vec<String>>,
    }

    impl CompletionService for ScriptedModel {
        fn complete(&self, req: &CompletionRequest) -> Result<String, ServiceError> {
            self.prompts.borrow_mut().push(req.messages[0].content.clone());
            self.reply.clone().map_err(ServiceError::Transport)
        }
    }

    fn config() -> GeneratorConfig {
        GeneratorConfig::new(
            SamplingParams {
                model: "gpt-4o".to_string(),
                temperature: 0.5,
                max_tokens: 1500,
            },
            Some("List the tests.".to_string()),
            None,
        )
    }

    fn now() -> chrono::DateTime<Local> {
        Local
            .with_ymd_and_hms(2025, 1, 2, 3, 4, 5)
            .single()
            .expect("valid local time")
    }

    #[test]
    fn testcases_are_written_verbatim() {
        let store = MemoryArtifactStore::default();
        store
            .write_text(Path::new(RAW_SCRIPT), "page.goto('x')")
            .expect("write should work");
        let model = ScriptedModel {
            reply: Ok("TC-1 Login works\n".to_string()),
            prompts: RefCell::new(Vec::new()),
        };

        let path = generate_artifact(&model, &store, &config(), ArtifactKind::TestCases, now())
            .expect("generate should work");

        assert_eq!(
            path,
            PathBuf::from(
                "ai_generated_tests/codeGenie_generated_testcases/ai_generated_ui_testcases_20250102_030405.txt"
            )
        );
        assert_eq!(store.read_text(&path).expect("read"), "TC-1 Login works\n");
        assert_eq!(
            model.prompts.borrow()[0],
            "List the tests.\nScript:\npage.goto('x')\n"
        );
    }

    #[test]
    fn refactor_uses_default_instructions_and_unwraps_fence() {
        let store = MemoryArtifactStore::default();
        store
            .write_text(Path::new(RAW_SCRIPT), "page.click('#go')")
            .expect("write should work");
        let model = ScriptedModel {
            reply: Ok("```python\ndef run():\n    pass\n```".to_string()),
            prompts: RefCell::new(Vec::new()),
        };

        let path = generate_artifact(&model, &store, &config(), ArtifactKind::Refactor, now())
            .expect("generate should work");

        assert!(path.ends_with("ai_refactored_script_20250102_030405.py"));
        assert_eq!(store.read_text(&path).expect("read"), "def run():\n    pass\n");
        assert!(model.prompts.borrow()[0].starts_with("You are a senior SDET"));
    }

    #[test]
    fn missing_raw_script_is_reported() {
        let model = ScriptedModel {
            reply: Ok(String::new()),
            prompts: RefCell::new(Vec::new()),
        };
        let err = generate_artifact(
            &model,
            &MemoryArtifactStore::default(),
            &config(),
            ArtifactKind::TestCases,
            now(),
        )
        .expect_err("must fail");
        assert!(format!("{err:#}").contains("failed reading raw script"));
        assert!(model.prompts.borrow().is_empty());
    }

    #[test]
    fn service_failure_writes_nothing() {
        let store = MemoryArtifactStore::default();
        store
            .write_text(Path::new(RAW_SCRIPT), "page.goto('x')")
            .expect("write should work");
        let model = ScriptedModel {
            reply: Err("connection refused".to_string()),
            prompts: RefCell::new(Vec::new()),
        };

        let err = generate_artifact(&model, &store, &config(), ArtifactKind::Refactor, now())
            .expect_err("must fail");
        assert!(format!("{err:#}").contains("connection refused"));
        assert_eq!(store.snapshot().len(), 1);
    }
}
