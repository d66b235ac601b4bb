use crate::layout::{AutofixLayout, RAW_SCRIPT, REFACTORED_DIR, TESTCASES_DIR};
use crate::prompts::chat_prompt;
use crate::store::{ArtifactStore, PersistenceError};
use genie_llm::{CompletionRequest, CompletionService, Message, SamplingParams};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const MAX_CONTEXT_CHARS: usize = 10_000;

/// Generated artifacts that can be handed to the chat as context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextSource {
    TestCases(String),
    Refactored(String),
    ExecutionLog,
    RawScript,
}

impl ContextSource {
    pub fn path(&self) -> PathBuf {
        match self {
            ContextSource::TestCases(name) => Path::new(TESTCASES_DIR).join(name),
            ContextSource::Refactored(name) => Path::new(REFACTORED_DIR).join(name),
            ContextSource::ExecutionLog => AutofixLayout::default().initial_log(),
            ContextSource::RawScript => PathBuf::from(RAW_SCRIPT),
        }
    }
}

/// `.py` and `.txt` files in one of the generated-output directories.
pub fn selectable_files<S>(store: &S, dir: &Path) -> Result<Vec<String>, PersistenceError>
where
    S: ArtifactStore + ?Sized,
{
    Ok(store
        .list(dir)?
        .into_iter()
        .filter(|name| name.ends_with(".py") || name.ends_with(".txt"))
        .collect())
}

pub fn truncate_for_context(content: &str) -> String {
    match content.char_indices().nth(MAX_CONTEXT_CHARS) {
        Some((cut, _)) => format!("{}\n... (truncated)", &content[..cut]),
        None => content.to_string(),
    }
}

pub fn render_context<S>(store: &S, files: &[PathBuf]) -> String
where
    S: ArtifactStore + ?Sized,
{
    let mut combined = String::new();
    for file in files {
        match store.read_bytes(file) {
            Ok(bytes) => {
                let content = String::from_utf8_lossy(&bytes);
                combined.push_str(&format!(
                    "\n### {}\n{}\n",
                    file.display(),
                    truncate_for_context(&content)
                ));
            }
            Err(err) => {
                warn!("skipping unreadable context file: {err}");
                combined.push_str(&format!("\nError reading {}: {}\n", file.display(), err.source));
            }
        }
    }
    combined
}

pub struct ChatSession<C: CompletionService> {
    completion: C,
    sampling: SamplingParams,
    files: Vec<PathBuf>,
    history: Vec<Message>,
}

impl<C: CompletionService> ChatSession<C> {
    pub fn new(completion: C, sampling: SamplingParams, sources: &[ContextSource]) -> Self {
        Self {
            completion,
            sampling,
            files: sources.iter().map(ContextSource::path).collect(),
            history: Vec::new(),
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Answers one question. A failed call becomes the reply instead of
    /// ending the session.
    pub fn ask<S>(&mut self, store: &S, question: &str) -> String
    where
        S: ArtifactStore + ?Sized,
    {
        let context = render_context(store, &self.files);
        let mut messages = self.history.clone();
        messages.push(Message::user(chat_prompt(&context, question)));
        debug!(
            turns = messages.len(),
            context_chars = context.len(),
            "sending chat request"
        );

        let reply = match self.completion.complete(&CompletionRequest {
            messages,
            sampling: self.sampling.clone(),
        }) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                warn!("chat completion failed: {err}");
                format!("call failed: {err}")
            }
        };

        self.history.push(Message::user(question));
        self.history.push(Message::assistant(reply.clone()));
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ChatSession, ContextSource, MAX_CONTEXT_CHARS, render_context, selectable_files,
        truncate_for_context,
    };
    use crate::layout::TESTCASES_DIR;
    use crate::store::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
    use genie_llm::{CompletionRequest, CompletionService, Role, SamplingParams, ServiceError};
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    struct Model {
        fail: bool,
        requests: RefCell<Vec<CompletionRequest>>,
    }

    impl CompletionService for Model {
        fn complete(&self, req: &CompletionRequest) -> Result<String, ServiceError> {
            self.requests.borrow_mut().push(req.clone());
            if self.fail {
                return Err(ServiceError::MissingCredentials("API_KEY is required".to_string()));
            }
            Ok("  an answer \n".to_string())
        }
    }

    fn sampling() -> SamplingParams {
        SamplingParams {
            model: "gpt-4o".to_string(),
            temperature: 0.5,
            max_tokens: 16000,
        }
    }

    #[test]
    fn truncates_long_content() {
        let long = "é".repeat(MAX_CONTEXT_CHARS + 5);
        let out = truncate_for_context(&long);
        assert!(out.ends_with("\n... (truncated)"));
        assert_eq!(out.chars().filter(|c| *c == 'é').count(), MAX_CONTEXT_CHARS);

        let exact = "a".repeat(MAX_CONTEXT_CHARS);
        assert_eq!(truncate_for_context(&exact), exact);
    }

    #[test]
    fn context_renders_headers_and_read_errors() {
        let store = MemoryArtifactStore::default();
        store
            .write_text(Path::new("raw_script/generated_code.py"), "page.goto()")
            .expect("write");

        let rendered = render_context(
            &store,
            &[
                ContextSource::RawScript.path(),
                PathBuf::from("missing.txt"),
            ],
        );
        assert!(rendered.starts_with("\n### raw_script/generated_code.py\npage.goto()\n"));
        assert!(rendered.contains("\nError reading missing.txt: no such artifact\n"));
    }

    #[test]
    fn invalid_utf8_context_is_still_included() {
        let dir = tempfile::tempdir().expect("tempdir should work");
        let log = dir.path().join("autofix_code_and_logs");
        std::fs::create_dir_all(&log).expect("mkdir should work");
        std::fs::write(
            log.join("refactored_script_execution.log"),
            b"STDERR:\n\xff\xfe broken locator\n",
        )
        .expect("write should work");
        let store = FsArtifactStore::new(dir.path());

        let rendered = render_context(&store, &[ContextSource::ExecutionLog.path()]);
        assert!(rendered.starts_with("\n### autofix_code_and_logs/refactored_script_execution.log\n"));
        assert!(rendered.contains("broken locator"));
        assert!(!rendered.contains("Error reading"));
    }

    #[test]
    fn only_py_and_txt_are_selectable() {
        let store = MemoryArtifactStore::default();
        for name in ["a.txt", "b.py", "c.json"] {
            store
                .write_text(&Path::new(TESTCASES_DIR).join(name), "")
                .expect("write");
        }
        assert_eq!(
            selectable_files(&store, Path::new(TESTCASES_DIR)).expect("list"),
            vec!["a.txt".to_string(), "b.py".to_string()]
        );
    }

    #[test]
    fn history_is_sent_with_follow_up_questions() {
        let store = MemoryArtifactStore::default();
        let model = Model {
            fail: false,
            requests: RefCell::new(Vec::new()),
        };
        let mut session = ChatSession::new(&model, sampling(), &[]);

        assert_eq!(session.ask(&store, "first?"), "an answer");
        session.ask(&store, "second?");

        let requests = model.requests.borrow();
        assert_eq!(requests[0].messages.len(), 1);
        assert!(requests[0].messages[0].content.starts_with("You are an expert Senior"));
        assert_eq!(requests[1].messages.len(), 3);
        assert_eq!(requests[1].messages[0].content, "first?");
        assert_eq!(requests[1].messages[1].role, Role::Assistant);
        assert_eq!(requests[1].sampling.max_tokens, 16000);
        assert_eq!(session.history().len(), 4);
    }

    #[test]
    fn failed_call_becomes_reply() {
        let store = MemoryArtifactStore::default();
        let model = Model {
            fail: true,
            requests: RefCell::new(Vec::new()),
        };
        let mut session = ChatSession::new(&model, sampling(), &[ContextSource::ExecutionLog]);

        let reply = session.ask(&store, "what failed?");
        assert_eq!(reply, "call failed: API_KEY is required");
        assert_eq!(
            session.files(),
            &[PathBuf::from("autofix_code_and_logs/refactored_script_execution.log")]
        );
        assert!(model.requests.borrow()[0].messages[0]
            .content
            .starts_with("Use the following context"));
    }
}
