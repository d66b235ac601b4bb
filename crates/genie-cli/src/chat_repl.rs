use crate::GlobalArgs;
use crate::runtime_context;
use anyhow::{Context, Result, bail};
use genie_config::CliOverrides;
use genie_core::layout::{RAW_SCRIPT, REFACTORED_DIR, TESTCASES_DIR};
use genie_core::{ArtifactStore, AutofixLayout, ChatSession, ContextSource, selectable_files};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

pub(crate) struct ChatArgs {
    pub testcases: Option<String>,
    pub refactored: Option<String>,
    pub execution_log: bool,
    pub raw_script: bool,
}

impl ChatArgs {
    fn is_empty(&self) -> bool {
        self.testcases.is_none()
            && self.refactored.is_none()
            && !self.execution_log
            && !self.raw_script
    }
}

pub(crate) fn chat_command(global: &GlobalArgs, args: ChatArgs) -> Result<()> {
    let ctx = runtime_context::resolve_context(global, CliOverrides::default())?;
    let sources = context_sources(&ctx.store, args)?;
    let mut session = ChatSession::new(ctx.completion(), ctx.chat_sampling(), &sources);
    let mut line = String::new();

    println!("genie chat. Type .help for commands, .exit to quit.");
    print_files(session.files());
    loop {
        line.clear();
        print!("genie> ");
        io::stdout().flush().context("failed flushing stdout")?;

        let bytes = io::stdin()
            .read_line(&mut line)
            .context("failed reading chat input")?;
        if bytes == 0 {
            break;
        }

        let trimmed = line.trim();
        match trimmed {
            "" => continue,
            ".exit" => break,
            ".help" => {
                println!("Chat commands:");
                println!("  .help    - show this help");
                println!("  .files   - list generated artifacts that can be selected");
                println!("  .context - list files given as context");
                println!("  .exit    - quit");
            }
            ".files" => print_selectable(&ctx.store)?,
            ".context" => print_files(session.files()),
            question => {
                let reply = session.ask(&ctx.store, question);
                println!("{reply}");
            }
        }
    }
    Ok(())
}

/// Explicit selections win; with none, the newest of each artifact that
/// exists is used.
fn context_sources<S>(store: &S, args: ChatArgs) -> Result<Vec<ContextSource>>
where
    S: ArtifactStore + ?Sized,
{
    if args.is_empty() {
        let mut sources = Vec::new();
        if let Some(name) = selectable_files(store, Path::new(TESTCASES_DIR))?.pop() {
            sources.push(ContextSource::TestCases(name));
        }
        if let Some(name) = selectable_files(store, Path::new(REFACTORED_DIR))?.pop() {
            sources.push(ContextSource::Refactored(name));
        }
        if store.exists(&AutofixLayout::default().initial_log()) {
            sources.push(ContextSource::ExecutionLog);
        }
        if store.exists(Path::new(RAW_SCRIPT)) {
            sources.push(ContextSource::RawScript);
        }
        return Ok(sources);
    }

    let mut sources = Vec::new();
    if let Some(name) = args.testcases {
        ensure_listed(store, TESTCASES_DIR, &name)?;
        sources.push(ContextSource::TestCases(name));
    }
    if let Some(name) = args.refactored {
        ensure_listed(store, REFACTORED_DIR, &name)?;
        sources.push(ContextSource::Refactored(name));
    }
    for (wanted, source) in [
        (args.execution_log, ContextSource::ExecutionLog),
        (args.raw_script, ContextSource::RawScript),
    ] {
        if !wanted {
            continue;
        }
        if store.exists(&source.path()) {
            sources.push(source);
        } else {
            warn!(path = %source.path().display(), "requested context file does not exist, skipping");
        }
    }
    Ok(sources)
}

fn ensure_listed<S>(store: &S, dir: &str, name: &str) -> Result<()>
where
    S: ArtifactStore + ?Sized,
{
    let available = selectable_files(store, Path::new(dir))?;
    if !available.iter().any(|f| f == name) {
        if available.is_empty() {
            bail!("{name} not found: {dir} has no .py or .txt files");
        }
        bail!("{name} not found in {dir}; available: {}", available.join(", "));
    }
    Ok(())
}

fn print_selectable<S>(store: &S) -> Result<()>
where
    S: ArtifactStore + ?Sized,
{
    for dir in [TESTCASES_DIR, REFACTORED_DIR] {
        let files = selectable_files(store, Path::new(dir))?;
        if files.is_empty() {
            println!("{dir}: (none)");
            continue;
        }
        println!("{dir}:");
        for file in files {
            println!("  {file}");
        }
    }
    Ok(())
}

fn print_files(files: &[PathBuf]) {
    if files.is_empty() {
        println!("No context files selected.");
        return;
    }
    println!("Context files:");
    for file in files {
        println!("  {}", file.display());
    }
}
