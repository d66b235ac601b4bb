use crate::GlobalArgs;
use crate::runtime_context::{self, RuntimeContext};
use anyhow::{Context, Result, anyhow, bail};
use chrono::Local;
use genie_config::CliOverrides;
use genie_core::layout::RAW_SCRIPT;
use genie_core::{
    ArtifactKind, ArtifactStore, AutofixLayout, LoopResult, RepairJob, RepairLoop, ScriptExecutor,
    generate_artifact,
};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

pub(crate) struct RepairArgs {
    pub script: PathBuf,
    pub log: Option<PathBuf>,
    pub max_retries: Option<u32>,
    pub interpreter: Option<String>,
}

pub(crate) struct WorkflowArgs {
    pub record: Option<bool>,
    pub url: Option<String>,
    pub auto_fix: Option<bool>,
    pub max_retries: Option<u32>,
    pub interpreter: Option<String>,
}

pub(crate) fn record_command(global: &GlobalArgs, url: Option<String>) -> Result<()> {
    let ctx = runtime_context::resolve_context(
        global,
        CliOverrides {
            target_url: url,
            ..CliOverrides::default()
        },
    )?;
    let raw = record_raw_script(&ctx)?;
    println!("Recorded raw script: {}", raw.display());
    Ok(())
}

pub(crate) fn generate_command(global: &GlobalArgs, kind: ArtifactKind) -> Result<()> {
    let ctx = runtime_context::resolve_context(global, CliOverrides::default())?;
    let output = generate(&ctx, kind)?;
    println!("Generated {}: {}", kind.label(), output.display());
    Ok(())
}

pub(crate) fn repair_command(global: &GlobalArgs, args: RepairArgs) -> Result<()> {
    let ctx = runtime_context::resolve_context(
        global,
        CliOverrides {
            max_retries: args.max_retries,
            interpreter: args.interpreter,
            ..CliOverrides::default()
        },
    )?;
    let script = runtime_context::resolve_cli_path(args.script)?;
    let script_code = fs::read_to_string(&script)
        .with_context(|| format!("failed reading script {}", script.display()))?;

    let initial_logs = match args.log {
        Some(log) => fs::read_to_string(&log)
            .with_context(|| format!("failed reading log {}", log.display()))?,
        None => {
            info!(script = %script.display(), "running script to capture its failure");
            let outcome = ctx
                .executor()
                .run(&script)
                .with_context(|| format!("failed running {}", script.display()))?;
            if outcome.succeeded() {
                println!("{} ran successfully; no repair needed", script.display());
                return Ok(());
            }
            outcome.log_text()
        }
    };

    repair(&ctx, &script, script_code, initial_logs)
}

pub(crate) fn workflow_command(global: &GlobalArgs, args: WorkflowArgs) -> Result<()> {
    let ctx = runtime_context::resolve_context(
        global,
        CliOverrides {
            max_retries: args.max_retries,
            interpreter: args.interpreter,
            target_url: args.url,
            ..CliOverrides::default()
        },
    )?;

    let record = match args.record {
        Some(choice) => choice,
        None => confirm("Record a new raw script with Playwright codegen?")?,
    };
    if record {
        let raw = record_raw_script(&ctx)?;
        println!("Recorded raw script: {}", raw.display());
    } else if !ctx.store.exists(Path::new(RAW_SCRIPT)) {
        bail!(
            "no raw script at {}; record one first",
            ctx.store.location(Path::new(RAW_SCRIPT)).display()
        );
    }

    let testcases = generate(&ctx, ArtifactKind::TestCases)?;
    println!("Generated test cases: {}", testcases.display());

    run_raw_script(&ctx)?;

    let refactored = generate(&ctx, ArtifactKind::Refactor)?;
    println!("Generated refactored script: {}", refactored.display());

    let outcome = ctx
        .executor()
        .run(&refactored)
        .with_context(|| format!("failed running {}", refactored.display()))?;
    let logs = outcome.log_text();
    let log_path = AutofixLayout::for_script(&refactored).initial_log();
    ctx.store.write_text(&log_path, &logs)?;
    println!(
        "Execution log saved: {}",
        ctx.store.location(&log_path).display()
    );
    if outcome.succeeded() {
        println!("Refactored script ran successfully");
        return Ok(());
    }

    warn!(exit_code = ?outcome.exit_code, "refactored script failed");
    let auto_fix = match args.auto_fix {
        Some(choice) => choice,
        None => confirm("Refactored script failed. Try to repair it automatically?")?,
    };
    if !auto_fix {
        return Ok(());
    }

    let script_code = ctx.store.read_text(&refactored)?;
    repair(&ctx, &refactored, script_code, logs)
}

fn record_raw_script(ctx: &RuntimeContext) -> Result<PathBuf> {
    let url = ctx
        .settings
        .target_url
        .as_deref()
        .ok_or_else(|| anyhow!("no target url; pass --url or set TARGET_URL"))?;
    let output = ctx.store.location(Path::new(RAW_SCRIPT));
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }

    info!(url, program = %ctx.settings.codegen_program, "starting recorder");
    let status = Command::new(&ctx.settings.codegen_program)
        .arg("codegen")
        .arg("--target=python")
        .arg(format!("--output={}", output.display()))
        .arg(url)
        .status()
        .with_context(|| format!("failed starting {}", ctx.settings.codegen_program))?;
    if !status.success() {
        bail!("recorder exited with {status}");
    }
    Ok(output)
}

/// Runs the recording with the terminal attached so its output is visible.
fn run_raw_script(ctx: &RuntimeContext) -> Result<()> {
    let raw = ctx.store.location(Path::new(RAW_SCRIPT));
    info!(script = %raw.display(), "running raw script");
    let status = Command::new(&ctx.settings.interpreter)
        .arg(&raw)
        .env(&ctx.settings.headless_env, "1")
        .status()
        .with_context(|| format!("failed starting {}", ctx.settings.interpreter))?;
    if !status.success() {
        warn!(%status, "raw script failed; continuing with refactor");
    }
    Ok(())
}

fn generate(ctx: &RuntimeContext, kind: ArtifactKind) -> Result<PathBuf> {
    generate_artifact(
        &ctx.completion(),
        &ctx.store,
        &ctx.generator_config(),
        kind,
        Local::now(),
    )
}

fn repair(
    ctx: &RuntimeContext,
    script: &Path,
    script_code: String,
    initial_logs: String,
) -> Result<()> {
    // Locators and helpers come from the recording when one exists.
    let reference = match ctx.store.read_text(Path::new(RAW_SCRIPT)) {
        Ok(raw) => raw,
        Err(_) => script_code.clone(),
    };
    let repair = RepairLoop::new(
        ctx.completion(),
        ctx.executor(),
        ctx.store.clone(),
        ctx.repair_config(reference),
    );
    let result = repair.run(&RepairJob {
        script_path: script.to_path_buf(),
        initial_script_code: script_code,
        initial_logs,
    });
    report_loop_result(result)
}

fn report_loop_result(result: LoopResult) -> Result<()> {
    match result {
        LoopResult::Success {
            attempts,
            candidate,
        } => {
            println!(
                "Repaired after {attempts} attempt(s): {}",
                candidate.display()
            );
            Ok(())
        }
        LoopResult::ExhaustedRetries {
            attempts,
            candidate,
        } => Err(anyhow!(
            "script still failing after {attempts} attempt(s); last candidate at {}",
            candidate.display()
        )),
        LoopResult::FatalError(err) => Err(err).context("repair aborted"),
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush().context("failed flushing prompt")?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed reading answer")?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::{is_yes, report_loop_result};
    use genie_core::{LoopResult, PersistenceError, RepairError};
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("sure"));
    }

    #[test]
    fn exhausted_retries_is_an_error() {
        let err = report_loop_result(LoopResult::ExhaustedRetries {
            attempts: 3,
            candidate: PathBuf::from("autofix_code_and_logs/ai_fixed_script_attempt.py"),
        })
        .expect_err("must fail");
        assert!(err.to_string().contains("after 3 attempt(s)"));
    }

    #[test]
    fn fatal_error_keeps_cause() {
        let err = report_loop_result(LoopResult::FatalError(RepairError::Persistence(
            PersistenceError {
                action: "writing",
                path: PathBuf::from("x.log"),
                source: io::Error::other("disk full"),
            },
        )))
        .expect_err("must fail");
        assert_eq!(err.to_string(), "repair aborted");
        assert!(format!("{err:#}").contains("disk full"));
    }

    #[test]
    fn success_is_ok() {
        assert!(
            report_loop_result(LoopResult::Success {
                attempts: 1,
                candidate: PathBuf::from("a.py"),
            })
            .is_ok()
        );
    }
}
