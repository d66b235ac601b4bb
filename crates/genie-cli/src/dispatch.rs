use super::{Cli, Commands};
use crate::chat_repl::{ChatArgs, chat_command};
use crate::workflow::{
    RepairArgs, WorkflowArgs, generate_command, record_command, repair_command, workflow_command,
};
use anyhow::Result;

pub(crate) fn execute(cli: Cli) -> Result<()> {
    let global = cli.global;
    match cli.command {
        Commands::Record { url } => record_command(&global, url),
        Commands::Generate { kind } => generate_command(&global, kind.as_kind()),
        Commands::Repair {
            script,
            log,
            max_retries,
            interpreter,
        } => repair_command(
            &global,
            RepairArgs {
                script,
                log,
                max_retries,
                interpreter,
            },
        ),
        Commands::Workflow {
            record,
            no_record,
            url,
            auto_fix,
            no_auto_fix,
            max_retries,
            interpreter,
        } => workflow_command(
            &global,
            WorkflowArgs {
                record: flag_choice(record, no_record),
                url,
                auto_fix: flag_choice(auto_fix, no_auto_fix),
                max_retries,
                interpreter,
            },
        ),
        Commands::Chat {
            testcases,
            refactored,
            execution_log,
            raw_script,
        } => chat_command(
            &global,
            ChatArgs {
                testcases,
                refactored,
                execution_log,
                raw_script,
            },
        ),
    }
}

/// `--x` / `--no-x` pairs; neither means ask interactively.
fn flag_choice(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
