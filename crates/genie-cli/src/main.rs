mod chat_repl;
mod dispatch;
mod runtime_context;
mod workflow;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use genie_config::ProviderSetting;
use genie_core::ArtifactKind;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Azure,
    Openai,
}

impl ProviderArg {
    fn as_setting(self) -> ProviderSetting {
        match self {
            ProviderArg::Azure => ProviderSetting::Azure,
            ProviderArg::Openai => ProviderSetting::Openai,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Testcases,
    Refactor,
}

impl KindArg {
    fn as_kind(self) -> ArtifactKind {
        match self {
            KindArg::Testcases => ArtifactKind::TestCases,
            KindArg::Refactor => ArtifactKind::Refactor,
        }
    }
}

#[derive(Debug, Clone, Default, clap::Args)]
struct GlobalArgs {
    /// Config file (defaults to GENIE_CONFIG, then ./genie.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding raw_script/, ai_generated_tests/ and autofix_code_and_logs/.
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,
    #[arg(long, global = true, value_enum)]
    provider: Option<ProviderArg>,
    #[arg(long, global = true)]
    model: Option<String>,
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "genie",
    version,
    about = "Record, refactor and self-repair Playwright UI scripts with a hosted model"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Record a raw script with Playwright codegen.
    Record {
        #[arg(long)]
        url: Option<String>,
    },
    /// Generate functional test cases or a refactored script from the raw script.
    Generate {
        #[arg(value_enum)]
        kind: KindArg,
    },
    /// Repair a failing script by asking the model for fixes and re-running it.
    Repair {
        script: PathBuf,
        /// Failure log of the script's last run; the script is run once when omitted.
        #[arg(long)]
        log: Option<PathBuf>,
        #[arg(long)]
        max_retries: Option<u32>,
        #[arg(long)]
        interpreter: Option<String>,
    },
    /// Record, generate, run and repair in one go.
    Workflow {
        #[arg(long, conflicts_with = "no_record")]
        record: bool,
        #[arg(long)]
        no_record: bool,
        #[arg(long)]
        url: Option<String>,
        #[arg(long, conflicts_with = "no_auto_fix")]
        auto_fix: bool,
        #[arg(long)]
        no_auto_fix: bool,
        #[arg(long)]
        max_retries: Option<u32>,
        #[arg(long)]
        interpreter: Option<String>,
    },
    /// Ask questions about the generated artifacts.
    Chat {
        /// File name under ai_generated_tests/codeGenie_generated_testcases.
        #[arg(long)]
        testcases: Option<String>,
        /// File name under ai_generated_tests/codeGenie_generated_code.
        #[arg(long)]
        refactored: Option<String>,
        #[arg(long)]
        execution_log: bool,
        #[arg(long)]
        raw_script: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "genie=debug,genie_core=debug,genie_llm_openai=debug,info"
    } else {
        "genie=info,genie_core=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    dispatch::execute(cli)
}
