#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap::error::ErrorKind;
use flowcheck_core::report::ExitStatus;
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "flowcheck: workflow state validator and crash-safe issue-set store",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format: pretty, text, or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags and environment.
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Validate",
        about = "Validate a plan, an issue set, or both",
        long_about = "Run schema, reference, cycle, coherence, and freshness checks and exit with the policy code.",
        after_help = "EXAMPLES:\n    # Check the latest plan and issue set\n    flowcheck check --project-root .\n\n    # Check one issue set against an earlier snapshot\n    flowcheck check --mode issues --issues docs/issues/auth.jsonl --baseline /tmp/auth.jsonl\n\n    # Fail on warnings too\n    flowcheck check --fail-on warning"
    )]
    Check(cmd::check::CheckArgs),

    #[command(
        next_help_heading = "Validate",
        about = "Print the canonical execution order",
        long_about = "Print dependency-first execution order for an issue set or plan, or the cycle that prevents one.",
        after_help = "EXAMPLES:\n    # Order an issue set\n    flowcheck order --issues docs/issues/auth.jsonl\n\n    # Order plan tasks\n    flowcheck order --plan docs/plans/auth.md --format json"
    )]
    Order(cmd::order::OrderArgs),

    #[command(
        next_help_heading = "Store",
        about = "Update fields of one issue record",
        long_about = "Apply field updates to one record through the crash-safe store. Recovery runs first.",
        after_help = "EXAMPLES:\n    # Finish development of an issue\n    flowcheck update --issues docs/issues/auth.jsonl --id AUTH-1 --set dev_state=done\n\n    # Reopen a finished issue\n    flowcheck update --issues docs/issues/auth.jsonl --id AUTH-1 --set review_regression_state=pending --set git_state=uncommitted"
    )]
    Update(cmd::update::UpdateArgs),

    #[command(
        next_help_heading = "Store",
        about = "Recover an issue set after an interrupted update",
        long_about = "Bring an issue set back to its pre- or post-update state using its temp and backup siblings."
    )]
    Recover(cmd::recover::RecoverArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    flowcheck completions bash\n\n    # Generate zsh completions\n    flowcheck completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("FLOWCHECK_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "flowcheck=debug,flowcheck_core=debug,info"
        } else {
            "flowcheck=info,flowcheck_core=info,warn"
        })
    });

    let format = env::var("FLOWCHECK_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, output: OutputMode) -> anyhow::Result<ExitStatus> {
    match &cli.command {
        Commands::Check(args) => cmd::check::run_check(args, output),
        Commands::Order(args) => cmd::order::run_order(args, output),
        Commands::Update(args) => cmd::update::run_update(args, output),
        Commands::Recover(args) => cmd::recover::run_recover(args, output),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)?;
            Ok(ExitStatus::Pass)
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let informational = matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
            let _ = err.print();
            return if informational {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(ExitStatus::RuntimeFailure.code())
            };
        }
    };

    init_tracing(cli.verbose);
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let output = cli.output_mode();
    match run(&cli, output) {
        Ok(status) => ExitCode::from(status.code()),
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            if render_error(output, &CliError::from_anyhow(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::from(ExitStatus::RuntimeFailure.code())
        }
    }
}
