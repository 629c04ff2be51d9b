//! `relay` command-line entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use relay::engine::{CancelToken, EngineError};
use relay::executors::ExecutorSet;
use relay::exit_codes;
use relay::init::{InitOptions, init_project};
use relay::io::config::load_config;
use relay::io::credentials::EnvCredentialProvider;
use relay::io::display::TerminalDisplay;
use relay::io::source::InputSource;
use relay::logging;
use relay::session::{SessionRequest, run_session, runs_dir};
use relay::stats::{collect_runs, render_stats};

#[derive(Parser)]
#[command(
    name = "relay",
    version,
    about = "Run LLM planning and coding pipelines against a ticket"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a pipeline against a Markdown spec file.
    Do {
        /// Path to the spec file.
        spec: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Run a pipeline against a free-form request.
    Ask {
        /// The request text.
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Summarize recorded runs and their cost.
    Stats,
    /// Write default `.relay/config.toml` and `.relay/.gitignore`.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct RunArgs {
    /// Pipeline to run instead of the configured default.
    #[arg(short, long)]
    pipeline: Option<String>,
    /// Plain line-per-event output, no live timer.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("relay: {err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let root = std::env::current_dir().context("resolve current directory")?;
    match cli.command {
        Command::Do { spec, run } => cmd_run(&root, InputSource::SpecFile(spec), run),
        Command::Ask { message, run } => {
            cmd_run(&root, InputSource::Prompt(message.join(" ")), run)
        }
        Command::Stats => cmd_stats(&root),
        Command::Init { force } => cmd_init(&root, force),
    }
}

/// Step failures and cancellation get their own codes; everything else is a
/// setup error.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::StepFailed { .. }) => exit_codes::STEP_FAILED,
        Some(EngineError::Cancelled { .. }) => exit_codes::CANCELLED,
        None => exit_codes::INVALID,
    }
}

fn cmd_run(root: &Path, source: InputSource, args: RunArgs) -> Result<()> {
    let cfg = load_config(root);
    logging::init(
        cfg.as_ref()
            .map(|cfg| cfg.log_level.as_str())
            .unwrap_or("warn"),
    );
    let cfg = cfg?;

    let credentials = Arc::new(EnvCredentialProvider::new(&cfg.provider.api_key_env));
    let executors = ExecutorSet::from_config(&cfg, credentials)?;
    let display = TerminalDisplay::new(args.verbose);
    let request = SessionRequest {
        root: root.to_path_buf(),
        source,
        pipeline: args.pipeline,
    };
    let outcome = run_session(&request, &cfg, &executors, &display, &CancelToken::new())?;
    println!("Run: {}", outcome.run_dir.display());
    Ok(())
}

fn cmd_stats(root: &Path) -> Result<()> {
    logging::init("warn");
    let runs = collect_runs(&runs_dir(root))?;
    print!("{}", render_stats(&runs));
    Ok(())
}

fn cmd_init(root: &Path, force: bool) -> Result<()> {
    logging::init("warn");
    let paths = init_project(root, InitOptions { force })?;
    println!("Wrote {}", paths.config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn parse_do_with_pipeline() {
        let cli = Cli::parse_from(["relay", "do", "TICKET.md", "-p", "implement", "-v"]);
        match cli.command {
            Command::Do { spec, run } => {
                assert_eq!(spec, PathBuf::from("TICKET.md"));
                assert_eq!(run.pipeline.as_deref(), Some("implement"));
                assert!(run.verbose);
            }
            _ => panic!("expected do"),
        }
    }

    #[test]
    fn parse_ask_collects_words() {
        let cli = Cli::parse_from(["relay", "ask", "fix", "the", "login", "bug"]);
        match cli.command {
            Command::Ask { message, run } => {
                assert_eq!(message.join(" "), "fix the login bug");
                assert!(run.pipeline.is_none());
                assert!(!run.verbose);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn ask_requires_a_message() {
        assert!(Cli::try_parse_from(["relay", "ask"]).is_err());
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["relay", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        let cli = Cli::parse_from(["relay", "stats"]);
        assert!(matches!(cli.command, Command::Stats));
    }

    #[test]
    fn exit_codes_follow_engine_errors() {
        let failed: anyhow::Error = EngineError::StepFailed {
            step: "Plan".to_string(),
            source: anyhow!("boom"),
        }
        .into();
        assert_eq!(exit_code_for(&failed), exit_codes::STEP_FAILED);

        let cancelled: anyhow::Error = EngineError::Cancelled {
            next_step: "Review".to_string(),
        }
        .into();
        assert_eq!(exit_code_for(&cancelled), exit_codes::CANCELLED);

        assert_eq!(exit_code_for(&anyhow!("bad config")), exit_codes::INVALID);
    }
}
