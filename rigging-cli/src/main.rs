//! `rigging` - run lifecycle hooks from the command line.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use rigging_hooks::ExecMode;
use rigging_hooks::HooksConfig;
use rigging_hooks::LOG_FILTER_ENV;
use rigging_hooks::ModePatterns;
use rigging_hooks::Runtime;
use rigging_hooks::discover_external;
use rigging_hooks::loader;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::reload;

#[derive(Parser, Debug)]
#[command(name = "rigging", about = "Run lifecycle hooks and their implementations")]
struct Cli {
    /// Load configuration from this file instead of the usual lookup.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a hook's implementations in their merged order.
    Run {
        /// The hook to run.
        hook: String,

        /// Arguments handed to every implementation.
        args: Vec<String>,

        /// Force the execution mode for this one run.
        #[arg(long, value_parser = parse_mode)]
        mode: Option<ExecMode>,
    },

    /// List a hook's discovered external implementations.
    List {
        /// The hook to inspect.
        hook: String,
    },

    /// Print the effective configuration.
    Config,
}

fn parse_mode(token: &str) -> Result<ExecMode, String> {
    token.parse().map_err(|err| format!("{err}"))
}

fn load_config(cli: &Cli) -> Result<HooksConfig> {
    match &cli.config {
        Some(path) => Ok(loader::load_from_file(path)?),
        None => {
            let cwd = std::env::current_dir()?;
            Ok(loader::load_config(&cwd)?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let (filter_layer, reload_handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Command::Run { hook, args, mode } => {
            let runtime = Runtime::new(config);
            runtime.enable_os_signals();

            // A directive mutating the filter variable retargets the
            // subscriber on the fly.
            runtime.flow().set_log_reload(move |filter| {
                match EnvFilter::try_new(filter) {
                    Ok(next) => {
                        let _ = reload_handle.reload(next);
                    }
                    Err(err) => debug!(%err, "ignoring invalid log filter from directive"),
                }
            });

            runtime.hooks().declare(&[hook.as_str()], "cli")?;
            let outcome = match mode {
                Some(mode) => runtime.run_hook_forced(&hook, mode, &args).await?,
                None => runtime.run_hook(&hook, &args).await?,
            };
            runtime.record_status(outcome.status);

            // End-of-process hooks still run before any requested exit;
            // the earliest termination request decides the code.
            let late_termination = runtime.finish().await;
            let code = outcome
                .termination
                .or(late_termination)
                .map(|t| t.code)
                .unwrap_or(outcome.status);
            std::process::exit(code);
        }
        Command::List { hook } => {
            let patterns = ModePatterns::new(&config.source_patterns, &config.exec_patterns);
            let mut found =
                discover_external(&config.hooks_dir, &hook, &patterns, config.default_mode);
            found.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
            if found.is_empty() {
                println!("no implementations for '{hook}' in {}", config.hooks_dir.display());
            }
            for implementation in found {
                println!(
                    "{}\t{}\t{}",
                    implementation.sort_key,
                    implementation.mode,
                    implementation.path.display()
                );
            }
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
