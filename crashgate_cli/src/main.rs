mod verify;

use crashgate_core::input::trigger_input;
use crashgate_core::{FaultKind, Harness, HarnessConfig};

use clap::{Args, Parser, Subcommand};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "crashgate.toml";

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the harness and run one input from a file or stdin.
    Run(RunArgs),
    /// Print the selector to fault kind table.
    Kinds {
        #[clap(long)]
        json: bool,
    },
    /// Write the shortest input that opens the gate with SELECTOR.
    Input {
        selector: u8,
        #[clap(short, long, value_parser)]
        config_file: Option<PathBuf>,
        #[clap(short, long, value_parser)]
        output: Option<PathBuf>,
    },
    /// Run every fault kind and control input in a child process and check how each ends.
    Verify(verify::VerifyArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Input file; stdin when omitted.
    #[clap(short, long, value_parser)]
    input: Option<PathBuf>,
    /// Arguments handed to Initialize, e.g. `-- --only_asan_failures`.
    #[clap(last = true)]
    harness_args: Vec<String>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("CRASHGATE_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Explicit path first, then `CRASHGATE_CONFIG`, then `./crashgate.toml`, then
/// the built-in defaults.
pub(crate) fn load_config(path: Option<&Path>) -> Result<HarnessConfig, anyhow::Error> {
    if let Some(config_path) = path {
        tracing::info!("Loading configuration from specified path: {config_path:?}");
        return HarnessConfig::load_from_file(config_path);
    }
    if std::env::var_os(crashgate_core::config::CONFIG_ENV_VAR).is_some() {
        return HarnessConfig::from_env();
    }
    let default_config_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_config_path.exists() {
        tracing::info!("Loading default configuration: {default_config_path:?}");
        HarnessConfig::load_from_file(default_config_path)
    } else {
        tracing::debug!("No configuration found, using built-in defaults");
        Ok(HarnessConfig::default())
    }
}

fn run(args: RunArgs) -> Result<(), anyhow::Error> {
    let config = load_config(args.config_file.as_deref())?;
    let init_args: Vec<String> = std::iter::once("crashgate".to_string())
        .chain(args.harness_args)
        .collect();

    let harness = Harness::initialize(&init_args, &config, &crashgate_module::linked_entries())
        .map_err(|e| {
            tracing::error!("harness initialization failed: {e}");
            anyhow::anyhow!("harness initialization failed: {e}")
        })?;

    let data = match &args.input {
        Some(path) => std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read input file {:?}: {}", path, e))?,
        None => {
            let mut buffer = Vec::new();
            std::io::stdin().read_to_end(&mut buffer)?;
            buffer
        }
    };

    let status = harness.test_one_input(&data);
    if status != 0 {
        std::process::exit(exit_code(status));
    }
    Ok(())
}

/// Process exit code for a non-zero entry point status.
///
/// Only the low byte survives on Unix, so statuses like 256 would read as
/// success; those become 1.
fn exit_code(status: i32) -> i32 {
    if status & 0xff == 0 { 1 } else { status }
}

fn print_kinds(json: bool) -> Result<(), anyhow::Error> {
    if json {
        let table: Vec<_> = FaultKind::ALL
            .iter()
            .map(|kind| {
                serde_json::json!({
                    "selector": kind.selector(),
                    "kind": kind,
                    "label": kind.label(),
                    "crashes_uninstrumented": kind.crashes_uninstrumented(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }
    println!("{:<9} {:<24} {}", "selector", "fault", "uninstrumented");
    for kind in FaultKind::ALL {
        let observable = if kind.crashes_uninstrumented() {
            "crashes"
        } else {
            "needs sanitizer"
        };
        println!("{:<9} {:<24} {}", kind.selector(), kind.label(), observable);
    }
    Ok(())
}

fn write_input(
    selector: u8,
    config_file: Option<&Path>,
    output: Option<&Path>,
) -> Result<(), anyhow::Error> {
    let config = load_config(config_file)?;
    config.validate()?;
    let input = trigger_input(&config.input_gate(), selector);
    match output {
        Some(path) => std::fs::write(path, &input)
            .map_err(|e| anyhow::anyhow!("Failed to write input to {:?}: {}", path, e))?,
        None => {
            let mut stdout = std::io::stdout();
            stdout.write_all(&input)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Kinds { json } => print_kinds(json),
        Commands::Input {
            selector,
            config_file,
            output,
        } => write_input(selector, config_file.as_deref(), output.as_deref()),
        Commands::Verify(args) => verify::verify(args),
    }
}
