//! privacy-hook: redirect privacy-sensitive calls in compiled classes
//!
//! ## Commands
//!
//! - **transform**: collect wrapper rules and rewrite a class tree
//! - **collect**: list the rules a class tree (plus rule tables) produces
//! - **inspect**: list every call site in one class file
//!
//! ## Example Usage
//!
//! ```bash
//! # Rewrite app classes against wrappers found in the same tree
//! privacy-hook transform --input build/classes --output build/hooked --reports build/reports
//!
//! # Add the bundled Android accessor table
//! privacy-hook transform --input build/classes --output build/hooked --builtin-rules
//!
//! # See which rules would apply
//! privacy-hook collect --input build/classes --json
//! ```

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

mod hook_cli;

use hook_cli::{collect::CollectCmd, inspect::InspectCmd, transform::TransformCmd};

#[derive(Parser)]
#[command(
    name = "privacy-hook",
    author,
    version,
    about = "Redirect privacy-sensitive platform calls to consent-gated wrappers",
    long_about = "Scans compiled classes for wrapper methods carrying the redirection marker,\n\
                  then rewrites matching call sites across the whole tree to call the wrappers."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (repeat for more log detail: -v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect rules and rewrite a class tree
    Transform(TransformCmd),

    /// List the redirection rules a class tree produces
    Collect(CollectCmd),

    /// List the call sites in a class file
    Inspect(InspectCmd),
}

fn init_tracing(verbose: u8, json_logs: bool) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Logs go to stderr so `--json` output stays parseable.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn main() -> Result<()> {
    let Cli {
        command,
        json,
        verbose,
        json_logs,
    } = Cli::parse();
    init_tracing(verbose, json_logs);

    let verbose = verbose > 0;
    match command {
        Commands::Transform(cmd) => cmd.execute(json, verbose),
        Commands::Collect(cmd) => cmd.execute(json, verbose),
        Commands::Inspect(cmd) => cmd.execute(json),
    }
}
