//! inspa CLI entry point.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

/// inspa - build single-file self-extracting Windows installers
#[derive(Parser, Debug)]
#[command(name = "inspa")]
#[command(about = "Build single-file self-extracting Windows installers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build an installer from a configuration file
    Build(cli::build::BuildCmd),

    /// Validate a configuration file and report diagnostics
    Validate(cli::validate::ValidateCmd),

    /// Print the parsed header metadata of an installer
    Inspect(cli::inspect::InspectCmd),

    /// Extract an installer's files without running scripts
    Extract(cli::extract::ExtractCmd),

    /// Print the payload SHA-256 of an installer
    Hash(cli::hash::HashCmd),

    /// Write a sample configuration file
    Example(cli::example::ExampleCmd),

    /// Show builder version and supported compression algorithms
    Info(cli::info::InfoCmd),

    /// Launch the builder GUI (ships separately)
    Gui(cli::gui::GuiCmd),
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    tracing::debug!(version = inspa::VERSION, "starting inspa");

    let result = match cli.command {
        Commands::Build(cmd) => cmd.run(),
        Commands::Validate(cmd) => cmd.run(),
        Commands::Inspect(cmd) => cmd.run(),
        Commands::Extract(cmd) => cmd.run(),
        Commands::Hash(cmd) => cmd.run(),
        Commands::Example(cmd) => cmd.run(),
        Commands::Info(cmd) => cmd.run(),
        Commands::Gui(cmd) => cmd.run(),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

/// Initialize the tracing subscriber.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "inspa=debug,inspa_pack=debug,inspa_stub=debug"
    } else {
        "inspa=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
