use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands {
    pub mod parse;
}

use commands::parse::{ParseArgs, parse_command};

#[derive(Parser)]
#[command(
    name = "gpxtools",
    version,
    about = "A CLI tool for analyzing GPX activity files"
)]
struct Cli {
    /// Log each point warning and the analysis steps to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Parse a GPX file and print activity statistics")]
    Parse(ParseArgs),
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Parse(args) => parse_command(&args),
    }
}

/// `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "gpxtools=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
