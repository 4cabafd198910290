//! cfbuild CLI: compose snipets into tasks and dispatch them.

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "cfbuild",
    version,
    about = "Compose build snipets into tasks and dispatch them to ComputeFarm workers"
)]
struct Cli {
    #[command(subcommand)]
    command: cfbuild::cli::Commands,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = cfbuild::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
