mod cli;

use anyhow::Result;
use clap::Parser;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::commands::run_cli;
use cli::opts::Cli;

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "spacer=info",
        1 => "spacer=debug",
        _ => "spacer=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);
    let rt = Runtime::new()?;
    rt.block_on(run_cli(args))
}
