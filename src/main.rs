use anyhow::Result;
use clap::Parser;
use tokio::runtime::Builder;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use nudge_bot::cli::Cli;
use nudge_bot::commands::Session;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    // One thread of control: resolution prompts and writes happen in order
    let runtime = Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(async_main(cli))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn async_main(cli: Cli) -> Result<()> {
    debug!("Running {:?}", cli.command);
    let mut session = Session::from_args(&cli.global)?;
    let mut stdout = std::io::stdout().lock();
    session.execute(cli.command, &mut stdout).await
}
