use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
mod cli;
mod commands;

fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    setup_logging(cli.verbose)?;
    cli.execute()?;
    Ok(())
}
