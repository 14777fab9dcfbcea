use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use fjord::config::Config;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("FJORD_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Interactive commands log to a daily file so agent output owns the
/// terminal. The guard must live until exit.
fn init_logging(config: &Config, interactive: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    if !interactive {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(config.data_dir().join("logs"), "fjord.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(writer)
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.clone())?;
    let _guard = init_logging(&config, cli.command.is_interactive());

    match cli.command {
        Commands::Project(command) => commands::project::execute(command, config),
        Commands::Run(args) => commands::run::execute(args, config).await,
        Commands::Sessions(args) => commands::sessions::execute(args, config).await,
        Commands::Resume(args) => commands::resume::execute(args, config).await,
        Commands::Kill(args) => commands::kill::execute(args, config).await,
        Commands::Branches(args) => commands::branches::execute(args, config).await,
        Commands::Watch(args) => commands::watch::execute(args, config).await,
        Commands::Commit(args) => commands::commit::execute(args, config).await,
    }
}
