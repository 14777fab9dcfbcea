use anyhow::Result;
use clap::Args as ClapArgs;

use super::common::{print_sessions, AppContext};
use fjord::config::Config;
use fjord::events;

#[derive(ClapArgs)]
pub struct Args {
    /// Project id or name (default: project containing the current directory)
    #[arg(short, long)]
    pub project: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let ctx = AppContext::load(config)?;
    let project = ctx.project(args.project.as_deref())?;

    let (tx, _rx) = events::channel();
    let mut orchestrator = ctx.orchestrator(tx);
    let sessions = orchestrator.discover_sessions(&project.id).await?;
    orchestrator.flush_pending_writes().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions in {}.", project.name);
        return Ok(());
    }
    print_sessions(&sessions);
    Ok(())
}
