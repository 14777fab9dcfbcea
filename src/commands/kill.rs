use anyhow::Result;
use clap::Args as ClapArgs;

use super::common::{find_session, AppContext};
use fjord::config::Config;
use fjord::events;

#[derive(ClapArgs)]
pub struct Args {
    /// Session id, id prefix or branch
    pub session: String,

    /// Project id or name (default: project containing the current directory)
    #[arg(short, long)]
    pub project: Option<String>,
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let ctx = AppContext::load(config)?;
    let project = ctx.project(args.project.as_deref())?;

    let (tx, _rx) = events::channel();
    let mut orchestrator = ctx.orchestrator(tx);
    let sessions = orchestrator.discover_sessions(&project.id).await?;
    let target = find_session(&sessions, &args.session)?;

    orchestrator.kill_session(&target.id).await?;
    if target.no_worktree {
        println!("Stopped session on {} (project directory left as is)", target.branch);
    } else {
        println!("Removed session {} and its worktree", target.branch);
    }
    Ok(())
}
