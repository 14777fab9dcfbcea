use anyhow::Result;
use clap::Args as ClapArgs;

use super::attach::attach;
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

    let (tx, mut rx) = events::channel();
    let mut orchestrator = ctx.orchestrator(tx);
    let sessions = orchestrator.discover_sessions(&project.id).await?;
    let target = find_session(&sessions, &args.session)?;

    let session = orchestrator.resume_session(&target.id).await?;
    attach(&mut orchestrator, &mut rx, &session).await?;
    orchestrator.flush_pending_writes().await;
    Ok(())
}
