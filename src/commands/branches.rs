use anyhow::Result;
use clap::Args as ClapArgs;

use super::common::AppContext;
use fjord::config::Config;
use fjord::events;
use fjord::git::BranchLocation;

#[derive(ClapArgs)]
pub struct Args {
    /// Project id or name (default: project containing the current directory)
    #[arg(short, long)]
    pub project: Option<String>,
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let ctx = AppContext::load(config)?;
    let project = ctx.project(args.project.as_deref())?;

    let (tx, _rx) = events::channel();
    let orchestrator = ctx.orchestrator(tx);
    let branches = orchestrator.list_branches(&project.id).await?;

    if branches.is_empty() {
        println!("No branches available.");
        return Ok(());
    }

    for branch in branches {
        let location = match branch.location {
            BranchLocation::Local => "local",
            BranchLocation::Remote => "remote",
            BranchLocation::Both => "local+remote",
        };
        println!("{:<48} {}", branch.name, location);
    }
    Ok(())
}
