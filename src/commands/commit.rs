use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use super::common::{find_session, AppContext};
use fjord::config::Config;
use fjord::events;
use fjord::git::commit::CommitMessageGenerator;
use fjord::git::GitClient;

#[derive(ClapArgs)]
pub struct Args {
    /// Session id, id prefix or branch
    pub session: String,

    /// Project id or name (default: project containing the current directory)
    #[arg(short, long)]
    pub project: Option<String>,

    /// Commit message; generated by the runtime when omitted
    #[arg(short, long)]
    pub message: Option<String>,

    /// Runtime asked to write the message
    #[arg(short, long, default_value = "claude")]
    pub runtime: String,
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let ctx = AppContext::load(config)?;
    let project = ctx.project(args.project.as_deref())?;

    let (tx, _rx) = events::channel();
    let mut orchestrator = ctx.orchestrator(tx);
    let sessions = orchestrator.discover_sessions(&project.id).await?;
    orchestrator.flush_pending_writes().await;
    let target = find_session(&sessions, &args.session)?;

    let generator = CommitMessageGenerator::new(
        GitClient::system(),
        ctx.config.commit_prompt.clone(),
        ctx.config.commit_message_timeout(),
    );

    let message = match args.message {
        Some(message) => message,
        None => {
            let runtimes = ctx.runtimes();
            let runtime = runtimes
                .get_runtime_by_id(&args.runtime)
                .with_context(|| format!("Unknown runtime: {}", args.runtime))?;
            match generator.generate(&target.worktree_path, runtime).await? {
                Some(message) => message,
                None => {
                    println!("Nothing to commit on {}.", target.branch);
                    return Ok(());
                }
            }
        }
    };

    generator.commit_all(&target.worktree_path, &message).await?;
    println!("Committed on {}:", target.branch);
    for line in message.lines() {
        println!("  {}", line);
    }
    Ok(())
}
