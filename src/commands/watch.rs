use anyhow::Result;
use clap::Args as ClapArgs;

use super::common::{find_session, AppContext};
use fjord::config::Config;
use fjord::events::{self, SessionEvent};
use fjord::git::{ChangeKind, GitClient};
use fjord::poller::RepoPoller;

#[derive(ClapArgs)]
pub struct Args {
    /// Session id, id prefix or branch
    pub session: String,

    /// Project id or name (default: project containing the current directory)
    #[arg(short, long)]
    pub project: Option<String>,
}

fn change_marker(kind: ChangeKind) -> char {
    match kind {
        ChangeKind::Added => 'A',
        ChangeKind::Deleted => 'D',
        ChangeKind::Modified => 'M',
    }
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let ctx = AppContext::load(config)?;
    let project = ctx.project(args.project.as_deref())?;

    let (tx, _rx) = events::channel();
    let mut orchestrator = ctx.orchestrator(tx);
    let sessions = orchestrator.discover_sessions(&project.id).await?;
    orchestrator.flush_pending_writes().await;
    let target = find_session(&sessions, &args.session)?;

    let (tx, mut rx) = events::channel();
    let mut poller = RepoPoller::new(GitClient::system(), tx, ctx.config.poll_interval());
    poller.watch(&target.id, &target.worktree_path);

    println!(
        "Watching {} ({}). Press Ctrl-C to stop.",
        target.branch,
        target.worktree_path.display()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = rx.recv() => match event {
                SessionEvent::FileChanges { changes, .. } => {
                    println!("{} changed file(s)", changes.len());
                    for change in changes {
                        println!("  {} {}", change_marker(change.kind), change.path);
                    }
                }
                SessionEvent::Conflicts { conflicts, .. } => {
                    if !conflicts.is_empty() {
                        println!("Conflicts: {}", conflicts.join(", "));
                    }
                }
                _ => {}
            },
        }
    }

    poller.stop_all();
    Ok(())
}
