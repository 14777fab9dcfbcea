use anyhow::Result;
use clap::Args as ClapArgs;

use super::attach::attach;
use super::common::AppContext;
use fjord::config::Config;
use fjord::events;
use fjord::session::{CreateSessionRequest, SessionSource, Workspace};

#[derive(ClapArgs)]
pub struct Args {
    /// Project id or name (default: project containing the current directory)
    #[arg(short, long)]
    pub project: Option<String>,

    /// Agent runtime to launch
    #[arg(short, long, default_value = "claude")]
    pub runtime: String,

    /// What the agent should do; also names the branch
    #[arg(short, long)]
    pub task: Option<String>,

    /// Model passed to the runtime's model flag
    #[arg(short, long)]
    pub model: Option<String>,

    /// Name for the new branch (default: generated)
    #[arg(long, conflicts_with_all = ["existing", "pr"])]
    pub branch: Option<String>,

    /// Work on an existing branch instead of cutting a new one
    #[arg(long, conflicts_with = "pr")]
    pub existing: Option<String>,

    /// Work on the head branch of a pull request (number or URL)
    #[arg(long)]
    pub pr: Option<String>,

    /// Run in the project directory instead of a separate worktree
    #[arg(long)]
    pub no_worktree: bool,

    /// One process per turn, answers shown as chat
    #[arg(long)]
    pub print: bool,
}

impl Args {
    fn source(&self) -> SessionSource {
        match (&self.existing, &self.pr) {
            (Some(branch), _) => SessionSource::ExistingBranch(branch.clone()),
            (None, Some(reference)) => SessionSource::PullRequest(reference.clone()),
            (None, None) => SessionSource::NewBranch {
                name: self.branch.clone(),
            },
        }
    }
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let ctx = AppContext::load(config)?;
    let project = ctx.project(args.project.as_deref())?;

    let (tx, mut rx) = events::channel();
    let mut orchestrator = ctx.orchestrator(tx);

    let request = CreateSessionRequest {
        source: args.source(),
        workspace: if args.no_worktree {
            Workspace::ProjectRoot
        } else {
            Workspace::Worktree
        },
        task_description: args.task.clone(),
        model: args.model.clone(),
        non_interactive: args.print,
        ..CreateSessionRequest::new(project.id.clone(), args.runtime.clone())
    };

    let session = orchestrator.create_session(request).await?;
    tracing::info!("Session {} started on {}", session.id, session.branch);

    attach(&mut orchestrator, &mut rx, &session).await?;
    orchestrator.flush_pending_writes().await;
    Ok(())
}
