use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Subcommand};
use std::path::PathBuf;

use super::common::AppContext;
use fjord::config::Config;

#[derive(Subcommand)]
pub enum Command {
    /// Register a git repository
    Add(AddArgs),

    /// List registered projects
    List,

    /// Forget a project (its worktrees are left alone)
    Remove {
        /// Project id or name
        project: String,
    },
}

#[derive(ClapArgs)]
pub struct AddArgs {
    /// Path to the repository (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Display name; also the branch namespace (default: directory name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Branch new sessions start from
    #[arg(short, long, default_value = "main")]
    pub base: String,
}

pub fn execute(command: Command, config: Config) -> Result<()> {
    let mut ctx = AppContext::load(config)?;

    match command {
        Command::Add(args) => {
            let path = args
                .path
                .canonicalize()
                .context("Failed to resolve project path")?;
            let name = match args.name {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .context("Cannot derive a project name from the path; pass --name")?,
            };
            let project = ctx.projects.add(&name, &path, &args.base)?;
            println!("Added project {} ({})", project.name, project.id);
            println!("Branches will be created under {}/", project.namespace());
        }
        Command::List => {
            let projects = ctx.projects.list();
            if projects.is_empty() {
                println!("No projects registered. Run 'fjord project add <path>'.");
                return Ok(());
            }
            println!("{:<38} {:<20} {:<10} {}", "ID", "NAME", "BASE", "PATH");
            println!("{}", "-".repeat(90));
            for project in projects {
                println!(
                    "{:<38} {:<20} {:<10} {}",
                    project.id,
                    project.name,
                    project.base_branch,
                    project.path.display()
                );
            }
        }
        Command::Remove { project } => {
            let id = ctx
                .projects
                .find(&project)
                .map(|p| p.id.clone())
                .with_context(|| format!("Unknown project: {}", project))?;
            if let Some(removed) = ctx.projects.remove(&id)? {
                println!("Removed project {}", removed.name);
            }
        }
    }

    Ok(())
}
