use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use fjord::config::{Config, RuntimeRegistry, TerminalConfig};
use fjord::events::EventSender;
use fjord::git::GitClient;
use fjord::process::PtyPool;
use fjord::session::{Orchestrator, SessionSnapshot};
use fjord::store::{FileMetadataStore, JsonProjectRegistry, Project};

/// Everything a command needs that comes from disk.
pub struct AppContext {
    pub config: Config,
    pub projects: JsonProjectRegistry,
}

impl AppContext {
    pub fn load(config: Config) -> Result<Self> {
        let projects = JsonProjectRegistry::load_from_data_dir(&config.data_dir())
            .context("Failed to load project registry")?;
        Ok(Self { config, projects })
    }

    /// Resolves `key` (id or name), or the registered project containing
    /// the current directory when no key is given.
    pub fn project(&self, key: Option<&str>) -> Result<Project> {
        if let Some(key) = key {
            return match self.projects.find(key) {
                Some(project) => Ok(project.clone()),
                None => bail!("Unknown project: {}. Run 'fjord project list'.", key),
            };
        }

        let cwd = std::env::current_dir()?;
        match project_containing(self.projects.list(), &cwd) {
            Some(project) => Ok(project.clone()),
            None => bail!("The current directory is not inside a registered project. Pass --project."),
        }
    }

    pub fn runtimes(&self) -> RuntimeRegistry {
        RuntimeRegistry::from_config(&self.config)
    }

    pub fn orchestrator(&self, events: EventSender) -> Orchestrator {
        let data_dir = self.config.data_dir();
        Orchestrator::new(
            Arc::new(self.projects.clone()),
            Arc::new(self.runtimes()),
            Arc::new(PtyPool::new()),
            Arc::new(FileMetadataStore::from_data_dir(&data_dir)),
            GitClient::system(),
            events,
        )
        .with_preview(self.config.preview.clone())
        .with_terminal_size(terminal_size(&self.config.terminal))
        .with_poll_interval(self.config.poll_interval())
        .with_chat_debounce(self.config.chat_debounce())
    }
}

/// Current terminal size, or the configured fallback when stdout is not a
/// terminal.
pub fn terminal_size(fallback: &TerminalConfig) -> TerminalConfig {
    match crossterm::terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => TerminalConfig { cols, rows },
        _ => fallback.clone(),
    }
}

/// Deepest registered project whose path contains `dir`.
pub fn project_containing<'a>(projects: &'a [Project], dir: &Path) -> Option<&'a Project> {
    let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    projects
        .iter()
        .filter(|p| dir.starts_with(&p.path))
        .max_by_key(|p| p.path.components().count())
}

/// Finds a session by full id, unique id prefix or branch name.
pub fn find_session(sessions: &[SessionSnapshot], key: &str) -> Result<SessionSnapshot> {
    if let Some(exact) = sessions.iter().find(|s| s.id == key || s.branch == key) {
        return Ok(exact.clone());
    }

    let matched: Vec<_> = sessions.iter().filter(|s| s.id.starts_with(key)).collect();
    match matched.len() {
        1 => Ok(matched[0].clone()),
        0 => bail!("No session matches {}", key),
        _ => {
            eprintln!("{} matches several sessions:", key);
            for session in matched {
                eprintln!("  {} - {}", session.id, session.branch);
            }
            bail!("Ambiguous session {}", key)
        }
    }
}

pub fn print_sessions(sessions: &[SessionSnapshot]) {
    println!(
        "{:<10} {:<32} {:<8} {:<8} {}",
        "SESSION", "BRANCH", "RUNTIME", "STATUS", "PATH"
    );
    println!("{}", "-".repeat(90));

    for session in sessions {
        let path = session.worktree_path.display().to_string();
        let path = if path.chars().count() > 38 {
            format!("...{}", fjord::utils::tail_chars(&path, 35))
        } else {
            path
        };
        let mut flags = Vec::new();
        if session.no_worktree {
            flags.push("root");
        }
        if session.non_interactive {
            flags.push("print");
        }
        let branch = if flags.is_empty() {
            session.branch.clone()
        } else {
            format!("{} [{}]", session.branch, flags.join(","))
        };

        println!(
            "{:<10} {:<32} {:<8} {:<8} {}",
            &session.id[..session.id.len().min(8)],
            branch,
            session.runtime_id,
            session.status,
            path
        );
    }
}
