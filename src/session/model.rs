use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::buffer::{LineBuffer, OutputBuffer};
use crate::detect::StatusMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Waiting,
    Done,
    Error,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionStatus::Running => "running",
            SessionStatus::Waiting => "waiting",
            SessionStatus::Done => "done",
            SessionStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Where a session's files live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workspace {
    /// An isolated worktree under the project's `.fjord/worktrees`.
    Worktree,
    /// The project's own checkout. At most one such session per project.
    ProjectRoot,
}

#[derive(Debug)]
pub struct DevServer {
    pub pty_id: String,
    pub output: OutputBuffer,
}

#[derive(Debug, Default)]
pub struct PrintState {
    pub task_description: Option<String>,
    pub model: Option<String>,
    /// Number of turns started so far; 0 until the first prompt.
    pub turn: u32,
    pub lines: LineBuffer,
    pub assistant_replied: bool,
    pub result_seen: bool,
    pub dev_server: Option<DevServer>,
}

impl PrintState {
    pub fn start_turn(&mut self) {
        self.turn += 1;
        self.lines.clear();
        self.assistant_replied = false;
        self.result_seen = false;
    }
}

#[derive(Debug)]
pub enum SessionKind {
    Interactive {
        task_description: Option<String>,
        model: Option<String>,
    },
    PrintMode(PrintState),
    Shell,
}

#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub project_id: String,
    pub runtime_id: String,
    pub branch: String,
    pub worktree_path: PathBuf,
    pub status: SessionStatus,
    pub pid: Option<u32>,
    pub additional_dirs: Vec<String>,
    pub preview_url: Option<String>,
    pub workspace: Workspace,
    pub kind: SessionKind,
    /// Live agent handle; `None` while dormant.
    pub(crate) pty_id: Option<String>,
    pub(crate) output: OutputBuffer,
    pub(crate) matcher: StatusMatcher,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        project_id: String,
        runtime_id: String,
        branch: String,
        worktree_path: PathBuf,
        workspace: Workspace,
        kind: SessionKind,
        matcher: StatusMatcher,
    ) -> Self {
        Self {
            id,
            project_id,
            runtime_id,
            branch,
            worktree_path,
            status: SessionStatus::Done,
            pid: None,
            additional_dirs: Vec::new(),
            preview_url: None,
            workspace,
            kind,
            pty_id: None,
            output: OutputBuffer::default(),
            matcher,
        }
    }

    pub fn is_dormant(&self) -> bool {
        self.pty_id.is_none()
    }

    pub fn is_print_mode(&self) -> bool {
        matches!(self.kind, SessionKind::PrintMode(_))
    }

    pub fn task_description(&self) -> Option<&str> {
        match &self.kind {
            SessionKind::Interactive {
                task_description, ..
            } => task_description.as_deref(),
            SessionKind::PrintMode(state) => state.task_description.as_deref(),
            SessionKind::Shell => None,
        }
    }

    pub fn model(&self) -> Option<&str> {
        match &self.kind {
            SessionKind::Interactive { model, .. } => model.as_deref(),
            SessionKind::PrintMode(state) => state.model.as_deref(),
            SessionKind::Shell => None,
        }
    }

    pub fn dev_server_pty(&self) -> Option<&str> {
        match &self.kind {
            SessionKind::PrintMode(state) => state.dev_server.as_ref().map(|d| d.pty_id.as_str()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            runtime_id: self.runtime_id.clone(),
            branch: self.branch.clone(),
            worktree_path: self.worktree_path.clone(),
            status: self.status,
            pid: self.pid,
            task_description: self.task_description().map(str::to_string),
            additional_dirs: self.additional_dirs.clone(),
            model: self.model().map(str::to_string),
            preview_url: self.preview_url.clone(),
            no_worktree: self.workspace == Workspace::ProjectRoot,
            non_interactive: self.is_print_mode(),
        }
    }
}

/// Consumer view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub project_id: String,
    pub runtime_id: String,
    pub branch: String,
    pub worktree_path: PathBuf,
    pub status: SessionStatus,
    pub pid: Option<u32>,
    pub task_description: Option<String>,
    pub additional_dirs: Vec<String>,
    pub model: Option<String>,
    pub preview_url: Option<String>,
    pub no_worktree: bool,
    pub non_interactive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(kind: SessionKind, workspace: Workspace) -> Session {
        Session::new(
            "s1".into(),
            "p1".into(),
            "claude".into(),
            "proj/oslo".into(),
            PathBuf::from("/repo/.fjord/worktrees/proj-oslo"),
            workspace,
            kind,
            StatusMatcher::for_runtime("claude", None),
        )
    }

    #[test]
    fn new_session_is_dormant_and_done() {
        let s = session(SessionKind::Shell, Workspace::Worktree);
        assert!(s.is_dormant());
        assert_eq!(s.status, SessionStatus::Done);
    }

    #[test]
    fn snapshot_exposes_flags_and_kind_fields() {
        let state = PrintState {
            task_description: Some("build it".into()),
            model: Some("opus".into()),
            ..Default::default()
        };
        let snap = session(SessionKind::PrintMode(state), Workspace::ProjectRoot).snapshot();
        assert!(snap.no_worktree);
        assert!(snap.non_interactive);
        assert_eq!(snap.task_description.as_deref(), Some("build it"));

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["noWorktree"], true);
        assert_eq!(json["status"], "done");
        assert!(
            json.get("ptyId").is_none() && json.get("output").is_none(),
            "snapshot: internal fields must never be exposed"
        );
    }

    #[test]
    fn shell_sessions_have_no_task_or_model() {
        let s = session(SessionKind::Shell, Workspace::Worktree);
        assert_eq!(s.task_description(), None);
        assert_eq!(s.model(), None);
        assert!(!s.snapshot().non_interactive);
    }

    #[test]
    fn start_turn_resets_turn_flags() {
        let mut state = PrintState {
            assistant_replied: true,
            result_seen: true,
            ..Default::default()
        };
        state.lines.push("partial");
        state.start_turn();
        assert_eq!(state.turn, 1);
        assert!(!state.assistant_replied && !state.result_seen);
        assert_eq!(state.lines.pending(), "");
    }
}
