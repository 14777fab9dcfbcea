use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::interpreter::{self, InterpreterHooks};
use super::model::{
    DevServer, PrintState, Session, SessionKind, SessionSnapshot, SessionStatus, Workspace,
};
use crate::chat::{ChatAdapter, ChatListener, ChatMessage, ChatRole};
use crate::config::{PreviewConfig, RuntimeConfig, RuntimeRegistry, TerminalConfig};
use crate::detect::StatusMatcher;
use crate::error::{OrchestratorError, Result};
use crate::events::{EventSender, SessionEvent};
use crate::git::{BranchInfo, BranchNamer, BranchResolver, GitClient, Worktree, WorktreeManager};
use crate::poller::{RepoPoller, DEFAULT_POLL_INTERVAL};
use crate::process::{PoolError, ProcessHost, ProcessInfo, SpawnOptions};
use crate::store::{MetadataStore, Project, ProjectRegistry, WorktreeMetadata};

/// Runtime assumed for worktrees discovered without metadata.
pub const DEFAULT_RUNTIME_ID: &str = "claude";

const DEFAULT_CHAT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    Agent,
    DevServer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessSignal {
    Data(String),
    Exit(Option<i32>),
}

/// One callback from the process host, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessEvent {
    pub session_id: String,
    pub handle_id: String,
    pub role: ProcessRole,
    pub signal: ProcessSignal,
}

/// Which branch a new session works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSource {
    /// Cut a new branch from the project's base; named automatically when
    /// `name` is `None`.
    NewBranch { name: Option<String> },
    ExistingBranch(String),
    /// PR number, `#number` or pull URL.
    PullRequest(String),
}

#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub project_id: String,
    pub runtime_id: String,
    pub source: SessionSource,
    pub workspace: Workspace,
    pub task_description: Option<String>,
    pub model: Option<String>,
    pub non_interactive: bool,
}

impl CreateSessionRequest {
    pub fn new(project_id: impl Into<String>, runtime_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            runtime_id: runtime_id.into(),
            source: SessionSource::NewBranch { name: None },
            workspace: Workspace::Worktree,
            task_description: None,
            model: None,
            non_interactive: false,
        }
    }
}

/// Spawns processes and routes their callbacks into the control channel.
struct Launcher {
    host: Arc<dyn ProcessHost>,
    process_tx: mpsc::UnboundedSender<ProcessEvent>,
    terminal: TerminalConfig,
}

impl Launcher {
    fn spawn(
        &self,
        session_id: &str,
        role: ProcessRole,
        program: &str,
        args: &[String],
        cwd: &Path,
        env: &HashMap<String, String>,
    ) -> std::result::Result<ProcessInfo, PoolError> {
        let options = SpawnOptions::new(cwd.to_path_buf())
            .with_env(env.clone())
            .with_size(self.terminal.cols, self.terminal.rows);
        let info = self.host.spawn(program, args, options)?;

        if let Err(e) = self.attach(session_id, &info.id, role) {
            let _ = self.host.kill(&info.id);
            return Err(e);
        }
        Ok(info)
    }

    fn attach(
        &self,
        session_id: &str,
        handle_id: &str,
        role: ProcessRole,
    ) -> std::result::Result<(), PoolError> {
        let tx = self.process_tx.clone();
        let (sid, hid) = (session_id.to_string(), handle_id.to_string());
        self.host.on_data(
            handle_id,
            Box::new(move |text| {
                let _ = tx.send(ProcessEvent {
                    session_id: sid.clone(),
                    handle_id: hid.clone(),
                    role,
                    signal: ProcessSignal::Data(text.to_string()),
                });
            }),
        )?;

        let tx = self.process_tx.clone();
        let (sid, hid) = (session_id.to_string(), handle_id.to_string());
        self.host.on_exit(
            handle_id,
            Box::new(move |code| {
                let _ = tx.send(ProcessEvent {
                    session_id: sid.clone(),
                    handle_id: hid.clone(),
                    role,
                    signal: ProcessSignal::Exit(code),
                });
            }),
        )?;

        self.host.resume(handle_id)
    }

    fn kill(&self, handle_id: &str) {
        if let Err(e) = self.host.kill(handle_id) {
            tracing::debug!("Kill of {} skipped: {}", handle_id, e);
        }
    }
}

/// Side effects requested while interpreting output.
struct Effects {
    events: EventSender,
    chat: ChatAdapter,
    poller: RepoPoller,
    metadata: Arc<dyn MetadataStore>,
    pending_writes: Vec<JoinHandle<()>>,
    dev_server_requests: Vec<String>,
}

impl Effects {
    fn write_metadata(&mut self, path: PathBuf, metadata: WorktreeMetadata) {
        self.pending_writes.retain(|h| !h.is_finished());
        let store = Arc::clone(&self.metadata);
        self.pending_writes.push(tokio::spawn(async move {
            if let Err(e) = store.write(&path, &metadata).await {
                tracing::warn!("Failed to write metadata for {}: {:#}", path.display(), e);
            }
        }));
    }
}

impl InterpreterHooks for Effects {
    fn emit(&mut self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn persist_metadata(&mut self, session: &Session) {
        if session.workspace == Workspace::Worktree {
            self.write_metadata(session.worktree_path.clone(), metadata_for(session));
        }
    }

    fn watch_directory(&mut self, session_id: &str, dir: &str) {
        self.poller.watch(session_id, Path::new(dir));
    }

    fn dev_server_needed(&mut self, session_id: &str) {
        self.dev_server_requests.push(session_id.to_string());
    }

    fn chat_output(&mut self, session_id: &str, text: &str) {
        self.chat.push_output(session_id, text, Instant::now());
    }

    fn chat_message(&mut self, session_id: &str, role: ChatRole, content: &str) {
        self.chat.add_message(session_id, role, content);
    }
}

fn metadata_for(session: &Session) -> WorktreeMetadata {
    WorktreeMetadata {
        session_id: Some(session.id.clone()),
        runtime_id: session.runtime_id.clone(),
        task_description: session.task_description().map(str::to_string),
        additional_dirs: session.additional_dirs.clone(),
        model: session.model().map(str::to_string),
        non_interactive: session.is_print_mode(),
        preview_url: session.preview_url.clone(),
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

/// Owns every session. All methods run on one control task; process
/// callbacks reach it through [`Orchestrator::pump`].
pub struct Orchestrator {
    projects: Arc<dyn ProjectRegistry>,
    runtimes: Arc<RuntimeRegistry>,
    worktrees: WorktreeManager,
    branches: BranchResolver,
    git: GitClient,
    namer: BranchNamer,
    preview: PreviewConfig,
    sessions: HashMap<String, Session>,
    launcher: Launcher,
    effects: Effects,
    process_rx: mpsc::UnboundedReceiver<ProcessEvent>,
}

impl Orchestrator {
    pub fn new(
        projects: Arc<dyn ProjectRegistry>,
        runtimes: Arc<RuntimeRegistry>,
        host: Arc<dyn ProcessHost>,
        metadata: Arc<dyn MetadataStore>,
        git: GitClient,
        events: EventSender,
    ) -> Self {
        let (process_tx, process_rx) = mpsc::unbounded_channel();
        let namer = BranchNamer::default();
        Self {
            projects,
            runtimes,
            worktrees: WorktreeManager::new(git.clone(), namer.clone()),
            branches: BranchResolver::new(git.clone()),
            namer,
            preview: PreviewConfig::default(),
            sessions: HashMap::new(),
            launcher: Launcher {
                host,
                process_tx,
                terminal: TerminalConfig::default(),
            },
            effects: Effects {
                poller: RepoPoller::new(git.clone(), events.clone(), DEFAULT_POLL_INTERVAL),
                events,
                chat: ChatAdapter::new(DEFAULT_CHAT_DEBOUNCE),
                metadata,
                pending_writes: Vec::new(),
                dev_server_requests: Vec::new(),
            },
            git,
            process_rx,
        }
    }

    pub fn with_preview(mut self, preview: PreviewConfig) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_terminal_size(mut self, terminal: TerminalConfig) -> Self {
        self.launcher.terminal = terminal;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.effects.poller.set_interval(interval);
        self
    }

    pub fn with_chat_debounce(mut self, debounce: Duration) -> Self {
        self.effects.chat = ChatAdapter::new(debounce);
        self
    }

    pub fn with_namer(mut self, namer: BranchNamer) -> Self {
        self.worktrees = WorktreeManager::new(self.git.clone(), namer.clone());
        self.namer = namer;
        self
    }

    fn project(&self, project_id: &str) -> Result<Project> {
        self.projects
            .get_project(project_id)
            .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))
    }

    fn runtime(&self, runtime_id: &str) -> Result<RuntimeConfig> {
        self.runtimes
            .get_runtime_by_id(runtime_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::RuntimeNotFound(runtime_id.to_string()))
    }

    fn matcher_for(&self, runtime_id: &str) -> StatusMatcher {
        let custom = self
            .runtimes
            .get_runtime_by_id(runtime_id)
            .and_then(|r| r.waiting_pattern.as_deref());
        StatusMatcher::for_runtime(runtime_id, custom)
    }

    fn has_project_root_session(&self, project_id: &str) -> bool {
        self.sessions
            .values()
            .any(|s| s.project_id == project_id && s.workspace == Workspace::ProjectRoot)
    }

    fn set_status(&mut self, session_id: &str, status: SessionStatus) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            interpreter::set_status(session, status, &mut self.effects);
        }
    }

    /// Creates the working copy, spawns the agent and starts tracking the
    /// session. A failed spawn removes the worktree it created.
    pub async fn create_session(&mut self, request: CreateSessionRequest) -> Result<SessionSnapshot> {
        let project = self.project(&request.project_id)?;
        let runtime = self.runtime(&request.runtime_id)?;
        let print_mode = request.non_interactive && !runtime.is_shell();
        if print_mode && !runtime.supports_print_mode() {
            return Err(OrchestratorError::PrintModeUnsupported(runtime.id));
        }

        let repo = tokio::fs::canonicalize(&project.path).await?;
        let namespace = project.namespace();
        let task = non_empty(request.task_description.clone());

        let worktree = match request.workspace {
            Workspace::Worktree => {
                self.prepare_worktree(&repo, &project, &namespace, &request.source, task.as_deref())
                    .await?
            }
            Workspace::ProjectRoot => {
                self.prepare_project_root(&repo, &project, &namespace, &request.source, task.as_deref())
                    .await?
            }
        };

        let model = non_empty(request.model.clone());
        let kind = if runtime.is_shell() {
            SessionKind::Shell
        } else if print_mode {
            SessionKind::PrintMode(PrintState {
                task_description: task.clone(),
                model,
                ..Default::default()
            })
        } else {
            SessionKind::Interactive {
                task_description: task.clone(),
                model,
            }
        };

        let mut session = Session::new(
            uuid::Uuid::new_v4().to_string(),
            project.id.clone(),
            runtime.id.clone(),
            worktree.branch.clone(),
            worktree.path.clone(),
            request.workspace,
            kind,
            self.matcher_for(&runtime.id),
        );

        let spawned = if session.is_print_mode() {
            match task.as_deref() {
                Some(prompt) => start_print_turn(&self.launcher, &mut session, &runtime, prompt).map(|_| true),
                None => Ok(false),
            }
        } else {
            let args = runtime.interactive_args(session.model(), task.as_deref(), false);
            self.launcher
                .spawn(&session.id, ProcessRole::Agent, &runtime.binary, &args, &worktree.path, &runtime.env)
                .map(|info| {
                    session.pty_id = Some(info.id);
                    session.pid = info.pid;
                    true
                })
        };

        let spawned = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::error!("Failed to start {} in {}: {}", runtime.binary, worktree.path.display(), e);
                if request.workspace == Workspace::Worktree {
                    if let Err(cleanup) = self
                        .worktrees
                        .remove_worktree(&repo, &worktree.path, &namespace)
                        .await
                    {
                        tracing::warn!("Failed to clean up {}: {}", worktree.path.display(), cleanup);
                    }
                }
                return Err(e.into());
            }
        };

        let session_id = session.id.clone();
        tracing::info!(
            "Created session {} ({}) on {} at {}",
            session_id,
            runtime.id,
            worktree.branch,
            worktree.path.display()
        );
        self.sessions.insert(session_id.clone(), session);

        if spawned {
            if let SessionKind::Interactive {
                task_description: Some(task),
                ..
            } = &self.sessions[&session_id].kind
            {
                if !runtime.prompt_as_argument {
                    self.type_into(&session_id, task);
                }
            }
        }

        if request.workspace == Workspace::Worktree {
            let session = &self.sessions[&session_id];
            self.effects
                .write_metadata(session.worktree_path.clone(), metadata_for(session));
        }
        self.effects.poller.watch(&session_id, &worktree.path);

        self.effects.chat.add_message(
            &session_id,
            ChatRole::System,
            &format!("Session started on {} with {}", worktree.branch, runtime.name),
        );
        if let Some(task) = &task {
            self.effects.chat.add_message(&session_id, ChatRole::User, task);
        }

        let status = if spawned {
            SessionStatus::Running
        } else {
            SessionStatus::Waiting
        };
        self.set_status(&session_id, status);

        Ok(self.sessions[&session_id].snapshot())
    }

    fn type_into(&self, session_id: &str, text: &str) {
        let Some(pty) = self.sessions.get(session_id).and_then(|s| s.pty_id.as_deref()) else {
            return;
        };
        if let Err(e) = self.launcher.host.write(pty, &format!("{text}\r")) {
            tracing::warn!("Failed to send task to session {}: {}", session_id, e);
        }
    }

    async fn prepare_worktree(
        &self,
        repo: &Path,
        project: &Project,
        namespace: &str,
        source: &SessionSource,
        task: Option<&str>,
    ) -> Result<Worktree> {
        match source {
            SessionSource::NewBranch { name } => {
                self.worktrees
                    .create_worktree(repo, &project.base_branch, namespace, name.as_deref(), task)
                    .await
            }
            SessionSource::ExistingBranch(branch) => {
                self.worktrees.add_worktree_for_branch(repo, branch).await
            }
            SessionSource::PullRequest(reference) => {
                let branch = self.branches.resolve_pr_branch(repo, reference).await?;
                self.worktrees.add_worktree_for_branch(repo, &branch).await
            }
        }
    }

    async fn prepare_project_root(
        &self,
        repo: &Path,
        project: &Project,
        namespace: &str,
        source: &SessionSource,
        task: Option<&str>,
    ) -> Result<Worktree> {
        if self.has_project_root_session(&project.id) {
            return Err(OrchestratorError::ProjectRootInUse(project.name.clone()));
        }
        if !self.branches.is_clean(repo).await? {
            return Err(OrchestratorError::DirtyWorkingTree(repo.display().to_string()));
        }

        let branch = match source {
            SessionSource::NewBranch { name } => {
                let branch = match name {
                    Some(name) => name.clone(),
                    None => {
                        let existing = self.branches.local_branches(repo).await?;
                        match task {
                            Some(task) => self.namer.generate_for_task(namespace, task, &existing),
                            None => self.namer.generate(namespace, &existing),
                        }
                    }
                };
                self.branches
                    .checkout_new_branch(repo, &branch, &project.base_branch)
                    .await?;
                branch
            }
            SessionSource::ExistingBranch(branch) => {
                self.branches.checkout_branch(repo, branch).await?;
                branch.clone()
            }
            SessionSource::PullRequest(reference) => {
                let branch = self.branches.resolve_pr_branch(repo, reference).await?;
                self.branches.checkout_branch(repo, &branch).await?;
                branch
            }
        };

        Ok(Worktree {
            branch,
            path: repo.to_path_buf(),
        })
    }

    /// Follow-up input. Interactive sessions get it typed in; print-mode
    /// sessions start a new turn that continues the conversation.
    pub fn send_input(&mut self, session_id: &str, text: &str) -> Result<()> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;

        if !session.is_print_mode() {
            let pty = session
                .pty_id
                .as_deref()
                .ok_or_else(|| OrchestratorError::SessionBusy(session_id.to_string()))?;
            self.launcher.host.write(pty, &format!("{text}\r"))?;
            self.effects.chat.add_message(session_id, ChatRole::User, text);
            return Ok(());
        }

        let runtime = self
            .runtimes
            .get_runtime_by_id(&session.runtime_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::RuntimeNotFound(session.runtime_id.clone()))?;

        if let Some(stale) = session.pty_id.take() {
            self.launcher.kill(&stale);
        }
        session.pid = None;

        self.effects.chat.add_message(session_id, ChatRole::User, text);
        start_print_turn(&self.launcher, session, &runtime, text)?;
        interpreter::set_status(session, SessionStatus::Running, &mut self.effects);
        Ok(())
    }

    /// Raw terminal input, passed through untouched.
    pub fn write_raw(&mut self, session_id: &str, data: &str) -> Result<()> {
        let pty = self.live_pty(session_id)?;
        self.launcher.host.write(&pty, data)?;
        Ok(())
    }

    pub fn resize(&mut self, session_id: &str, cols: u16, rows: u16) -> Result<()> {
        let pty = self.live_pty(session_id)?;
        self.launcher.host.resize(&pty, cols, rows)?;
        Ok(())
    }

    fn live_pty(&self, session_id: &str) -> Result<String> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;
        session
            .pty_id
            .clone()
            .ok_or_else(|| OrchestratorError::SessionBusy(session_id.to_string()))
    }

    /// Re-attaches a process to a dormant session without changing its id
    /// or branch.
    pub async fn resume_session(&mut self, session_id: &str) -> Result<SessionSnapshot> {
        let (project_id, runtime_id) = match self.sessions.get(session_id) {
            Some(s) if !s.is_dormant() => return Ok(s.snapshot()),
            Some(s) => (s.project_id.clone(), s.runtime_id.clone()),
            None => return Err(OrchestratorError::SessionNotFound(session_id.to_string())),
        };
        let project = self.project(&project_id)?;
        let runtime = self.runtime(&runtime_id)?;

        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;

        match session.workspace {
            Workspace::ProjectRoot => {
                let current = self.branches.current_branch(&session.worktree_path).await?;
                if current != session.branch {
                    if !self.branches.is_clean(&session.worktree_path).await? {
                        return Err(OrchestratorError::DirtyWorkingTree(
                            session.worktree_path.display().to_string(),
                        ));
                    }
                    self.branches
                        .checkout_branch(&session.worktree_path, &session.branch)
                        .await?;
                }
            }
            Workspace::Worktree => {
                if !session.worktree_path.exists() {
                    let repo = tokio::fs::canonicalize(&project.path).await?;
                    let worktree = self
                        .worktrees
                        .add_worktree_for_branch(&repo, &session.branch)
                        .await?;
                    session.worktree_path = worktree.path;
                }
            }
        }

        let status = if let SessionKind::PrintMode(state) = &mut session.kind {
            // The next prompt continues the earlier conversation.
            state.turn = state.turn.max(1);
            SessionStatus::Waiting
        } else {
            let args = runtime.interactive_args(session.model(), None, true);
            let info = self.launcher.spawn(
                session_id,
                ProcessRole::Agent,
                &runtime.binary,
                &args,
                &session.worktree_path,
                &runtime.env,
            )?;
            session.pty_id = Some(info.id);
            session.pid = info.pid;
            SessionStatus::Running
        };
        session.output = Default::default();

        tracing::info!("Resumed session {} on {}", session_id, session.branch);
        self.effects.poller.watch(session_id, &session.worktree_path);
        self.effects
            .chat
            .add_message(session_id, ChatRole::System, "Session resumed");
        interpreter::set_status(session, status, &mut self.effects);
        Ok(session.snapshot())
    }

    /// Materialises dormant sessions for worktrees that are not tracked
    /// yet, then adopts the project checkout when nothing else exists.
    pub async fn discover_sessions(&mut self, project_id: &str) -> Result<Vec<SessionSnapshot>> {
        let project = self.project(project_id)?;
        let repo = tokio::fs::canonicalize(&project.path).await?;
        let namespace = project.namespace();

        let worktrees = match self.worktrees.list_worktrees(&repo, &namespace).await {
            Ok(worktrees) => worktrees,
            Err(e) => {
                tracing::warn!("Discovery in {} failed: {}", repo.display(), e);
                Vec::new()
            }
        };

        let mut discovered = Vec::new();
        for worktree in worktrees {
            if self.sessions.values().any(|s| s.worktree_path == worktree.path) {
                continue;
            }
            let metadata = match self.effects.metadata.read(&worktree.path).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!("Unreadable metadata for {}: {:#}", worktree.path.display(), e);
                    None
                }
            };
            let snapshot = self.restore_dormant(&project, worktree, metadata);
            discovered.push(snapshot);
        }

        if !self.sessions.values().any(|s| s.project_id == project.id) {
            if let Some(snapshot) = self.adopt_project_branch(&project, &repo).await {
                discovered.push(snapshot);
            }
        }

        Ok(discovered)
    }

    fn restore_dormant(
        &mut self,
        project: &Project,
        worktree: Worktree,
        metadata: Option<WorktreeMetadata>,
    ) -> SessionSnapshot {
        let persisted_id = metadata.as_ref().and_then(|m| m.session_id.clone());
        let metadata = metadata.unwrap_or_else(|| WorktreeMetadata {
            runtime_id: DEFAULT_RUNTIME_ID.to_string(),
            ..Default::default()
        });

        let kind = if metadata.runtime_id == crate::config::SHELL_RUNTIME_ID {
            SessionKind::Shell
        } else if metadata.non_interactive {
            // Whatever ran here before is the conversation the next prompt continues.
            SessionKind::PrintMode(PrintState {
                task_description: metadata.task_description.clone(),
                model: metadata.model.clone(),
                turn: 1,
                ..Default::default()
            })
        } else {
            SessionKind::Interactive {
                task_description: metadata.task_description.clone(),
                model: metadata.model.clone(),
            }
        };

        let id = persisted_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut session = Session::new(
            id.clone(),
            project.id.clone(),
            metadata.runtime_id.clone(),
            worktree.branch,
            worktree.path,
            Workspace::Worktree,
            kind,
            self.matcher_for(&metadata.runtime_id),
        );
        session.additional_dirs = metadata.additional_dirs.clone();
        session.preview_url = metadata.preview_url.clone();

        if persisted_id.is_none() {
            self.effects
                .write_metadata(session.worktree_path.clone(), metadata_for(&session));
        }

        tracing::info!("Discovered dormant session {} on {}", id, session.branch);
        let snapshot = session.snapshot();
        self.sessions.insert(id, session);
        snapshot
    }

    /// Tracks the project checkout itself as a dormant session. Prefers
    /// the branch it is on unless that is the base branch, in which case
    /// the most recently committed namespace branch is used.
    async fn adopt_project_branch(&mut self, project: &Project, repo: &Path) -> Option<SessionSnapshot> {
        if self.has_project_root_session(&project.id) {
            return None;
        }

        let current = match self.branches.current_branch(repo).await {
            Ok(branch) => branch,
            Err(e) => {
                tracing::debug!("Adoption skipped for {}: {}", repo.display(), e);
                return None;
            }
        };

        let branch = if current != project.base_branch && current != "HEAD" {
            current
        } else {
            self.branches
                .newest_namespace_branch(repo, &project.namespace())
                .await?
        };

        let session = Session::new(
            uuid::Uuid::new_v4().to_string(),
            project.id.clone(),
            DEFAULT_RUNTIME_ID.to_string(),
            branch,
            repo.to_path_buf(),
            Workspace::ProjectRoot,
            SessionKind::Interactive {
                task_description: None,
                model: None,
            },
            self.matcher_for(DEFAULT_RUNTIME_ID),
        );
        tracing::info!("Adopted {} in {} as session {}", session.branch, repo.display(), session.id);
        let snapshot = session.snapshot();
        self.sessions.insert(session.id.clone(), session);
        Some(snapshot)
    }

    /// Tears a session down. The map entry goes first; every cleanup step
    /// after that is best effort.
    pub async fn kill_session(&mut self, session_id: &str) -> Result<()> {
        let mut session = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;

        if let Some(pty) = session.pty_id.take() {
            self.launcher.kill(&pty);
        }
        if let Some(dev) = session.dev_server_pty() {
            self.launcher.kill(dev);
        }
        self.effects.poller.unwatch_session(session_id);

        if session.workspace == Workspace::Worktree {
            match self.projects.get_project(&session.project_id) {
                Some(project) => {
                    let repo = tokio::fs::canonicalize(&project.path)
                        .await
                        .unwrap_or_else(|_| project.path.clone());
                    if let Err(e) = self
                        .worktrees
                        .remove_worktree(&repo, &session.worktree_path, &project.namespace())
                        .await
                    {
                        tracing::warn!("Failed to remove {}: {}", session.worktree_path.display(), e);
                    }
                }
                None => tracing::warn!(
                    "Project {} is gone; leaving {} in place",
                    session.project_id,
                    session.worktree_path.display()
                ),
            }
            if let Err(e) = self.effects.metadata.remove(&session.worktree_path).await {
                tracing::warn!("Failed to remove metadata for {}: {:#}", session.worktree_path.display(), e);
            }
        }

        self.effects.chat.remove_session(session_id);
        session.pid = None;
        interpreter::set_status(&mut session, SessionStatus::Done, &mut self.effects);
        tracing::info!("Killed session {}", session_id);
        Ok(())
    }

    /// Stops every process and the poller. Worktrees stay on disk.
    pub fn kill_all(&mut self) {
        self.launcher.host.kill_all();
        for session in self.sessions.values_mut() {
            session.pty_id = None;
            session.pid = None;
            if let SessionKind::PrintMode(state) = &mut session.kind {
                state.dev_server = None;
            }
            interpreter::set_status(session, SessionStatus::Done, &mut self.effects);
        }
        self.effects.poller.stop_all();
    }

    pub fn list_sessions(&self, project_id: Option<&str>) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> = self
            .sessions
            .values()
            .filter(|s| project_id.map_or(true, |id| s.project_id == id))
            .map(Session::snapshot)
            .collect();
        sessions.sort_by(|a, b| a.branch.cmp(&b.branch));
        sessions
    }

    pub fn get_session(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.sessions.get(session_id).map(Session::snapshot)
    }

    pub async fn list_branches(&self, project_id: &str) -> Result<Vec<BranchInfo>> {
        let project = self.project(project_id)?;
        let repo = tokio::fs::canonicalize(&project.path).await?;
        Ok(self.branches.list_branches(&repo).await)
    }

    pub fn subscribe_chat(&mut self, session_id: &str, listener: ChatListener) {
        self.effects.chat.subscribe(session_id, listener);
    }

    pub fn chat_messages(&self, session_id: &str) -> &[ChatMessage] {
        self.effects.chat.messages(session_id)
    }

    /// Applies one process callback. Callbacks from a handle that is no
    /// longer the session's current one are dropped.
    pub fn handle_process_event(&mut self, event: ProcessEvent) {
        let Some(session) = self.sessions.get_mut(&event.session_id) else {
            tracing::debug!("Event for unknown session {}", event.session_id);
            return;
        };

        match event.role {
            ProcessRole::Agent => {
                if session.pty_id.as_deref() != Some(event.handle_id.as_str()) {
                    tracing::debug!("Dropping event from superseded handle {}", event.handle_id);
                    return;
                }
                match event.signal {
                    ProcessSignal::Data(text) if session.is_print_mode() => {
                        interpreter::on_print_data(session, &text, &mut self.effects)
                    }
                    ProcessSignal::Data(text) => {
                        interpreter::on_interactive_data(session, &text, &mut self.effects)
                    }
                    ProcessSignal::Exit(code) => {
                        tracing::info!("Session {} process exited with {:?}", session.id, code);
                        session.pty_id = None;
                        session.pid = None;
                        self.effects.emit(SessionEvent::Exited {
                            session_id: session.id.clone(),
                            code,
                        });
                        if session.is_print_mode() {
                            interpreter::on_print_exit(session, code, &mut self.effects);
                        } else {
                            self.effects.chat.flush(&session.id);
                            interpreter::on_interactive_exit(session, &mut self.effects);
                        }
                    }
                }
            }
            ProcessRole::DevServer => {
                if session.dev_server_pty() != Some(event.handle_id.as_str()) {
                    tracing::debug!("Dropping event from old dev server {}", event.handle_id);
                    return;
                }
                match event.signal {
                    ProcessSignal::Data(text) => {
                        interpreter::on_dev_server_data(session, &text, &mut self.effects)
                    }
                    ProcessSignal::Exit(code) => {
                        interpreter::on_dev_server_exit(session, code, &mut self.effects)
                    }
                }
            }
        }

        for session_id in std::mem::take(&mut self.effects.dev_server_requests) {
            self.start_dev_server(&session_id);
        }
    }

    /// Starts the preview server after a first print-mode turn. Without a
    /// marker file (or when spawning fails) the session just goes back to
    /// waiting.
    fn start_dev_server(&mut self, session_id: &str) {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };

        let marker_present = session.worktree_path.join(&self.preview.marker_file).exists();
        let command = self.preview.command.split_first().filter(|_| marker_present);
        if let Some((program, args)) = command {
            match self.launcher.spawn(
                session_id,
                ProcessRole::DevServer,
                program,
                args,
                &session.worktree_path,
                &HashMap::new(),
            ) {
                Ok(info) => {
                    if let SessionKind::PrintMode(state) = &mut session.kind {
                        state.dev_server = Some(DevServer {
                            pty_id: info.id,
                            output: Default::default(),
                        });
                    }
                    tracing::info!("Started preview server for session {}", session_id);
                    self.effects.chat.add_message(
                        session_id,
                        ChatRole::System,
                        &format!("Starting preview: {}", self.preview.command.join(" ")),
                    );
                    return;
                }
                Err(e) => tracing::warn!("Preview server for {} failed to start: {}", session_id, e),
            }
        }

        if session.status == SessionStatus::Running {
            interpreter::set_status(session, SessionStatus::Waiting, &mut self.effects);
        }
    }

    /// Waits for the next process callback or chat debounce deadline and
    /// handles it.
    pub async fn pump(&mut self) {
        let deadline = self.effects.chat.next_deadline();
        let flush_timer = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            Some(event) = self.process_rx.recv() => self.handle_process_event(event),
            _ = flush_timer => {
                self.effects.chat.flush_due(Instant::now());
            }
        }
    }

    /// Handles every callback already queued, without waiting.
    pub fn try_drain(&mut self) {
        while let Ok(event) = self.process_rx.try_recv() {
            self.handle_process_event(event);
        }
        self.effects.chat.flush_due(Instant::now());
    }

    /// Waits for outstanding metadata writes.
    pub async fn flush_pending_writes(&mut self) {
        for handle in self.effects.pending_writes.drain(..) {
            let _ = handle.await;
        }
    }
}

/// Spawns the next print-mode turn. Turns after the first continue the
/// previous conversation.
fn start_print_turn(
    launcher: &Launcher,
    session: &mut Session,
    runtime: &RuntimeConfig,
    prompt: &str,
) -> std::result::Result<(), PoolError> {
    let SessionKind::PrintMode(state) = &mut session.kind else {
        return Ok(());
    };
    let args = runtime.print_turn_args(state.model.as_deref(), prompt, state.turn > 0);
    let info = launcher.spawn(
        &session.id,
        ProcessRole::Agent,
        &runtime.binary,
        &args,
        &session.worktree_path,
        &runtime.env,
    )?;
    state.start_turn();
    session.pty_id = Some(info.id);
    session.pid = info.pid;
    Ok(())
}
