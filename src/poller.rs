//! Periodic `git status` snapshots per watched working copy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use xxhash_rust::xxh3::xxh3_64;

use crate::events::{EventSender, SessionEvent};
use crate::git::{parse_porcelain, GitClient, StatusReport};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Last-seen status of one path, kept as a fingerprint of the raw text.
#[derive(Debug, Default)]
pub struct PathPollState {
    last_fingerprint: Option<u64>,
}

impl PathPollState {
    /// Returns a parsed report only when `text` differs from the last
    /// observation.
    pub fn observe(&mut self, text: &str) -> Option<StatusReport> {
        let fingerprint = xxh3_64(text.as_bytes());
        if self.last_fingerprint == Some(fingerprint) {
            return None;
        }
        self.last_fingerprint = Some(fingerprint);
        Some(parse_porcelain(text))
    }
}

struct Watch {
    session_id: String,
    task: JoinHandle<()>,
}

pub struct RepoPoller {
    git: GitClient,
    events: EventSender,
    interval: Duration,
    watches: HashMap<PathBuf, Watch>,
}

impl RepoPoller {
    pub fn new(git: GitClient, events: EventSender, interval: Duration) -> Self {
        Self {
            git,
            events,
            interval,
            watches: HashMap::new(),
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Starts polling `path` on behalf of `session_id`. Watching an already
    /// watched path is a no-op.
    pub fn watch(&mut self, session_id: &str, path: &Path) {
        if self.watches.contains_key(path) {
            return;
        }
        let task = tokio::spawn(poll_loop(
            self.git.clone(),
            self.events.clone(),
            session_id.to_string(),
            path.to_path_buf(),
            self.interval,
        ));
        tracing::debug!("Watching {} for session {}", path.display(), session_id);
        self.watches.insert(
            path.to_path_buf(),
            Watch {
                session_id: session_id.to_string(),
                task,
            },
        );
    }

    pub fn unwatch(&mut self, path: &Path) {
        if let Some(watch) = self.watches.remove(path) {
            watch.task.abort();
            tracing::debug!("Stopped watching {}", path.display());
        }
    }

    pub fn unwatch_session(&mut self, session_id: &str) {
        let paths: Vec<PathBuf> = self
            .watches
            .iter()
            .filter(|(_, w)| w.session_id == session_id)
            .map(|(p, _)| p.clone())
            .collect();
        for path in paths {
            self.unwatch(&path);
        }
    }

    pub fn stop_all(&mut self) {
        for (_, watch) in self.watches.drain() {
            watch.task.abort();
        }
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watches.contains_key(path)
    }
}

impl Drop for RepoPoller {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn poll_loop(
    git: GitClient,
    events: EventSender,
    session_id: String,
    path: PathBuf,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut state = PathPollState::default();

    loop {
        ticker.tick().await;

        let text = match git.git(&path, &["status", "--porcelain", "-uall"]).await {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("Status poll of {} failed: {}", path.display(), e);
                continue;
            }
        };

        let Some(report) = state.observe(&text) else {
            continue;
        };

        let changes = SessionEvent::FileChanges {
            session_id: session_id.clone(),
            changes: report.changes,
        };
        let conflicts = SessionEvent::Conflicts {
            session_id: session_id.clone(),
            conflicts: report.conflicts,
        };
        if events.send(changes).is_err() || events.send(conflicts).is_err() {
            break;
        }
    }
}
