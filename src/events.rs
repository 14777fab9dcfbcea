use serde::Serialize;
use tokio::sync::mpsc;

use crate::git::FileChange;
use crate::session::SessionStatus;

/// Everything consumers learn about sessions arrives as one of these.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    StatusChanged {
        session_id: String,
        status: SessionStatus,
    },
    Output {
        session_id: String,
        data: String,
    },
    Exited {
        session_id: String,
        code: Option<i32>,
    },
    AdditionalDirsChanged {
        session_id: String,
        dirs: Vec<String>,
    },
    PreviewUrl {
        session_id: String,
        url: String,
    },
    FileChanges {
        session_id: String,
        changes: Vec<FileChange>,
    },
    Conflicts {
        session_id: String,
        conflicts: Vec<String>,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::StatusChanged { session_id, .. }
            | SessionEvent::Output { session_id, .. }
            | SessionEvent::Exited { session_id, .. }
            | SessionEvent::AdditionalDirsChanged { session_id, .. }
            | SessionEvent::PreviewUrl { session_id, .. }
            | SessionEvent::FileChanges { session_id, .. }
            | SessionEvent::Conflicts { session_id, .. } => session_id,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
