use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::detect::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    System,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

pub type ChatListener = Box<dyn Fn(&ChatMessage) + Send>;

fn cursor_move_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[\d*(?:;\d*)?[A-Hf]").expect("valid cursor regex"))
}

fn spaces_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" {2,}").expect("valid spaces regex"))
}

fn trailing_space_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m) +$").expect("valid trailing space regex"))
}

fn blank_lines_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("valid blank line regex"))
}

/// Turns raw terminal output into readable chat text.
pub fn clean_terminal_text(raw: &str) -> String {
    let text = cursor_move_regex().replace_all(raw, " ");
    let text = normalize(&text).replace('\t', " ");
    let text = spaces_regex().replace_all(&text, " ");
    let text = trailing_space_regex().replace_all(&text, "");
    let text = blank_lines_regex().replace_all(&text, "\n\n");
    text.trim().to_string()
}

struct PendingOutput {
    text: String,
    last_chunk: Instant,
}

/// Per-session chat history with debounced capture of terminal output.
pub struct ChatAdapter {
    debounce: Duration,
    histories: HashMap<String, Vec<ChatMessage>>,
    listeners: HashMap<String, Vec<ChatListener>>,
    pending: HashMap<String, PendingOutput>,
}

impl ChatAdapter {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            histories: HashMap::new(),
            listeners: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn messages(&self, session_id: &str) -> &[ChatMessage] {
        self.histories
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn subscribe(&mut self, session_id: &str, listener: ChatListener) {
        self.listeners
            .entry(session_id.to_string())
            .or_default()
            .push(listener);
    }

    pub fn add_message(&mut self, session_id: &str, role: ChatRole, content: &str) -> ChatMessage {
        let message = ChatMessage::new(role, content);
        if let Some(listeners) = self.listeners.get(session_id) {
            for listener in listeners {
                listener(&message);
            }
        }
        self.histories
            .entry(session_id.to_string())
            .or_default()
            .push(message.clone());
        message
    }

    /// Buffers raw interactive output; it becomes a message once the
    /// session has been quiet for the debounce interval.
    pub fn push_output(&mut self, session_id: &str, text: &str, now: Instant) {
        let pending = self
            .pending
            .entry(session_id.to_string())
            .or_insert_with(|| PendingOutput {
                text: String::new(),
                last_chunk: now,
            });
        pending.text.push_str(text);
        pending.last_chunk = now;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|p| p.last_chunk + self.debounce)
            .min()
    }

    pub fn flush_due(&mut self, now: Instant) -> Vec<ChatMessage> {
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.last_chunk + self.debounce <= now)
            .map(|(id, _)| id.clone())
            .collect();

        due.iter().filter_map(|id| self.flush(id)).collect()
    }

    /// Flushes one session's buffer immediately. `None` when the cleaned
    /// text is empty.
    pub fn flush(&mut self, session_id: &str) -> Option<ChatMessage> {
        let pending = self.pending.remove(session_id)?;
        let content = clean_terminal_text(&pending.text);
        if content.is_empty() {
            return None;
        }
        Some(self.add_message(session_id, ChatRole::Agent, &content))
    }

    pub fn remove_session(&mut self, session_id: &str) {
        self.histories.remove(session_id);
        self.listeners.remove(session_id);
        self.pending.remove(session_id);
    }
}
