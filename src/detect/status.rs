use regex::Regex;
use std::sync::OnceLock;

use super::ansi::detection_window;
use crate::session::SessionStatus;

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("Invalid built-in status pattern {:?}: {}", p, e);
                None
            }
        })
        .collect()
}

fn builtin_waiting(runtime_id: &str) -> Vec<Regex> {
    let patterns: &[&str] = match runtime_id {
        "claude" => &[
            r"❯\s",
            r"(?i)do you want to",
            r"(?i)\bwaiting for input\b",
            r"(?i)press enter to",
        ],
        "codex" => &[r"(?m)^\s*›\s", r"(?i)allow command\?", r"(?i)\bapprove\b.*\?"],
        "gemini" => &[
            r"(?i)type your message",
            r"(?i)waiting for user confirmation",
        ],
        "shell" => &[r"[$#%>]\s*$"],
        _ => &[],
    };
    compile_all(patterns)
}

fn shared_errors() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile_all(&[
            r"(?i)\berror:",
            r"(?i)\bfatal:",
            r"Traceback \(most recent call last\)",
            r"panicked at",
            r"(?m)^\s+at .+\(.+:\d+:\d+\)",
            r"(?i)command not found",
        ])
    })
}

/// Custom waiting patterns are `|`-separated alternatives. When the whole
/// pattern is not a valid regex each alternative is matched literally.
fn compile_custom(pattern: &str) -> Option<Regex> {
    if pattern.trim().is_empty() {
        return None;
    }
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(_) => {
            let escaped: Vec<String> = pattern
                .split('|')
                .filter(|alt| !alt.is_empty())
                .map(regex::escape)
                .collect();
            Regex::new(&escaped.join("|")).ok()
        }
    }
}

/// Per-runtime status classifier. Waiting patterns outrank error patterns;
/// no match means the agent is still running.
#[derive(Debug, Clone)]
pub struct StatusMatcher {
    waiting: Vec<Regex>,
}

impl StatusMatcher {
    pub fn for_runtime(runtime_id: &str, custom_waiting: Option<&str>) -> Self {
        let mut waiting = builtin_waiting(runtime_id);
        if let Some(custom) = custom_waiting.and_then(compile_custom) {
            waiting.push(custom);
        }
        Self { waiting }
    }

    /// Classifies already-normalised text.
    pub fn classify(&self, window: &str) -> SessionStatus {
        if self.waiting.iter().any(|re| re.is_match(window)) {
            return SessionStatus::Waiting;
        }
        if shared_errors().iter().any(|re| re.is_match(window)) {
            return SessionStatus::Error;
        }
        SessionStatus::Running
    }

    /// Classifies the trailing window of raw terminal output.
    pub fn detect(&self, raw: &str) -> SessionStatus {
        self.classify(&detection_window(raw))
    }
}

pub fn detect_status(raw: &str, runtime_id: &str) -> SessionStatus {
    StatusMatcher::for_runtime(runtime_id, None).detect(raw)
}
