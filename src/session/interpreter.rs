//! Turns process output into session state.
//!
//! Interactive sessions are classified from their terminal text. Print-mode
//! sessions speak a line-delimited JSON protocol, one process per turn.
//! Side effects the interpreter cannot perform itself go through
//! [`InterpreterHooks`].

use serde::Deserialize;

use super::model::{PrintState, Session, SessionKind, SessionStatus};
use crate::chat::ChatRole;
use crate::detect::{detect_added_directory, detect_url};
use crate::events::SessionEvent;

pub trait InterpreterHooks {
    fn emit(&mut self, event: SessionEvent);
    fn persist_metadata(&mut self, session: &Session);
    fn watch_directory(&mut self, session_id: &str, dir: &str);
    fn dev_server_needed(&mut self, session_id: &str);
    fn chat_output(&mut self, session_id: &str, text: &str);
    fn chat_message(&mut self, session_id: &str, role: ChatRole, content: &str);
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    Assistant {
        message: AssistantMessage,
    },
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        result: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl AssistantMessage {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn print_state(session: &mut Session) -> Option<&mut PrintState> {
    match &mut session.kind {
        SessionKind::PrintMode(state) => Some(state),
        _ => None,
    }
}

/// Sets the status, emitting an event only when it actually changes.
pub fn set_status(session: &mut Session, status: SessionStatus, hooks: &mut dyn InterpreterHooks) {
    if session.status == status {
        return;
    }
    session.status = status;
    hooks.emit(SessionEvent::StatusChanged {
        session_id: session.id.clone(),
        status,
    });
}

/// First detected preview URL wins; later ones are ignored.
fn record_preview_url(session: &mut Session, url: String, hooks: &mut dyn InterpreterHooks) {
    if session.preview_url.is_some() {
        return;
    }
    tracing::info!("Session {} preview at {}", session.id, url);
    session.preview_url = Some(url.clone());
    hooks.emit(SessionEvent::PreviewUrl {
        session_id: session.id.clone(),
        url,
    });
    hooks.persist_metadata(session);
}

fn record_added_directory(session: &mut Session, dir: String, hooks: &mut dyn InterpreterHooks) {
    if !session.additional_dirs.is_empty() {
        return;
    }
    tracing::info!("Session {} added directory {}", session.id, dir);
    session.additional_dirs.push(dir.clone());
    hooks.watch_directory(&session.id, &dir);
    hooks.emit(SessionEvent::AdditionalDirsChanged {
        session_id: session.id.clone(),
        dirs: session.additional_dirs.clone(),
    });
    hooks.persist_metadata(session);
}

pub fn on_interactive_data(session: &mut Session, chunk: &str, hooks: &mut dyn InterpreterHooks) {
    session.output.push(chunk);
    hooks.emit(SessionEvent::Output {
        session_id: session.id.clone(),
        data: chunk.to_string(),
    });
    hooks.chat_output(&session.id, chunk);

    let status = session.matcher.detect(session.output.as_str());
    set_status(session, status, hooks);

    if session.additional_dirs.is_empty() {
        if let Some(dir) = detect_added_directory(session.output.as_str()) {
            record_added_directory(session, dir, hooks);
        }
    }
    if session.preview_url.is_none() {
        if let Some(url) = detect_url(session.output.as_str()) {
            record_preview_url(session, url, hooks);
        }
    }
}

pub fn on_interactive_exit(session: &mut Session, hooks: &mut dyn InterpreterHooks) {
    set_status(session, SessionStatus::Done, hooks);
}

pub fn on_print_data(session: &mut Session, chunk: &str, hooks: &mut dyn InterpreterHooks) {
    session.output.push(chunk);
    hooks.emit(SessionEvent::Output {
        session_id: session.id.clone(),
        data: chunk.to_string(),
    });

    let lines = match print_state(session) {
        Some(state) => state.lines.push(chunk),
        None => return,
    };
    for line in lines {
        handle_stream_line(session, &line, hooks);
    }
}

fn handle_stream_line(session: &mut Session, line: &str, hooks: &mut dyn InterpreterHooks) {
    let event: StreamEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!("Session {}: dropping non-JSON line ({}): {}", session.id, e, line);
            return;
        }
    };

    match event {
        StreamEvent::Assistant { message } => {
            let text = message.text();
            if text.trim().is_empty() {
                return;
            }
            hooks.chat_message(&session.id, ChatRole::Agent, &text);
            if let Some(state) = print_state(session) {
                state.assistant_replied = true;
            }
            if let Some(url) = detect_url(&text) {
                record_preview_url(session, url, hooks);
            }
        }
        StreamEvent::Result { subtype, result } => {
            let assistant_replied = match print_state(session) {
                Some(state) => {
                    state.result_seen = true;
                    state.assistant_replied
                }
                None => return,
            };

            if subtype == "success" {
                if !assistant_replied {
                    if let Some(result) = result.filter(|r| !r.trim().is_empty()) {
                        hooks.chat_message(&session.id, ChatRole::Agent, &result);
                    }
                }
                set_status(session, SessionStatus::Waiting, hooks);
            } else {
                let detail = result.unwrap_or_else(|| subtype.clone());
                hooks.chat_message(
                    &session.id,
                    ChatRole::System,
                    &format!("Run ended with {subtype}: {detail}"),
                );
                set_status(session, SessionStatus::Error, hooks);
            }
        }
        StreamEvent::Other => {}
    }
}

/// End of one print-mode turn. Never moves the session back to running.
pub fn on_print_exit(session: &mut Session, code: Option<i32>, hooks: &mut dyn InterpreterHooks) {
    let remainder = print_state(session).and_then(|state| state.lines.take_remainder());
    if let Some(line) = remainder {
        handle_stream_line(session, &line, hooks);
    }

    let (turn, result_seen) = match print_state(session) {
        Some(state) => (state.turn, state.result_seen),
        None => return,
    };

    if code != Some(0) && !result_seen {
        hooks.chat_message(
            &session.id,
            ChatRole::System,
            &format!("Agent exited with code {}", code.map_or("unknown".to_string(), |c| c.to_string())),
        );
        set_status(session, SessionStatus::Error, hooks);
        return;
    }

    if turn == 1 && session.preview_url.is_none() && session.status != SessionStatus::Error {
        hooks.dev_server_needed(&session.id);
        return;
    }

    if session.status == SessionStatus::Running {
        set_status(session, SessionStatus::Waiting, hooks);
    }
}

pub fn on_dev_server_data(session: &mut Session, chunk: &str, hooks: &mut dyn InterpreterHooks) {
    hooks.emit(SessionEvent::Output {
        session_id: session.id.clone(),
        data: chunk.to_string(),
    });

    let url = match print_state(session).and_then(|state| state.dev_server.as_mut()) {
        Some(dev) => {
            dev.output.push(chunk);
            detect_url(dev.output.as_str())
        }
        None => return,
    };

    if let Some(url) = url {
        record_preview_url(session, url, hooks);
        if session.status == SessionStatus::Running {
            set_status(session, SessionStatus::Waiting, hooks);
        }
    }
}

pub fn on_dev_server_exit(session: &mut Session, code: Option<i32>, hooks: &mut dyn InterpreterHooks) {
    tracing::info!("Session {} dev server exited with {:?}", session.id, code);
    if let Some(state) = print_state(session) {
        state.dev_server = None;
    }
    if session.status == SessionStatus::Running {
        set_status(session, SessionStatus::Waiting, hooks);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    #[derive(Default)]
    pub struct RecordingHooks {
        pub events: Vec<SessionEvent>,
        pub persisted: usize,
        pub watched: Vec<String>,
        pub dev_server_requests: Vec<String>,
        pub chat_output: String,
        pub chat: Vec<(ChatRole, String)>,
    }

    impl RecordingHooks {
        pub fn statuses(&self) -> Vec<SessionStatus> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    SessionEvent::StatusChanged { status, .. } => Some(*status),
                    _ => None,
                })
                .collect()
        }
    }

    impl InterpreterHooks for RecordingHooks {
        fn emit(&mut self, event: SessionEvent) {
            self.events.push(event);
        }

        fn persist_metadata(&mut self, _session: &Session) {
            self.persisted += 1;
        }

        fn watch_directory(&mut self, _session_id: &str, dir: &str) {
            self.watched.push(dir.to_string());
        }

        fn dev_server_needed(&mut self, session_id: &str) {
            self.dev_server_requests.push(session_id.to_string());
        }

        fn chat_output(&mut self, _session_id: &str, text: &str) {
            self.chat_output.push_str(text);
        }

        fn chat_message(&mut self, _session_id: &str, role: ChatRole, content: &str) {
            self.chat.push((role, content.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingHooks;
    use super::*;
    use crate::detect::StatusMatcher;
    use crate::session::model::{DevServer, Workspace};
    use std::path::PathBuf;

    fn session_with(kind: SessionKind) -> Session {
        let mut session = Session::new(
            "s1".into(),
            "p1".into(),
            "claude".into(),
            "proj/oslo".into(),
            PathBuf::from("/wt"),
            Workspace::Worktree,
            kind,
            StatusMatcher::for_runtime("claude", None),
        );
        session.status = SessionStatus::Running;
        session.pty_id = Some("pty-1".into());
        session
    }

    fn interactive() -> Session {
        session_with(SessionKind::Interactive {
            task_description: None,
            model: None,
        })
    }

    fn print_mode(turn: u32) -> Session {
        session_with(SessionKind::PrintMode(PrintState {
            turn,
            ..Default::default()
        }))
    }

    fn assistant(text: &str) -> String {
        format!(
            "{}\n",
            serde_json::json!({"type": "assistant", "message": {"content": [{"type": "text", "text": text}]}})
        )
    }

    fn result(subtype: &str, text: &str) -> String {
        format!(
            "{}\n",
            serde_json::json!({"type": "result", "subtype": subtype, "result": text, "is_error": subtype != "success"})
        )
    }

    #[test]
    fn interactive_status_change_fires_once() {
        let mut session = interactive();
        let mut hooks = RecordingHooks::default();

        on_interactive_data(&mut session, "thinking...", &mut hooks);
        on_interactive_data(&mut session, "\n❯ ", &mut hooks);
        on_interactive_data(&mut session, " ", &mut hooks);

        assert_eq!(
            hooks.statuses(),
            vec![SessionStatus::Waiting],
            "on_interactive_data: only actual changes should be emitted"
        );
        assert_eq!(hooks.chat_output, "thinking...\n❯  ");
    }

    #[test]
    fn interactive_added_directory_first_detection_wins() {
        let mut session = interactive();
        let mut hooks = RecordingHooks::default();

        on_interactive_data(&mut session, "Added /data/one as a working directory\n", &mut hooks);
        on_interactive_data(&mut session, "Added /data/two as a working directory\n", &mut hooks);

        assert_eq!(session.additional_dirs, vec!["/data/one"]);
        assert_eq!(hooks.watched, vec!["/data/one"]);
        assert_eq!(hooks.persisted, 1);
    }

    #[test]
    fn interactive_preview_url_first_detection_wins() {
        let mut session = interactive();
        let mut hooks = RecordingHooks::default();

        on_interactive_data(&mut session, "Local: http://localhost:5173/\n", &mut hooks);
        on_interactive_data(&mut session, "Also http://localhost:8080\n", &mut hooks);

        assert_eq!(session.preview_url.as_deref(), Some("http://localhost:5173/"));
        let urls: Vec<_> = hooks
            .events
            .iter()
            .filter(|e| matches!(e, SessionEvent::PreviewUrl { .. }))
            .collect();
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn print_assistant_split_across_chunks_becomes_one_message() {
        let mut session = print_mode(1);
        let mut hooks = RecordingHooks::default();
        let line = assistant("Done! Open http://localhost:3000");
        let (a, b) = line.split_at(20);

        on_print_data(&mut session, a, &mut hooks);
        assert!(hooks.chat.is_empty());
        on_print_data(&mut session, b, &mut hooks);

        assert_eq!(hooks.chat, vec![(ChatRole::Agent, "Done! Open http://localhost:3000".to_string())]);
        assert_eq!(session.preview_url.as_deref(), Some("http://localhost:3000"));
    }

    #[test]
    fn print_garbage_lines_are_dropped() {
        let mut session = print_mode(1);
        let mut hooks = RecordingHooks::default();
        on_print_data(&mut session, "not json\n{\"type\":\"system\"}\n", &mut hooks);
        assert!(hooks.chat.is_empty());
        assert_eq!(session.status, SessionStatus::Running);
    }

    #[test]
    fn print_result_sets_waiting_and_falls_back_to_result_text() {
        let mut session = print_mode(2);
        let mut hooks = RecordingHooks::default();

        on_print_data(&mut session, &result("success", "All set."), &mut hooks);

        assert_eq!(session.status, SessionStatus::Waiting);
        assert_eq!(hooks.chat, vec![(ChatRole::Agent, "All set.".to_string())]);
    }

    #[test]
    fn print_result_after_assistant_is_not_duplicated() {
        let mut session = print_mode(2);
        let mut hooks = RecordingHooks::default();

        on_print_data(&mut session, &assistant("Here you go"), &mut hooks);
        on_print_data(&mut session, &result("success", "Here you go"), &mut hooks);

        assert_eq!(hooks.chat.len(), 1);
    }

    #[test]
    fn print_error_result_sets_error() {
        let mut session = print_mode(2);
        let mut hooks = RecordingHooks::default();
        on_print_data(&mut session, &result("error_max_turns", "limit"), &mut hooks);
        assert_eq!(session.status, SessionStatus::Error);
    }

    #[test]
    fn print_success_result_waits_even_when_flagged_as_error() {
        let mut session = print_mode(2);
        let mut hooks = RecordingHooks::default();
        let line = serde_json::json!({"type": "result", "subtype": "success", "result": "done", "is_error": true});

        on_print_data(&mut session, &format!("{line}\n"), &mut hooks);

        assert_eq!(
            session.status,
            SessionStatus::Waiting,
            "handle_stream_line: a success result always waits for the next prompt"
        );
    }

    #[test]
    fn result_then_late_exit_keeps_waiting() {
        let mut session = print_mode(2);
        let mut hooks = RecordingHooks::default();

        on_print_data(&mut session, &result("success", "ok"), &mut hooks);
        on_print_exit(&mut session, Some(0), &mut hooks);

        assert_eq!(session.status, SessionStatus::Waiting);
        assert_eq!(
            hooks.statuses(),
            vec![SessionStatus::Waiting],
            "on_print_exit: a late exit must never bounce the status back to running"
        );
    }

    #[test]
    fn first_turn_exit_without_url_requests_dev_server() {
        let mut session = print_mode(1);
        let mut hooks = RecordingHooks::default();
        on_print_data(&mut session, &result("success", "ok"), &mut hooks);
        on_print_exit(&mut session, Some(0), &mut hooks);
        assert_eq!(hooks.dev_server_requests, vec!["s1"]);
    }

    #[test]
    fn first_turn_exit_with_url_skips_dev_server() {
        let mut session = print_mode(1);
        let mut hooks = RecordingHooks::default();
        on_print_data(&mut session, &assistant("running at http://localhost:4000"), &mut hooks);
        on_print_exit(&mut session, Some(0), &mut hooks);
        assert!(hooks.dev_server_requests.is_empty());
        assert_eq!(session.status, SessionStatus::Waiting);
    }

    #[test]
    fn exit_parses_unterminated_final_line() {
        let mut session = print_mode(2);
        let mut hooks = RecordingHooks::default();
        on_print_data(&mut session, result("success", "tail").trim_end(), &mut hooks);
        assert_eq!(session.status, SessionStatus::Running);
        on_print_exit(&mut session, Some(0), &mut hooks);
        assert_eq!(hooks.chat, vec![(ChatRole::Agent, "tail".to_string())]);
        assert_eq!(session.status, SessionStatus::Waiting);
    }

    #[test]
    fn failed_exit_without_result_is_error() {
        let mut session = print_mode(1);
        let mut hooks = RecordingHooks::default();
        on_print_exit(&mut session, Some(1), &mut hooks);
        assert_eq!(session.status, SessionStatus::Error);
        assert!(hooks.dev_server_requests.is_empty());
    }

    #[test]
    fn dev_server_url_promotes_to_waiting() {
        let mut session = print_mode(1);
        if let SessionKind::PrintMode(state) = &mut session.kind {
            state.dev_server = Some(DevServer {
                pty_id: "dev-1".into(),
                output: Default::default(),
            });
        }
        let mut hooks = RecordingHooks::default();

        on_dev_server_data(&mut session, "VITE ready\n  ➜  Local:   http://localhost:", &mut hooks);
        assert_eq!(session.status, SessionStatus::Running);
        on_dev_server_data(&mut session, "5173/\n", &mut hooks);

        assert_eq!(session.preview_url.as_deref(), Some("http://localhost:5173/"));
        assert_eq!(session.status, SessionStatus::Waiting);
    }

    #[test]
    fn dev_server_exit_promotes_to_waiting() {
        let mut session = print_mode(1);
        let mut hooks = RecordingHooks::default();
        on_dev_server_exit(&mut session, Some(1), &mut hooks);
        assert_eq!(session.status, SessionStatus::Waiting);
    }
}
