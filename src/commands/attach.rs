use anyhow::Result;
use std::io::{Read, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use fjord::chat::{ChatMessage, ChatRole};
use fjord::events::{EventReceiver, SessionEvent};
use fjord::session::{Orchestrator, SessionSnapshot, SessionStatus};

/// Ctrl-]
const DETACH_KEY: u8 = 0x1d;

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

/// Runs the session in the foreground until its process exits, the user
/// detaches, or stdin closes. Every process is stopped on the way out;
/// the worktree stays so the session can be resumed.
pub async fn attach(
    orchestrator: &mut Orchestrator,
    events: &mut EventReceiver,
    session: &SessionSnapshot,
) -> Result<()> {
    let result = if session.non_interactive {
        chat_loop(orchestrator, events, session).await
    } else {
        terminal_loop(orchestrator, events, session).await
    };
    orchestrator.kill_all();
    result
}

fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<Vec<u8>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut buffer = [0_u8; 1024];
        loop {
            match stdin.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(read) => {
                    if tx.send(buffer[..read].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

async fn terminal_loop(
    orchestrator: &mut Orchestrator,
    events: &mut EventReceiver,
    session: &SessionSnapshot,
) -> Result<()> {
    println!(
        "Attached to {} ({}) in {}. Press Ctrl-] to leave.\r",
        session.branch,
        session.runtime_id,
        session.worktree_path.display()
    );

    let raw = RawModeGuard::enable()?;
    let mut input = spawn_stdin_reader();
    let mut stdout = std::io::stdout();
    let mut exit_code = None;

    loop {
        tokio::select! {
            _ = orchestrator.pump() => {}
            Some(event) = events.recv() => {
                if event.session_id() != session.id {
                    continue;
                }
                match event {
                    SessionEvent::Output { data, .. } => {
                        stdout.write_all(data.as_bytes())?;
                        stdout.flush()?;
                    }
                    SessionEvent::Exited { code, .. } => {
                        exit_code = Some(code);
                        break;
                    }
                    SessionEvent::StatusChanged { status, .. } => {
                        tracing::info!("Session {} is {}", session.id, status);
                    }
                    SessionEvent::PreviewUrl { url, .. } => {
                        tracing::info!("Session {} preview at {}", session.id, url);
                    }
                    other => tracing::debug!("{:?}", other),
                }
            }
            Some(bytes) = input.recv() => {
                if bytes.contains(&DETACH_KEY) {
                    break;
                }
                if let Err(e) = orchestrator.write_raw(&session.id, &String::from_utf8_lossy(&bytes)) {
                    tracing::warn!("Input to {} failed: {}", session.id, e);
                    break;
                }
            }
        }
    }

    drop(raw);
    match exit_code {
        Some(Some(code)) => println!("\nProcess exited with code {}.", code),
        Some(None) => println!("\nProcess exited."),
        None => println!("\nDetached. Resume with 'fjord resume {}'.", session.branch),
    }
    Ok(())
}

fn print_message(message: &ChatMessage) {
    match message.role {
        ChatRole::User => {}
        ChatRole::System => println!("-- {}", message.content),
        ChatRole::Agent => println!("{}\n", message.content),
    }
}

async fn chat_loop(
    orchestrator: &mut Orchestrator,
    events: &mut EventReceiver,
    session: &SessionSnapshot,
) -> Result<()> {
    for message in orchestrator.chat_messages(&session.id) {
        print_message(message);
    }
    orchestrator.subscribe_chat(&session.id, Box::new(print_message));
    if session.status == SessionStatus::Waiting {
        print_prompt();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = orchestrator.pump() => {}
            Some(event) = events.recv() => {
                if event.session_id() != session.id {
                    continue;
                }
                match event {
                    SessionEvent::StatusChanged { status: SessionStatus::Waiting, .. } => print_prompt(),
                    SessionEvent::StatusChanged { status: SessionStatus::Error, .. } => {
                        eprintln!("The turn ended with an error.");
                        print_prompt();
                    }
                    SessionEvent::PreviewUrl { url, .. } => println!("Preview: {}", url),
                    _ => {}
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => print_prompt(),
                    Some(line) => orchestrator.send_input(&session.id, line.trim())?,
                    None => break,
                }
            }
        }
    }

    Ok(())
}

fn print_prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}
