//! Session orchestration for coding-agent processes: one PTY-backed agent
//! per git worktree, with its terminal stream turned into session status,
//! chat messages and repository change events.

pub mod chat;
pub mod config;
pub mod detect;
pub mod error;
pub mod events;
pub mod git;
pub mod poller;
pub mod process;
pub mod session;
pub mod store;
pub mod utils;

pub use error::{OrchestratorError, Result};
pub use session::{CreateSessionRequest, Orchestrator, SessionSnapshot, SessionSource, SessionStatus};
