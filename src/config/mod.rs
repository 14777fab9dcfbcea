mod loader;
mod runtime;

pub use loader::{Config, PreviewConfig, TerminalConfig, DEFAULT_COMMIT_PROMPT};
pub use runtime::{builtin_runtimes, RuntimeConfig, RuntimeRegistry, SHELL_RUNTIME_ID};
