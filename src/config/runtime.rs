use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::loader::Config;

pub const SHELL_RUNTIME_ID: &str = "shell";

/// How to launch one agent program.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    pub id: String,
    pub name: String,
    pub binary: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// `|`-separated alternatives marking "waiting for input".
    #[serde(default)]
    pub waiting_pattern: Option<String>,
    #[serde(default)]
    pub model_flag: Option<String>,
    /// Flags for a non-interactive turn emitting NDJSON; empty means the
    /// runtime has no print mode.
    #[serde(default)]
    pub print_args: Vec<String>,
    /// Flags for a one-shot plain-text answer (commit messages).
    #[serde(default)]
    pub oneshot_args: Vec<String>,
    #[serde(default)]
    pub continue_flag: Option<String>,
    /// Pass an interactive session's task as a trailing argument instead of
    /// typing it into the terminal.
    #[serde(default)]
    pub prompt_as_argument: bool,
}

impl RuntimeConfig {
    pub fn is_shell(&self) -> bool {
        self.id == SHELL_RUNTIME_ID
    }

    pub fn supports_print_mode(&self) -> bool {
        !self.print_args.is_empty()
    }

    fn model_args(&self, model: Option<&str>) -> Vec<String> {
        match (self.model_flag.as_deref(), model) {
            (Some(flag), Some(model)) if !model.is_empty() => {
                vec![flag.to_string(), model.to_string()]
            }
            _ => Vec::new(),
        }
    }

    /// Arguments for a resident interactive process.
    pub fn interactive_args(
        &self,
        model: Option<&str>,
        task: Option<&str>,
        resume: bool,
    ) -> Vec<String> {
        let mut args = self.args.clone();
        if self.is_shell() {
            return args;
        }
        args.extend(self.model_args(model));
        if resume {
            if let Some(flag) = &self.continue_flag {
                args.push(flag.clone());
            }
        }
        if self.prompt_as_argument {
            if let Some(task) = task.filter(|t| !t.trim().is_empty()) {
                args.push(task.to_string());
            }
        }
        args
    }

    /// Arguments for one print-mode turn.
    pub fn print_turn_args(&self, model: Option<&str>, prompt: &str, continue_turn: bool) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend(self.model_args(model));
        args.extend(self.print_args.iter().cloned());
        if continue_turn {
            if let Some(flag) = &self.continue_flag {
                args.push(flag.clone());
            }
        }
        args.push(prompt.to_string());
        args
    }
}

fn builtin(id: &str, name: &str, binary: &str) -> RuntimeConfig {
    RuntimeConfig {
        id: id.to_string(),
        name: name.to_string(),
        binary: binary.to_string(),
        args: Vec::new(),
        env: HashMap::new(),
        waiting_pattern: None,
        model_flag: None,
        print_args: Vec::new(),
        oneshot_args: Vec::new(),
        continue_flag: None,
        prompt_as_argument: false,
    }
}

pub fn builtin_runtimes() -> Vec<RuntimeConfig> {
    let claude = RuntimeConfig {
        model_flag: Some("--model".to_string()),
        print_args: ["-p", "--output-format", "stream-json", "--verbose"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        oneshot_args: vec!["-p".to_string()],
        continue_flag: Some("--continue".to_string()),
        prompt_as_argument: true,
        ..builtin("claude", "Claude Code", "claude")
    };

    let codex = RuntimeConfig {
        model_flag: Some("--model".to_string()),
        oneshot_args: vec!["exec".to_string()],
        prompt_as_argument: true,
        ..builtin("codex", "Codex", "codex")
    };

    let gemini = RuntimeConfig {
        model_flag: Some("--model".to_string()),
        oneshot_args: vec!["-p".to_string()],
        ..builtin("gemini", "Gemini CLI", "gemini")
    };

    let shell_binary = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let shell = builtin(SHELL_RUNTIME_ID, "Shell", &shell_binary);

    vec![claude, codex, gemini, shell]
}

/// Immutable runtime lookup, built once and shared by reference.
#[derive(Debug, Clone)]
pub struct RuntimeRegistry {
    runtimes: Vec<RuntimeConfig>,
}

impl RuntimeRegistry {
    pub fn new(runtimes: Vec<RuntimeConfig>) -> Self {
        Self { runtimes }
    }

    /// Built-ins, with config entries replacing or extending them by id.
    pub fn from_config(config: &Config) -> Self {
        let mut runtimes = builtin_runtimes();
        for custom in &config.runtimes {
            match runtimes.iter_mut().find(|r| r.id == custom.id) {
                Some(existing) => *existing = custom.clone(),
                None => runtimes.push(custom.clone()),
            }
        }
        Self::new(runtimes)
    }

    pub fn get_runtime_by_id(&self, id: &str) -> Option<&RuntimeConfig> {
        self.runtimes.iter().find(|r| r.id == id)
    }

    pub fn list(&self) -> &[RuntimeConfig] {
        &self.runtimes
    }
}
