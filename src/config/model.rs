//! Configuration model for procsignal
//!
//! Launch settings applied to every run plus the interpreter table used
//! when a process is created from a script file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct Config {
    /// Settings applied when spawning processes
    #[serde(default)]
    pub launch: LaunchConfig,

    /// Script interpreter table
    #[serde(default)]
    pub scripts: ScriptConfig,
}

/// Settings applied when spawning processes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LaunchConfig {
    /// Working directory (None = inherit from the caller)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Environment variables to set on the child
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Start the child with an empty environment before applying `env`
    #[serde(default)]
    pub env_clear: bool,

    /// Kill the native process when the run is disposed
    #[serde(default = "default_true")]
    pub kill_on_dispose: bool,

    /// Suppress the console window on Windows
    #[serde(default = "default_true")]
    pub hide_window: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            env: HashMap::new(),
            env_clear: false,
            kill_on_dispose: true,
            hide_window: true,
        }
    }
}

/// Interpreter used to run a script file
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct InterpreterConfig {
    /// Interpreter executable
    pub program: String,

    /// Arguments placed before the script path
    #[serde(default)]
    pub args: Vec<String>,
}

impl InterpreterConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Script interpreter table keyed by file extension (without the dot)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ScriptConfig {
    #[serde(default = "default_interpreters")]
    pub interpreters: HashMap<String, InterpreterConfig>,
}

fn default_interpreters() -> HashMap<String, InterpreterConfig> {
    let mut map = HashMap::new();
    map.insert("sh".to_string(), InterpreterConfig::new("sh"));
    map.insert("bash".to_string(), InterpreterConfig::new("bash"));
    map.insert("py".to_string(), InterpreterConfig::new("python3"));
    map.insert(
        "ps1".to_string(),
        InterpreterConfig::new("powershell").with_args([
            "-NoProfile",
            "-ExecutionPolicy",
            "Bypass",
            "-File",
        ]),
    );
    let cmd = InterpreterConfig::new("cmd").with_args(["/C"]);
    map.insert("cmd".to_string(), cmd.clone());
    map.insert("bat".to_string(), cmd);
    map
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            interpreters: default_interpreters(),
        }
    }
}

impl ScriptConfig {
    /// Find the interpreter for a script path by its extension
    pub fn interpreter_for(&self, path: &Path) -> Option<&InterpreterConfig> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.interpreters.get(&ext)
    }
}
