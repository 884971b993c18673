//! Error types for procsignal
//!
//! Launch failures are carried as data on the terminal result rather than
//! raised, so every variant is cloneable and serializable.

use serde::Serialize;
use thiserror::Error;

/// Failure to start (or consume) a process run
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessError {
    /// Executable could not be found
    #[error("Executable not found: {program}")]
    NotFound { program: String },

    /// Executable exists but may not be executed
    #[error("Permission denied: {program}")]
    PermissionDenied { program: String },

    /// Argument string could not be turned into an argument list
    #[error("Invalid arguments '{arguments}': {reason}")]
    InvalidArguments { arguments: String, reason: String },

    /// Any other OS-level spawn failure
    #[error("Failed to spawn {program}: {message}")]
    SpawnFailed { program: String, message: String },

    /// The run already has a consumer
    #[error("Process run already has a subscriber")]
    AlreadySubscribed,

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ProcessError {
    /// Classify an I/O error returned by process creation
    pub fn from_spawn(program: impl Into<String>, err: &std::io::Error) -> Self {
        let program = program.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => ProcessError::NotFound { program },
            std::io::ErrorKind::PermissionDenied => ProcessError::PermissionDenied { program },
            std::io::ErrorKind::InvalidInput => ProcessError::InvalidArguments {
                arguments: program,
                reason: err.to_string(),
            },
            _ => ProcessError::SpawnFailed {
                program,
                message: err.to_string(),
            },
        }
    }

    /// Stable identifier for the error kind
    pub fn error_type(&self) -> &'static str {
        match self {
            ProcessError::NotFound { .. } => "not_found",
            ProcessError::PermissionDenied { .. } => "permission_denied",
            ProcessError::InvalidArguments { .. } => "invalid_arguments",
            ProcessError::SpawnFailed { .. } => "spawn_failed",
            ProcessError::AlreadySubscribed => "already_subscribed",
            ProcessError::Config { .. } => "config_error",
        }
    }

    /// Hint for resolving the failure
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ProcessError::NotFound { program } => Some(format!(
                "Check that '{}' exists and is on PATH, or pass an absolute path",
                program
            )),
            ProcessError::PermissionDenied { program } => suggest_fix(program, "Permission denied"),
            ProcessError::InvalidArguments { reason, .. } => suggest_fix("", reason),
            ProcessError::SpawnFailed { program, message } => suggest_fix(program, message),
            ProcessError::AlreadySubscribed => Some(
                "Each run supports one consumer. Build a new observable to run the process again."
                    .to_string(),
            ),
            ProcessError::Config { .. } => {
                Some("Check your procsignal configuration file".to_string())
            }
        }
    }
}

/// Suggest fixes for common spawn failure messages
pub fn suggest_fix(program: &str, message: &str) -> Option<String> {
    if message.contains("Permission denied") {
        if program.ends_with(".sh") {
            return Some(format!(
                "Script is not executable. Run 'chmod +x {}' or launch it from a file so an interpreter is used.",
                program
            ));
        }
        return Some(
            "Permission denied. Check file permissions or run with appropriate access.".to_string(),
        );
    }

    if message.contains("unterminated") {
        return Some("Close every quote in the argument string.".to_string());
    }

    if message.contains("nul byte") {
        return Some("Arguments may not contain NUL characters.".to_string());
    }

    if message.contains("Exec format error") {
        return Some(
            "File is not a native executable. Add a shebang line or launch it as a script file."
                .to_string(),
        );
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = ProcessError::NotFound {
            program: "/nonexistent".to_string(),
        };
        assert_eq!(err.to_string(), "Executable not found: /nonexistent");
        assert_eq!(err.error_type(), "not_found");
        assert!(err.suggestion().unwrap().contains("PATH"));
    }

    #[test]
    fn test_from_spawn_classifies_io_kinds() {
        let not_found = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(
            ProcessError::from_spawn("x", &not_found),
            ProcessError::NotFound { .. }
        ));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            ProcessError::from_spawn("x", &denied),
            ProcessError::PermissionDenied { .. }
        ));

        let other = std::io::Error::other("boom");
        match ProcessError::from_spawn("x", &other) {
            ProcessError::SpawnFailed { program, message } => {
                assert_eq!(program, "x");
                assert!(message.contains("boom"));
            }
            e => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_invalid_arguments_error() {
        let err = ProcessError::InvalidArguments {
            arguments: "\"abc".to_string(),
            reason: "unterminated double quote".to_string(),
        };
        assert!(err.to_string().contains("unterminated"));
        assert!(err.suggestion().unwrap().contains("quote"));
    }

    #[test]
    fn test_error_serialization() {
        let err = ProcessError::SpawnFailed {
            program: "make".to_string(),
            message: "boom".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("spawn_failed"));
        assert!(json.contains("boom"));
    }

    #[test]
    fn test_suggest_fix_permission_denied_script() {
        let suggestion = suggest_fix("./run.sh", "Permission denied (os error 13)");
        assert!(suggestion.unwrap().contains("chmod"));
    }

    #[test]
    fn test_suggest_fix_exec_format() {
        let suggestion = suggest_fix("./data.txt", "Exec format error (os error 8)");
        assert!(suggestion.unwrap().contains("shebang"));
    }

    #[test]
    fn test_suggest_fix_no_match() {
        assert!(suggest_fix("some command", "some random error").is_none());
    }
}
