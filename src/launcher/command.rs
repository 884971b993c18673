//! Command resolution
//!
//! Turns an executable (or script file) plus an argument string into the
//! concrete program and argument list handed to the OS.

use std::path::{Path, PathBuf};

use crate::config::ScriptConfig;
use crate::error::ProcessError;

/// What the caller asked to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSource {
    /// A native executable
    Executable(PathBuf),
    /// A script file run through its configured interpreter
    ScriptFile(PathBuf),
}

impl CommandSource {
    pub fn path(&self) -> &Path {
        match self {
            CommandSource::Executable(p) | CommandSource::ScriptFile(p) => p,
        }
    }
}

/// Captured launch request: source plus the raw argument string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub source: CommandSource,
    pub arguments: String,
}

impl CommandSpec {
    pub fn executable(path: impl Into<PathBuf>, arguments: impl Into<String>) -> Self {
        Self {
            source: CommandSource::Executable(path.into()),
            arguments: arguments.into(),
        }
    }

    pub fn script(path: impl Into<PathBuf>, arguments: impl Into<String>) -> Self {
        Self {
            source: CommandSource::ScriptFile(path.into()),
            arguments: arguments.into(),
        }
    }

    /// Resolve the program and leading arguments
    ///
    /// Interpreter arguments and the script path come first, followed by the
    /// caller's argument string.
    pub fn resolve(&self, scripts: &ScriptConfig) -> Result<ResolvedCommand, ProcessError> {
        let user_args = Arguments::parse(&self.arguments)?;

        match &self.source {
            CommandSource::ScriptFile(path) => match scripts.interpreter_for(path) {
                Some(interpreter) => {
                    let mut prefix = interpreter.args.clone();
                    prefix.push(path.to_string_lossy().into_owned());
                    Ok(ResolvedCommand {
                        program: PathBuf::from(&interpreter.program),
                        prefix_args: prefix,
                        arguments: user_args,
                    })
                }
                None => {
                    tracing::debug!(
                        "No interpreter configured for {}, running it directly",
                        path.display()
                    );
                    Ok(ResolvedCommand::direct(path.clone(), user_args))
                }
            },
            CommandSource::Executable(path) => Ok(ResolvedCommand::direct(path.clone(), user_args)),
        }
    }
}

/// User arguments in the form the host OS expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arguments {
    /// Split argument vector (Unix)
    Split(Vec<String>),
    /// Verbatim command-line tail, parsed by the target (Windows)
    Raw(String),
}

impl Arguments {
    #[cfg(not(windows))]
    pub fn parse(arguments: &str) -> Result<Self, ProcessError> {
        split_arguments(arguments).map(Arguments::Split)
    }

    #[cfg(windows)]
    pub fn parse(arguments: &str) -> Result<Self, ProcessError> {
        if arguments.contains('\0') {
            return Err(invalid(arguments, "argument string contains a nul byte"));
        }
        Ok(Arguments::Raw(arguments.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Arguments::Split(args) => args.is_empty(),
            Arguments::Raw(raw) => raw.trim().is_empty(),
        }
    }
}

/// Fully resolved command ready for spawning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: PathBuf,
    /// Arguments always passed as separate argv entries (interpreter flags, script path)
    pub prefix_args: Vec<String>,
    pub arguments: Arguments,
}

impl ResolvedCommand {
    fn direct(program: PathBuf, arguments: Arguments) -> Self {
        Self {
            program,
            prefix_args: vec![],
            arguments,
        }
    }

    /// Display form used in logs and error messages
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.prefix_args.iter().cloned());
        match &self.arguments {
            Arguments::Split(args) => parts.extend(args.iter().cloned()),
            Arguments::Raw(raw) if !raw.is_empty() => parts.push(raw.clone()),
            Arguments::Raw(_) => {}
        }
        parts.join(" ")
    }
}

fn invalid(arguments: &str, reason: &str) -> ProcessError {
    ProcessError::InvalidArguments {
        arguments: arguments.to_string(),
        reason: reason.to_string(),
    }
}

/// Split an argument string using POSIX shell quoting rules
///
/// Whitespace separates words. Single quotes preserve everything literally,
/// double quotes allow `\"`, `\\`, `\$` and `` \` `` escapes, and a backslash
/// outside quotes escapes the next character. No expansion is performed.
pub fn split_arguments(arguments: &str) -> Result<Vec<String>, ProcessError> {
    #[derive(PartialEq)]
    enum State {
        Between,
        Word,
        Single,
        Double,
    }

    if arguments.contains('\0') {
        return Err(invalid(arguments, "argument string contains a nul byte"));
    }

    let mut words = Vec::new();
    let mut current = String::new();
    let mut state = State::Between;
    let mut chars = arguments.chars();

    while let Some(c) = chars.next() {
        match state {
            State::Between | State::Word => match c {
                c if c.is_whitespace() => {
                    if state == State::Word {
                        words.push(std::mem::take(&mut current));
                        state = State::Between;
                    }
                }
                '\'' => state = State::Single,
                '"' => state = State::Double,
                '\\' => {
                    let escaped = chars
                        .next()
                        .ok_or_else(|| invalid(arguments, "unterminated escape at end of input"))?;
                    current.push(escaped);
                    state = State::Word;
                }
                c => {
                    current.push(c);
                    state = State::Word;
                }
            },
            State::Single => match c {
                '\'' => state = State::Word,
                c => current.push(c),
            },
            State::Double => match c {
                '"' => state = State::Word,
                '\\' => match chars.next() {
                    Some(e @ ('"' | '\\' | '$' | '`')) => current.push(e),
                    Some(other) => {
                        current.push('\\');
                        current.push(other);
                    }
                    None => return Err(invalid(arguments, "unterminated double quote")),
                },
                c => current.push(c),
            },
        }
    }

    match state {
        State::Single => Err(invalid(arguments, "unterminated single quote")),
        State::Double => Err(invalid(arguments, "unterminated double quote")),
        State::Word => {
            words.push(current);
            Ok(words)
        }
        State::Between => Ok(words),
    }
}
