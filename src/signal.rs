//! Signal and result types
//!
//! A run produces a sequence of [`ProcessSignal`]s. The task aggregator folds
//! that sequence into one [`ProcessResult`].

use serde::{Deserialize, Serialize};

use crate::error::ProcessError;

/// One event in the lifecycle of a wrapped process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessSignal {
    /// A line captured from standard output
    #[serde(rename_all = "camelCase")]
    Output {
        process_id: u32,
        line_number: u64,
        data: String,
    },

    /// A line captured from standard error
    #[serde(rename_all = "camelCase")]
    Error {
        process_id: u32,
        line_number: u64,
        data: String,
    },

    /// The process exited and both output channels were drained
    #[serde(rename_all = "camelCase")]
    Exited { process_id: u32, exit_code: i32 },

    /// The run was disposed before it completed naturally
    #[serde(rename_all = "camelCase")]
    Disposed {
        #[serde(skip_serializing_if = "Option::is_none")]
        process_id: Option<u32>,
    },
}

impl ProcessSignal {
    /// Process id carried by this signal, if known
    pub fn process_id(&self) -> Option<u32> {
        match self {
            ProcessSignal::Output { process_id, .. }
            | ProcessSignal::Error { process_id, .. }
            | ProcessSignal::Exited { process_id, .. } => Some(*process_id),
            ProcessSignal::Disposed { process_id } => *process_id,
        }
    }

    /// Global line number for output/error signals
    pub fn line_number(&self) -> Option<u64> {
        match self {
            ProcessSignal::Output { line_number, .. }
            | ProcessSignal::Error { line_number, .. } => Some(*line_number),
            _ => None,
        }
    }

    /// Whether this signal ends the sequence
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessSignal::Exited { .. } | ProcessSignal::Disposed { .. }
        )
    }

    /// Convert an output/error signal into a persisted [`DataLine`]
    pub fn to_data_line(&self) -> Option<DataLine> {
        match self {
            ProcessSignal::Output {
                line_number, data, ..
            } => Some(DataLine::new(DataLineType::Output, *line_number, data.clone())),
            ProcessSignal::Error {
                line_number, data, ..
            } => Some(DataLine::new(DataLineType::Error, *line_number, data.clone())),
            _ => None,
        }
    }
}

/// Output channel a line was captured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataLineType {
    Output,
    Error,
}

impl std::fmt::Display for DataLineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataLineType::Output => write!(f, "stdout"),
            DataLineType::Error => write!(f, "stderr"),
        }
    }
}

/// A captured line with its position in the run's global ordering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataLine {
    #[serde(rename = "type")]
    pub kind: DataLineType,
    pub line_number: u64,
    pub data: String,
}

impl DataLine {
    pub fn new(kind: DataLineType, line_number: u64, data: impl Into<String>) -> Self {
        Self {
            kind,
            line_number,
            data: data.into(),
        }
    }
}

/// Aggregate of a whole run, produced once when the sequence completes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    /// Exit code of the process (unset on launch failure or disposal)
    pub exit_code: Option<i32>,
    /// Whether the run ended through disposal
    ///
    /// Also set when waiting for the process exit failed: such a run is torn
    /// down like a disposed one, so it has no exit code.
    pub is_disposed: bool,
    /// Native process id, once known
    pub process_id: Option<u32>,
    /// Captured lines in global line-number order
    pub data: Vec<DataLine>,
    /// Launch failure, if the process could not be started
    pub error: Option<ProcessError>,
}

impl ProcessResult {
    /// Result for a run that never started
    pub fn failed(error: ProcessError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    /// Fold one signal into the aggregate
    pub fn apply(&mut self, signal: ProcessSignal) {
        if let Some(pid) = signal.process_id() {
            self.process_id = Some(pid);
        }
        match signal {
            ProcessSignal::Output {
                line_number, data, ..
            } => self
                .data
                .push(DataLine::new(DataLineType::Output, line_number, data)),
            ProcessSignal::Error {
                line_number, data, ..
            } => self
                .data
                .push(DataLine::new(DataLineType::Error, line_number, data)),
            ProcessSignal::Exited { exit_code, .. } => self.exit_code = Some(exit_code),
            ProcessSignal::Disposed { .. } => self.is_disposed = true,
        }
    }

    /// Exit code 0, not disposed, no launch failure
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.is_disposed && self.error.is_none()
    }

    /// Lines captured from standard output
    pub fn output_lines(&self) -> impl Iterator<Item = &DataLine> {
        self.data.iter().filter(|l| l.kind == DataLineType::Output)
    }

    /// Lines captured from standard error
    pub fn error_lines(&self) -> impl Iterator<Item = &DataLine> {
        self.data.iter().filter(|l| l.kind == DataLineType::Error)
    }

    /// Standard output joined with newlines
    pub fn stdout_string(&self) -> String {
        join_lines(self.output_lines())
    }

    /// Standard error joined with newlines
    pub fn stderr_string(&self) -> String {
        join_lines(self.error_lines())
    }
}

fn join_lines<'a>(lines: impl Iterator<Item = &'a DataLine>) -> String {
    lines.map(|l| l.data.as_str()).collect::<Vec<_>>().join("\n")
}

/// Observable state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "exitCode", rename_all = "snake_case")]
pub enum RunPhase {
    /// Configured but not yet consumed
    NotStarted,
    /// Process spawned, sequence open
    Running,
    /// Process exited and the sequence completed
    Exited(i32),
    /// Process could not be spawned
    LaunchFailed,
    /// Run was disposed
    Disposed,
}

impl RunPhase {
    /// Whether the sequence for this run has completed
    pub fn is_completed(&self) -> bool {
        !matches!(self, RunPhase::NotStarted | RunPhase::Running)
    }
}
