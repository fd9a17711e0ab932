use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::{error::Error, metadata::Metadata};

/// How a cell is handed to the compiler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileMode {
    /// Metadata-aware: header parsing, auto-wrap and scanf echo, source fed on stdin
    #[default]
    Stdin,
    /// Plain: the raw cell is written to a `.c` file and compiled as-is
    SourceFile,
}

impl FromStr for CompileMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdin" | "gcc" => Ok(CompileMode::Stdin),
            "source_file" | "file" | "gcc_file" => Ok(CompileMode::SourceFile),
            _ => Err(format!("Unsupported compile mode: {}", s)),
        }
    }
}

/// Cell execution request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Raw cell text, header included
    pub cell: String,
    /// Compilation path to take
    #[serde(default)]
    pub mode: CompileMode,
    /// Wall-clock limit for the compiled program
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    /// Environment variables for the compiled program
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
}

impl ExecutionRequest {
    pub fn new(cell: impl Into<String>, mode: CompileMode, timeout: Duration) -> Self {
        Self {
            cell: cell.into(),
            mode,
            timeout,
            env_vars: HashMap::new(),
        }
    }
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStats {
    /// Peak memory usage in kilobytes
    pub max_rss: u64,
    /// Number of page faults that didn't require I/O
    pub minor_page_faults: u64,
    /// Number of page faults that required I/O
    pub major_page_faults: u64,
    /// Number of voluntary context switches
    pub voluntary_context_switches: u64,
    /// Number of involuntary context switches
    pub involuntary_context_switches: u64,
    /// Total user CPU time
    #[serde(with = "duration_millis")]
    pub user_time: Duration,
    /// Total system CPU time
    #[serde(with = "duration_millis")]
    pub system_time: Duration,
    #[serde(with = "duration_millis")]
    pub execution_time: Duration,
}

/// Captured compiler streams
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CompilerOutput {
    /// Text to show when compilation failed. gcc writes diagnostics to stderr,
    /// fall back to stdout for compilers that don't.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Execution status
    pub status: ExecutionStatus,
    /// Program output (stdout)
    pub stdout: String,
    /// Program errors (stderr)
    pub stderr: String,
    /// What the compiler printed
    pub compiler: CompilerOutput,
    /// Header parsed from the cell, empty for plain compilation
    pub metadata: Metadata,
    /// Exit code of the program, `None` when it never ran or was killed
    pub exit_code: Option<i32>,
    /// Signal that terminated the program, if any
    #[serde(default)]
    pub signal: Option<i32>,
    /// Process statistics
    pub process_stats: ProcessStats,
}

impl ExecutionResult {
    pub(crate) fn compilation_failed(compiler: CompilerOutput, metadata: Metadata) -> Self {
        Self {
            status: ExecutionStatus::CompilationError,
            stdout: String::new(),
            stderr: String::new(),
            compiler,
            metadata,
            exit_code: None,
            signal: None,
            process_stats: ProcessStats::default(),
        }
    }

    /// One-line description of why the program did not succeed
    pub fn failure_reason(&self) -> String {
        match (self.status, self.exit_code, self.signal) {
            (ExecutionStatus::Success, _, _) => String::new(),
            (ExecutionStatus::CompilationError, _, _) => "compilation failed".to_string(),
            (ExecutionStatus::Timeout, _, Some(signal)) if signal == Signal::SIGXCPU as i32 => {
                "program exceeded its CPU time limit".to_string()
            }
            (ExecutionStatus::Timeout, _, _) => format!(
                "program timed out after {} seconds",
                self.process_stats.execution_time.as_secs()
            ),
            (_, Some(code), _) => format!("program exited with status {}", code),
            (_, None, Some(signal)) => format!("program was terminated by signal {}", signal),
            (_, None, None) => "program was terminated".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Convert a failed outcome back into an [`Error`] for `?` propagation
    pub fn into_result(self) -> Result<Self, Error> {
        match self.status {
            ExecutionStatus::Success => Ok(self),
            ExecutionStatus::CompilationError => Err(Error::CompilationError(
                self.compiler.diagnostic().to_string(),
            )),
            ExecutionStatus::Error => Err(Error::ExecutionError(self.failure_reason())),
            ExecutionStatus::Timeout => Err(Error::Timeout(
                self.process_stats.execution_time.as_secs(),
            )),
        }
    }
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Error,
    Timeout,
    CompilationError,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::CompilationError => "compilation_error",
        };
        f.write_str(s)
    }
}

/// Resource limits for the compiled program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum CPU time (seconds)
    pub cpu_time: u32,
    /// Maximum address space (bytes)
    pub memory: u64,
    /// Maximum file size (bytes)
    pub file_size: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_time: 30,
            memory: 512 * 1024 * 1024, // 512MB
            file_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
