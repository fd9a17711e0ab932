//! # C Cell Execution
//!
//! Compiles and runs notebook cells of C source text with an external compiler.
//! Cells may carry a `//| key: value` metadata header, bare statements are wrapped
//! in a synthesized `main`, and simple `scanf` calls are rewritten to echo the
//! values they read so programmatically supplied input shows up in the output.

mod config;
mod error;
mod executor;
pub mod magic;
pub mod metadata;
pub mod report;
mod sandbox;
mod service;
pub mod source;
mod types;

#[cfg(test)]
mod tests;

pub use config::ExecutorConfig;
pub use error::Error;
pub use executor::{CellExecutor, Compilation, CompileStrategy, SourceFileCompile, StdinCompile};
pub use magic::{CellMagic, GccMagic, MagicRegistry};
pub use metadata::Metadata;
pub use sandbox::{ProcessOutput, Sandbox};
pub use service::CellExecutionService;
pub use types::{
    CompileMode, CompilerOutput, ExecutionRequest, ExecutionResult, ExecutionStatus, ProcessStats,
    ResourceLimits,
};

/// Result type for cell execution operations
pub type Result<T> = std::result::Result<T, Error>;
