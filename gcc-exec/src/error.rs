use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Cell contains no code to compile")]
    EmptyCell,

    #[error("Compilation failed: {0}")]
    CompilationError(String),

    #[error("Execution failed: {0}")]
    ExecutionError(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("System error: {0}")]
    System(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
