use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs;
use tracing::{debug, warn};

use crate::{
    config::ExecutorConfig,
    error::Error,
    metadata::{split_metadata, Metadata},
    sandbox::{ProcessOutput, Sandbox},
    source::prepare_source,
    types::{CompileMode, CompilerOutput, ExecutionRequest, ExecutionResult, ExecutionStatus},
};

/// A compiled cell waiting to run
pub struct Compilation {
    /// Where the compiler was asked to put the program
    pub binary: PathBuf,
    /// The compiler's exit status and streams
    pub output: ProcessOutput,
    /// Source file written for the compiler, removed on drop
    pub source_file: Option<TempPath>,
}

/// One way of turning a cell into a program
#[async_trait]
pub trait CompileStrategy: Send + Sync {
    fn mode(&self) -> CompileMode;

    /// Split off metadata and produce the source text handed to the compiler
    fn prepare(&self, cell: &str) -> Result<(Metadata, String), Error>;

    /// Compile `source` inside the sandbox
    async fn compile(
        &self,
        sandbox: &Sandbox,
        source: &str,
        config: &ExecutorConfig,
    ) -> Result<Compilation, Error>;
}

/// Metadata-aware compilation: header, auto-wrap, scanf echo, source on stdin.
pub struct StdinCompile;

#[async_trait]
impl CompileStrategy for StdinCompile {
    fn mode(&self) -> CompileMode {
        CompileMode::Stdin
    }

    fn prepare(&self, cell: &str) -> Result<(Metadata, String), Error> {
        let (metadata, code) = split_metadata(cell);
        if code.trim().is_empty() {
            return Err(Error::EmptyCell);
        }
        Ok((metadata, prepare_source(code)))
    }

    async fn compile(
        &self,
        sandbox: &Sandbox,
        source: &str,
        config: &ExecutorConfig,
    ) -> Result<Compilation, Error> {
        let binary = sandbox.path(&config.binary_name);
        let output = sandbox
            .run_tool(
                &config.compiler,
                &[
                    config.std_flag.as_str(),
                    "-x",
                    "c",
                    "-o",
                    config.binary_name.as_str(),
                    "-",
                ],
                Some(source),
                config.compile_timeout(),
            )
            .await?;

        Ok(Compilation {
            binary,
            output,
            source_file: None,
        })
    }
}

/// Plain compilation: the cell is written verbatim to a `.c` file.
pub struct SourceFileCompile;

#[async_trait]
impl CompileStrategy for SourceFileCompile {
    fn mode(&self) -> CompileMode {
        CompileMode::SourceFile
    }

    fn prepare(&self, cell: &str) -> Result<(Metadata, String), Error> {
        if cell.trim().is_empty() {
            return Err(Error::EmptyCell);
        }
        Ok((Metadata::new(), cell.to_string()))
    }

    async fn compile(
        &self,
        sandbox: &Sandbox,
        source: &str,
        config: &ExecutorConfig,
    ) -> Result<Compilation, Error> {
        let source_file = tempfile::Builder::new()
            .prefix("cell")
            .suffix(".c")
            .tempfile_in(&sandbox.root_dir)?
            .into_temp_path();
        fs::write(&source_file, source).await?;

        let binary = source_file.with_extension("");
        let source_arg = source_file.to_string_lossy().to_string();
        let binary_arg = binary.to_string_lossy().to_string();

        let output = sandbox
            .run_tool(
                &config.compiler,
                &[source_arg.as_str(), "-o", binary_arg.as_str()],
                None,
                config.compile_timeout(),
            )
            .await?;

        Ok(Compilation {
            binary,
            output,
            source_file: Some(source_file),
        })
    }
}

/// Sequences compile, run, capture and cleanup for one cell
pub struct CellExecutor {
    config: ExecutorConfig,
}

impl CellExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Check that the configured compiler can be found
    pub fn check_tools(&self) -> Result<PathBuf, Error> {
        let compiler = &self.config.compiler;
        if compiler.contains('/') {
            let path = PathBuf::from(compiler);
            return if path.is_file() {
                Ok(path)
            } else {
                Err(Error::CommandNotFound(compiler.clone()))
            };
        }
        which::which(compiler).map_err(|_| Error::CommandNotFound(compiler.clone()))
    }

    /// Compile and run a cell in the given sandbox.
    ///
    /// Compile and run failures come back as `Ok` with the matching status; `Err` is
    /// reserved for cells that can't be attempted at all (empty cell, missing
    /// compiler, sandbox I/O).
    pub async fn execute_in_sandbox(
        &self,
        request: ExecutionRequest,
        sandbox: Sandbox,
    ) -> Result<ExecutionResult, Error> {
        let strategy = self.create_strategy(request.mode);
        let (metadata, source) = strategy.prepare(&request.cell)?;

        debug!(
            "Compiling cell in sandbox {} ({:?} mode, {} bytes of source)",
            sandbox.id(),
            strategy.mode(),
            source.len()
        );

        let compilation = strategy.compile(&sandbox, &source, &self.config).await?;

        let mut compiler = CompilerOutput {
            stdout: compilation.output.stdout.clone(),
            stderr: compilation.output.stderr.clone(),
        };
        if compilation.output.timed_out {
            compiler.stderr.push_str(&format!(
                "Compiler timed out after {} seconds\n",
                self.config.compile_timeout().as_secs()
            ));
        }

        if !compilation.output.success() {
            debug!("Compilation failed: {}", compilation.output.status);
            remove_binary(&compilation.binary).await;
            return Ok(ExecutionResult::compilation_failed(compiler, metadata));
        }

        let env_vars: Vec<(String, String)> = request
            .env_vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let run = sandbox
            .execute(
                &compilation.binary,
                &[],
                &env_vars,
                metadata.stdin(),
                request.timeout,
            )
            .await;

        remove_binary(&compilation.binary).await;
        drop(compilation);

        let output = run?;
        let status = if output.hit_limit() {
            ExecutionStatus::Timeout
        } else if output.success() {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Error
        };

        if status != ExecutionStatus::Success {
            debug!("Program failed: {}", output.status);
        }

        Ok(ExecutionResult {
            status,
            exit_code: output.exit_code(),
            signal: output.signal(),
            stdout: output.stdout,
            stderr: output.stderr,
            compiler,
            metadata,
            process_stats: output.stats,
        })
    }

    fn create_strategy(&self, mode: CompileMode) -> Box<dyn CompileStrategy> {
        match mode {
            CompileMode::Stdin => Box::new(StdinCompile),
            CompileMode::SourceFile => Box::new(SourceFileCompile),
        }
    }
}

async fn remove_binary(binary: &Path) {
    match fs::remove_file(binary).await {
        Ok(()) => debug!("Removed {:?}", binary),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", binary, e),
    }
}
