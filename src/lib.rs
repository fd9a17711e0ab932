//! `jupygcc` runs C notebook cells outside a notebook: from a file or standard
//! input on the command line, or behind the HTTP server.

use clap::{Parser, Subcommand};
use gcc_exec::{magic::GCC_MAGIC, CellExecutionService, ExecutorConfig, MagicRegistry};
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "jupygcc")]
#[command(about = "Compile and run C notebook cells with gcc")]
#[command(version)]
pub struct Cli {
    /// TOML file with executor settings
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Compiler executable
    #[arg(long, global = true)]
    pub compiler: Option<String>,

    /// Wall-clock limit for the compiled program in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a cell and print what the notebook would show
    Run {
        /// File holding the cell; standard input when omitted
        file: Option<PathBuf>,
        /// Magic to run the cell through (gcc or gcc_file)
        #[arg(short, long, default_value = GCC_MAGIC)]
        magic: String,
        /// Argument line passed to the magic
        #[arg(long, default_value = "")]
        line: String,
    },
    /// Check that the compiler can be found
    Check,
    /// Serve cells over HTTP
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        addr: SocketAddr,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to read cell: {0}")]
    Input(#[source] std::io::Error),
    #[error("Failed to write output: {0}")]
    Output(#[source] std::io::Error),
    #[error(transparent)]
    Exec(#[from] gcc_exec::Error),
    #[error(transparent)]
    Server(#[from] gcc_exec_server::ServerError),
}

impl Cli {
    /// Settings from the config file, overridden by command-line flags
    pub fn executor_config(&self) -> Result<ExecutorConfig, Error> {
        let mut config = match &self.config {
            Some(path) => ExecutorConfig::from_file(path)?,
            None => ExecutorConfig::default(),
        };
        if let Some(compiler) = &self.compiler {
            config = config.with_compiler(compiler.clone());
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(Duration::from_secs(timeout));
        }
        config.validate()?;
        Ok(config)
    }

    /// Execute the parsed command. Cell output goes to `out`; a cell that fails to
    /// compile or run still counts as handled.
    pub async fn execute(self, input: &mut dyn Read, out: &mut dyn Write) -> Result<(), Error> {
        let config = self.executor_config()?;

        match self.command {
            Commands::Run { file, magic, line } => {
                let cell = match file {
                    Some(path) => std::fs::read_to_string(path).map_err(Error::Input)?,
                    None => {
                        let mut cell = String::new();
                        input.read_to_string(&mut cell).map_err(Error::Input)?;
                        cell
                    }
                };

                let service = CellExecutionService::new(config)?;
                let registry = MagicRegistry::with_defaults(service);
                let output = registry.run_cell(&magic, &line, &cell).await;

                out.write_all(output.as_bytes()).map_err(Error::Output)?;
                out.flush().map_err(Error::Output)?;
            }
            Commands::Check => {
                let service = CellExecutionService::new(config)?;
                let path = service.check_tools()?;
                writeln!(out, "{}: {}", service.config().compiler, path.display())
                    .map_err(Error::Output)?;
            }
            Commands::Serve { addr } => {
                info!("Serving cells on {}", addr);
                let app = gcc_exec_server::create_app(config)?;
                gcc_exec_server::run_server(app, addr).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("jupygcc").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&["run", "--compiler", "cc", "--timeout", "3"]);
        let config = cli.executor_config().unwrap();
        assert_eq!(config.compiler, "cc");
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.std_flag, "-std=c99");
    }

    #[test]
    fn test_run_defaults_to_gcc_magic() {
        match parse(&["run"]).command {
            Commands::Run { file, magic, line } => {
                assert!(file.is_none());
                assert_eq!(magic, "gcc");
                assert!(line.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let cli = parse(&["run", "--timeout", "0"]);
        assert!(matches!(
            cli.executor_config(),
            Err(Error::Exec(gcc_exec::Error::Config(_)))
        ));
    }

    #[tokio::test]
    async fn test_run_reports_missing_compiler_as_output() {
        let cli = parse(&["run", "--compiler", "no-such-cc-jupygcc"]);
        let mut input = Cursor::new("puts(\"x\");");
        let mut out = Vec::new();

        cli.execute(&mut input, &mut out).await.unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Running the program failed with error: Command not found: no-such-cc-jupygcc\n"
        );
    }

    #[tokio::test]
    async fn test_check_fails_without_compiler() {
        let cli = parse(&["check", "--compiler", "no-such-cc-jupygcc"]);
        let mut out = Vec::new();
        let result = cli.execute(&mut std::io::empty(), &mut out).await;
        assert!(matches!(
            result,
            Err(Error::Exec(gcc_exec::Error::CommandNotFound(_)))
        ));
    }
}
