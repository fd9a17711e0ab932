use clap::Parser;
use gcc_exec::{ExecutorConfig, ResourceLimits};
use gcc_exec_server::{create_app, run_server};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to listen on
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    addr: SocketAddr,

    /// TOML file with executor settings; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of concurrent executions
    #[arg(short, long)]
    max_concurrent: Option<usize>,

    /// Compiler executable
    #[arg(long)]
    compiler: Option<String>,

    /// Wall-clock limit for compiled programs in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Memory limit in bytes
    #[arg(long)]
    memory_limit: Option<u64>,

    /// CPU time limit in seconds
    #[arg(long)]
    cpu_time_limit: Option<u32>,

    /// File size limit in bytes
    #[arg(long)]
    file_size_limit: Option<u64>,
}

impl Args {
    fn executor_config(&self) -> anyhow::Result<ExecutorConfig> {
        let mut config = match &self.config {
            Some(path) => ExecutorConfig::from_file(path)?,
            None => ExecutorConfig::default(),
        };

        if let Some(max) = self.max_concurrent {
            config.max_concurrent_executions = max;
        }
        if let Some(compiler) = &self.compiler {
            config.compiler = compiler.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }

        let defaults = config.limits.clone();
        config.limits = ResourceLimits {
            memory: self.memory_limit.unwrap_or(defaults.memory),
            cpu_time: self.cpu_time_limit.unwrap_or(defaults.cpu_time),
            file_size: self.file_size_limit.unwrap_or(defaults.file_size),
        };

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.executor_config()?;

    let app = create_app(config)?;
    run_server(app, args.addr).await?;

    Ok(())
}
