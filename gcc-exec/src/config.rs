use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{error::Error, types::ResourceLimits};

/// Executor settings, loadable from a TOML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Compiler executable, looked up on PATH unless it contains a `/`
    pub compiler: String,

    /// Dialect flag passed when compiling from standard input
    pub std_flag: String,

    /// File name of the compiled program inside the sandbox
    pub binary_name: String,

    /// Wall-clock limit for the compiled program, in seconds
    pub timeout_secs: u64,

    /// Wall-clock limit for the compiler, in seconds
    pub compile_timeout_secs: u64,

    /// Maximum number of cells compiling or running at once
    pub max_concurrent_executions: usize,

    /// Limits applied to the compiled program
    pub limits: ResourceLimits,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            compiler: "gcc".to_string(),
            std_flag: "-std=c99".to_string(),
            binary_name: "jupygcc_code".to_string(),
            timeout_secs: 10,
            compile_timeout_secs: 60,
            max_concurrent_executions: 10,
            limits: ResourceLimits::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn with_compiler(mut self, compiler: impl Into<String>) -> Self {
        self.compiler = compiler.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_max_concurrent_executions(mut self, max: usize) -> Self {
        self.max_concurrent_executions = max;
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.compiler.trim().is_empty() {
            return Err(Error::Config("compiler must not be empty".to_string()));
        }
        if self.binary_name.is_empty() || self.binary_name.contains('/') {
            return Err(Error::Config(format!(
                "binary_name must be a plain file name, got {:?}",
                self.binary_name
            )));
        }
        if self.timeout_secs == 0 || self.compile_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be positive".to_string()));
        }
        if self.max_concurrent_executions == 0 {
            return Err(Error::Config(
                "max_concurrent_executions must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
