use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::{
    config::ExecutorConfig,
    error::Error,
    executor::CellExecutor,
    sandbox::Sandbox,
    types::{CompileMode, ExecutionRequest, ExecutionResult},
};

#[derive(Clone)]
pub struct CellExecutionService {
    executor: Arc<CellExecutor>,
    semaphore: Arc<Semaphore>,
}

impl CellExecutionService {
    pub fn new(config: ExecutorConfig) -> Result<Self, Error> {
        config.validate()?;
        let max_concurrent_executions = config.max_concurrent_executions;

        Ok(Self {
            executor: Arc::new(CellExecutor::new(config)),
            semaphore: Arc::new(Semaphore::new(max_concurrent_executions)),
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        self.executor.config()
    }

    /// Build a request for `cell` using the configured timeout
    pub fn request(&self, cell: impl Into<String>, mode: CompileMode) -> ExecutionRequest {
        ExecutionRequest::new(cell, mode, self.config().timeout())
    }

    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult, Error> {
        // Acquire execution permit
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| Error::System(format!("Failed to acquire execution permit: {}", e)))?;

        debug!("Starting cell execution in {:?} mode", request.mode);

        // Create new sandbox for this execution
        let sandbox = Sandbox::new(self.config().limits.clone()).await?;

        let result = self.executor.execute_in_sandbox(request, sandbox).await;

        match &result {
            Ok(r) => info!("Cell execution finished with status {}", r.status),
            Err(e) => error!("Cell execution failed: {}", e),
        }

        result
    }

    pub fn check_tools(&self) -> Result<std::path::PathBuf, Error> {
        self.executor.check_tools()
    }

    pub fn get_available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }
}
