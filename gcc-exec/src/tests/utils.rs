pub mod defaults {
    use crate::{sandbox::Sandbox, ExecutorConfig, ResourceLimits, Result};
    use tokio::time::Duration;

    pub fn default_test_limits() -> ResourceLimits {
        #[cfg(target_os = "linux")]
        {
            ResourceLimits {
                memory: 256 * 1024 * 1024, // 256MB
                cpu_time: 5,               // 5 seconds
                file_size: 10 * 1024 * 1024, // 10MB
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            ResourceLimits {
                memory: u64::MAX, // Address space limits are not enforced off Linux
                cpu_time: 5,
                file_size: 10 * 1024 * 1024,
            }
        }
    }

    pub fn test_config() -> ExecutorConfig {
        ExecutorConfig::default()
            .with_limits(default_test_limits())
            .with_timeout(default_timeout())
    }

    pub async fn setup_test_sandbox() -> Result<Sandbox> {
        Sandbox::new(default_test_limits()).await
    }

    pub fn default_timeout() -> Duration {
        Duration::from_secs(5)
    }

    pub fn short_timeout() -> Duration {
        Duration::from_secs(1)
    }
}

pub mod tools {
    use which::which;

    /// Tests that need a real compiler call this first and return early on `true`
    pub fn skip_if_not_available(tools: &[&str]) -> bool {
        let missing: Vec<_> = tools
            .iter()
            .filter(|tool| which(**tool).is_err())
            .map(|s| (*s).to_string())
            .collect();

        if !missing.is_empty() {
            eprintln!("Skipping test: {} not available", missing.join(", "));
            return true;
        }
        false
    }
}
