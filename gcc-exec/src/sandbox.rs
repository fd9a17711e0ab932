use crate::{error::Error, types::ResourceLimits, ProcessStats};
use nix::libc;
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{setpgid, Pid};
use std::{
    io::{Read, Write},
    os::unix::process::{CommandExt, ExitStatusExt},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    time::Instant,
};
use tokio::{
    fs,
    task::{self, JoinHandle},
    time::{self, Duration},
};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// How long to keep reading output once the process group is gone
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Per-invocation scratch directory holding the cell's source and binary.
///
/// Every sandbox gets its own directory, so concurrent cells never share an
/// output path. The directory is removed when the sandbox is dropped.
pub struct Sandbox {
    /// Root directory for the sandbox
    pub root_dir: PathBuf,
    /// Limits applied to programs started with [`Sandbox::execute`]
    limits: ResourceLimits,
    /// Unique ID for this sandbox instance
    id: String,
}

/// Captured result of a finished child process
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    /// Resource usage of this process and the children it waited for
    pub stats: ProcessStats,
    /// The wall-clock limit expired and the process group was killed
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn signal(&self) -> Option<i32> {
        self.status.signal()
    }

    /// Whether the wall-clock timer or the CPU limit stopped the process
    pub fn hit_limit(&self) -> bool {
        self.timed_out || self.signal() == Some(Signal::SIGXCPU as i32)
    }
}

impl Sandbox {
    /// Create a new sandbox environment
    pub async fn new(limits: ResourceLimits) -> Result<Self, Error> {
        Self::new_in(std::env::temp_dir(), limits).await
    }

    /// Create a sandbox below `parent` instead of the system temp directory
    pub async fn new_in(parent: impl AsRef<Path>, limits: ResourceLimits) -> Result<Self, Error> {
        let id = Uuid::new_v4().to_string();
        let root_dir = parent.as_ref().join(format!("jupygcc-{}", id));

        fs::create_dir_all(&root_dir)
            .await
            .map_err(|e| Error::Sandbox(format!("Failed to create sandbox directory: {}", e)))?;

        debug!("Created sandbox {} at {:?}", id, root_dir);

        Ok(Sandbox {
            root_dir,
            limits,
            id,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path of a file inside the sandbox
    pub fn path(&self, name: &str) -> PathBuf {
        self.root_dir.join(name)
    }

    /// Run a build tool (the compiler) in the sandbox directory.
    ///
    /// The tool inherits the caller's environment so it can find its assembler and
    /// linker. No resource limits are applied.
    pub async fn run_tool(
        &self,
        cmd: &str,
        args: &[&str],
        input: Option<&str>,
        timeout: Duration,
    ) -> Result<ProcessOutput, Error> {
        let cmd_path = resolve_command(cmd)?;
        debug!("Sandbox run_tool - Command: {:?} Args: {:?}", cmd_path, args);

        let mut command = Command::new(&cmd_path);
        command.args(args).current_dir(&self.root_dir);

        self.spawn_and_wait(command, input, timeout).await
    }

    /// Execute a program in the sandbox with a clean environment and resource limits
    pub async fn execute(
        &self,
        program: &Path,
        args: &[&str],
        env: &[(String, String)],
        input: Option<&str>,
        timeout: Duration,
    ) -> Result<ProcessOutput, Error> {
        debug!("Sandbox execute - Program: {:?}", program);
        debug!("Sandbox execute - Args: {:?}", args);
        debug!("Sandbox execute - Env: {:?}", env);
        debug!("Sandbox execute - Root dir: {:?}", self.root_dir);

        let mut command = Command::new(program);
        command
            .args(args)
            .env_clear()
            .envs(env.iter().map(|(k, v)| (k, v)))
            .env("PATH", "/usr/bin:/bin:/usr/sbin:/sbin")
            .env("HOME", &self.root_dir)
            .current_dir(&self.root_dir);

        // Copy limits out of self for the pre_exec closure
        let file_size = self.limits.file_size;
        let cpu_time = self.limits.cpu_time as u64;
        #[cfg(target_os = "linux")]
        let memory = self.limits.memory;

        unsafe {
            command.pre_exec(move || {
                setrlimit(Resource::RLIMIT_FSIZE, file_size, file_size).map_err(|e| {
                    std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Failed to set file size limit: {}", e),
                    )
                })?;
                setrlimit(Resource::RLIMIT_CPU, cpu_time, cpu_time).map_err(|e| {
                    std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Failed to set CPU time limit: {}", e),
                    )
                })?;

                // RLIMIT_AS is not enforced on macOS
                #[cfg(target_os = "linux")]
                setrlimit(Resource::RLIMIT_AS, memory, memory).map_err(|e| {
                    std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Failed to set memory limit: {}", e),
                    )
                })?;

                Ok(())
            });
        }

        self.spawn_and_wait(command, input, timeout).await
    }

    /// Spawn `command` as the leader of a new process group and wait for it.
    ///
    /// The exit status and rusage come from `wait4` on the leader alone. Once it
    /// exits, or the timeout expires, the whole group is killed so nothing forked
    /// by the process outlives the call. Output written before that is kept.
    async fn spawn_and_wait(
        &self,
        mut command: Command,
        input: Option<&str>,
        timeout: Duration,
    ) -> Result<ProcessOutput, Error> {
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        unsafe {
            command.pre_exec(|| {
                setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
                Ok(())
            });
        }

        let start_time = Instant::now();
        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::CommandNotFound(format!("{:?}", command.get_program()))
            }
            _ => Error::Sandbox(format!("Failed to spawn process: {}", e)),
        })?;
        let pid = Pid::from_raw(child.id() as i32);
        let group = ProcessGroup(pid);

        let stdout = child.stdout.take().map(read_pipe);
        let stderr = child.stderr.take().map(read_pipe);

        // Feed input from a separate task so a child that never reads can't block us
        if let (Some(input_str), Some(mut stdin)) = (input, child.stdin.take()) {
            let input_owned = input_str.to_string();
            task::spawn_blocking(move || {
                if let Err(e) = stdin.write_all(input_owned.as_bytes()) {
                    debug!("Child closed stdin early: {}", e);
                }
                // Dropping stdin signals EOF
            });
        }

        // std's Child neither kills nor reaps on drop, wait_with_usage reaps it
        drop(child);

        let mut waiter = task::spawn_blocking(move || wait_with_usage(pid));
        let waited = time::timeout(timeout, &mut waiter).await.ok();
        let timed_out = waited.is_none();
        if timed_out {
            debug!("Process {} timed out after {:?}", pid, timeout);
        }

        drop(group);

        let joined = match waited {
            Some(joined) => joined,
            None => waiter.await,
        };
        let (status, usage) = joined
            .map_err(|e| Error::Sandbox(format!("Process wait task failed: {}", e)))?
            .map_err(|e| Error::Sandbox(format!("Process error: {}", e)))?;
        let stats = stats_from_usage(&usage, start_time.elapsed());

        Ok(ProcessOutput {
            status,
            stdout: drain_pipe(stdout).await,
            stderr: drain_pipe(stderr).await,
            stats,
            timed_out,
        })
    }
}

/// System commands are looked up on PATH, anything with a separator is used as-is
fn resolve_command(cmd: &str) -> Result<PathBuf, Error> {
    if cmd.contains('/') {
        return Ok(PathBuf::from(cmd));
    }
    which::which(cmd).map_err(|_| Error::CommandNotFound(cmd.to_string()))
}

fn read_pipe<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    task::spawn_blocking(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            debug!("Stopped reading child output: {}", e);
        }
        buf
    })
}

async fn drain_pipe(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    match time::timeout(PIPE_DRAIN_GRACE, reader).await {
        Ok(Ok(buf)) => String::from_utf8_lossy(&buf).to_string(),
        Ok(Err(e)) => {
            warn!("Output reader failed: {}", e);
            String::new()
        }
        // Something that left the process group still holds the pipe open
        Err(_) => {
            warn!("Output pipe still open after the process group was killed");
            String::new()
        }
    }
}

/// Process group of a spawned command, SIGKILLed when dropped.
///
/// Dropping it also covers the waiting future being cancelled.
struct ProcessGroup(Pid);

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        match killpg(self.0, Signal::SIGKILL) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => warn!("Failed to kill process group {}: {}", self.0, e),
        }
    }
}

/// Block until `pid` exits and return its status with its own resource usage
fn wait_with_usage(pid: Pid) -> std::io::Result<(ExitStatus, libc::rusage)> {
    let mut status: libc::c_int = 0;
    // All-zero is a valid rusage
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    loop {
        let ret = unsafe { libc::wait4(pid.as_raw(), &mut status, 0, &mut usage) };
        if ret == pid.as_raw() {
            return Ok((ExitStatus::from_raw(status), usage));
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn stats_from_usage(usage: &libc::rusage, execution_time: Duration) -> ProcessStats {
    ProcessStats {
        max_rss: usage.ru_maxrss as u64,
        minor_page_faults: usage.ru_minflt as u64,
        major_page_faults: usage.ru_majflt as u64,
        voluntary_context_switches: usage.ru_nvcsw as u64,
        involuntary_context_switches: usage.ru_nivcsw as u64,
        user_time: timeval_to_duration(usage.ru_utime),
        system_time: timeval_to_duration(usage.ru_stime),
        execution_time,
    }
}

fn timeval_to_duration(tv: libc::timeval) -> Duration {
    Duration::from_secs(tv.tv_sec as u64) + Duration::from_micros(tv.tv_usec as u64)
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.root_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!("Failed to clean up sandbox directory: {}", e);
            }
        }
    }
}
