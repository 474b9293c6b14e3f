#![doc = include_str!("../README.md")]
//!
//! Every call to [`run`] owns a private current-thread Tokio runtime, so the
//! API stays blocking for callers (worker threads in the harness) while the
//! deadline, the budget poller and the pipe readers run concurrently.
//!
//! On Unix the child leads a fresh process group whose id is its pid. Budgets
//! are measured over, and kills are delivered to, the whole group.
//!
//! **Fail-closed semantics:** a CPU or memory budget that cannot be monitored
//! on the current platform is an error unless [`SandboxLimits::allow_degraded`]
//! is set.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// How long pipe readers may keep draining after the child is gone.
///
/// A killed child can leave grandchildren holding the write end of its pipes.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Kernel clock ticks per second assumed for `/proc/<pid>/stat`.
const CLOCK_TICKS_PER_SEC: u64 = 100;

const PAGE_SIZE: u64 = 4096;

/// Resource limits applied to one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Hard wall-clock deadline. The child is killed when it expires.
    pub wall_timeout: Duration,
    /// CPU-seconds budget (user + system). 0 disables.
    pub cpu_secs: u64,
    /// RSS budget in MiB. 0 disables.
    pub memory_mb: u64,
    /// How often CPU and RSS are sampled.
    pub poll_interval: Duration,
    /// Captured bytes kept per stream; the rest is discarded.
    pub max_output_bytes: usize,
    /// Run even when CPU/RSS monitoring is unavailable.
    pub allow_degraded: bool,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            wall_timeout: Duration::from_secs(60),
            cpu_secs: 0,
            memory_mb: 0,
            poll_interval: Duration::from_millis(50),
            max_output_bytes: 64 * 1024 * 1024,
            allow_degraded: false,
        }
    }
}

impl SandboxLimits {
    pub fn with_timeout(wall_timeout: Duration) -> Self {
        Self {
            wall_timeout,
            ..Self::default()
        }
    }

    fn needs_process_monitoring(&self) -> bool {
        self.cpu_secs > 0 || self.memory_mb > 0
    }
}

/// A command line plus the environment it runs in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Bytes written to the child's stdin, which is then closed. `None`
    /// connects stdin to `/dev/null`.
    pub stdin: Option<Vec<u8>>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        let mut rendered = self.program.display().to_string();
        for arg in &self.args {
            rendered.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                rendered.push('\'');
                rendered.push_str(arg);
                rendered.push('\'');
            } else {
                rendered.push_str(arg);
            }
        }
        rendered
    }
}

/// How the child process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
    /// Killed at the wall-clock deadline.
    TimedOut,
    /// Killed after consuming its CPU budget.
    CpuBudgetExceeded { cpu_secs: u64 },
    /// Killed after its RSS exceeded the budget.
    MemoryBudgetExceeded { rss_mb: u64, limit_mb: u64 },
}

impl Termination {
    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Exited(0))
    }

    /// True when the sandbox, not the child, ended the process.
    pub fn was_killed(&self) -> bool {
        matches!(
            self,
            Termination::TimedOut
                | Termination::CpuBudgetExceeded { .. }
                | Termination::MemoryBudgetExceeded { .. }
        )
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exited with code {code}"),
            Termination::Signaled(signal) => write!(f, "terminated by signal {signal}"),
            Termination::TimedOut => write!(f, "killed at wall-clock deadline"),
            Termination::CpuBudgetExceeded { cpu_secs } => {
                write!(f, "killed after {cpu_secs}s of CPU time")
            }
            Termination::MemoryBudgetExceeded { rss_mb, limit_mb } => {
                write!(f, "killed at RSS {rss_mb} MiB (limit {limit_mb} MiB)")
            }
        }
    }
}

/// Everything observed about one sandboxed execution.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub termination: Termination,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub elapsed: Duration,
    /// Largest RSS sampled, when budgets were being monitored.
    pub peak_rss_mb: Option<u64>,
}

impl ProcessOutcome {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// stdout followed by stderr, as one log.
    pub fn combined_log(&self) -> String {
        let mut log = self.stdout_lossy();
        if !log.is_empty() && !log.ends_with('\n') && !self.stderr.is_empty() {
            log.push('\n');
        }
        log.push_str(&self.stderr_lossy());
        log
    }
}

/// Errors that prevent a child from being run at all.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "{control} cannot be enforced on this platform ({reason}); \
         set allow_degraded to run with reduced protections"
    )]
    ControlUnavailable { control: String, reason: String },
    #[error("failed to start process runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to wait for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl SandboxError {
    /// Spawn failures are usually a misconfigured command, not a harness bug.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, SandboxError::Spawn { .. })
    }
}

/// Result of platform capability detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCapabilities {
    pub process_monitoring: bool,
    pub degraded_reason: Option<String>,
}

pub fn detect_platform_capabilities() -> PlatformCapabilities {
    let process_monitoring = process_rss_bytes(std::process::id()).is_some();
    PlatformCapabilities {
        process_monitoring,
        degraded_reason: (!process_monitoring).then(platform_monitoring_reason),
    }
}

fn platform_monitoring_reason() -> String {
    #[cfg(target_os = "linux")]
    {
        "/proc/<pid>/statm not readable".into()
    }
    #[cfg(not(target_os = "linux"))]
    {
        format!("{}: no procfs to sample child processes", std::env::consts::OS)
    }
}

/// Run `spec` to completion or until a limit is hit.
///
/// Limit violations and non-zero exits are reported through
/// [`ProcessOutcome::termination`]; `Err` is reserved for a child that could
/// not be started or observed.
pub fn run(spec: &CommandSpec, limits: &SandboxLimits) -> Result<ProcessOutcome, SandboxError> {
    if limits.needs_process_monitoring() && !limits.allow_degraded {
        let caps = detect_platform_capabilities();
        if !caps.process_monitoring {
            return Err(SandboxError::ControlUnavailable {
                control: if limits.memory_mb > 0 {
                    "memory budget".into()
                } else {
                    "cpu budget".into()
                },
                reason: caps.degraded_reason.unwrap_or_default(),
            });
        }
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(SandboxError::Runtime)?;
    runtime.block_on(run_async(spec, limits))
}

async fn run_async(
    spec: &CommandSpec,
    limits: &SandboxLimits,
) -> Result<ProcessOutcome, SandboxError> {
    let started = Instant::now();
    let mut command = std::process::Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    if let Some(dir) = &spec.cwd {
        command.current_dir(dir);
    }
    for (key, value) in &spec.env {
        command.env(key, value);
    }
    let mut command = tokio::process::Command::from(command);
    command.kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| SandboxError::Spawn {
        program: spec.program.display().to_string(),
        source,
    })?;
    let pid = child.id();
    debug!(pid, command = %spec.display(), "spawned child");

    let stdin_task = match (child.stdin.take(), spec.stdin.clone()) {
        (Some(mut pipe), Some(bytes)) => Some(tokio::spawn(async move {
            // A child that exits without reading its input closes the pipe.
            let _ = pipe.write_all(&bytes).await;
            let _ = pipe.shutdown().await;
        })),
        _ => None,
    };
    let stdout = Capture::shared();
    let stderr = Capture::shared();
    let stdout_task = child
        .stdout
        .take()
        .map(|pipe| tokio::spawn(read_capped(pipe, stdout.clone(), limits.max_output_bytes)));
    let stderr_task = child
        .stderr
        .take()
        .map(|pipe| tokio::spawn(read_capped(pipe, stderr.clone(), limits.max_output_bytes)));

    let deadline = tokio::time::sleep(limits.wall_timeout);
    tokio::pin!(deadline);
    let mut ticker = tokio::time::interval(limits.poll_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let monitor = limits.needs_process_monitoring();
    let mut peak_rss_mb = None;

    let termination = loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|source| SandboxError::Wait {
                    program: spec.program.display().to_string(),
                    source,
                })?;
                // Helpers the child left behind share its group.
                signal_group(pid);
                break termination_from_status(status);
            }
            _ = &mut deadline => {
                kill(&mut child, pid, "wall-clock deadline").await;
                break Termination::TimedOut;
            }
            _ = ticker.tick(), if monitor => {
                if let Some(pid) = pid {
                    if let Some(violation) = check_budgets(pid, limits, &mut peak_rss_mb) {
                        kill(&mut child, Some(pid), "resource budget").await;
                        break violation;
                    }
                }
            }
        }
    };

    if let Some(task) = stdin_task {
        task.abort();
    }
    drain(stdout_task).await;
    drain(stderr_task).await;
    let (stdout, stdout_truncated) = Capture::take(&stdout);
    let (stderr, stderr_truncated) = Capture::take(&stderr);
    let elapsed = started.elapsed();
    debug!(pid, %termination, elapsed_ms = elapsed.as_millis() as u64, "child finished");

    Ok(ProcessOutcome {
        termination,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        elapsed,
        peak_rss_mb,
    })
}

async fn kill(child: &mut Child, pid: Option<u32>, reason: &str) {
    warn!(pid, reason, "killing process group");
    signal_group(pid);
    if let Err(err) = child.start_kill() {
        debug!(pid, error = %err, "kill failed (child already gone?)");
    }
    let _ = child.wait().await;
}

/// SIGKILL every process in the group led by `pid`.
fn signal_group(pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };
        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(err) => debug!(pgid, error = %err, "killpg failed"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

fn termination_from_status(status: ExitStatus) -> Termination {
    if let Some(code) = status.code() {
        return Termination::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Termination::Signaled(signal);
        }
    }
    Termination::Exited(-1)
}

fn check_budgets(pgid: u32, limits: &SandboxLimits, peak_rss_mb: &mut Option<u64>) -> Option<Termination> {
    let usage = group_usage(pgid)?;
    if limits.memory_mb > 0 {
        let rss_mb = usage.rss_bytes / (1024 * 1024);
        *peak_rss_mb = Some(peak_rss_mb.map_or(rss_mb, |peak| peak.max(rss_mb)));
        if rss_mb > limits.memory_mb {
            return Some(Termination::MemoryBudgetExceeded {
                rss_mb,
                limit_mb: limits.memory_mb,
            });
        }
    }
    if limits.cpu_secs > 0 {
        let cpu = usage.cpu_time();
        if cpu.as_secs() >= limits.cpu_secs {
            return Some(Termination::CpuBudgetExceeded {
                cpu_secs: cpu.as_secs(),
            });
        }
    }
    None
}

#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: bool,
}

type SharedCapture = Arc<Mutex<Capture>>;

impl Capture {
    fn shared() -> SharedCapture {
        Arc::new(Mutex::new(Capture::default()))
    }

    fn take(shared: &SharedCapture) -> (Vec<u8>, bool) {
        let mut guard = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let capture = std::mem::take(&mut *guard);
        (capture.bytes, capture.truncated)
    }
}

async fn read_capped<R>(mut pipe: R, sink: SharedCapture, cap: usize)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut capture = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                let room = cap.saturating_sub(capture.bytes.len());
                if n > room {
                    capture.truncated = true;
                }
                capture.bytes.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
}

async fn drain(task: Option<JoinHandle<()>>) {
    let Some(mut task) = task else {
        return;
    };
    if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
        debug!("pipe still open after child exit; abandoning reader");
        task.abort();
    }
}

// ---------------------------------------------------------------------------
// Process sampling
// ---------------------------------------------------------------------------

/// RSS of the current process in bytes.
pub fn current_rss_bytes() -> Option<u64> {
    process_rss_bytes(std::process::id())
}

/// RSS of `pid` in bytes. `None` where procfs is unavailable.
pub fn process_rss_bytes(pid: u32) -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let raw = std::fs::read_to_string(format!("/proc/{pid}/statm")).ok()?;
        parse_statm_rss(&raw)
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = pid;
        None
    }
}

/// Resources held by every live member of one process group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupUsage {
    pub members: usize,
    pub rss_bytes: u64,
    /// utime + stime + cutime + cstime, summed over members.
    pub cpu_ticks: u64,
}

impl GroupUsage {
    pub fn cpu_time(&self) -> Duration {
        Duration::from_millis(self.cpu_ticks * 1000 / CLOCK_TICKS_PER_SEC)
    }
}

/// Sum RSS and CPU over every `/proc/<pid>/stat` whose pgrp is `pgid`.
///
/// `None` where procfs is unavailable or the group has no members left.
pub fn group_usage(pgid: u32) -> Option<GroupUsage> {
    #[cfg(target_os = "linux")]
    {
        let mut usage = GroupUsage::default();
        for entry in std::fs::read_dir("/proc").ok()?.flatten() {
            let name = entry.file_name();
            let Some(pid) = name.to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            // Members may exit between listing and reading.
            let Ok(raw) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
                continue;
            };
            let Some(stat) = parse_stat(&raw) else {
                continue;
            };
            if stat.pgrp == pgid && stat.state != 'Z' {
                usage.members += 1;
                usage.rss_bytes += stat.rss_pages * PAGE_SIZE;
                usage.cpu_ticks += stat.cpu_ticks;
            }
        }
        (usage.members > 0).then_some(usage)
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = pgid;
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProcStat {
    state: char,
    pgrp: u32,
    cpu_ticks: u64,
    rss_pages: u64,
}

/// Fields 3 (state), 5 (pgrp), 14-17 (CPU ticks) and 24 (rss) of
/// `/proc/<pid>/stat`.
fn parse_stat(raw: &str) -> Option<ProcStat> {
    // The command name is parenthesized and may itself contain spaces.
    let after_comm = &raw[raw.rfind(')')? + 1..];
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let state = fields.first()?.chars().next()?;
    let pgrp = fields.get(2)?.parse().ok()?;
    let rss: i64 = fields.get(21)?.parse().ok()?;
    Some(ProcStat {
        state,
        pgrp,
        cpu_ticks: parse_stat_cpu_ticks(raw)?,
        rss_pages: rss.max(0) as u64,
    })
}

fn parse_statm_rss(raw: &str) -> Option<u64> {
    let rss_pages: u64 = raw.split_whitespace().nth(1)?.parse().ok()?;
    Some(rss_pages * PAGE_SIZE)
}

/// Sums utime, stime, cutime and cstime (fields 14-17 of `/proc/<pid>/stat`).
fn parse_stat_cpu_ticks(raw: &str) -> Option<u64> {
    // The command name is parenthesized and may itself contain spaces.
    let after_comm = &raw[raw.rfind(')')? + 1..];
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let mut total = 0u64;
    for index in 11..=14 {
        let value: i64 = fields.get(index)?.parse().ok()?;
        total += value.max(0) as u64;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn default_limits_have_sane_values() {
        let limits = SandboxLimits::default();
        assert_eq!(limits.wall_timeout, Duration::from_secs(60));
        assert_eq!(limits.cpu_secs, 0);
        assert_eq!(limits.memory_mb, 0);
        assert!(!limits.allow_degraded);
        assert!(!limits.needs_process_monitoring());
    }

    #[test]
    fn statm_rss_is_pages_times_page_size() {
        assert_eq!(parse_statm_rss("1000 250 30 4 0 60 0"), Some(250 * 4096));
        assert_eq!(parse_statm_rss("garbage"), None);
    }

    #[test]
    fn stat_cpu_ticks_handles_spaces_in_comm() {
        let raw = "4242 (my (odd) proc) R 1 4242 4242 0 -1 4194304 100 0 0 0 70 30 5 -5 20 0 1 0";
        // utime 70 + stime 30 + cutime 5 + cstime (-5 clamped to 0)
        assert_eq!(parse_stat_cpu_ticks(raw), Some(105));
        assert_eq!(parse_stat_cpu_ticks("no parens here"), None);
    }

    #[test]
    fn stat_exposes_state_group_and_rss() {
        let raw = "4242 (sh) S 1 4000 4000 0 -1 4194304 100 0 0 0 70 30 5 0 20 0 1 0 123 8192000 1500 18446744073709551615";
        let stat = parse_stat(raw).unwrap();
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.pgrp, 4000);
        assert_eq!(stat.cpu_ticks, 105);
        assert_eq!(stat.rss_pages, 1500);
        assert_eq!(parse_stat("4242 (sh) S 1"), None);
    }

    #[test]
    fn command_display_quotes_whitespace() {
        let spec = CommandSpec::new("gcc").arg("-o").arg("out dir/a.elf");
        assert_eq!(spec.display(), "gcc -o 'out dir/a.elf'");
    }

    #[test]
    fn termination_classification() {
        assert!(Termination::Exited(0).is_success());
        assert!(!Termination::Exited(1).is_success());
        assert!(Termination::TimedOut.was_killed());
        assert!(!Termination::Signaled(9).was_killed());
        let msg = Termination::MemoryBudgetExceeded {
            rss_mb: 5000,
            limit_mb: 4096,
        }
        .to_string();
        assert!(msg.contains("5000") && msg.contains("4096"));
    }

    #[test]
    fn combined_log_orders_stdout_before_stderr() {
        let outcome = ProcessOutcome {
            termination: Termination::Exited(0),
            stdout: b"out".to_vec(),
            stderr: b"err\n".to_vec(),
            stdout_truncated: false,
            stderr_truncated: false,
            elapsed: Duration::ZERO,
            peak_rss_mb: None,
        };
        assert_eq!(outcome.combined_log(), "out\nerr\n");
    }

    #[test]
    fn current_rss_available_on_linux() {
        #[cfg(target_os = "linux")]
        {
            let rss = current_rss_bytes().expect("RSS should be available");
            assert!(rss > 0);
            assert!(detect_platform_capabilities().process_monitoring);
        }
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let spec = CommandSpec::new("/nonexistent/rotor-missing-tool");
        let err = run(&spec, &SandboxLimits::default()).unwrap_err();
        assert!(err.is_spawn_failure(), "got {err}");
        assert!(err.to_string().contains("rotor-missing-tool"));
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_and_streams_are_captured() {
        let outcome = run(
            &sh("echo hello; echo oops >&2; exit 3"),
            &SandboxLimits::default(),
        )
        .unwrap();
        assert_eq!(outcome.termination, Termination::Exited(3));
        assert_eq!(outcome.stdout_lossy(), "hello\n");
        assert_eq!(outcome.stderr_lossy(), "oops\n");
    }

    #[cfg(unix)]
    #[test]
    fn stdin_bytes_reach_the_child() {
        let spec = CommandSpec::new("cat").stdin_bytes(b"abc\x00\x01".to_vec());
        let outcome = run(&spec, &SandboxLimits::default()).unwrap();
        assert!(outcome.termination.is_success());
        assert_eq!(outcome.stdout, b"abc\x00\x01");
    }

    #[cfg(unix)]
    #[test]
    fn wall_clock_deadline_kills_child() {
        let limits = SandboxLimits::with_timeout(Duration::from_millis(200));
        let outcome = run(&sh("exec sleep 30"), &limits).unwrap();
        assert_eq!(outcome.termination, Termination::TimedOut);
        assert!(outcome.elapsed < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn deadline_returns_even_if_grandchild_holds_pipes() {
        let limits = SandboxLimits::with_timeout(Duration::from_millis(200));
        let outcome = run(&sh("(sleep 30; echo late) & wait"), &limits).unwrap();
        assert_eq!(outcome.termination, Termination::TimedOut);
        assert!(outcome.elapsed < Duration::from_secs(10));
        assert!(!outcome.stdout_lossy().contains("late"));
    }

    #[cfg(unix)]
    #[test]
    fn signal_termination_is_reported() {
        let outcome = run(&sh("kill -9 $$"), &SandboxLimits::default()).unwrap();
        assert_eq!(outcome.termination, Termination::Signaled(9));
    }

    #[cfg(unix)]
    #[test]
    fn output_beyond_cap_is_truncated() {
        let limits = SandboxLimits {
            max_output_bytes: 4,
            ..SandboxLimits::default()
        };
        let outcome = run(&sh("printf 0123456789"), &limits).unwrap();
        assert_eq!(outcome.stdout, b"0123");
        assert!(outcome.stdout_truncated);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn cpu_budget_kills_busy_loop() {
        let limits = SandboxLimits {
            wall_timeout: Duration::from_secs(20),
            cpu_secs: 1,
            ..SandboxLimits::default()
        };
        let outcome = run(&sh("while :; do :; done"), &limits).unwrap();
        assert!(
            matches!(outcome.termination, Termination::CpuBudgetExceeded { .. }),
            "got {:?}",
            outcome.termination
        );
    }

    /// True while `pid` exists and is not a zombie.
    #[cfg(target_os = "linux")]
    fn alive(pid: u32) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|raw| parse_stat(&raw))
            .is_some_and(|stat| stat.state != 'Z')
    }

    #[cfg(target_os = "linux")]
    fn wait_until_gone(pid: u32) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if !alive(pid) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn deadline_kills_processes_started_by_a_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("worker.pid");
        let script = dir.path().join("worker.sh");
        std::fs::write(&script, format!("echo $$ > {}\nexec sleep 30\n", pid_file.display())).unwrap();

        let limits = SandboxLimits::with_timeout(Duration::from_millis(500));
        let outcome = run(&sh(&format!("sh {}; true", script.display())), &limits).unwrap();
        assert_eq!(outcome.termination, Termination::TimedOut);

        let worker: u32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        assert!(wait_until_gone(worker), "worker {worker} outlived the deadline");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn helpers_left_behind_are_reaped_on_exit() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("helper.pid");
        let outcome = run(
            &sh(&format!("sleep 30 & echo $! > {}; exit 0", pid_file.display())),
            &SandboxLimits::with_timeout(Duration::from_secs(10)),
        )
        .unwrap();
        assert_eq!(outcome.termination, Termination::Exited(0));
        let helper: u32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        assert!(wait_until_gone(helper), "background helper {helper} survived");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn memory_budget_counts_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let hog = dir.path().join("hog.sh");
        // The inner shell holds ~150 MB in a variable, then idles.
        std::fs::write(&hog, "x=$(head -c 150000000 /dev/zero | tr '\\0' a)\nsleep 30\n").unwrap();

        let limits = SandboxLimits {
            wall_timeout: Duration::from_secs(30),
            memory_mb: 50,
            ..SandboxLimits::default()
        };
        let outcome = run(&sh(&format!("sh {}; true", hog.display())), &limits).unwrap();
        assert!(
            matches!(outcome.termination, Termination::MemoryBudgetExceeded { limit_mb: 50, .. }),
            "got {:?} peak {:?}",
            outcome.termination,
            outcome.peak_rss_mb
        );
        assert!(outcome.peak_rss_mb.is_some_and(|peak| peak > 50));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn group_usage_sees_the_current_group() {
        let pgid = parse_stat(&std::fs::read_to_string("/proc/self/stat").unwrap()).unwrap().pgrp;
        let usage = group_usage(pgid).unwrap();
        assert!(usage.members >= 1);
        assert!(usage.rss_bytes > 0);
    }

    #[test]
    fn working_directory_is_applied() {
        #[cfg(unix)]
        {
            let dir = tempfile::tempdir().unwrap();
            let outcome = run(&CommandSpec::new("pwd").current_dir(dir.path()), &SandboxLimits::default()).unwrap();
            let printed = outcome.stdout_lossy();
            let expected = dir.path().canonicalize().unwrap();
            assert_eq!(Path::new(printed.trim()).canonicalize().unwrap(), expected);
        }
    }
}
