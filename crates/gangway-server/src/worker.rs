//! Multi-process worker supervision.
//!
//! The supervisor binds the listening socket once, marks it inheritable,
//! and re-executes the current binary `worker_num` times with the
//! descriptor number in the environment. Every worker accepts from the
//! same socket; the kernel load-balances. The supervisor itself serves
//! no traffic: it forwards termination signals to the workers and reaps
//! them, reporting any abnormal exit.
//!
//! Workers call [`inherited_listener`] at startup and, when it yields a
//! socket, serve it via `Server::run_on_listener` instead of binding.

use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::io::FromRawFd;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use thiserror::Error;
use tokio::process::Command;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinSet;

use crate::config::ServerConfig;

/// Environment variable carrying the inherited listener descriptor.
pub const WORKER_FD_ENV: &str = "GANGWAY_WORKER_FD";

/// Errors from running the supervisor.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The configured bind address did not parse.
    #[error("invalid bind address '{addr}': {source}")]
    InvalidAddr {
        addr: String,
        source: std::net::AddrParseError,
    },

    /// Binding the shared listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: io::Error,
    },

    /// The listener descriptor could not be marked inheritable.
    #[error("failed to prepare listener for inheritance: {0}")]
    Inherit(io::Error),

    /// The current executable path could not be determined.
    #[error("could not determine current executable: {0}")]
    Exe(io::Error),

    /// A worker process could not be spawned.
    #[error("failed to spawn worker: {0}")]
    Spawn(io::Error),

    /// Signal handler registration failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Exit code zero.
    Clean,

    /// Nonzero exit code.
    Failed(i32),

    /// Killed by a signal.
    Signaled(i32),
}

impl WorkerOutcome {
    /// Classifies an exit code / terminating signal pair.
    #[must_use]
    pub fn from_parts(code: Option<i32>, signal: Option<i32>) -> Self {
        match (code, signal) {
            (Some(0), _) | (None, None) => Self::Clean,
            (Some(code), _) => Self::Failed(code),
            (None, Some(signal)) => Self::Signaled(signal),
        }
    }

    /// Classifies a reaped process status.
    #[must_use]
    pub fn from_status(status: ExitStatus) -> Self {
        Self::from_parts(status.code(), status.signal())
    }

    /// Returns `true` for outcomes the supervisor itself caused: a clean
    /// exit, or death by the SIGTERM it forwarded.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        match self {
            Self::Clean => true,
            Self::Signaled(s) => *s == libc::SIGTERM,
            Self::Failed(_) => false,
        }
    }
}

impl fmt::Display for WorkerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "exited cleanly"),
            Self::Failed(code) => write!(f, "exited with code {code}"),
            Self::Signaled(sig) => write!(f, "killed by {} ({sig})", signal_name(*sig)),
        }
    }
}

/// Names the signals workers commonly die from.
fn signal_name(sig: i32) -> &'static str {
    match sig {
        libc::SIGHUP => "SIGHUP",
        libc::SIGINT => "SIGINT",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGILL => "SIGILL",
        libc::SIGABRT => "SIGABRT",
        libc::SIGBUS => "SIGBUS",
        libc::SIGFPE => "SIGFPE",
        libc::SIGKILL => "SIGKILL",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGTERM => "SIGTERM",
        _ => "unknown signal",
    }
}

/// Recovers the listener a supervisor passed to this process, if any.
///
/// Returns `None` when the process was not started by a supervisor, and
/// `Some(Err(_))` when the environment value is not a descriptor number.
#[allow(unsafe_code)]
pub fn inherited_listener() -> Option<io::Result<std::net::TcpListener>> {
    let value = std::env::var(WORKER_FD_ENV).ok()?;
    Some(match value.parse::<RawFd>() {
        // Safety: the supervisor put this descriptor number in our
        // environment and transferred ownership of it to this process.
        Ok(fd) => Ok(unsafe { std::net::TcpListener::from_raw_fd(fd) }),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid {WORKER_FD_ENV} value '{value}'"),
        )),
    })
}

/// Clears `FD_CLOEXEC` so the descriptor survives exec.
#[allow(unsafe_code)]
fn set_inheritable(fd: RawFd) -> io::Result<()> {
    // Safety: plain fcntl flag manipulation on a descriptor the caller
    // owns for the duration of the call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Sends SIGTERM to each listed worker pid.
#[allow(unsafe_code)]
fn forward_sigterm(pids: &[Option<u32>]) {
    for pid in pids.iter().flatten() {
        tracing::info!(pid, "forwarding SIGTERM to worker");
        // Safety: pid came from our own child table; at worst it names an
        // already-reaped process and kill reports ESRCH.
        let rc = unsafe { libc::kill(*pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            tracing::debug!(pid, error = %io::Error::last_os_error(), "kill failed");
        }
    }
}

/// Supervises a set of worker processes sharing one listening socket.
///
/// # Example
///
/// ```rust,ignore
/// let config = ServerConfig::builder().worker_num(4).build();
/// Supervisor::new(config).run().await?;
/// ```
pub struct Supervisor {
    config: ServerConfig,
}

impl Supervisor {
    /// Creates a supervisor for the given configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Binds the shared socket, spawns the workers, and runs until all of
    /// them exit.
    ///
    /// SIGTERM, SIGINT, and SIGHUP are each forwarded to the workers as
    /// SIGTERM; the workers then drain and exit on their own schedule.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError`] when the socket cannot be bound or
    /// prepared, or a worker cannot be spawned.
    pub async fn run(&self) -> Result<(), SupervisorError> {
        let addr = self
            .config
            .socket_addr()
            .map_err(|source| SupervisorError::InvalidAddr {
                addr: self.config.bind_addr().to_string(),
                source,
            })?;
        let listener = std::net::TcpListener::bind(addr).map_err(|source| {
            SupervisorError::Bind {
                addr: self.config.bind_addr().to_string(),
                source,
            }
        })?;
        let fd = listener.as_raw_fd();
        set_inheritable(fd).map_err(SupervisorError::Inherit)?;

        let exe = std::env::current_exe().map_err(SupervisorError::Exe)?;
        tracing::info!(
            addr = %addr,
            workers = self.config.worker_num(),
            "supervisor starting"
        );

        let mut children = JoinSet::new();
        let mut pids = Vec::with_capacity(self.config.worker_num());
        for index in 0..self.config.worker_num() {
            let mut command = Command::new(&exe);
            command
                .args(std::env::args_os().skip(1))
                .env(WORKER_FD_ENV, fd.to_string())
                .kill_on_drop(true);

            let mut child = command.spawn().map_err(SupervisorError::Spawn)?;
            let pid = child.id();
            tracing::info!(worker = index, pid, "spawned worker");
            pids.push(pid);
            children.spawn(async move { (index, child.wait().await) });
        }

        // Each child holds its own copy of the descriptor now.
        drop(listener);

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;

        while !children.is_empty() {
            tokio::select! {
                _ = sigterm.recv() => forward_sigterm(&pids),
                _ = sigint.recv() => forward_sigterm(&pids),
                _ = sighup.recv() => forward_sigterm(&pids),
                Some(joined) = children.join_next() => {
                    reap(joined);
                }
            }
        }

        tracing::info!("all workers exited");
        Ok(())
    }
}

/// Reaps one joined worker: classifies its exit and reports it exactly
/// once. A crash in one worker never interrupts supervision of the rest.
fn reap(
    joined: Result<(usize, io::Result<ExitStatus>), tokio::task::JoinError>,
) -> Option<(usize, WorkerOutcome)> {
    match joined {
        Ok((index, Ok(status))) => {
            let outcome = WorkerOutcome::from_status(status);
            if outcome.is_expected() {
                tracing::info!(worker = index, %outcome, "worker exited");
            } else {
                tracing::error!(worker = index, %outcome, "worker exited abnormally");
            }
            Some((index, outcome))
        }
        Ok((index, Err(e))) => {
            tracing::error!(worker = index, error = %e, "failed to reap worker");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "worker wait task failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_clean_exit() {
        let outcome = WorkerOutcome::from_parts(Some(0), None);
        assert_eq!(outcome, WorkerOutcome::Clean);
        assert!(outcome.is_expected());
    }

    #[test]
    fn test_outcome_nonzero_exit() {
        let outcome = WorkerOutcome::from_parts(Some(3), None);
        assert_eq!(outcome, WorkerOutcome::Failed(3));
        assert!(!outcome.is_expected());
        assert_eq!(outcome.to_string(), "exited with code 3");
    }

    #[test]
    fn test_outcome_sigterm_is_expected() {
        let outcome = WorkerOutcome::from_parts(None, Some(libc::SIGTERM));
        assert_eq!(outcome, WorkerOutcome::Signaled(libc::SIGTERM));
        assert!(outcome.is_expected());
    }

    #[test]
    fn test_outcome_crash_signal_is_abnormal() {
        let outcome = WorkerOutcome::from_parts(None, Some(libc::SIGSEGV));
        assert!(!outcome.is_expected());
        assert_eq!(
            outcome.to_string(),
            format!("killed by SIGSEGV ({})", libc::SIGSEGV)
        );
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(libc::SIGKILL), "SIGKILL");
        assert_eq!(signal_name(libc::SIGTERM), "SIGTERM");
        assert_eq!(signal_name(-1), "unknown signal");
    }

    #[test]
    fn test_inherited_listener_absent() {
        // Nothing in the test environment sets the variable.
        assert!(inherited_listener().is_none());
    }

    #[tokio::test]
    async fn test_reap_loop_reports_crashed_worker_once_among_siblings() {
        // One worker dies by SIGSEGV; its siblings exit cleanly. Every
        // worker is reaped, and exactly one abnormal outcome is reported.
        let scripts = ["kill -SEGV $$", "exit 0", "exit 0"];

        let mut children = JoinSet::new();
        for (index, script) in scripts.iter().enumerate() {
            let mut child = Command::new("/bin/sh")
                .arg("-c")
                .arg(script)
                .spawn()
                .expect("spawn test child");
            children.spawn(async move { (index, child.wait().await) });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = children.join_next().await {
            if let Some(reaped) = reap(joined) {
                outcomes.push(reaped);
            }
        }
        outcomes.sort_by_key(|(index, _)| *index);

        assert_eq!(outcomes.len(), scripts.len());
        assert_eq!(outcomes[0].1, WorkerOutcome::Signaled(libc::SIGSEGV));
        assert!(!outcomes[0].1.is_expected());
        assert_eq!(outcomes[1].1, WorkerOutcome::Clean);
        assert_eq!(outcomes[2].1, WorkerOutcome::Clean);
    }

    #[tokio::test]
    async fn test_reap_sigterm_exit_is_expected() {
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg("kill -TERM $$")
            .spawn()
            .expect("spawn test child");
        let mut children = JoinSet::new();
        children.spawn(async move { (0usize, child.wait().await) });

        let joined = children.join_next().await.expect("one child");
        let (_, outcome) = reap(joined).expect("child reaped");
        assert_eq!(outcome, WorkerOutcome::Signaled(libc::SIGTERM));
        assert!(outcome.is_expected());
    }

    #[test]
    fn test_set_inheritable_clears_cloexec() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let fd = listener.as_raw_fd();
        set_inheritable(fd).unwrap();

        #[allow(unsafe_code)]
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        assert_eq!(flags & libc::FD_CLOEXEC, 0);
    }
}
