//! Sandboxed worker — one short-lived execution context per file operation.
//!
//! RULES:
//!   - A worker is handed a `Grant` (one path, one access mode) and turns it
//!     into a `Sandbox` before running any job code. There is no way to widen
//!     a sandbox once built.
//!   - A sandbox opens at most one file: the granted path, in the granted
//!     mode. Everything else is a `SandboxViolation`.
//!   - On Linux the worker thread also restricts itself with Landlock before
//!     the job runs, so the kernel refuses any path or mode outside the grant
//!     even when the job bypasses `Sandbox::open`. Where Landlock is missing
//!     the `Sandbox` checks are the only guard; `Enforcement` says which.
//!   - The file handle carries exactly the granted OS access mode, so a
//!     read-only handle refuses writes at the OS level.
//!   - Workers share no mutable memory with the engine. Bytes move over a
//!     channel; the outcome moves back as a `WorkerReport`.
//!   - Any fault, including a panic, ends the worker with a non-zero exit.

use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::error::{CodecError, PersistError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteCreateTruncate,
    /// Stat the path, require a regular file, then open it read-only.
    StatRead,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadOnly => "read-only",
            Self::WriteCreateTruncate => "write-create-truncate",
            Self::StatRead => "stat-read",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    path: PathBuf,
    mode: AccessMode,
}

impl Grant {
    pub fn new(path: impl Into<PathBuf>, mode: AccessMode) -> Self {
        Self { path: path.into(), mode }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }
}

/// Worker exit status. Zero is success; every failure has its own code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Success = 0,
    ReadFailed = 2,
    WriteFailed = 3,
    VersionMismatch = 4,
    Truncated = 5,
    Malformed = 6,
    InvalidRecord = 7,
    SandboxViolation = 8,
    Crashed = 101,
}

impl WorkerExit {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Why a job stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFault {
    pub exit: WorkerExit,
    pub detail: String,
}

impl WorkerFault {
    pub fn new(exit: WorkerExit, detail: impl Into<String>) -> Self {
        Self { exit, detail: detail.into() }
    }

    pub fn read(err: io::Error) -> Self {
        Self::new(WorkerExit::ReadFailed, err.to_string())
    }

    pub fn write(err: io::Error) -> Self {
        Self::new(WorkerExit::WriteFailed, err.to_string())
    }
}

impl From<CodecError> for WorkerFault {
    fn from(err: CodecError) -> Self {
        let exit = match err {
            CodecError::Truncated => WorkerExit::Truncated,
            CodecError::VersionMismatch { .. } => WorkerExit::VersionMismatch,
            CodecError::Malformed(_) => WorkerExit::Malformed,
        };
        Self::new(exit, err.to_string())
    }
}

/// Who refuses access outside the grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforcement {
    /// The kernel, for every filesystem call the worker thread makes.
    Kernel,
    /// Only `Sandbox::open`.
    Emulated,
}

impl fmt::Display for Enforcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Kernel => "kernel",
            Self::Emulated => "emulated",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub exit: WorkerExit,
    pub detail: String,
    pub enforcement: Enforcement,
}

impl WorkerReport {
    pub fn success(enforcement: Enforcement) -> Self {
        Self { exit: WorkerExit::Success, detail: String::new(), enforcement }
    }
}

/// The narrowed filesystem capability a job runs with.
pub struct Sandbox {
    grant: Grant,
    spent: bool,
    enforcement: Enforcement,
}

impl Sandbox {
    /// Restrict the current thread to `grant`. Irrevocable for this thread.
    fn narrow(grant: Grant) -> Self {
        let enforcement = restrict_thread(&grant);
        log::debug!(
            "Worker narrowed to {} {} ({enforcement})",
            grant.mode(),
            grant.path().display()
        );
        Self { grant, spent: false, enforcement }
    }

    pub fn enforcement(&self) -> Enforcement {
        self.enforcement
    }

    pub fn granted_path(&self) -> &Path {
        self.grant.path()
    }

    pub fn granted_mode(&self) -> AccessMode {
        self.grant.mode()
    }

    /// Open the granted file. Succeeds at most once per sandbox.
    pub fn open(&mut self, path: &Path, mode: AccessMode) -> Result<File, WorkerFault> {
        if self.spent {
            return Err(violation(format!(
                "second open of {} after the capability was spent",
                path.display()
            )));
        }
        if path != self.grant.path {
            return Err(violation(format!(
                "{} is outside the grant for {}",
                path.display(),
                self.grant.path.display()
            )));
        }
        if mode != self.grant.mode {
            return Err(violation(format!(
                "{mode} access requested, only {} granted",
                self.grant.mode
            )));
        }
        self.spent = true;

        match mode {
            AccessMode::ReadOnly => File::open(path).map_err(WorkerFault::read),
            AccessMode::WriteCreateTruncate => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .map_err(WorkerFault::write),
            AccessMode::StatRead => {
                // Stat first so FIFOs and devices are refused before open can block.
                let meta = fs::metadata(path).map_err(WorkerFault::read)?;
                if !meta.is_file() {
                    return Err(WorkerFault::new(
                        WorkerExit::ReadFailed,
                        format!("{} is not a regular file", path.display()),
                    ));
                }
                let file = File::open(path).map_err(WorkerFault::read)?;
                let opened = file.metadata().map_err(WorkerFault::read)?;
                if !opened.is_file() {
                    return Err(WorkerFault::new(
                        WorkerExit::ReadFailed,
                        format!("{} changed type while opening", path.display()),
                    ));
                }
                Ok(file)
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn restrict_thread(grant: &Grant) -> Enforcement {
    match landlock_rules::restrict(grant) {
        Ok(true) => Enforcement::Kernel,
        Ok(false) => {
            log::warn!("Landlock is not available; worker grant is emulated only");
            Enforcement::Emulated
        }
        Err(reason) => {
            log::warn!("Landlock setup failed for {}: {reason}", grant.path().display());
            Enforcement::Emulated
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn restrict_thread(_grant: &Grant) -> Enforcement {
    Enforcement::Emulated
}

#[cfg(target_os = "linux")]
mod landlock_rules {
    use std::path::Path;

    use landlock::{
        Access, AccessFs, PathBeneath, PathFd, Ruleset, RulesetAttr, RulesetCreatedAttr, RulesetStatus, ABI,
    };

    use super::{AccessMode, Grant};

    /// V2 handles every file access this worker can make. Truncation is
    /// only handled from V3 on, so `O_TRUNC` stays governed by WriteFile.
    const ABI_LEVEL: ABI = ABI::V2;

    /// Returns whether the kernel enforces the ruleset.
    ///
    /// A path that cannot be resolved gets no rule at all, which leaves
    /// every access denied.
    pub(super) fn restrict(grant: &Grant) -> Result<bool, String> {
        let ruleset = Ruleset::default()
            .handle_access(AccessFs::from_all(ABI_LEVEL))
            .map_err(|e| e.to_string())?
            .create()
            .map_err(|e| e.to_string())?;

        let path = grant.path();
        let ruleset = match grant.mode() {
            AccessMode::ReadOnly | AccessMode::StatRead => match PathFd::new(path) {
                Ok(fd) => ruleset
                    .add_rule(PathBeneath::new(fd, AccessFs::ReadFile))
                    .map_err(|e| e.to_string())?,
                Err(_) => ruleset,
            },
            AccessMode::WriteCreateTruncate if path.is_file() => match PathFd::new(path) {
                Ok(fd) => ruleset
                    .add_rule(PathBeneath::new(fd, AccessFs::WriteFile))
                    .map_err(|e| e.to_string())?,
                Err(_) => ruleset,
            },
            // Creating a file needs a rule on its directory; that is the
            // narrowest grant Landlock can express for a new file.
            AccessMode::WriteCreateTruncate => match PathFd::new(parent_dir(path)) {
                Ok(fd) => ruleset
                    .add_rule(PathBeneath::new(fd, AccessFs::MakeReg | AccessFs::WriteFile))
                    .map_err(|e| e.to_string())?,
                Err(_) => ruleset,
            },
        };

        let status = ruleset.restrict_self().map_err(|e| e.to_string())?;
        Ok(status.ruleset != RulesetStatus::NotEnforced)
    }

    fn parent_dir(path: &Path) -> &Path {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

fn violation(detail: String) -> WorkerFault {
    WorkerFault::new(WorkerExit::SandboxViolation, detail)
}

pub struct SandboxedWorker;

impl SandboxedWorker {
    /// Start a worker that narrows itself to `grant` and then runs `job`.
    pub fn spawn<F>(grant: Grant, timeout: Duration, job: F) -> Result<WorkerHandle, PersistError>
    where
        F: FnOnce(&mut Sandbox) -> Result<(), WorkerFault> + Send + 'static,
    {
        let path = grant.path().to_path_buf();
        let mode = grant.mode();
        let (report_tx, report_rx) = mpsc::sync_channel(1);

        let thread = thread::Builder::new()
            .name(format!("fangcare-worker-{mode}"))
            .spawn(move || {
                let mut sandbox = Sandbox::narrow(grant);
                let enforcement = sandbox.enforcement();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&mut sandbox)));
                let report = match outcome {
                    Ok(Ok(())) => WorkerReport::success(enforcement),
                    Ok(Err(fault)) => WorkerReport {
                        exit: fault.exit,
                        detail: fault.detail,
                        enforcement,
                    },
                    Err(_) => WorkerReport {
                        exit: WorkerExit::Crashed,
                        detail: "worker panicked".to_string(),
                        enforcement,
                    },
                };
                // The parent may have given up waiting already.
                let _ = report_tx.send(report);
            })
            .map_err(|e| spawn_failure(&path, mode, e))?;

        log::debug!("Spawned {mode} worker for {}", path.display());
        Ok(WorkerHandle {
            report_rx,
            thread: Some(thread),
            path,
            timeout,
        })
    }
}

fn spawn_failure(path: &Path, mode: AccessMode, err: io::Error) -> PersistError {
    let reason = format!("cannot start worker: {err}");
    match mode {
        AccessMode::WriteCreateTruncate => PersistError::WriteFailed { path: path.to_path_buf(), reason },
        _ => PersistError::ReadFailed { path: path.to_path_buf(), reason },
    }
}

pub struct WorkerHandle {
    report_rx: Receiver<WorkerReport>,
    thread: Option<JoinHandle<()>>,
    path: PathBuf,
    timeout: Duration,
}

impl WorkerHandle {
    /// Block until the worker exits, up to the configured timeout.
    ///
    /// A worker that misses the deadline is abandoned: the thread is detached
    /// and the call fails with `WorkerUnresponsive`.
    pub fn wait(mut self) -> Result<WorkerReport, PersistError> {
        let report = match self.report_rx.recv_timeout(self.timeout) {
            Ok(report) => report,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Worker for {} unresponsive; abandoning it", self.path.display());
                self.thread.take();
                return Err(PersistError::WorkerUnresponsive {
                    path: self.path.clone(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            Err(RecvTimeoutError::Disconnected) => WorkerReport {
                exit: WorkerExit::Crashed,
                detail: "worker exited without a report".to_string(),
                enforcement: Enforcement::Emulated,
            },
        };
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Worker thread for {} panicked after reporting", self.path.display());
            }
        }
        log::debug!(
            "Worker for {} exited with status {} {}",
            self.path.display(),
            report.exit.code(),
            report.detail
        );
        Ok(report)
    }
}
