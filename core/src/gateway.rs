//! Persistence gateway — save, load and validate through sandboxed workers.
//!
//! RULES:
//!   - Only the gateway touches save files, and only from inside a worker.
//!   - One operation at a time: a second call waits for the first worker.
//!   - Bytes cross the boundary in codec order: header, fixed blocks, text.
//!   - A failed load returns an error and nothing else; the caller's
//!     in-memory state is never touched here.

use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use crate::{
    catalog::Catalog,
    channel::{byte_channel, CHUNK_LEN},
    codec,
    config::GameConfig,
    error::{CodecError, PersistError},
    state::{SimulationState, Subject},
    worker::{AccessMode, Grant, SandboxedWorker, WorkerExit, WorkerFault, WorkerReport},
};

/// A fully re-hydrated game, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedGame {
    pub state: SimulationState,
    pub subject: Subject,
    pub player_name: String,
}

pub struct PersistenceGateway {
    timeout: Duration,
    max_record_bytes: usize,
    default_player_name: String,
    catalog: Option<Catalog>,
    op_lock: Mutex<()>,
}

impl PersistenceGateway {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            timeout: config.worker_timeout(),
            max_record_bytes: config.persistence.max_record_bytes,
            default_player_name: config.rules.default_player_name.clone(),
            catalog: Some(config.catalog.clone()),
            op_lock: Mutex::new(()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Skip catalog bounds checks on load and validate.
    pub fn without_catalog(mut self) -> Self {
        self.catalog = None;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Write `state` and `subject` to `path`, replacing any existing file.
    ///
    /// The worker buffers and checks the whole record before opening the
    /// file, so an interrupted stream never truncates an existing save.
    pub fn save(&self, path: &Path, state: &SimulationState, subject: &Subject) -> Result<(), PersistError> {
        let _guard = self.op_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let bytes = codec::encode_record(state, subject);
        let (mut writer, reader) = byte_channel(self.timeout);
        let target = path.to_path_buf();
        let limit = self.max_record_bytes;

        let handle = SandboxedWorker::spawn(
            Grant::new(path, AccessMode::WriteCreateTruncate),
            self.timeout,
            move |sandbox| {
                let record = read_capped(reader, limit)?;
                codec::decode_record(&record)?;
                let mut file = sandbox.open(&target, AccessMode::WriteCreateTruncate)?;
                file.write_all(&record).map_err(WorkerFault::write)?;
                file.sync_all().map_err(WorkerFault::write)?;
                Ok(())
            },
        )?;

        let sent = bytes.chunks(CHUNK_LEN).try_for_each(|chunk| writer.write_all(chunk));
        drop(writer);
        let report = handle.wait()?;

        match report.exit {
            WorkerExit::Success => {}
            WorkerExit::SandboxViolation => return Err(sandbox_violation(path, report)),
            _ => {
                return Err(PersistError::WriteFailed {
                    path: path.to_path_buf(),
                    reason: report.detail,
                })
            }
        }
        if let Err(err) = sent {
            return Err(PersistError::WriteFailed {
                path: path.to_path_buf(),
                reason: err.to_string(),
            });
        }
        log::info!("Saved game to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Read and fully re-hydrate the game stored at `path`.
    ///
    /// The worker decodes and range-checks the file, then streams a canonical
    /// re-encoding back; the engine side decodes its own copy from those bytes.
    pub fn load(&self, path: &Path) -> Result<LoadedGame, PersistError> {
        let _guard = self.op_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let (mut writer, reader) = byte_channel(self.timeout);
        let target = path.to_path_buf();
        let limit = self.max_record_bytes;
        let catalog = self.catalog.clone();

        let handle = SandboxedWorker::spawn(Grant::new(path, AccessMode::ReadOnly), self.timeout, move |sandbox| {
            let file = sandbox.open(&target, AccessMode::ReadOnly)?;
            let record = read_capped(file, limit)?;
            let (state, subject) = codec::decode_record(&record)?;
            codec::check_ranges(&state, &subject, catalog.as_ref())
                .map_err(|reason| WorkerFault::new(WorkerExit::InvalidRecord, reason))?;
            let canonical = codec::encode_record(&state, &subject);
            canonical
                .chunks(CHUNK_LEN)
                .try_for_each(|chunk| writer.write_all(chunk))
                .map_err(WorkerFault::read)?;
            Ok(())
        })?;

        let mut received = Vec::new();
        let streamed = reader
            .take(self.max_record_bytes as u64 + 1)
            .read_to_end(&mut received);
        let report = handle.wait()?;
        map_read_report(path, report)?;

        if let Err(err) = streamed {
            return Err(match err.kind() {
                std::io::ErrorKind::TimedOut => PersistError::WorkerUnresponsive {
                    path: path.to_path_buf(),
                    timeout_ms: self.timeout.as_millis() as u64,
                },
                _ => PersistError::ReadFailed {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                },
            });
        }

        let (state, subject) = codec::decode_record(&received).map_err(|err| codec_failure(path, err))?;
        let player_name = state
            .player_name
            .clone()
            .unwrap_or_else(|| self.default_player_name.clone());
        log::info!("Loaded game from {}", path.display());
        Ok(LoadedGame { state, subject, player_name })
    }

    /// Structural and range checks on `path` without loading anything.
    ///
    /// Never fails: every fault, including unreadable or hostile paths, is
    /// absorbed by the worker and reported as `false`.
    pub fn validate(&self, path: &Path) -> bool {
        self.validate_report(path)
            .map(|report| report.exit.is_success())
            .unwrap_or(false)
    }

    /// Like `validate`, keeping the worker's exit status and detail.
    pub fn validate_report(&self, path: &Path) -> Result<WorkerReport, PersistError> {
        let _guard = self.op_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let target = path.to_path_buf();
        let limit = self.max_record_bytes;
        let catalog = self.catalog.clone();

        let handle = SandboxedWorker::spawn(Grant::new(path, AccessMode::StatRead), self.timeout, move |sandbox| {
            let file = sandbox.open(&target, AccessMode::StatRead)?;
            let record = read_capped(file, limit)?;
            let (state, subject) = codec::decode_record(&record)?;
            codec::check_ranges(&state, &subject, catalog.as_ref())
                .map_err(|reason| WorkerFault::new(WorkerExit::InvalidRecord, reason))
        })?;
        let report = handle.wait()?;
        if !report.exit.is_success() {
            log::info!("{} failed validation: {}", path.display(), report.detail);
        }
        Ok(report)
    }
}

/// Read everything, refusing inputs over `limit` bytes.
fn read_capped<R: Read>(source: R, limit: usize) -> Result<Vec<u8>, WorkerFault> {
    let mut bytes = Vec::new();
    source
        .take(limit as u64 + 1)
        .read_to_end(&mut bytes)
        .map_err(WorkerFault::read)?;
    if bytes.len() > limit {
        return Err(WorkerFault::new(
            WorkerExit::Malformed,
            format!("record larger than {limit} bytes"),
        ));
    }
    Ok(bytes)
}

fn map_read_report(path: &Path, report: WorkerReport) -> Result<(), PersistError> {
    let path: PathBuf = path.to_path_buf();
    match report.exit {
        WorkerExit::Success => Ok(()),
        WorkerExit::VersionMismatch => Err(PersistError::VersionMismatch { path }),
        WorkerExit::Truncated => Err(PersistError::Truncated { path }),
        WorkerExit::Malformed => Err(PersistError::Malformed { path, reason: report.detail }),
        WorkerExit::InvalidRecord => Err(PersistError::InvalidRecord { path, reason: report.detail }),
        WorkerExit::SandboxViolation => Err(sandbox_violation(&path, report)),
        WorkerExit::ReadFailed | WorkerExit::WriteFailed | WorkerExit::Crashed => {
            Err(PersistError::ReadFailed { path, reason: report.detail })
        }
    }
}

fn codec_failure(path: &Path, err: CodecError) -> PersistError {
    let path = path.to_path_buf();
    match err {
        CodecError::Truncated => PersistError::Truncated { path },
        CodecError::VersionMismatch { .. } => PersistError::VersionMismatch { path },
        CodecError::Malformed(reason) => PersistError::Malformed { path, reason },
    }
}

fn sandbox_violation(path: &Path, report: WorkerReport) -> PersistError {
    log::error!("Sandbox violation for {}: {}", path.display(), report.detail);
    PersistError::SandboxViolation {
        path: path.to_path_buf(),
        reason: report.detail,
    }
}
