pub mod parser;
pub mod runner;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use self::parser::Observation;
use self::runner::RunOutcome;
use crate::error::{FileCityError, Result};
use crate::sandbox::{ClientPath, PathSandbox};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
pub const MIN_INTERVAL: Duration = Duration::from_millis(500);
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
pub const STOP_GRACE: Duration = Duration::from_millis(1500);

const DELETED_SUFFIX: &str = " (deleted)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenFileProcess {
    pub pid: u32,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenFileEntry {
    pub path: ClientPath,
    /// Where the path resolves to once symlinks are followed, if inside the root.
    pub resolved_path: Option<ClientPath>,
    pub processes: Vec<OpenFileProcess>,
}

/// Open files under the root at one point in time. Never mutated after it
/// has been built; each poll publishes a new one.
#[derive(Debug, Default)]
pub struct LsofSnapshot {
    entries: BTreeMap<ClientPath, OpenFileEntry>,
}

impl LsofSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fold parsed observations into per-path entries. Names are resolved
    /// against the root when relative; anything that is the root itself,
    /// lies outside it, or is a directory is dropped.
    pub fn from_observations(sandbox: &PathSandbox, observations: &[Observation]) -> Self {
        let mut entries: BTreeMap<ClientPath, OpenFileEntry> = BTreeMap::new();

        for observation in observations {
            let Some((client, resolved)) = locate_observation(sandbox, &observation.name) else {
                continue;
            };

            let entry = entries.entry(client.clone()).or_insert_with(|| OpenFileEntry {
                path: client,
                resolved_path: None,
                processes: Vec::new(),
            });
            if entry.resolved_path.is_none() {
                entry.resolved_path = resolved;
            }
            if !entry.processes.iter().any(|p| p.pid == observation.pid) {
                entry.processes.push(OpenFileProcess {
                    pid: observation.pid,
                    command: observation.command.clone(),
                });
            }
        }

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries at or below `directory`, sorted case-insensitively by path.
    pub fn entries_under(&self, directory: &ClientPath) -> Vec<OpenFileEntry> {
        let mut matches: Vec<OpenFileEntry> = self
            .entries
            .values()
            .filter(|entry| entry.path.is_within(directory))
            .cloned()
            .collect();
        matches.sort_by_cached_key(|entry| entry.path.to_string().to_lowercase());
        matches
    }
}

fn locate_observation(
    sandbox: &PathSandbox,
    raw: &str,
) -> Option<(ClientPath, Option<ClientPath>)> {
    let cleaned = raw.split(DELETED_SUFFIX).next().unwrap_or_default().trim();
    if cleaned.is_empty() {
        return None;
    }

    let candidate = Path::new(cleaned);
    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        // Relative names are pseudo-files (pipes, sockets) unless they exist under the root.
        let joined = sandbox.root().join(candidate);
        if joined.symlink_metadata().is_err() {
            return None;
        }
        joined
    };

    let client = sandbox.lexical_client_path(&absolute).ok()?;
    if client.is_root() || absolute.is_dir() {
        return None;
    }
    let resolved = sandbox.to_client_path(&absolute).ok();
    Some((client, resolved))
}

/// How to invoke the external tool and how often.
#[derive(Debug, Clone)]
pub struct LsofSettings {
    pub binary: PathBuf,
    pub args: Vec<OsString>,
    pub interval: Duration,
    pub timeout: Duration,
}

impl LsofSettings {
    pub fn new(binary: PathBuf, interval: Duration) -> Self {
        Self {
            binary,
            args: ["-w", "-n", "-P", "-Fpcn"].iter().map(OsString::from).collect(),
            interval: interval.max(MIN_INTERVAL),
            timeout: COMMAND_TIMEOUT,
        }
    }
}

struct Shared {
    sandbox: Arc<PathSandbox>,
    settings: Option<LsofSettings>,
    available: AtomicBool,
    /// Set while consecutive polls fail, so a streak is reported once.
    failing: AtomicBool,
    snapshot: RwLock<Arc<LsofSnapshot>>,
}

struct Worker {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Caches the latest lsof snapshot, refreshed by a single background thread.
pub struct LsofSnapshotCache {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl LsofSnapshotCache {
    pub fn new(sandbox: Arc<PathSandbox>, settings: LsofSettings) -> Self {
        Self::build(sandbox, Some(settings))
    }

    /// A cache for hosts where open-file monitoring is off or impossible.
    pub fn disabled(sandbox: Arc<PathSandbox>) -> Self {
        Self::build(sandbox, None)
    }

    fn build(sandbox: Arc<PathSandbox>, settings: Option<LsofSettings>) -> Self {
        Self {
            shared: Arc::new(Shared {
                sandbox,
                available: AtomicBool::new(settings.is_some()),
                settings,
                failing: AtomicBool::new(false),
                snapshot: RwLock::new(Arc::new(LsofSnapshot::empty())),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn is_available(&self) -> bool {
        self.shared.available.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Spawn the polling thread. Does nothing if it is already running or
    /// monitoring is unavailable.
    pub fn start(&self) {
        if !self.is_available() {
            return;
        }
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(&self.shared);
        let flag = Arc::clone(&shutdown);
        let spawned = std::thread::Builder::new()
            .name("filecity-lsof".to_string())
            .spawn(move || poll_loop(shared, flag));

        match spawned {
            Ok(handle) => *worker = Some(Worker { shutdown, handle }),
            Err(e) => warn!("failed to spawn lsof polling thread: {}", e),
        }
    }

    /// Signal the polling thread, wait briefly for it, and clear the snapshot.
    /// A thread stuck in an lsof call is left to finish on its own.
    pub fn stop(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.shutdown.store(true, Ordering::SeqCst);
            let deadline = Instant::now() + STOP_GRACE;
            while !worker.handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if worker.handle.is_finished() {
                let _ = worker.handle.join();
            } else {
                warn!("lsof polling thread did not stop within {:?}", STOP_GRACE);
            }
        }
        *self.shared.snapshot.write() = Arc::new(LsofSnapshot::empty());
        self.shared.failing.store(false, Ordering::Relaxed);
    }

    /// Run one poll cycle on the calling thread.
    pub fn poll_now(&self) {
        poll_once(&self.shared, &AtomicBool::new(false));
    }

    /// Whether the most recent poll failed and the failure has not cleared yet.
    pub fn is_failing(&self) -> bool {
        self.shared.failing.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Arc<LsofSnapshot> {
        Arc::clone(&self.shared.snapshot.read())
    }

    /// Open files at or below `directory` according to the latest snapshot.
    pub fn entries_for(&self, directory: &Path) -> Result<Vec<OpenFileEntry>> {
        if !self.is_available() {
            return Err(FileCityError::Unsupported(
                "Open file inspection is not supported on this system".to_string(),
            ));
        }
        let client = self.shared.sandbox.to_client_path(directory)?;
        Ok(self.snapshot().entries_under(&client))
    }
}

impl Drop for LsofSnapshotCache {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().as_ref() {
            worker.shutdown.store(true, Ordering::Relaxed);
        }
    }
}

/// Swap in a new snapshot unless the poller that built it has been stopped.
/// The flag is checked under the write lock, so a stopped worker can never
/// overwrite the empty snapshot `stop` leaves behind.
fn publish(shared: &Shared, snapshot: LsofSnapshot, shutdown: &AtomicBool) -> bool {
    let mut current = shared.snapshot.write();
    if shutdown.load(Ordering::SeqCst) {
        return false;
    }
    *current = Arc::new(snapshot);
    true
}

fn poll_loop(shared: Arc<Shared>, shutdown: Arc<AtomicBool>) {
    let Some(interval) = shared.settings.as_ref().map(|s| s.interval) else {
        return;
    };
    debug!("lsof polling started, interval={:?}", interval);

    while !shutdown.load(Ordering::Relaxed) {
        poll_once(&shared, &shutdown);
        if !shared.available.load(Ordering::Relaxed) {
            break;
        }

        // Sleep in short ticks so a stop request is noticed promptly.
        let tick = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && !shutdown.load(Ordering::Relaxed) {
            let sleep_time = remaining.min(tick);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }
    debug!("lsof polling stopped");
}

/// One cycle. Failures keep the previous snapshot and are reported once per
/// streak; a missing binary disables monitoring for good. Results from a
/// worker stopped mid-capture are discarded.
fn poll_once(shared: &Shared, shutdown: &AtomicBool) {
    let result = capture(shared);
    if shutdown.load(Ordering::SeqCst) {
        debug!("lsof poller stopped during capture, discarding result");
        return;
    }

    match result {
        Ok(snapshot) => {
            let count = snapshot.len();
            if publish(shared, snapshot, shutdown) {
                if shared.failing.swap(false, Ordering::Relaxed) {
                    info!("lsof polling recovered");
                }
                debug!("lsof snapshot captured: {} open files", count);
            }
        }
        Err(FileCityError::Unsupported(reason)) => {
            if publish(shared, LsofSnapshot::empty(), shutdown) {
                warn!("{}; open-file monitoring disabled", reason);
                shared.available.store(false, Ordering::Relaxed);
            }
        }
        Err(e) => {
            if shared.failing.swap(true, Ordering::Relaxed) {
                debug!("lsof poll still failing: {}", e);
            } else {
                warn!("lsof poll failed, keeping previous snapshot: {}", e);
            }
        }
    }
}

fn capture(shared: &Shared) -> Result<LsofSnapshot> {
    let Some(settings) = shared.settings.as_ref() else {
        return Err(FileCityError::Unsupported("lsof is not configured".to_string()));
    };

    match runner::run(&settings.binary, &settings.args, settings.timeout)? {
        RunOutcome::Missing => Err(FileCityError::Unsupported(format!(
            "lsof binary {} not found",
            settings.binary.display()
        ))),
        RunOutcome::TimedOut => Err(FileCityError::Timeout(format!(
            "lsof did not finish within {:?}",
            settings.timeout
        ))),
        // lsof exits with 1 when nothing matched.
        RunOutcome::Completed {
            code: Some(0 | 1),
            stdout,
            ..
        } => {
            let observations = parser::parse(&stdout);
            Ok(LsofSnapshot::from_observations(&shared.sandbox, &observations))
        }
        RunOutcome::Completed { code, stderr, .. } => {
            let detail = stderr.trim();
            Err(FileCityError::Io(std::io::Error::other(format!(
                "lsof exited with {:?}: {}",
                code,
                if detail.is_empty() { "no output" } else { detail }
            ))))
        }
    }
}
