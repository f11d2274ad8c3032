//! StateStore — single-writer arbiter for the memory document
//!
//! One task owns the document. Every mutation is a transaction closure sent
//! over a bounded queue; the arbiter applies it to a copy, persists the copy
//! (write-to-temp + rename), and only then publishes it as committed. Readers
//! see the last committed document through a watch channel and never block.
//!
//! Concurrent read-modify-write cycles therefore cannot lose each other's
//! updates: they are serialized by the queue, not raced on disk. Other
//! processes are kept out by an advisory lock on `<document>.lock`, held for
//! as long as the arbiter runs.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vritual_core::{Error, MemoryDocument, Result};

const LOCK_RETRY: Duration = Duration::from_millis(25);

// Request claim states. Caller and arbiter race on PENDING; exactly one wins.
const PENDING: u8 = 0;
const STARTED: u8 = 1;
const ABANDONED: u8 = 2;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Max wait for the process lock, to enqueue a transaction, and for it to start.
    pub acquire_timeout: Duration,
    /// Persists slower than this are reported.
    pub io_timeout: Duration,
    pub queue_depth: usize,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            acquire_timeout: Duration::from_millis(2_000),
            io_timeout: Duration::from_millis(5_000),
            queue_depth: 64,
        }
    }
}

type Job = Box<dyn FnOnce(&mut MemoryDocument) + Send>;

struct Request {
    job: Job,
    claim: Arc<AtomicU8>,
    done: oneshot::Sender<Result<bool>>,
}

fn try_claim(claim: &AtomicU8, to: u8) -> bool {
    claim
        .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// Cheap-to-clone handle to the arbiter.
#[derive(Clone)]
pub struct StateStore {
    tx: mpsc::Sender<Request>,
    committed: watch::Receiver<Arc<MemoryDocument>>,
    path: Arc<PathBuf>,
    acquire_timeout: Duration,
}

impl StateStore {
    /// Take the process lock, load the document (or the default skeleton if
    /// absent) and spawn the arbiter. A document that exists but does not
    /// parse is a `CorruptState` error; a lock held elsewhere is `StoreBusy`.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let lock = acquire_lock(&config.path, config.acquire_timeout).await?;
        let doc = load_document(&config.path).await?;
        info!(
            "Opened memory document {} ({} loops, {} rituals)",
            config.path.display(),
            doc.loops.len(),
            doc.rituals.len()
        );

        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let (publish, committed) = watch::channel(Arc::new(doc));
        let path = Arc::new(config.path);

        tokio::spawn(run_arbiter(rx, publish, path.clone(), config.io_timeout, lock));

        Ok(Self {
            tx,
            committed,
            path,
            acquire_timeout: config.acquire_timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a slice of the last committed document.
    pub fn read<T>(&self, selector: impl FnOnce(&MemoryDocument) -> T) -> T {
        selector(&self.committed.borrow())
    }

    pub fn snapshot(&self) -> Arc<MemoryDocument> {
        self.committed.borrow().clone()
    }

    /// Observe every committed document.
    pub fn subscribe(&self) -> watch::Receiver<Arc<MemoryDocument>> {
        self.committed.clone()
    }

    /// Run one read-modify-write cycle against the document, atomically.
    ///
    /// `StoreBusy` means the closure never ran and never will. Once the
    /// arbiter has started it, the call waits for the persist to finish and
    /// returns its real outcome.
    pub async fn transact<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut MemoryDocument) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (out_tx, out_rx) = oneshot::channel();
        let (done_tx, mut done_rx) = oneshot::channel();
        let claim = Arc::new(AtomicU8::new(PENDING));
        let request = Request {
            job: Box::new(move |doc| {
                let _ = out_tx.send(f(doc));
            }),
            claim: claim.clone(),
            done: done_tx,
        };
        let submitted = Instant::now();

        match self.tx.send_timeout(request, self.acquire_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                return Err(Error::StoreBusy(format!(
                    "queue full for {}ms",
                    self.acquire_timeout.as_millis()
                )))
            }
            Err(SendTimeoutError::Closed(_)) => return Err(Error::StoreClosed),
        }

        let remaining = self.acquire_timeout.saturating_sub(submitted.elapsed());
        let waited = tokio::time::timeout(remaining, &mut done_rx).await;
        let verdict = match waited {
            Ok(verdict) => verdict,
            Err(_) if try_claim(&claim, ABANDONED) => {
                return Err(Error::StoreBusy(format!(
                    "not started within {}ms",
                    self.acquire_timeout.as_millis()
                )))
            }
            // Already running; its outcome is what lands on disk.
            Err(_) => done_rx.await,
        };

        match verdict {
            Ok(Ok(_changed)) => out_rx.await.map_err(|_| Error::StoreClosed),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::StoreClosed),
        }
    }
}

async fn run_arbiter(
    mut rx: mpsc::Receiver<Request>,
    publish: watch::Sender<Arc<MemoryDocument>>,
    path: Arc<PathBuf>,
    io_timeout: Duration,
    lock: File,
) {
    while let Some(request) = rx.recv().await {
        if !try_claim(&request.claim, STARTED) {
            debug!("Dropping abandoned transaction");
            continue;
        }

        let current = publish.borrow().clone();
        let mut next = (*current).clone();
        (request.job)(&mut next);

        if next == *current {
            let _ = request.done.send(Ok(false));
            continue;
        }

        // Never cancelled: the verdict must match what is on disk.
        let started = Instant::now();
        let verdict = match persist(&path, &next).await {
            Ok(()) => {
                publish.send_replace(Arc::new(next));
                Ok(true)
            }
            Err(e) => {
                warn!("Persist of {} failed: {}", path.display(), e);
                Err(e)
            }
        };
        let elapsed = started.elapsed();
        if elapsed > io_timeout {
            warn!(
                "Persist of {} took {}ms (io window {}ms)",
                path.display(),
                elapsed.as_millis(),
                io_timeout.as_millis()
            );
        }
        let _ = request.done.send(verdict);
    }
    drop(lock);
    debug!("Store arbiter for {} stopped, lock released", path.display());
}

/// Exclusive advisory lock on `<path>.lock`, held until the file is dropped.
async fn acquire_lock(path: &Path, timeout: Duration) -> Result<File> {
    ensure_parent(path).await?;
    let lock_path = sibling(path, ".lock");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;

    let deadline = Instant::now() + timeout;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(file),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                if Instant::now() >= deadline {
                    return Err(Error::StoreBusy(format!(
                        "{} is held by another process",
                        lock_path.display()
                    )));
                }
                tokio::time::sleep(LOCK_RETRY).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Load a memory document from disk. Missing file → default skeleton.
pub async fn load_document(path: &Path) -> Result<MemoryDocument> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str(&content)
            .map_err(|e| Error::corrupt_state(path, e.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No memory document at {} — starting from skeleton", path.display());
            Ok(MemoryDocument::default())
        }
        Err(e) => Err(e.into()),
    }
}

async fn persist(path: &Path, doc: &MemoryDocument) -> Result<()> {
    let json = serde_json::to_vec_pretty(doc)?;
    write_atomic(path, &json).await
}

/// Write to a sibling temp file, then rename over the target.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent(path).await?;
    let tmp = sibling(path, ".tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
