//! Background ingestion: a bounded worker pool and per-document locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedMutexGuard, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::IngestionConfig;
use crate::document::Document;
use crate::error::{RagError, Result};
use crate::pipeline::RagPipeline;

type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Serialises writers per document.
///
/// Each document ID maps to its own async mutex. An entry lives only while
/// some caller holds or awaits its lock, so the map is bounded by the number
/// of documents being written concurrently rather than by every ID ever seen.
#[derive(Debug, Clone, Default)]
pub struct DocumentLocks {
    inner: Arc<Mutex<LockMap>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, document_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(document_id.to_string()).or_default().clone()
    }

    /// Wait for exclusive access to `document_id`.
    pub async fn lock(&self, document_id: &str) -> DocumentGuard {
        let guard = self.entry(document_id).lock_owned().await;
        DocumentGuard { document_id: document_id.to_string(), locks: self.clone(), guard: Some(guard) }
    }

    /// Take exclusive access to `document_id` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Conflict`] if another writer holds the document.
    pub fn try_lock(&self, document_id: &str) -> Result<DocumentGuard> {
        let guard = self.entry(document_id).try_lock_owned().map_err(|_| {
            RagError::Conflict(format!("document '{document_id}' is locked by another writer"))
        })?;
        Ok(DocumentGuard { document_id: document_id.to_string(), locks: self.clone(), guard: Some(guard) })
    }

    /// Number of documents currently locked or awaited.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, document_id: &str) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map's own reference left: nobody holds or awaits the lock.
        if map.get(document_id).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            map.remove(document_id);
        }
    }
}

/// Exclusive access to one document, released on drop.
#[derive(Debug)]
pub struct DocumentGuard {
    document_id: String,
    locks: DocumentLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl DocumentGuard {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }
}

impl Drop for DocumentGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.document_id);
    }
}

struct IngestJob {
    document: Document,
    reply: oneshot::Sender<IngestReport>,
}

/// Result of a background ingestion job.
#[derive(Debug)]
pub struct IngestReport {
    /// The document in its final lifecycle state.
    pub document: Document,
    /// Chunk count, or the error that failed the job.
    pub result: Result<usize>,
}

/// Handle to a submitted ingestion job.
#[derive(Debug)]
pub struct IngestTicket {
    document_id: String,
    reply: oneshot::Receiver<IngestReport>,
}

impl IngestTicket {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Wait for the job and return the number of chunks stored.
    ///
    /// # Errors
    ///
    /// Returns the ingestion error, or [`RagError::Pipeline`] if the worker
    /// stopped before finishing the job.
    pub async fn wait(self) -> Result<usize> {
        self.report().await?.result
    }

    /// Wait for the job and return the full report, including the document
    /// in its final state.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Pipeline`] if the worker stopped before finishing
    /// the job.
    pub async fn report(self) -> Result<IngestReport> {
        let document_id = self.document_id;
        self.reply.await.map_err(|_| {
            RagError::Pipeline(format!("ingestion of document '{document_id}' was abandoned"))
        })
    }
}

/// A fixed set of workers ingesting documents from a bounded queue.
///
/// [`submit`](IngestionPool::submit) never waits: when the queue is full the
/// job is rejected with [`RagError::Backpressure`] and the caller should
/// retry later.
///
/// # Example
///
/// ```rust,ignore
/// let pool = IngestionPool::new(pipeline.clone(), &config.ingestion);
/// let ticket = pool.submit(Document::new("doc-1", text))?;
/// let chunk_count = ticket.wait().await?;
/// pool.shutdown().await;
/// ```
pub struct IngestionPool {
    sender: mpsc::Sender<IngestJob>,
    workers: Vec<JoinHandle<()>>,
    capacity: usize,
}

impl IngestionPool {
    /// Spawn `config.workers` workers on the current Tokio runtime.
    pub fn new(pipeline: Arc<RagPipeline>, config: &IngestionConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                let pipeline = pipeline.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move { run_worker(worker, pipeline, receiver).await })
            })
            .collect();

        info!(workers = config.workers.max(1), queue_capacity = capacity, "ingestion pool started");
        Self { sender, workers, capacity }
    }

    /// Queue capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue a document for ingestion.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Backpressure`] if the queue is full.
    pub fn submit(&self, document: Document) -> Result<IngestTicket> {
        let document_id = document.id.clone();
        let (reply, receiver) = oneshot::channel();
        self.sender.try_send(IngestJob { document, reply }).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!(document.id = %document_id, capacity = self.capacity, "ingestion queue full");
                RagError::Backpressure { capacity: self.capacity }
            }
            mpsc::error::TrySendError::Closed(_) => {
                RagError::Pipeline("ingestion pool is shut down".to_string())
            }
        })?;
        debug!(document.id = %document_id, "queued document for ingestion");
        Ok(IngestTicket { document_id, reply: receiver })
    }

    /// Stop accepting jobs, let workers drain the queue, and wait for them.
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "ingestion worker panicked");
            }
        }
        info!("ingestion pool stopped");
    }
}

async fn run_worker(
    worker: usize,
    pipeline: Arc<RagPipeline>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<IngestJob>>>,
) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(IngestJob { mut document, reply }) = job else {
            break;
        };
        debug!(worker, document.id = %document.id, "ingestion job started");
        let result = pipeline.ingest(&mut document).await;
        if reply.send(IngestReport { document, result }).is_err() {
            debug!(worker, "ingestion ticket dropped before completion");
        }
    }
    debug!(worker, "ingestion worker exiting");
}
