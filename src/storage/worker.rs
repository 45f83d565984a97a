use std::{
    sync::{mpsc, Arc, Mutex},
    thread,
    time::Duration,
};

use tracing::{debug, warn};

use super::{Record, RecordKind, RecordQuery, StorageBackend, StorageError};
use crate::utils::lock;

type Job = Box<dyn FnOnce(&dyn StorageBackend) + Send>;

/// Single-writer queue in front of a [`StorageBackend`].
///
/// Every call runs on a dedicated worker thread and the caller waits at most
/// `timeout`. A timed-out call may still complete later; callers retry with
/// the same record id, which backends treat as a replacement.
#[derive(Clone)]
pub struct PersistenceQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    sender: Mutex<mpsc::Sender<Job>>,
    timeout: Duration,
}

impl PersistenceQueue {
    pub fn new(backend: Arc<dyn StorageBackend>, timeout: Duration) -> Result<Self, StorageError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name("money-ledger-persistence".into())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job(backend.as_ref());
                }
                debug!("persistence worker stopped");
            })?;
        Ok(Self {
            inner: Arc::new(QueueInner {
                sender: Mutex::new(sender),
                timeout,
            }),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn save_record(&self, record: Record) -> Result<(), StorageError> {
        self.call(move |backend| backend.save_record(&record))
    }

    pub fn load_record(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StorageError> {
        let id = id.to_string();
        self.call(move |backend| backend.load_record(kind, &id))
    }

    pub fn query_range(&self, query: RecordQuery) -> Result<Vec<Record>, StorageError> {
        self.call(move |backend| backend.query_range(&query))
    }

    fn call<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn StorageBackend) -> Result<T, StorageError> + Send + 'static,
    {
        let (reply, response) = mpsc::channel();
        let job: Job = Box::new(move |backend| {
            // The caller may have given up already; a closed reply channel is fine.
            let _ = reply.send(op(backend));
        });
        lock(&self.inner.sender)
            .send(job)
            .map_err(|_| StorageError::Unavailable("persistence worker stopped".into()))?;
        match response.recv_timeout(self.inner.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(timeout = ?self.inner.timeout, "storage call timed out");
                Err(StorageError::Timeout(self.inner.timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(StorageError::Unavailable(
                "persistence worker dropped the call".into(),
            )),
        }
    }
}
