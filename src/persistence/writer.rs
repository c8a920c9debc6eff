//! Background persistence worker
//!
//! The broker never touches the disk while serving a request. Instead it
//! takes a point-in-time snapshot under its lock and parks it in the slot for
//! its document, replacing any snapshot the worker has not picked up yet.
//! The worker is woken through a one-slot channel, takes whatever the slots
//! hold and writes it on the blocking pool.
//!
//! Every snapshot is a complete document, so only the latest one per document
//! matters and nothing is ever dropped: a burst of mutations costs one write
//! per document. `flush` returns once the state current at the time of the
//! call has reached the disk.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::broker::message::Message;
use crate::broker::sequencer::CursorEntry;
use crate::persistence::file_store::DurableStore;
use crate::utils::error::PersistenceError;

/// Snapshots waiting for the worker, at most one per document.
#[derive(Debug, Default)]
struct Pending {
    messages: Option<Vec<Message>>,
    cursors: Option<Vec<CursorEntry>>,
    flushes: Vec<oneshot::Sender<()>>,
}

impl Pending {
    fn is_idle(&self) -> bool {
        self.messages.is_none() && self.cursors.is_none() && self.flushes.is_empty()
    }
}

/// Sending side of the persistence worker, held by the broker.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    pending: Arc<Mutex<Pending>>,
    wake: mpsc::Sender<()>,
}

impl PersistenceHandle {
    pub fn save_messages(&self, snapshot: Vec<Message>) {
        self.lock().messages = Some(snapshot);
        self.notify("message queue");
    }

    pub fn save_cursors(&self, snapshot: Vec<CursorEntry>) {
        self.lock().cursors = Some(snapshot);
        self.notify("sequence tracker");
    }

    /// Wait until every snapshot handed over before this call is on disk.
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        let (reply, done) = oneshot::channel();
        self.lock().flushes.push(reply);
        if let Err(mpsc::error::TrySendError::Closed(_)) = self.wake.try_send(()) {
            return Err(PersistenceError::WorkerGone);
        }
        done.await.map_err(|_| PersistenceError::WorkerGone)
    }

    // A full wake channel already guarantees another pass over the slots.
    fn notify(&self, what: &str) {
        if let Err(mpsc::error::TrySendError::Closed(_)) = self.wake.try_send(()) {
            error!("Persistence worker stopped, {what} snapshot not saved");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Start the worker. It runs until every handle is dropped, writing whatever
/// is still pending before it exits.
pub fn spawn_writer(store: DurableStore) -> (PersistenceHandle, JoinHandle<()>) {
    let pending = Arc::new(Mutex::new(Pending::default()));
    let (wake, rx) = mpsc::channel(1);
    let task = tokio::spawn(run_writer(store, pending.clone(), rx));
    (PersistenceHandle { pending, wake }, task)
}

async fn run_writer(store: DurableStore, pending: Arc<Mutex<Pending>>, mut rx: mpsc::Receiver<()>) {
    while rx.recv().await.is_some() {
        drain(&store, &pending).await;
    }
    drain(&store, &pending).await;
    debug!("Persistence writer stopped");
}

async fn drain(store: &DurableStore, pending: &Mutex<Pending>) {
    loop {
        let batch = {
            let mut slots = pending.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.is_idle() {
                return;
            }
            std::mem::take(&mut *slots)
        };

        if let Some(snapshot) = batch.messages {
            let doc = store.messages.clone();
            write("message queue", move || doc.save(&snapshot)).await;
        }
        if let Some(snapshot) = batch.cursors {
            let doc = store.cursors.clone();
            write("sequence tracker", move || doc.save(&snapshot)).await;
        }
        for reply in batch.flushes {
            let _ = reply.send(());
        }
    }
}

async fn write<F>(what: &str, save: F)
where
    F: FnOnce() -> Result<(), PersistenceError> + Send + 'static,
{
    match tokio::task::spawn_blocking(save).await {
        Ok(Ok(())) => debug!("Saved {what}"),
        Ok(Err(e)) => error!("Failed to save {what}: {e}"),
        Err(e) => error!("Writer for {what} panicked: {e}"),
    }
}
