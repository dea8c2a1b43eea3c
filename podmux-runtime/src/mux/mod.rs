//! The multiplexer front-end.
//!
//! [`PodConfig`] is what the embedding process holds: it hands each pod
//! source a bounded input endpoint, exposes the single merged output stream,
//! and can inject all-source checkpoints on demand. The actual state lives
//! with the merger task spawned at construction; see [`merger`].

mod merger;
mod store;

use self::merger::{MergeMsg, Merger};
use crate::events::EventRecorder;
use ahash::{AHashMap, AHashSet};
use futures::{channel::mpsc, SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use podmux_core::{LocalAnnotations, PodUpdate};
use std::sync::Arc;

/// How store changes translate into events on the merged stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationMode {
    /// One event per non-empty change bucket, in the order removes, adds,
    /// updates, reconciles.
    Incremental,
    /// A single full-source `Set` snapshot whenever anything changed.
    Snapshot,
    /// A full-source `Set` snapshot whenever membership shifted, followed by
    /// incremental removes, updates, and reconciles; a pure semantic update
    /// yields only `Update`.
    SnapshotAndUpdates,
}

/// Queue depth of each source endpoint and of the output stream.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 50;

/// A multiplexer merging pod reports from many sources into one classified
/// update stream.
///
/// Construction spawns the merger task onto the ambient tokio runtime.
/// Shutdown is signalled by closing the inputs: once the `PodConfig` and
/// every endpoint sender are dropped, the merger drains what is queued and
/// the stream returned by [`PodConfig::updates`] terminates.
#[derive(Debug)]
pub struct PodConfig {
    capacity: usize,
    merge_tx: mpsc::Sender<MergeMsg>,
    sources: Mutex<AHashMap<String, mpsc::Sender<PodUpdate>>>,
    seen_sources: Arc<RwLock<AHashSet<String>>>,
    updates_rx: Option<mpsc::Receiver<PodUpdate>>,
}

impl PodConfig {
    /// Creates the multiplexer and spawns its merger task.
    ///
    /// Must be called from within a tokio runtime. `local_annotations`
    /// decides which annotation keys belong to the node agent (see
    /// [`LocalAnnotations`]); `recorder` receives a `Warning` event for
    /// every pod dropped at validation.
    #[must_use]
    pub fn new(
        mode: NotificationMode,
        recorder: Arc<dyn EventRecorder>,
        local_annotations: LocalAnnotations,
    ) -> Self {
        Self::with_channel_capacity(mode, recorder, local_annotations, DEFAULT_CHANNEL_CAPACITY)
    }

    /// As [`PodConfig::new`], with an explicit queue depth for the source
    /// endpoints and the output stream.
    #[must_use]
    pub fn with_channel_capacity(
        mode: NotificationMode,
        recorder: Arc<dyn EventRecorder>,
        local_annotations: LocalAnnotations,
        capacity: usize,
    ) -> Self {
        let (merge_tx, merge_rx) = mpsc::channel(capacity);
        let (updates_tx, updates_rx) = mpsc::channel(capacity);
        let seen_sources = Arc::new(RwLock::new(AHashSet::new()));
        let merger = Merger::new(
            mode,
            recorder,
            local_annotations,
            seen_sources.clone(),
            updates_tx,
        );
        tokio::spawn(merger.run(merge_rx));
        Self {
            capacity,
            merge_tx,
            sources: Mutex::new(AHashMap::new()),
            seen_sources,
            updates_rx: Some(updates_rx),
        }
    }

    /// Returns the input endpoint for `source`, registering the source on
    /// first use.
    ///
    /// Repeated calls with the same name return handles to the same bounded
    /// queue. Reports are fire-and-forget once enqueued; their `source`
    /// field is ignored in favor of the registered name.
    pub fn channel(&self, source: &str) -> mpsc::Sender<PodUpdate> {
        let mut sources = self.sources.lock();
        if let Some(tx) = sources.get(source) {
            return tx.clone();
        }
        tracing::debug!(%source, "registering pod source");
        let (tx, rx) = mpsc::channel(self.capacity);
        tokio::spawn(forward(source.to_string(), rx, self.merge_tx.clone()));
        sources.insert(source.to_string(), tx.clone());
        tx
    }

    /// Claims the consumer-facing stream of merged events.
    ///
    /// The stream supports a single consumer; calling this twice is a
    /// programmer error and panics.
    pub fn updates(&mut self) -> mpsc::Receiver<PodUpdate> {
        self.updates_rx
            .take()
            .expect("the update stream was already claimed")
    }

    /// Asks the merger for a checkpoint event carrying every pod of every
    /// source, with op `Set` and the `"*"` source.
    ///
    /// Best-effort once shutdown has begun: if the merger is gone, this
    /// returns without emitting.
    pub async fn sync(&self) {
        let mut merge_tx = self.merge_tx.clone();
        let _ = merge_tx.send(MergeMsg::Sync).await;
    }

    /// True iff every source in `expected` has delivered at least one
    /// report since construction. Consumers use this to gate readiness.
    pub fn seen_all_sources<'a>(&self, expected: impl IntoIterator<Item = &'a str>) -> bool {
        let seen = self.seen_sources.read();
        expected.into_iter().all(|source| seen.contains(source))
    }
}

/// Moves reports from one source endpoint into the merger, preserving
/// per-source order and propagating merger back-pressure onto the source.
async fn forward(
    source: String,
    rx: mpsc::Receiver<PodUpdate>,
    mut merge_tx: mpsc::Sender<MergeMsg>,
) {
    let mut reports = rx.map(|update| {
        Ok::<MergeMsg, mpsc::SendError>(MergeMsg::Report {
            source: source.clone(),
            update,
        })
    });
    if merge_tx.send_all(&mut reports).await.is_err() {
        tracing::debug!(%source, "merger is gone, dropping remaining reports");
    }
}
