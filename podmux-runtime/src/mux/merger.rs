//! The single-writer merger task.

use super::store::{Deltas, SourceStore};
use super::NotificationMode;
use crate::events::{Event, EventRecorder, EventType};
use ahash::{AHashMap, AHashSet};
use futures::{channel::mpsc, SinkExt, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use parking_lot::RwLock;
use podmux_core::pod_ref::normalize_namespace;
use podmux_core::{
    validate_pod, LocalAnnotations, PodOperation, PodRef, PodUpdate, ValidationError, ALL_SOURCE,
};
use std::collections::hash_map::Entry;
use std::sync::Arc;

/// What flows into the merger: a report from a registered source, or a
/// request for an all-source checkpoint.
#[derive(Debug)]
pub(super) enum MergeMsg {
    Report { source: String, update: PodUpdate },
    Sync,
}

/// Owns every per-source store and the output stream.
///
/// All classification happens on this task, one report at a time, so the
/// stores need no locking. Sources feel back-pressure transitively: when the
/// consumer stops reading, [`Merger::send`] blocks, the input queue fills,
/// and the per-source endpoints fill after it.
pub(super) struct Merger {
    mode: NotificationMode,
    recorder: Arc<dyn EventRecorder>,
    local_annotations: LocalAnnotations,
    stores: AHashMap<String, SourceStore>,
    /// Sources that have delivered at least one report. Written here, read
    /// by [`super::PodConfig::seen_all_sources`].
    seen_sources: Arc<RwLock<AHashSet<String>>>,
    updates_tx: mpsc::Sender<PodUpdate>,
}

impl Merger {
    pub(super) fn new(
        mode: NotificationMode,
        recorder: Arc<dyn EventRecorder>,
        local_annotations: LocalAnnotations,
        seen_sources: Arc<RwLock<AHashSet<String>>>,
        updates_tx: mpsc::Sender<PodUpdate>,
    ) -> Self {
        Self {
            mode,
            recorder,
            local_annotations,
            stores: AHashMap::new(),
            seen_sources,
            updates_tx,
        }
    }

    /// Drains the input queue until every sender is gone, then lets the
    /// output stream close behind the last event.
    pub(super) async fn run(mut self, mut rx: mpsc::Receiver<MergeMsg>) {
        tracing::debug!("pod merger task started");
        while let Some(msg) = rx.next().await {
            match msg {
                MergeMsg::Report { source, update } => self.merge(&source, update).await,
                MergeMsg::Sync => self.sync().await,
            }
        }
        tracing::debug!("pod merger task terminated");
    }

    async fn merge(&mut self, source: &str, update: PodUpdate) {
        self.seen_sources.write().insert(source.to_string());
        let op = update.op;
        tracing::debug!(%source, %op, pods = update.pods.len(), "merging report");

        let pods = match op {
            // Removal only needs the ref; the emitted pod is the stored one,
            // which passed validation at its own ingress.
            PodOperation::Remove => Self::normalized(update.pods),
            _ => self.ingest(source, update.pods),
        };
        let local = self.local_annotations.clone();
        let store = self.stores.entry(source.to_string()).or_default();
        let deltas = match op {
            PodOperation::Add | PodOperation::Update | PodOperation::Reconcile => {
                store.upsert(pods, &local)
            }
            PodOperation::Remove => store.remove(&pods),
            PodOperation::Set => store.replace(pods, &local),
        };
        self.notify(source, deltas).await;
    }

    /// Clones, normalizes, validates, and deduplicates the pods of one
    /// report. Invalid pods are dropped here and never reach a store; when a
    /// ref appears twice the later entry wins and the earlier is discarded
    /// silently.
    fn ingest(&self, source: &str, pods: Vec<Arc<Pod>>) -> Vec<Pod> {
        let mut accepted: Vec<Pod> = Vec::with_capacity(pods.len());
        let mut by_ref: AHashMap<PodRef, usize> = AHashMap::with_capacity(pods.len());
        for pod in pods {
            let mut pod = Pod::clone(&pod);
            normalize_namespace(&mut pod);
            if let Err(error) = validate_pod(&pod) {
                self.reject(source, &pod, &error);
                continue;
            }
            match by_ref.entry(PodRef::from_pod(&pod)) {
                Entry::Occupied(entry) => accepted[*entry.get()] = pod,
                Entry::Vacant(entry) => {
                    entry.insert(accepted.len());
                    accepted.push(pod);
                }
            }
        }
        accepted
    }

    fn normalized(pods: Vec<Arc<Pod>>) -> Vec<Pod> {
        pods.iter()
            .map(|pod| {
                let mut pod = Pod::clone(pod);
                normalize_namespace(&mut pod);
                pod
            })
            .collect()
    }

    fn reject(&self, source: &str, pod: &Pod, error: &ValidationError) {
        let regarding = PodRef::from_pod(pod);
        tracing::warn!(%source, pod = %regarding, %error, "dropping invalid pod");
        self.recorder.publish(Event {
            event_type: EventType::Warning,
            reason: "FailedValidation".to_string(),
            note: Some(format!("ignoring invalid pod from {source}: {error}")),
            regarding,
        });
    }

    async fn notify(&mut self, source: &str, deltas: Deltas) {
        match self.mode {
            NotificationMode::Incremental => self.send_buckets(source, deltas, true).await,
            NotificationMode::Snapshot => {
                if !deltas.is_empty() {
                    let pods = self.state(source);
                    self.send(PodUpdate::new(PodOperation::Set, source, pods)).await;
                }
            }
            NotificationMode::SnapshotAndUpdates => {
                if deltas.membership_shifted() {
                    let pods = self.state(source);
                    self.send(PodUpdate::new(PodOperation::Set, source, pods)).await;
                }
                // Adds appear only in the snapshot.
                self.send_buckets(source, deltas, false).await;
            }
        }
    }

    /// Emits one event per non-empty bucket, in the fixed order
    /// removes, adds, updates, reconciles.
    async fn send_buckets(&mut self, source: &str, deltas: Deltas, with_adds: bool) {
        let Deltas {
            adds,
            updates,
            removes,
            reconciles,
        } = deltas;
        let buckets = [
            (PodOperation::Remove, removes),
            (PodOperation::Add, if with_adds { adds } else { Vec::new() }),
            (PodOperation::Update, updates),
            (PodOperation::Reconcile, reconciles),
        ];
        for (op, pods) in buckets {
            if !pods.is_empty() {
                self.send(PodUpdate::new(op, source, pods)).await;
            }
        }
    }

    /// Emits the all-source checkpoint: every pod of every store under the
    /// `"*"` source.
    async fn sync(&mut self) {
        let pods: Vec<Arc<Pod>> = self.stores.values().flat_map(SourceStore::state).collect();
        self.send(PodUpdate::new(PodOperation::Set, ALL_SOURCE, pods)).await;
    }

    fn state(&self, source: &str) -> Vec<Arc<Pod>> {
        self.stores.get(source).map(SourceStore::state).unwrap_or_default()
    }

    async fn send(&mut self, update: PodUpdate) {
        // Blocking here is the back-pressure path.
        if self.updates_tx.send(update).await.is_err() {
            tracing::debug!("update stream consumer is gone, dropping event");
        }
    }
}
