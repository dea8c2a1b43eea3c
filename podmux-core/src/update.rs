//! The message exchanged between sources, the merger, and the consumer.

use k8s_openapi::api::core::v1::Pod;
use std::{fmt, sync::Arc};

/// Source name carried by events that span every registered source.
pub const ALL_SOURCE: &str = "*";

/// The kinds of change a report or event can describe.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum PodOperation {
    /// Pods were added.
    Add,
    /// Pods changed semantically (spec, labels, or non-local annotations).
    Update,
    /// Pods were removed.
    Remove,
    /// The full desired state of a source, replacing whatever was recorded
    /// for it before.
    Set,
    /// Only node-local annotations changed; downstream must observe the new
    /// pods without treating them as spec changes.
    Reconcile,
}

impl fmt::Display for PodOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PodOperation::Add => "ADD",
            PodOperation::Update => "UPDATE",
            PodOperation::Remove => "REMOVE",
            PodOperation::Set => "SET",
            PodOperation::Reconcile => "RECONCILE",
        })
    }
}

/// A batch of pod changes flowing through the multiplexer.
///
/// Inbound, a `PodUpdate` is a report from one source (whose `source` field
/// is ignored in favor of the registered endpoint name). Outbound, it is a
/// classified event on the merged stream, where every pod carried has a
/// normalized namespace and passed validation when it entered its store.
///
/// Pods are shared immutably; the merger stores its own clones, so a
/// consumer holding an event can never reach into the stores through it.
#[derive(Clone, Debug)]
pub struct PodUpdate {
    /// What happened to the pods.
    pub op: PodOperation,
    /// The source the change originated from, or [`ALL_SOURCE`].
    pub source: String,
    /// The pods the change applies to.
    pub pods: Vec<Arc<Pod>>,
}

impl PodUpdate {
    /// Creates an update.
    #[must_use]
    pub fn new(op: PodOperation, source: impl Into<String>, pods: Vec<Arc<Pod>>) -> Self {
        Self {
            op,
            source: source.into(),
            pods,
        }
    }
}
