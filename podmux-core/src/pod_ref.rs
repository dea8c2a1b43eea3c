//! Pod identity.

use k8s_openapi::api::core::v1::Pod;
use std::fmt;

/// Namespace assigned to pods that arrive without one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// A reference to a pod along with its namespace.
///
/// This is the unit of identity inside one source: a report carries at most
/// one pod per ref (later entries win), and the per-source stores are keyed
/// by it. Two sources may each hold a pod with the same ref.
///
/// The derived ordering is namespace-major, which gives snapshot contents a
/// stable order when sorted.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PodRef {
    /// The pod's namespace, never empty after construction through
    /// [`PodRef::from_pod`].
    pub namespace: String,
    /// The pod's name.
    pub name: String,
}

impl PodRef {
    /// Creates a ref from a pod, normalizing an absent or empty namespace to
    /// [`DEFAULT_NAMESPACE`].
    ///
    /// A pod without a name maps to a ref with an empty name; such pods are
    /// rejected by validation and never reach a store.
    #[must_use]
    pub fn from_pod(pod: &Pod) -> Self {
        Self {
            namespace: normalized_namespace(pod),
            name: pod.metadata.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Returns the pod's namespace after normalization.
#[must_use]
pub fn normalized_namespace(pod: &Pod) -> String {
    match pod.metadata.namespace.as_deref() {
        None | Some("") => DEFAULT_NAMESPACE.to_string(),
        Some(namespace) => namespace.to_string(),
    }
}

/// Rewrites the pod's namespace to its normalized form in place.
pub fn normalize_namespace(pod: &mut Pod) {
    pod.metadata.namespace = Some(normalized_namespace(pod));
}
