//! Semantic pod equality.
//!
//! Sources own a pod's `spec`, `labels`, and most `annotations`. A subset of
//! annotation keys is owned by the node agent itself ("local" annotations):
//! the merger preserves those across updates from a source, and a change to
//! them alone downgrades an `Update` to a `Reconcile`. Which keys are local
//! is configuration, supplied at construction as a [`LocalAnnotations`]
//! predicate.

use k8s_openapi::api::core::v1::Pod;
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Identifies the annotation keys owned by the node agent.
#[derive(Clone)]
pub struct LocalAnnotations(Arc<dyn Fn(&str) -> bool + Send + Sync>);

impl LocalAnnotations {
    /// Wraps an arbitrary predicate over annotation keys.
    ///
    /// The predicate must be pure; it is invoked from the merger task.
    pub fn new(is_local: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(is_local))
    }

    /// Marks every key starting with one of `prefixes` as local.
    pub fn prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes: Vec<String> = prefixes.into_iter().map(Into::into).collect();
        Self::new(move |key| prefixes.iter().any(|prefix| key.starts_with(prefix.as_str())))
    }

    /// Treats no annotation as local.
    #[must_use]
    pub fn none() -> Self {
        Self::new(|_| false)
    }

    /// Whether `key` is owned by the node agent.
    #[must_use]
    pub fn is_local(&self, key: &str) -> bool {
        (self.0)(key)
    }
}

impl fmt::Debug for LocalAnnotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAnnotations").finish_non_exhaustive()
    }
}

/// True iff the two pods are equal in every aspect a source may change:
/// `spec`, `labels`, and the non-local subset of `annotations`.
///
/// Absent label and annotation maps compare equal to empty ones.
#[must_use]
pub fn semantically_equal(a: &Pod, b: &Pod, local: &LocalAnnotations) -> bool {
    a.spec == b.spec
        && filtered_eq(a.metadata.labels.as_ref(), b.metadata.labels.as_ref(), |_| true)
        && filtered_eq(
            a.metadata.annotations.as_ref(),
            b.metadata.annotations.as_ref(),
            |key| !local.is_local(key),
        )
}

/// True iff the two pods carry the same local annotations.
#[must_use]
pub fn local_annotations_equal(a: &Pod, b: &Pod, local: &LocalAnnotations) -> bool {
    filtered_eq(
        a.metadata.annotations.as_ref(),
        b.metadata.annotations.as_ref(),
        |key| local.is_local(key),
    )
}

/// Copies `existing`'s local annotations onto `incoming` for every key the
/// incoming pod does not set itself.
///
/// An explicit value from the source wins and registers as a local-annotation
/// change; keys the source omits survive the update unchanged.
pub fn carry_local_annotations(incoming: &mut Pod, existing: &Pod, local: &LocalAnnotations) {
    let Some(stored) = existing.metadata.annotations.as_ref() else {
        return;
    };
    let carried: Vec<(&String, &String)> = stored
        .iter()
        .filter(|(key, _)| local.is_local(key))
        .filter(|(key, _)| match incoming.metadata.annotations.as_ref() {
            Some(annotations) => !annotations.contains_key(*key),
            None => true,
        })
        .collect();
    if carried.is_empty() {
        return;
    }
    let target = incoming.metadata.annotations.get_or_insert_with(BTreeMap::new);
    for (key, value) in carried {
        target.insert(key.clone(), value.clone());
    }
}

fn filtered_eq(
    a: Option<&BTreeMap<String, String>>,
    b: Option<&BTreeMap<String, String>>,
    keep: impl Fn(&str) -> bool,
) -> bool {
    let a = a.into_iter().flatten().filter(|(key, _)| keep(key));
    let b = b.into_iter().flatten().filter(|(key, _)| keep(key));
    a.eq(b)
}
