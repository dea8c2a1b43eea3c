//! The authoritative per-source view of desired pods.

use ahash::{AHashMap, AHashSet};
use k8s_openapi::api::core::v1::Pod;
use podmux_core::semantic::{carry_local_annotations, local_annotations_equal, semantically_equal};
use podmux_core::{LocalAnnotations, PodRef};
use std::sync::Arc;

/// The changes one report produced against a source's store, bucketed by the
/// kind of event they will become.
#[derive(Debug, Default)]
pub(super) struct Deltas {
    pub(super) adds: Vec<Arc<Pod>>,
    pub(super) updates: Vec<Arc<Pod>>,
    pub(super) removes: Vec<Arc<Pod>>,
    pub(super) reconciles: Vec<Arc<Pod>>,
}

impl Deltas {
    pub(super) fn is_empty(&self) -> bool {
        self.adds.is_empty()
            && self.updates.is_empty()
            && self.removes.is_empty()
            && self.reconciles.is_empty()
    }

    /// Whether the report changed which refs the source holds.
    pub(super) fn membership_shifted(&self) -> bool {
        !self.adds.is_empty() || !self.removes.is_empty()
    }
}

/// The recorded desired state of a single source: one pod per [`PodRef`].
///
/// The store owns its pods. Callers hand in owned clones (the merger clones
/// at ingress) and get `Arc` snapshots back out, so nothing a source or the
/// consumer holds can alias into the map.
#[derive(Debug, Default)]
pub(super) struct SourceStore {
    pods: AHashMap<PodRef, Arc<Pod>>,
}

impl SourceStore {
    /// Applies an `Add`/`Update`/`Reconcile` batch, classifying each pod
    /// against the recorded state.
    ///
    /// Pods must already be normalized, validated, and deduplicated.
    pub(super) fn upsert(&mut self, pods: Vec<Pod>, local: &LocalAnnotations) -> Deltas {
        let mut deltas = Deltas::default();
        for pod in pods {
            self.upsert_one(pod, local, &mut deltas);
        }
        deltas
    }

    fn upsert_one(&mut self, mut pod: Pod, local: &LocalAnnotations, deltas: &mut Deltas) {
        let key = PodRef::from_pod(&pod);
        let Some(existing) = self.pods.get(&key) else {
            let pod = Arc::new(pod);
            self.pods.insert(key, pod.clone());
            deltas.adds.push(pod);
            return;
        };
        carry_local_annotations(&mut pod, existing, local);
        if semantically_equal(&pod, existing, local) {
            if local_annotations_equal(&pod, existing, local) {
                // The stored pod already matches; nothing to tell downstream.
                return;
            }
            let pod = Arc::new(pod);
            self.pods.insert(key, pod.clone());
            deltas.reconciles.push(pod);
        } else {
            let pod = Arc::new(pod);
            self.pods.insert(key, pod.clone());
            deltas.updates.push(pod);
        }
    }

    /// Applies a `Remove` batch. Emitted pods are the stored ones, not the
    /// (possibly bare) incoming ones.
    pub(super) fn remove(&mut self, pods: &[Pod]) -> Deltas {
        let mut deltas = Deltas::default();
        for pod in pods {
            if let Some(existing) = self.pods.remove(&PodRef::from_pod(pod)) {
                deltas.removes.push(existing);
            }
        }
        deltas
    }

    /// Applies a `Set` report: afterwards the store holds exactly the
    /// incoming pods (post-filtering). Refs the report omits are removed.
    pub(super) fn replace(&mut self, pods: Vec<Pod>, local: &LocalAnnotations) -> Deltas {
        let keep: AHashSet<PodRef> = pods.iter().map(PodRef::from_pod).collect();
        let stale: Vec<PodRef> = self
            .pods
            .keys()
            .filter(|key| !keep.contains(*key))
            .cloned()
            .collect();
        let mut deltas = Deltas::default();
        for key in stale {
            if let Some(existing) = self.pods.remove(&key) {
                deltas.removes.push(existing);
            }
        }
        for pod in pods {
            self.upsert_one(pod, local, &mut deltas);
        }
        deltas
    }

    /// A point-in-time snapshot of the store contents.
    pub(super) fn state(&self) -> Vec<Arc<Pod>> {
        self.pods.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::SourceStore;
    use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, SecurityContext};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use podmux_core::{LocalAnnotations, PodRef};
    use std::sync::Arc;

    fn local() -> LocalAnnotations {
        LocalAnnotations::prefixes(["kubernetes.io/"])
    }

    fn pod(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                uid: Some(name.to_string()),
                name: Some(name.to_string()),
                namespace: Some("new".to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(PodSpec {
                restart_policy: Some("Always".to_string()),
                dns_policy: Some("ClusterFirst".to_string()),
                containers: vec![Container {
                    name: "ctr".to_string(),
                    image: Some("image".to_string()),
                    image_pull_policy: Some("IfNotPresent".to_string()),
                    security_context: Some(SecurityContext::default()),
                    ..Container::default()
                }],
                ..PodSpec::default()
            }),
            ..Pod::default()
        }
    }

    fn with_container(mut p: Pod, name: &str, image: &str) -> Pod {
        p.spec.as_mut().unwrap().containers = vec![Container {
            name: name.to_string(),
            image: Some(image.to_string()),
            image_pull_policy: Some("IfNotPresent".to_string()),
            security_context: Some(SecurityContext::default()),
            ..Container::default()
        }];
        p
    }

    fn with_annotation(mut p: Pod, key: &str, value: &str) -> Pod {
        p.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value.to_string());
        p
    }

    fn names(pods: &[Arc<Pod>]) -> Vec<String> {
        let mut names: Vec<String> = pods
            .iter()
            .map(|p| p.metadata.name.clone().unwrap_or_default())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn first_sighting_is_an_add_and_redelivery_a_noop() {
        let mut store = SourceStore::default();
        let deltas = store.upsert(vec![pod("foo")], &local());
        assert_eq!(names(&deltas.adds), ["foo"]);
        assert!(deltas.updates.is_empty() && deltas.removes.is_empty());

        let deltas = store.upsert(vec![pod("foo")], &local());
        assert!(deltas.is_empty());
        assert_eq!(names(&store.state()), ["foo"]);
    }

    #[test]
    fn semantic_changes_classify_as_updates() {
        let mut store = SourceStore::default();
        store.upsert(vec![pod("foo")], &local());
        let changed = with_container(pod("foo"), "bar", "test");
        let deltas = store.upsert(vec![changed.clone()], &local());
        assert_eq!(names(&deltas.updates), ["foo"]);
        assert!(deltas.adds.is_empty() && deltas.reconciles.is_empty());
        assert_eq!(store.state()[0].spec, changed.spec);
    }

    #[test]
    fn local_annotation_changes_classify_as_reconciles() {
        let mut store = SourceStore::default();
        store.upsert(vec![pod("foo")], &local());
        let deltas = store.upsert(
            vec![with_annotation(pod("foo"), "kubernetes.io/config.seen", "now")],
            &local(),
        );
        assert_eq!(names(&deltas.reconciles), ["foo"]);
        assert!(deltas.updates.is_empty());
        // The store's local annotations were replaced.
        let stored = &store.state()[0];
        assert_eq!(
            stored
                .metadata
                .annotations
                .as_ref()
                .unwrap()
                .get("kubernetes.io/config.seen")
                .map(String::as_str),
            Some("now")
        );
    }

    #[test]
    fn omitted_local_annotations_survive_updates() {
        let mut store = SourceStore::default();
        store.upsert(
            vec![with_annotation(pod("foo"), "kubernetes.io/config.seen", "then")],
            &local(),
        );
        // A semantic update that does not mention the local key at all.
        let deltas = store.upsert(vec![with_container(pod("foo"), "bar", "test")], &local());
        assert_eq!(names(&deltas.updates), ["foo"]);
        let stored = &store.state()[0];
        assert_eq!(
            stored
                .metadata
                .annotations
                .as_ref()
                .unwrap()
                .get("kubernetes.io/config.seen")
                .map(String::as_str),
            Some("then")
        );
    }

    #[test]
    fn removes_emit_the_stored_pod() {
        let mut store = SourceStore::default();
        store.upsert(vec![pod("foo")], &local());
        // A bare ref is enough to remove.
        let bare = Pod {
            metadata: ObjectMeta {
                name: Some("foo".to_string()),
                namespace: Some("new".to_string()),
                ..ObjectMeta::default()
            },
            ..Pod::default()
        };
        let deltas = store.remove(&[bare]);
        assert_eq!(names(&deltas.removes), ["foo"]);
        assert!(deltas.removes[0].spec.is_some());
        assert!(store.state().is_empty());

        // Removing an unknown ref is a no-op.
        let deltas = store.remove(&[pod("ghost")]);
        assert!(deltas.is_empty());
    }

    #[test]
    fn replace_diffs_against_the_recorded_state() {
        let mut store = SourceStore::default();
        store.upsert(vec![pod("foo"), pod("foo2"), pod("foo3")], &local());

        let deltas = store.replace(
            vec![
                with_container(pod("foo2"), "bar", "test"),
                pod("foo3"),
                pod("foo4"),
            ],
            &local(),
        );
        assert_eq!(names(&deltas.removes), ["foo"]);
        assert_eq!(names(&deltas.adds), ["foo4"]);
        assert_eq!(names(&deltas.updates), ["foo2"]);
        assert!(deltas.reconciles.is_empty());
        assert_eq!(names(&store.state()), ["foo2", "foo3", "foo4"]);
    }

    #[test]
    fn replace_with_nothing_clears_the_store() {
        let mut store = SourceStore::default();
        store.upsert(vec![pod("foo"), pod("foo2")], &local());
        let deltas = store.replace(Vec::new(), &local());
        assert_eq!(names(&deltas.removes), ["foo", "foo2"]);
        assert!(store.state().is_empty());

        let deltas = store.replace(Vec::new(), &local());
        assert!(deltas.is_empty());
    }

    #[test]
    fn buckets_cover_exactly_the_changed_refs() {
        let mut store = SourceStore::default();
        store.upsert(vec![pod("a"), pod("b"), pod("keep")], &local());

        // a removed, b updated, c added, keep untouched.
        let deltas = store.replace(
            vec![with_container(pod("b"), "bar", "test"), pod("c"), pod("keep")],
            &local(),
        );
        let mut touched: Vec<PodRef> = deltas
            .adds
            .iter()
            .chain(&deltas.updates)
            .chain(&deltas.removes)
            .chain(&deltas.reconciles)
            .map(|p| PodRef::from_pod(p))
            .collect();
        touched.sort();
        let expected: Vec<PodRef> = ["a", "b", "c"]
            .iter()
            .map(|name| PodRef::from_pod(&pod(name)))
            .collect();
        assert_eq!(touched, expected);
    }
}
