//! Core types for the pod configuration multiplexer.
//!
//! This crate contains the vocabulary shared by pod sources and the
//! multiplexer runtime: the [`PodUpdate`] message exchanged in both
//! directions, pod identity ([`PodRef`]) with namespace normalization,
//! semantic equality under a [`LocalAnnotations`] predicate, and the
//! structural admission checks applied to every pod at ingress.
//!
//! Pods themselves are [`k8s_openapi::api::core::v1::Pod`]; no schema of our
//! own is defined here.

#![deny(unsafe_code)]
#![deny(clippy::all)]

pub mod pod_ref;
pub use pod_ref::{PodRef, DEFAULT_NAMESPACE};

pub mod semantic;
pub use semantic::{local_annotations_equal, semantically_equal, LocalAnnotations};

pub mod update;
pub use update::{PodOperation, PodUpdate, ALL_SOURCE};

pub mod validation;
pub use validation::{validate_pod, ValidationError};
