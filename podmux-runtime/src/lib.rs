//! Runtime components of the pod configuration multiplexer.
//!
//! A [`PodConfig`] fans desired-state pod reports from any number of named
//! sources into one classified stream of [`podmux_core::PodUpdate`] events.
//! Each source pushes [`PodOperation::Add`](podmux_core::PodOperation)
//! deltas, removals, or full [`Set`](podmux_core::PodOperation::Set)
//! snapshots into its own bounded endpoint; a single merger task diffs every
//! report against the authoritative per-source store and tells the consumer
//! exactly what changed.
//!
//! ```no_run
//! use podmux_core::{LocalAnnotations, PodOperation, PodUpdate};
//! use podmux_runtime::{LogRecorder, NotificationMode, PodConfig};
//! use futures::{SinkExt, StreamExt};
//! use std::sync::Arc;
//!
//! # async fn wrapper() {
//! let mut config = PodConfig::new(
//!     NotificationMode::Incremental,
//!     Arc::new(LogRecorder),
//!     LocalAnnotations::prefixes(["kubernetes.io/"]),
//! );
//! let mut file_source = config.channel("file");
//! let mut updates = config.updates();
//!
//! // Sources push reports; the consumer reads classified events.
//! # let pods = vec![];
//! file_source
//!     .send(PodUpdate::new(PodOperation::Set, "file", pods))
//!     .await
//!     .unwrap();
//! while let Some(update) = updates.next().await {
//!     println!("{} from {}: {} pod(s)", update.op, update.source, update.pods.len());
//! }
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(clippy::all)]

pub mod events;
pub mod mux;

pub use events::{Event, EventRecorder, EventType, LogRecorder};
pub use mux::{NotificationMode, PodConfig, DEFAULT_CHANNEL_CAPACITY};
