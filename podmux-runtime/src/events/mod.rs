//! In-process event recording.
//!
//! The merger reports pod-level problems (today: validation failures)
//! through an injected [`EventRecorder`] rather than a global sink, so the
//! embedding process decides where events end up — a Kubernetes event API,
//! a test buffer, or just the log.

use podmux_core::PodRef;

/// The event severity. Kubernetes only has two.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// A single event attached to a pod.
#[derive(Clone, Debug)]
pub struct Event {
    pub event_type: EventType,
    /// Machine-readable UpperCamelCase cause, e.g. `FailedValidation`.
    pub reason: String,
    /// Human-readable detail.
    pub note: Option<String>,
    /// The pod the event is about.
    pub regarding: PodRef,
}

/// A sink for pod events.
///
/// Shared with the merger task, so implementations must tolerate concurrent
/// use.
pub trait EventRecorder: Send + Sync {
    fn publish(&self, event: Event);
}

/// An [`EventRecorder`] that forwards events to the `tracing` subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRecorder;

impl EventRecorder for LogRecorder {
    fn publish(&self, event: Event) {
        let note = event.note.unwrap_or_default();
        match event.event_type {
            EventType::Normal => {
                tracing::info!(pod = %event.regarding, reason = %event.reason, "{note}");
            }
            EventType::Warning => {
                tracing::warn!(pod = %event.regarding, reason = %event.reason, "{note}");
            }
        }
    }
}
