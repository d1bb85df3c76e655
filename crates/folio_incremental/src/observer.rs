//! Build status events and the observers that receive them.
//!
//! A [`BuildObserver`] is handed to the planner and the build cycle
//! explicitly. Nothing is registered globally.

use std::fmt;
use std::path::PathBuf;

use folio_common::DocId;
use parking_lot::Mutex;

use crate::fingerprint::FullRebuildReason;

/// A notable moment in a build cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// Planning started for the given number of current documents.
    CycleStarted {
        /// Number of current documents.
        documents: usize,
    },
    /// The build cannot be incremental.
    FullRebuild {
        /// Every reason that applied.
        reasons: Vec<FullRebuildReason>,
    },
    /// Verdicts were decided.
    Planned {
        /// Documents that will be rebuilt.
        rebuild: usize,
        /// Documents whose prior outputs will be reused.
        reuse: usize,
        /// Deleted documents whose outputs will be dropped.
        removed: usize,
    },
    /// A document's steps succeeded.
    DocumentBuilt {
        /// The document.
        document: DocId,
        /// Number of outputs it produced.
        outputs: usize,
    },
    /// A document's prior outputs were carried forward.
    DocumentReused {
        /// The document.
        document: DocId,
    },
    /// A document's steps failed.
    DocumentFailed {
        /// The document.
        document: DocId,
        /// The failure message.
        message: String,
    },
    /// A deleted document's state was dropped.
    DocumentRemoved {
        /// The document.
        document: DocId,
    },
    /// The new manifest was persisted.
    ManifestSaved {
        /// Where it was written.
        path: PathBuf,
    },
    /// The cycle completed.
    CycleFinished {
        /// Documents rebuilt successfully.
        built: usize,
        /// Documents reused.
        reused: usize,
        /// Documents that failed.
        failed: usize,
    },
}

impl fmt::Display for BuildEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildEvent::CycleStarted { documents } => {
                write!(f, "planning build of {documents} documents")
            }
            BuildEvent::FullRebuild { reasons } => {
                write!(f, "full rebuild:")?;
                for (i, reason) in reasons.iter().enumerate() {
                    let sep = if i == 0 { " " } else { "; " };
                    write!(f, "{sep}{reason}")?;
                }
                Ok(())
            }
            BuildEvent::Planned {
                rebuild,
                reuse,
                removed,
            } => write!(f, "{rebuild} to rebuild, {reuse} reused, {removed} removed"),
            BuildEvent::DocumentBuilt { document, outputs } => {
                write!(f, "built {document} ({outputs} outputs)")
            }
            BuildEvent::DocumentReused { document } => write!(f, "reused {document}"),
            BuildEvent::DocumentFailed { document, message } => {
                write!(f, "failed {document}: {message}")
            }
            BuildEvent::DocumentRemoved { document } => write!(f, "removed {document}"),
            BuildEvent::ManifestSaved { path } => {
                write!(f, "manifest saved to {}", path.display())
            }
            BuildEvent::CycleFinished {
                built,
                reused,
                failed,
            } => write!(f, "finished: {built} built, {reused} reused, {failed} failed"),
        }
    }
}

/// Receives build events.
pub trait BuildObserver: Send + Sync {
    /// Called once per event, from the coordinating thread.
    fn on_event(&self, event: &BuildEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl BuildObserver for NullObserver {
    fn on_event(&self, _event: &BuildEvent) {}
}

/// Forwards events to `tracing`.
///
/// Failures are logged at `warn`, per-document progress at `debug` and
/// everything else at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl BuildObserver for TracingObserver {
    fn on_event(&self, event: &BuildEvent) {
        match event {
            BuildEvent::DocumentFailed { document, message } => {
                tracing::warn!(document = %document, %message, "document failed");
            }
            BuildEvent::FullRebuild { .. } => tracing::info!("{event}"),
            BuildEvent::DocumentBuilt { .. }
            | BuildEvent::DocumentReused { .. }
            | BuildEvent::DocumentRemoved { .. } => tracing::debug!("{event}"),
            _ => tracing::info!("{event}"),
        }
    }
}

/// Collects every event in order. Safe to share across threads.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<BuildEvent>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<BuildEvent> {
        self.events.lock().clone()
    }

    /// Takes all recorded events, leaving the log empty.
    pub fn take_all(&self) -> Vec<BuildEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Returns the number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl BuildObserver for EventLog {
    fn on_event(&self, event: &BuildEvent) {
        self.events.lock().push(event.clone());
    }
}
