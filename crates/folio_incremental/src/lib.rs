//! Incremental build decisions for Folio documentation projects.
//!
//! Build steps report cross-document dependency facts into a
//! [`DependencyGraph`]. The next build expands those facts through `Include`
//! edges ([`ExpandedDependencyMap`]), classifies every document against the
//! persisted [`BuildManifest`] ([`ChangeDetector`]) and decides per document
//! whether its prior outputs can be reused ([`IncrementalPlanner`]). A
//! [`BuildCycle`] then runs only the steps that are needed and assembles the
//! manifest for the build after that.
//!
//! Reading prior state is fail-safe throughout: a missing, corrupt or
//! incompatible manifest turns into a full rebuild with a recorded reason.

#![warn(missing_docs)]

pub mod artifact;
pub mod capability;
pub mod change;
pub mod cycle;
pub mod dependency;
pub mod error;
pub mod expand;
pub mod fingerprint;
pub mod graph;
pub mod manifest;
pub mod observer;
pub mod planner;
pub mod session;
pub mod step;

pub use artifact::ArtifactStore;
pub use capability::{Processor, ProcessorCapability, ProcessorRegistry};
pub use change::{ChangeDetector, ChangeKind, ChangeOverrides, ChangeSet};
pub use cycle::{BuildCycle, BuildReport, CycleOutcome};
pub use dependency::{DependencyItem, DependencyKind, ExpandedDependencyItem};
pub use error::IncrementalError;
pub use expand::ExpandedDependencyMap;
pub use fingerprint::{FullRebuildReason, GlobalFingerprint};
pub use graph::DependencyGraph;
pub use manifest::{
    BuildManifest, BuildStatus, FileFingerprint, ManifestUnavailable, MANIFEST_FILE,
    MANIFEST_FORMAT_VERSION,
};
pub use observer::{BuildEvent, BuildObserver, EventLog, NullObserver, TracingObserver};
pub use planner::{BuildPlan, DocumentInput, IncrementalPlanner, PlanEntry, Verdict, VerdictReason};
pub use session::BuildSession;
pub use step::{BuildStep, StepContext, StepError, StepOutput};
