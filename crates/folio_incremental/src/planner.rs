//! Per-document reuse/rebuild decisions.
//!
//! The planner combines the build-wide fingerprint check, change detection,
//! the expanded dependency map of the prior build and processor capabilities
//! into one [`BuildPlan`]. It never runs a step; the rebuild set it returns is
//! fixed before any step starts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use folio_common::{ContentHash, DocId};
use serde::Serialize;

use crate::capability::ProcessorCapability;
use crate::change::{ChangeDetector, ChangeKind, ChangeOverrides, ChangeSet};
use crate::expand::ExpandedDependencyMap;
use crate::fingerprint::{FullRebuildReason, GlobalFingerprint};
use crate::manifest::{BuildManifest, FileFingerprint, ManifestUnavailable};
use crate::observer::{BuildEvent, BuildObserver};

/// A document in the current build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInput {
    /// The document's identifier.
    pub id: DocId,
    /// Hash of its current content.
    pub content_hash: ContentHash,
    /// Name of the processor responsible for it.
    pub processor: String,
}

impl DocumentInput {
    /// Creates a document input.
    pub fn new(id: impl Into<DocId>, content_hash: ContentHash, processor: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content_hash,
            processor: processor.into(),
        }
    }
}

/// Whether a document's steps run in this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Run the processor's steps.
    Rebuild,
    /// Carry the prior outputs forward.
    Reuse,
}

/// Why a document received its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictReason {
    /// The whole build is not incremental.
    FullBuild,
    /// The document itself changed.
    Changed(ChangeKind),
    /// Something the document depends on changed.
    DependencyChanged,
    /// The document's processor cannot reuse outputs.
    ProcessorNotIncremental,
    /// The document moved to another processor, or its processor's steps changed.
    ProcessorChanged,
    /// No outputs from a prior build exist for the document.
    NoPriorOutputs,
    /// Nothing relevant changed.
    Unchanged,
}

impl fmt::Display for VerdictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerdictReason::FullBuild => write!(f, "full build"),
            VerdictReason::Changed(kind) => write!(f, "{kind}"),
            VerdictReason::DependencyChanged => write!(f, "dependency changed"),
            VerdictReason::ProcessorNotIncremental => write!(f, "processor is not incremental"),
            VerdictReason::ProcessorChanged => write!(f, "processor changed"),
            VerdictReason::NoPriorOutputs => write!(f, "no prior outputs"),
            VerdictReason::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// The decision for one current document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    /// The document.
    pub document: DocId,
    /// Hash of its current content.
    pub content_hash: ContentHash,
    /// The processor that will build it.
    pub processor: String,
    /// How the document changed since the last build.
    pub change: ChangeKind,
    /// Rebuild or reuse.
    pub verdict: Verdict,
    /// Why.
    pub reason: VerdictReason,
}

/// The outcome of planning one cycle.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// Whether prior state is reused at all.
    pub incremental: bool,
    /// Why the build is not incremental. Empty when it is.
    pub reasons: Vec<FullRebuildReason>,
    /// Classification of every document known to either build.
    pub changes: ChangeSet,
    /// Documents impacted by a change through the prior build's dependencies.
    pub impacted: BTreeSet<DocId>,
    /// One entry per current document.
    pub entries: BTreeMap<DocId, PlanEntry>,
    /// Deleted documents whose outputs must be dropped.
    pub removed: Vec<DocId>,
}

impl BuildPlan {
    /// Returns the entry for `doc`.
    pub fn entry(&self, doc: &str) -> Option<&PlanEntry> {
        self.entries.get(doc)
    }

    /// Returns the verdict for `doc`.
    pub fn verdict(&self, doc: &str) -> Option<Verdict> {
        self.entry(doc).map(|e| e.verdict)
    }

    /// Iterates over entries with the given verdict, in document order.
    pub fn with_verdict(&self, verdict: Verdict) -> impl Iterator<Item = &PlanEntry> {
        self.entries.values().filter(move |e| e.verdict == verdict)
    }

    /// Returns `(rebuild, reuse)` counts.
    pub fn counts(&self) -> (usize, usize) {
        let rebuild = self.with_verdict(Verdict::Rebuild).count();
        (rebuild, self.entries.len() - rebuild)
    }
}

/// Decides, per document, whether prior outputs can be reused.
#[derive(Debug, Clone)]
pub struct IncrementalPlanner<'a> {
    global: GlobalFingerprint,
    capabilities: &'a BTreeMap<String, ProcessorCapability>,
    overrides: Option<&'a ChangeOverrides>,
    force_full: bool,
}

impl<'a> IncrementalPlanner<'a> {
    /// Creates a planner for a build with the given fingerprint and processors.
    pub fn new(
        global: GlobalFingerprint,
        capabilities: &'a BTreeMap<String, ProcessorCapability>,
    ) -> Self {
        Self {
            global,
            capabilities,
            overrides: None,
            force_full: false,
        }
    }

    /// Uses a caller-supplied change map in place of hashing for the paths it lists.
    pub fn with_overrides(mut self, overrides: &'a ChangeOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Disables reuse for this cycle.
    pub fn force_full_rebuild(mut self) -> Self {
        self.force_full = true;
        self
    }

    /// Returns the build-wide fingerprint this planner compares against.
    pub fn global(&self) -> &GlobalFingerprint {
        &self.global
    }

    /// Plans a cycle over `documents` against the prior build.
    #[tracing::instrument(skip_all, fields(documents = documents.len()))]
    pub fn plan(
        &self,
        documents: &[DocumentInput],
        previous: Result<&BuildManifest, &ManifestUnavailable>,
        observer: &dyn BuildObserver,
    ) -> BuildPlan {
        observer.on_event(&BuildEvent::CycleStarted {
            documents: documents.len(),
        });

        let mut reasons = Vec::new();
        if self.force_full {
            reasons.push(FullRebuildReason::Requested);
        }
        match previous {
            Ok(manifest) => reasons.extend(self.global.compare(&manifest.global)),
            Err(cause) => reasons.push(FullRebuildReason::NoPriorState {
                cause: cause.clone(),
            }),
        }
        let incremental = reasons.is_empty();

        let empty = BTreeMap::new();
        let prior_fingerprints = previous.map(|m| &m.fingerprints).unwrap_or(&empty);
        let current: BTreeMap<DocId, ContentHash> = documents
            .iter()
            .map(|d| (d.id.clone(), d.content_hash))
            .collect();
        let detector = match self.overrides {
            Some(overrides) => ChangeDetector::with_overrides(overrides),
            None => ChangeDetector::new(),
        };
        let changes = detector.detect(&current, prior_fingerprints);

        let impacted = match previous {
            Ok(manifest) if incremental => {
                let expanded = ExpandedDependencyMap::build(&manifest.graph);
                let mut impacted = expanded.impact_of(changes.directly_changed());
                impacted.extend(changes.directly_changed().cloned());
                impacted
            }
            _ => BTreeSet::new(),
        };

        let mut entries = BTreeMap::new();
        for doc in documents {
            let change = changes.kind(doc.id.as_str()).unwrap_or(ChangeKind::Created);
            if change == ChangeKind::Deleted {
                continue;
            }
            let (verdict, reason) = if incremental {
                let prior_capability = previous.ok().and_then(|m| m.processors.get(&doc.processor));
                self.decide(
                    doc,
                    change,
                    prior_fingerprints.get(&doc.id),
                    prior_capability,
                    &impacted,
                )
            } else {
                (Verdict::Rebuild, VerdictReason::FullBuild)
            };
            entries.insert(
                doc.id.clone(),
                PlanEntry {
                    document: doc.id.clone(),
                    content_hash: doc.content_hash,
                    processor: doc.processor.clone(),
                    change,
                    verdict,
                    reason,
                },
            );
        }
        let removed: Vec<DocId> = changes.of_kind(ChangeKind::Deleted).cloned().collect();

        let plan = BuildPlan {
            incremental,
            reasons,
            changes,
            impacted,
            entries,
            removed,
        };

        if !plan.incremental {
            observer.on_event(&BuildEvent::FullRebuild {
                reasons: plan.reasons.clone(),
            });
        }
        let (rebuild, reuse) = plan.counts();
        tracing::info!(incremental = plan.incremental, rebuild, reuse, removed = plan.removed.len(), "build planned");
        observer.on_event(&BuildEvent::Planned {
            rebuild,
            reuse,
            removed: plan.removed.len(),
        });
        plan
    }

    fn decide(
        &self,
        doc: &DocumentInput,
        change: ChangeKind,
        prior: Option<&FileFingerprint>,
        prior_capability: Option<&ProcessorCapability>,
        impacted: &BTreeSet<DocId>,
    ) -> (Verdict, VerdictReason) {
        let capability = self.capabilities.get(&doc.processor);
        let reason = if change.is_change() {
            VerdictReason::Changed(change)
        } else if !capability.is_some_and(|c| c.can_incremental) {
            VerdictReason::ProcessorNotIncremental
        } else if prior.is_none() {
            VerdictReason::NoPriorOutputs
        } else if prior.is_some_and(|fp| fp.processor != doc.processor)
            || prior_capability != capability
        {
            VerdictReason::ProcessorChanged
        } else if impacted.contains(&doc.id) {
            VerdictReason::DependencyChanged
        } else {
            return (Verdict::Reuse, VerdictReason::Unchanged);
        };
        (Verdict::Rebuild, reason)
    }
}
