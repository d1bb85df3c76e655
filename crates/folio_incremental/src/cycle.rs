//! Executes a [`BuildPlan`] and assembles the next manifest.
//!
//! Rebuild steps run on a rayon pool, one task per document. Each task
//! returns its outputs and dependency facts in its own buffer; nothing is
//! shared while steps run. Once every task has finished, the coordinating
//! thread merges the buffers in document order into a fresh
//! [`BuildManifest`], so the result does not depend on scheduling.

use std::collections::BTreeMap;

use folio_common::{ContentHash, DocId};
use rayon::prelude::*;

use crate::artifact::ArtifactStore;
use crate::capability::ProcessorRegistry;
use crate::error::IncrementalError;
use crate::fingerprint::GlobalFingerprint;
use crate::manifest::{BuildManifest, FileFingerprint};
use crate::observer::{BuildEvent, BuildObserver};
use crate::planner::{BuildPlan, PlanEntry, Verdict};
use crate::step::{StepContext, StepError, StepOutput};

/// Which documents went which way in a finished cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Documents whose steps ran and succeeded.
    pub built: Vec<DocId>,
    /// Documents whose prior outputs were carried forward.
    pub reused: Vec<DocId>,
    /// Documents that failed, with the failure message.
    pub failed: BTreeMap<DocId, String>,
    /// Deleted documents whose state was dropped.
    pub removed: Vec<DocId>,
}

impl BuildReport {
    /// Returns `true` if no document failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The result of running a cycle: the manifest to persist and a summary.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// The manifest describing this build.
    pub manifest: BuildManifest,
    /// Per-document outcome.
    pub report: BuildReport,
}

/// Runs the steps a plan calls for.
#[derive(Debug, Clone, Copy)]
pub struct BuildCycle<'a> {
    registry: &'a ProcessorRegistry,
    store: &'a ArtifactStore,
    tool_version: &'a str,
    jobs: usize,
}

impl<'a> BuildCycle<'a> {
    /// Creates a cycle that stores outputs in `store`.
    pub fn new(registry: &'a ProcessorRegistry, store: &'a ArtifactStore, tool_version: &'a str) -> Self {
        Self {
            registry,
            store,
            tool_version,
            jobs: 0,
        }
    }

    /// Limits the number of worker threads. `0` uses rayon's default.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Executes `plan` and returns the new manifest.
    ///
    /// Step failures are recorded per document and do not stop the cycle.
    /// Only cache I/O errors abort it, in which case no manifest is produced.
    #[tracing::instrument(skip_all, fields(incremental = plan.incremental))]
    pub fn run(
        &self,
        plan: &BuildPlan,
        previous: Option<&BuildManifest>,
        global: GlobalFingerprint,
        observer: &dyn BuildObserver,
    ) -> Result<CycleOutcome, IncrementalError> {
        let no_outputs = BTreeMap::new();
        let rebuild: Vec<&PlanEntry> = plan.with_verdict(Verdict::Rebuild).collect();

        let run_all = || -> Vec<(DocId, Result<StepOutput, StepError>)> {
            rebuild
                .par_iter()
                .map(|entry| {
                    let previous_outputs = previous
                        .and_then(|m| m.fingerprints.get(&entry.document))
                        .map(|fp| &fp.outputs)
                        .unwrap_or(&no_outputs);
                    let result = self.run_document(entry, previous_outputs);
                    (entry.document.clone(), result)
                })
                .collect()
        };
        let results = if self.jobs == 0 {
            run_all()
        } else {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.jobs)
                .build()
                .map_err(|e| IncrementalError::WorkerPool {
                    reason: e.to_string(),
                })?
                .install(run_all)
        };
        let mut results: BTreeMap<DocId, Result<StepOutput, StepError>> = results.into_iter().collect();

        let mut manifest = BuildManifest::new(global);
        manifest.processors = self.registry.capabilities();
        manifest.status.incremental = plan.incremental;
        manifest.status.reasons = plan.reasons.clone();
        let mut report = BuildReport::default();

        for entry in plan.entries.values() {
            let outcome = match entry.verdict {
                Verdict::Reuse => self.carry_forward(entry, previous, &mut manifest),
                Verdict::Rebuild => match results.remove(&entry.document) {
                    Some(Ok(output)) => self.record_output(entry, output, &mut manifest)?,
                    Some(Err(e)) => Err(e.message),
                    None => Err("step result missing".to_string()),
                },
            };
            match outcome {
                Ok(_) if entry.verdict == Verdict::Reuse => {
                    observer.on_event(&BuildEvent::DocumentReused {
                        document: entry.document.clone(),
                    });
                    report.reused.push(entry.document.clone());
                }
                Ok(outputs) => {
                    observer.on_event(&BuildEvent::DocumentBuilt {
                        document: entry.document.clone(),
                        outputs,
                    });
                    report.built.push(entry.document.clone());
                }
                Err(message) => {
                    observer.on_event(&BuildEvent::DocumentFailed {
                        document: entry.document.clone(),
                        message: message.clone(),
                    });
                    manifest
                        .status
                        .failures
                        .insert(entry.document.clone(), message.clone());
                    report.failed.insert(entry.document.clone(), message);
                }
            }
        }

        for doc in &plan.removed {
            observer.on_event(&BuildEvent::DocumentRemoved {
                document: doc.clone(),
            });
            report.removed.push(doc.clone());
        }

        tracing::info!(
            built = report.built.len(),
            reused = report.reused.len(),
            failed = report.failed.len(),
            facts = manifest.graph.len(),
            "build cycle finished"
        );
        observer.on_event(&BuildEvent::CycleFinished {
            built: report.built.len(),
            reused: report.reused.len(),
            failed: report.failed.len(),
        });
        Ok(CycleOutcome { manifest, report })
    }

    /// Runs every step of the document's processor in order.
    fn run_document(
        &self,
        entry: &PlanEntry,
        previous_outputs: &BTreeMap<String, ContentHash>,
    ) -> Result<StepOutput, StepError> {
        let processor = self
            .registry
            .get(&entry.processor)
            .ok_or_else(|| StepError::new(format!("no processor named '{}'", entry.processor)))?;

        let mut merged = StepOutput::new();
        for step in processor.steps() {
            let ctx = StepContext {
                document: &entry.document,
                change: entry.change,
                previous_outputs,
                upstream: &merged.produced_outputs,
            };
            let output = step.run(&ctx).map_err(|e| {
                StepError::new(format!("step '{}' failed: {}", step.name(), e.message))
            })?;
            merged.produced_outputs.extend(output.produced_outputs);
            merged.dependency_items.extend(output.dependency_items);
        }
        tracing::trace!(document = %entry.document, outputs = merged.produced_outputs.len(), "document built");
        Ok(merged)
    }

    /// Stores a rebuilt document's outputs and facts.
    ///
    /// The outer error aborts the cycle; the inner one fails only this document.
    fn record_output(
        &self,
        entry: &PlanEntry,
        output: StepOutput,
        manifest: &mut BuildManifest,
    ) -> Result<Result<usize, String>, IncrementalError> {
        if let Err(e) = manifest.graph.report(output.dependency_items.iter().cloned()) {
            return Ok(Err(e.to_string()));
        }

        let mut fingerprint = FileFingerprint::new(
            entry.document.clone(),
            entry.content_hash,
            &entry.processor,
        );
        for (name, data) in &output.produced_outputs {
            let key = self.store.write_artifact(data, self.tool_version)?;
            fingerprint.outputs.insert(name.clone(), key);
        }
        fingerprint.dependencies = output.dependency_items;
        let count = fingerprint.outputs.len();
        manifest.fingerprints.insert(entry.document.clone(), fingerprint);
        Ok(Ok(count))
    }

    /// Copies a reused document's prior state into the new manifest.
    fn carry_forward(
        &self,
        entry: &PlanEntry,
        previous: Option<&BuildManifest>,
        manifest: &mut BuildManifest,
    ) -> Result<usize, String> {
        let prior = previous
            .and_then(|m| m.fingerprints.get(&entry.document))
            .ok_or_else(|| "no prior state to reuse".to_string())?;
        manifest
            .graph
            .report(prior.dependencies.iter().cloned())
            .map_err(|e| e.to_string())?;
        manifest
            .fingerprints
            .insert(entry.document.clone(), prior.clone());
        Ok(prior.outputs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Processor;
    use crate::dependency::{DependencyItem, DependencyKind};
    use crate::manifest::ManifestUnavailable;
    use crate::observer::{EventLog, NullObserver};
    use crate::planner::{DocumentInput, IncrementalPlanner};
    use crate::step::BuildStep;

    /// Emits the document name as its output and an optional fact.
    struct Echo;

    impl BuildStep for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn supports_incremental(&self) -> bool {
            true
        }

        fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutput, StepError> {
            let doc = ctx.document.as_str();
            if doc.starts_with("bad") {
                return Err(StepError::new("cannot build"));
            }
            let mut out = StepOutput::new().with_output("html", format!("<p>{doc}</p>"));
            if doc == "a.md" {
                out = out.with_dependency(DependencyItem::new("a.md", "b.md", DependencyKind::Include));
            }
            if doc == "broken.md" {
                out = out.with_dependency(DependencyItem::new("broken.md", "", DependencyKind::File));
            }
            Ok(out)
        }
    }

    fn registry() -> ProcessorRegistry {
        let mut reg = ProcessorRegistry::new();
        reg.register(Processor::new("markdown").with_step(Echo));
        reg
    }

    fn global() -> GlobalFingerprint {
        GlobalFingerprint::new("cfg", "tpl", "0.1.0")
    }

    fn inputs(ids: &[&str]) -> Vec<DocumentInput> {
        ids.iter()
            .map(|id| DocumentInput::new(*id, ContentHash::from_bytes(id.as_bytes()), "markdown"))
            .collect()
    }

    fn first_build(ids: &[&str], store: &ArtifactStore, log: &dyn BuildObserver) -> CycleOutcome {
        let reg = registry();
        let caps = reg.capabilities();
        let plan = IncrementalPlanner::new(global(), &caps).plan(
            &inputs(ids),
            Err(&ManifestUnavailable::NotFound),
            log,
        );
        BuildCycle::new(&reg, store, "0.1.0")
            .run(&plan, None, global(), log)
            .unwrap()
    }

    #[test]
    fn first_build_records_outputs_and_facts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let outcome = first_build(&["a.md", "b.md"], &store, &NullObserver);

        assert_eq!(outcome.report.built.len(), 2);
        assert!(outcome.report.is_success());
        let fp = &outcome.manifest.fingerprints[&DocId::new("a.md")];
        assert_eq!(store.read_artifact(&fp.outputs["html"]).unwrap(), b"<p>a.md</p>");
        assert_eq!(outcome.manifest.graph.len(), 1);
        assert!(!outcome.manifest.status.incremental);
    }

    #[test]
    fn step_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let log = EventLog::new();
        let outcome = first_build(&["a.md", "bad.md", "b.md"], &store, &log);

        assert_eq!(outcome.report.built, vec![DocId::new("a.md"), DocId::new("b.md")]);
        assert!(outcome.report.failed[&DocId::new("bad.md")].contains("cannot build"));
        assert!(!outcome.manifest.fingerprints.contains_key("bad.md"));
        assert!(outcome.manifest.status.failures.contains_key("bad.md"));
        assert!(log
            .events()
            .iter()
            .any(|e| matches!(e, BuildEvent::DocumentFailed { document, .. } if document.as_str() == "bad.md")));
    }

    #[test]
    fn invalid_fact_fails_the_reporting_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let outcome = first_build(&["broken.md", "b.md"], &store, &NullObserver);
        assert!(outcome.report.failed[&DocId::new("broken.md")].contains("empty target"));
        assert_eq!(outcome.report.built, vec![DocId::new("b.md")]);
        assert!(outcome.manifest.graph.is_empty());
    }

    #[test]
    fn reuse_carries_prior_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let first = first_build(&["a.md", "b.md"], &store, &NullObserver);

        let reg = registry();
        let caps = reg.capabilities();
        let plan = IncrementalPlanner::new(global(), &caps).plan(
            &inputs(&["a.md", "b.md"]),
            Ok(&first.manifest),
            &NullObserver,
        );
        let second = BuildCycle::new(&reg, &store, "0.1.0")
            .with_jobs(2)
            .run(&plan, Some(&first.manifest), global(), &NullObserver)
            .unwrap();

        assert_eq!(second.report.reused.len(), 2);
        assert!(second.report.built.is_empty());
        assert_eq!(second.manifest.fingerprints, first.manifest.fingerprints);
        assert_eq!(second.manifest.graph, first.manifest.graph);
        assert!(second.manifest.status.incremental);
    }

    #[test]
    fn unknown_processor_fails_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let reg = registry();
        let caps = reg.capabilities();
        let docs = vec![DocumentInput::new("x.rst", ContentHash::from_bytes(b"x"), "rst")];
        let plan = IncrementalPlanner::new(global(), &caps).plan(
            &docs,
            Err(&ManifestUnavailable::NotFound),
            &NullObserver,
        );
        let outcome = BuildCycle::new(&reg, &store, "0.1.0")
            .run(&plan, None, global(), &NullObserver)
            .unwrap();
        assert!(outcome.report.failed[&DocId::new("x.rst")].contains("no processor named 'rst'"));
    }
}
