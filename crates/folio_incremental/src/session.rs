//! High-level driver tying the manifest, artifact store, planner and cycle
//! together for one cache directory.

use std::path::{Path, PathBuf};

use crate::artifact::ArtifactStore;
use crate::capability::ProcessorRegistry;
use crate::cycle::{BuildCycle, CycleOutcome};
use crate::error::IncrementalError;
use crate::manifest::{BuildManifest, ManifestUnavailable, MANIFEST_FILE};
use crate::observer::{BuildEvent, BuildObserver};
use crate::planner::{BuildPlan, DocumentInput, IncrementalPlanner, Verdict, VerdictReason};

/// Prior state and storage for successive builds of one project.
///
/// Opening a session never fails: a missing or unusable manifest is kept as
/// the [`ManifestUnavailable`] value so the planner can record why the build
/// is not incremental.
#[derive(Debug)]
pub struct BuildSession {
    cache_dir: PathBuf,
    store: ArtifactStore,
    previous: Result<BuildManifest, ManifestUnavailable>,
}

impl BuildSession {
    /// Opens the cache at `cache_dir` and loads the prior manifest, if any.
    pub fn open(cache_dir: &Path) -> Self {
        let previous = BuildManifest::load(&cache_dir.join(MANIFEST_FILE));
        if let Err(cause) = &previous {
            tracing::debug!(cache = %cache_dir.display(), %cause, "no usable prior manifest");
        }
        Self {
            cache_dir: cache_dir.to_path_buf(),
            store: ArtifactStore::new(cache_dir),
            previous,
        }
    }

    /// Returns the cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path of the manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.cache_dir.join(MANIFEST_FILE)
    }

    /// Returns the artifact store.
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Returns the prior manifest, or why there is none.
    pub fn previous(&self) -> Result<&BuildManifest, &ManifestUnavailable> {
        self.previous.as_ref()
    }

    /// Plans a cycle against the prior manifest.
    ///
    /// A document planned for reuse whose stored outputs are missing or
    /// damaged is moved to the rebuild set.
    pub fn plan(
        &self,
        planner: &IncrementalPlanner<'_>,
        documents: &[DocumentInput],
        observer: &dyn BuildObserver,
    ) -> BuildPlan {
        let mut plan = planner.plan(documents, self.previous(), observer);
        let Ok(previous) = self.previous() else {
            return plan;
        };

        for entry in plan.entries.values_mut() {
            if entry.verdict != Verdict::Reuse {
                continue;
            }
            let intact = previous
                .fingerprints
                .get(&entry.document)
                .is_some_and(|fp| fp.outputs.values().all(|key| self.store.contains(key)));
            if !intact {
                tracing::warn!(document = %entry.document, "cached outputs missing, rebuilding");
                entry.verdict = Verdict::Rebuild;
                entry.reason = VerdictReason::NoPriorOutputs;
            }
        }
        plan
    }

    /// Runs the steps `plan` calls for and returns the new manifest.
    pub fn execute(
        &self,
        plan: &BuildPlan,
        planner: &IncrementalPlanner<'_>,
        registry: &ProcessorRegistry,
        jobs: usize,
        observer: &dyn BuildObserver,
    ) -> Result<CycleOutcome, IncrementalError> {
        let global = planner.global();
        BuildCycle::new(registry, &self.store, &global.tool_version)
            .with_jobs(jobs)
            .run(plan, self.previous().ok(), global.clone(), observer)
    }

    /// Persists `manifest` and removes outputs it no longer references.
    ///
    /// Returns the number of outputs removed.
    pub fn commit(
        &self,
        manifest: &BuildManifest,
        observer: &dyn BuildObserver,
    ) -> Result<usize, IncrementalError> {
        let path = self.manifest_path();
        manifest.save(&path)?;
        observer.on_event(&BuildEvent::ManifestSaved { path });
        self.store.gc(&manifest.live_outputs())
    }

    /// Plans, executes and commits one cycle.
    pub fn build(
        &self,
        planner: &IncrementalPlanner<'_>,
        documents: &[DocumentInput],
        registry: &ProcessorRegistry,
        jobs: usize,
        observer: &dyn BuildObserver,
    ) -> Result<(BuildPlan, CycleOutcome), IncrementalError> {
        let plan = self.plan(planner, documents, observer);
        let outcome = self.execute(&plan, planner, registry, jobs, observer)?;
        self.commit(&outcome.manifest, observer)?;
        Ok((plan, outcome))
    }
}
