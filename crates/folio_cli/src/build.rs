//! `folio build`: run one incremental build cycle.
//!
//! 1. Discover and hash documents
//! 2. Compute the global fingerprint and load change overrides
//! 3. Plan against the last manifest
//! 4. Run render steps for the rebuild set
//! 5. Persist the new manifest and collect unreferenced outputs
//! 6. Sync the output directory

use std::path::Path;

use folio_incremental::{
    ArtifactStore, BuildObserver, BuildPlan, BuildSession, ChangeOverrides, CycleOutcome,
    DocumentInput, GlobalFingerprint, ProcessorRegistry, TracingObserver,
};

use crate::pipeline::{
    build_registry, discover_documents, global_fingerprint, hash_documents, load_overrides,
    make_planner, Project,
};
use crate::steps::PAGE_OUTPUT;
use crate::{BuildArgs, CycleArgs, GlobalArgs};

/// Everything needed to plan a cycle for a project.
pub struct CycleInputs {
    /// Current documents with their hashes.
    pub documents: Vec<DocumentInput>,
    /// Build-wide fingerprint.
    pub global: GlobalFingerprint,
    /// Processors for the configured extensions.
    pub registry: ProcessorRegistry,
    /// Caller-declared change kinds, if any.
    pub overrides: Option<ChangeOverrides>,
}

impl CycleInputs {
    /// Collects the inputs for `project`.
    pub fn collect(project: &Project, args: &CycleArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let discovered = discover_documents(project)?;
        let documents =
            hash_documents(&discovered).map_err(|e| e as Box<dyn std::error::Error>)?;
        let overrides = args.changes.as_deref().map(load_overrides).transpose()?;
        Ok(Self {
            documents,
            global: global_fingerprint(project)?,
            registry: build_registry(project),
            overrides,
        })
    }
}

/// Runs the `folio build` command.
///
/// Returns exit code 0 if every document built, 1 if any failed.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global)?;
    if !global.quiet {
        eprintln!(
            "   Building {} v{}",
            project.config.project.name, project.config.project.version
        );
    }

    let (plan, outcome) = build_project(&project, args, &TracingObserver)?;

    if !global.quiet {
        if !plan.incremental {
            for reason in &plan.reasons {
                eprintln!("      Full {reason}");
            }
        }
        for (doc, message) in &outcome.report.failed {
            eprintln!("    Failed {doc}: {message}");
        }
        eprintln!(
            "  Finished {} built, {} reused, {} removed, {} failed",
            outcome.report.built.len(),
            outcome.report.reused.len(),
            outcome.report.removed.len(),
            outcome.report.failed.len()
        );
    }

    Ok(if outcome.report.is_success() { 0 } else { 1 })
}

/// Builds `project` and syncs its output directory.
pub fn build_project(
    project: &Project,
    args: &BuildArgs,
    observer: &dyn BuildObserver,
) -> Result<(BuildPlan, CycleOutcome), Box<dyn std::error::Error>> {
    let inputs = CycleInputs::collect(project, &args.cycle)?;
    let capabilities = inputs.registry.capabilities();
    let planner = make_planner(
        inputs.global,
        &capabilities,
        inputs.overrides.as_ref(),
        args.cycle.full,
    );
    let jobs = args.jobs.unwrap_or(project.config.build.jobs);

    let session = BuildSession::open(&project.cache_dir());
    let (plan, outcome) =
        session.build(&planner, &inputs.documents, &inputs.registry, jobs, observer)?;
    let written = sync_outputs(&project.output_dir(), session.store(), &outcome)?;
    tracing::debug!(written, "output directory synced");
    Ok((plan, outcome))
}

/// Writes rebuilt pages (and any missing ones) and deletes removed ones.
///
/// Returns the number of files written.
fn sync_outputs(
    output_dir: &Path,
    store: &ArtifactStore,
    outcome: &CycleOutcome,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut written = 0;
    for (doc, fingerprint) in &outcome.manifest.fingerprints {
        let Some(key) = fingerprint.outputs.get(PAGE_OUTPUT) else {
            continue;
        };
        let path = output_dir.join(doc.as_str());
        if !outcome.report.built.contains(doc) && path.exists() {
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, store.read_artifact(key)?)?;
        written += 1;
    }

    let stale = outcome
        .report
        .removed
        .iter()
        .chain(outcome.report.failed.keys());
    for doc in stale {
        let path = output_dir.join(doc.as_str());
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(written)
}
