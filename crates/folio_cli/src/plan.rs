//! `folio plan`: show which documents the next build would rebuild.
//!
//! Planning reads the manifest but never runs a step or writes to the cache.

use std::fmt::Write as _;

use folio_incremental::{BuildPlan, BuildSession, NullObserver, Verdict};

use crate::build::CycleInputs;
use crate::pipeline::{make_planner, Project};
use crate::{GlobalArgs, PlanArgs, ReportFormat};

/// Runs the `folio plan` command.
pub fn run(args: &PlanArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global)?;
    let plan = plan_project(&project, args)?;
    let rendered = match args.format {
        ReportFormat::Text => render_text(&plan),
        ReportFormat::Json => serde_json::to_string_pretty(&plan_json(&plan))?,
    };
    println!("{}", rendered.trim_end());
    Ok(0)
}

/// Plans the next cycle for `project` without executing it.
pub fn plan_project(
    project: &Project,
    args: &PlanArgs,
) -> Result<BuildPlan, Box<dyn std::error::Error>> {
    let inputs = CycleInputs::collect(project, &args.cycle)?;
    let capabilities = inputs.registry.capabilities();
    let planner = make_planner(
        inputs.global,
        &capabilities,
        inputs.overrides.as_ref(),
        args.cycle.full,
    );
    let session = BuildSession::open(&project.cache_dir());
    Ok(session.plan(&planner, &inputs.documents, &NullObserver))
}

fn render_text(plan: &BuildPlan) -> String {
    let mut out = String::new();
    if plan.incremental {
        let _ = writeln!(out, "incremental build");
    } else {
        let _ = writeln!(out, "full build");
        for reason in &plan.reasons {
            let _ = writeln!(out, "  because {reason}");
        }
    }

    for entry in plan.entries.values() {
        let marker = match entry.verdict {
            Verdict::Rebuild => "rebuild",
            Verdict::Reuse => "reuse",
        };
        let _ = writeln!(out, "{marker:>8} {} ({})", entry.document, entry.reason);
    }
    for doc in &plan.removed {
        let _ = writeln!(out, "{:>8} {doc}", "remove");
    }

    let (rebuild, reuse) = plan.counts();
    let _ = writeln!(
        out,
        "{rebuild} to rebuild, {reuse} to reuse, {} to remove",
        plan.removed.len()
    );
    out
}

fn plan_json(plan: &BuildPlan) -> serde_json::Value {
    let (rebuild, reuse) = plan.counts();
    serde_json::json!({
        "incremental": plan.incremental,
        "reasons": plan.reasons,
        "entries": plan.entries.values().collect::<Vec<_>>(),
        "removed": plan.removed,
        "rebuild": rebuild,
        "reuse": reuse,
    })
}
