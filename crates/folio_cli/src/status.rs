//! `folio status`: summarize the last build from its manifest.

use std::fmt::Write as _;

use folio_incremental::{BuildManifest, MANIFEST_FILE};

use crate::pipeline::Project;
use crate::GlobalArgs;

/// Runs the `folio status` command.
///
/// Returns exit code 1 if no usable manifest exists or the last build had
/// failures.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global)?;
    let manifest = match BuildManifest::load(&project.cache_dir().join(MANIFEST_FILE)) {
        Ok(manifest) => manifest,
        Err(cause) => {
            eprintln!("no build manifest ({cause})");
            return Ok(1);
        }
    };
    print!("{}", render(&manifest));
    Ok(if manifest.status.failures.is_empty() { 0 } else { 1 })
}

fn render(manifest: &BuildManifest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "tool version   {}", manifest.global.tool_version);
    if manifest.status.incremental {
        let _ = writeln!(out, "last build     incremental");
    } else {
        let _ = writeln!(out, "last build     full");
        for reason in &manifest.status.reasons {
            let _ = writeln!(out, "               {reason}");
        }
    }
    let _ = writeln!(out, "documents      {}", manifest.fingerprints.len());
    let _ = writeln!(out, "dependencies   {}", manifest.graph.len());
    let _ = writeln!(out, "outputs        {}", manifest.live_outputs().len());

    for (name, capability) in &manifest.processors {
        let mode = if capability.can_incremental {
            "incremental".to_string()
        } else {
            format!("full ({})", capability.unsupported_steps.join(", "))
        };
        let _ = writeln!(out, "processor      {name}: {mode}");
    }
    for (doc, message) in &manifest.status.failures {
        let _ = writeln!(out, "failed         {doc}: {message}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_common::{ContentHash, DocId};
    use folio_incremental::{
        BuildStatus, DependencyItem, DependencyKind, FileFingerprint, FullRebuildReason,
        GlobalFingerprint, ProcessorCapability,
    };

    fn manifest() -> BuildManifest {
        let mut manifest = BuildManifest::new(GlobalFingerprint::new("c", "t", "0.3.0"));
        let mut fp = FileFingerprint::new(DocId::new("a.md"), ContentHash::from_bytes(b"a"), "markdown");
        fp.outputs.insert("page".into(), ContentHash::from_bytes(b"page"));
        fp.dependencies
            .push(DependencyItem::new("a.md", "b.md", DependencyKind::File));
        manifest.graph.report(fp.dependencies.clone()).unwrap();
        manifest.fingerprints.insert(DocId::new("a.md"), fp);
        manifest.processors.insert(
            "markdown".into(),
            ProcessorCapability {
                name: "markdown".into(),
                can_incremental: true,
                unsupported_steps: Vec::new(),
                steps: vec!["render".into()],
            },
        );
        manifest.processors.insert(
            "data".into(),
            ProcessorCapability {
                name: "data".into(),
                can_incremental: false,
                unsupported_steps: vec!["render".into()],
                steps: vec!["render".into()],
            },
        );
        manifest
    }

    #[test]
    fn renders_incremental_build() {
        let mut m = manifest();
        m.status = BuildStatus {
            incremental: true,
            ..BuildStatus::default()
        };
        let text = render(&m);
        assert!(text.contains("last build     incremental\n"));
        assert!(text.contains("documents      1\n"));
        assert!(text.contains("dependencies   1\n"));
        assert!(text.contains("outputs        1\n"));
        assert!(text.contains("processor      data: full (render)\n"));
        assert!(text.contains("processor      markdown: incremental\n"));
    }

    #[test]
    fn renders_reasons_and_failures() {
        let mut m = manifest();
        m.status.incremental = false;
        m.status.reasons = vec![FullRebuildReason::ConfigChanged];
        m.status
            .failures
            .insert(DocId::new("b.md"), "step 'render' failed: boom".into());
        let text = render(&m);
        assert!(text.contains("last build     full\n               configuration changed\n"));
        assert!(text.contains("failed         b.md: step 'render' failed: boom\n"));
    }

    #[test]
    fn run_without_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("folio.toml"),
            "[project]\nname = \"t\"\n[processors.markdown]\nextensions = \"md\"\n",
        )
        .unwrap();
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(dir.path().to_string_lossy().into_owned()),
        };
        assert_eq!(run(&global).unwrap(), 1);
    }
}
