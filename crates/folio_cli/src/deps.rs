//! `folio deps`: query the expanded dependencies recorded by the last build.

use folio_common::DocId;
use folio_incremental::{BuildManifest, ExpandedDependencyItem, ExpandedDependencyMap, MANIFEST_FILE};

use crate::pipeline::Project;
use crate::{DepsArgs, GlobalArgs};

/// Runs the `folio deps` command.
///
/// Returns exit code 1 if no usable manifest exists.
pub fn run(args: &DepsArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global)?;
    let manifest = match BuildManifest::load(&project.cache_dir().join(MANIFEST_FILE)) {
        Ok(manifest) => manifest,
        Err(cause) => {
            eprintln!("no build manifest ({cause}); run `folio build` first");
            return Ok(1);
        }
    };

    let doc = DocId::new(&args.doc);
    let map = ExpandedDependencyMap::build(&manifest.graph);
    for line in render(&map, &doc, args.reverse) {
        println!("{line}");
    }
    Ok(0)
}

/// Formats one line per expanded item touching `doc`.
///
/// Forward queries list targets, reverse queries list the dependents.
fn render(map: &ExpandedDependencyMap, doc: &DocId, reverse: bool) -> Vec<String> {
    let items: &[ExpandedDependencyItem] = if reverse {
        map.dependencies_to(doc.as_str())
    } else {
        map.dependencies_from(doc.as_str())
    };
    items
        .iter()
        .map(|item| {
            let other = if reverse { &item.from } else { &item.to };
            format!("{:<9} {other}", item.kind)
        })
        .collect()
}
