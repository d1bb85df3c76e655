//! Shared pipeline helpers for CLI commands.
//!
//! Contains project root resolution, document discovery, global fingerprint
//! computation, change-override loading and processor registration used by
//! `build`, `plan`, `deps` and `status`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use folio_common::{ContentHash, DocId};
use folio_config::{ProjectConfig, CONFIG_FILE};
use folio_incremental::{
    ChangeOverrides, DocumentInput, GlobalFingerprint, IncrementalPlanner, Processor,
    ProcessorCapability, ProcessorRegistry,
};
use rayon::prelude::*;

use crate::steps::RenderStep;
use crate::GlobalArgs;

/// Version recorded in every manifest this binary writes.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A loaded project: its root directory and validated configuration.
pub struct Project {
    /// Directory containing `folio.toml`.
    pub root: PathBuf,
    /// The parsed configuration.
    pub config: ProjectConfig,
    /// The raw configuration text, hashed into the global fingerprint.
    pub config_text: String,
}

impl Project {
    /// Resolves the project root from global args and loads its configuration.
    pub fn load(global: &GlobalArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let root = resolve_project_root(global)?;
        let (config, config_text) = folio_config::load_config(&root)?;
        Ok(Self {
            root,
            config,
            config_text,
        })
    }

    /// Directory holding the documents.
    pub fn source_dir(&self) -> PathBuf {
        self.root.join(&self.config.build.source_dir)
    }

    /// Directory receiving rendered outputs.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.config.build.output_dir)
    }

    /// Directory holding the manifest and cached artifacts.
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(&self.config.build.cache_dir)
    }
}

/// Walks up from `start` looking for the nearest directory containing `folio.toml`.
///
/// Returns the directory containing `folio.toml`, or an error if none is found.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root directory from global CLI args.
///
/// If `--config` is specified, uses that path (file → parent dir, dir → itself).
/// Otherwise walks up from the current directory looking for `folio.toml`.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(ref config_path) = global.config {
        let p = PathBuf::from(config_path);
        if p.is_file() {
            Ok(p.parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")))
        } else {
            Ok(p)
        }
    } else {
        find_project_root(&std::env::current_dir()?)
    }
}

/// A document found on disk.
#[derive(Debug, Clone)]
pub struct DiscoveredDocument {
    /// Identifier relative to the source directory.
    pub id: DocId,
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Name of the processor claiming the file's extension.
    pub processor: String,
}

/// Discovers documents under the project's source directory (recursive).
///
/// Files whose extension no processor claims are skipped. Returns documents
/// sorted by identifier.
pub fn discover_documents(
    project: &Project,
) -> Result<Vec<DiscoveredDocument>, Box<dyn std::error::Error>> {
    let source_dir = project.source_dir();
    if !source_dir.is_dir() {
        return Err(format!("source directory {} does not exist", source_dir.display()).into());
    }
    let mut files = Vec::new();
    walk_dir(&source_dir, &mut files)?;

    let mut documents = Vec::new();
    for path in files {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let Some(processor) = project.config.processor_for_extension(ext) else {
            continue;
        };
        let Some(id) = DocId::from_path(&source_dir, &path) else {
            tracing::warn!(path = %path.display(), "skipping file with non UTF-8 path");
            continue;
        };
        documents.push(DiscoveredDocument {
            id,
            path,
            processor: processor.to_string(),
        });
    }
    documents.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(documents)
}

/// Recursively collects every file below `dir`.
fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_dir(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// Reads and hashes every discovered document in parallel.
pub fn hash_documents(
    documents: &[DiscoveredDocument],
) -> Result<Vec<DocumentInput>, Box<dyn std::error::Error + Send + Sync>> {
    documents
        .par_iter()
        .map(|doc| -> Result<DocumentInput, Box<dyn std::error::Error + Send + Sync>> {
            let bytes = std::fs::read(&doc.path)
                .map_err(|e| format!("failed to read {}: {e}", doc.path.display()))?;
            Ok(DocumentInput::new(
                doc.id.clone(),
                ContentHash::from_normalized(&bytes),
                doc.processor.clone(),
            ))
        })
        .collect()
}

/// Hashes every template file, keyed by its path relative to the project root.
///
/// Missing template paths contribute nothing, so creating one later changes
/// the hash.
pub fn template_hash(project: &Project) -> Result<ContentHash, Box<dyn std::error::Error>> {
    let mut files = Vec::new();
    for template in &project.config.fingerprint.templates {
        let path = project.root.join(template);
        if path.is_dir() {
            walk_dir(&path, &mut files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }

    let mut entries: BTreeMap<String, ContentHash> = BTreeMap::new();
    for file in files {
        let rel = DocId::from_path(&project.root, &file)
            .map(|id| id.to_string())
            .unwrap_or_else(|| file.display().to_string());
        entries.insert(rel, ContentHash::from_normalized(&std::fs::read(&file)?));
    }
    let hashes: Vec<ContentHash> = entries
        .iter()
        .flat_map(|(rel, hash)| [ContentHash::from_bytes(rel.as_bytes()), *hash])
        .collect();
    Ok(ContentHash::combine(&hashes))
}

/// Computes the build-wide fingerprint for the project.
pub fn global_fingerprint(
    project: &Project,
) -> Result<GlobalFingerprint, Box<dyn std::error::Error>> {
    Ok(GlobalFingerprint::new(
        ContentHash::from_normalized(project.config_text.as_bytes()).to_string(),
        template_hash(project)?.to_string(),
        TOOL_VERSION,
    ))
}

/// Loads a change-override map from a JSON file.
///
/// Keys are document paths relative to the source directory.
pub fn load_overrides(path: &Path) -> Result<ChangeOverrides, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let raw: BTreeMap<String, folio_incremental::ChangeKind> = serde_json::from_str(&text)
        .map_err(|e| format!("invalid change map {}: {e}", path.display()))?;
    Ok(raw.into_iter().map(|(k, v)| (DocId::new(k), v)).collect())
}

/// Creates a planner honoring the `--changes` and `--full` options.
pub fn make_planner<'a>(
    global: GlobalFingerprint,
    capabilities: &'a BTreeMap<String, ProcessorCapability>,
    overrides: Option<&'a ChangeOverrides>,
    full: bool,
) -> IncrementalPlanner<'a> {
    let mut planner = IncrementalPlanner::new(global, capabilities);
    if let Some(overrides) = overrides {
        planner = planner.with_overrides(overrides);
    }
    if full {
        planner = planner.force_full_rebuild();
    }
    planner
}

/// Registers one render processor per configured processor.
pub fn build_registry(project: &Project) -> ProcessorRegistry {
    let source_dir = project.source_dir();
    let mut registry = ProcessorRegistry::new();
    for (name, processor) in &project.config.processors {
        registry.register(
            Processor::new(name.as_str())
                .with_step(RenderStep::new(source_dir.clone(), processor.incremental)),
        );
    }
    registry
}
