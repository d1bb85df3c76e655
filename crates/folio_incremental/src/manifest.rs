//! Persisted state of the last build.
//!
//! The manifest is stored as pretty JSON (`manifest.json` in the cache
//! directory) with sorted maps so that two identical builds write identical
//! bytes. Loading is fail-safe: a missing, damaged or foreign manifest is
//! reported as a [`ManifestUnavailable`] value and the caller falls back to a
//! full rebuild. Each cycle populates a fresh manifest; a loaded one is only
//! ever read.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Write;
use std::path::Path;

use folio_common::{ContentHash, DocId};
use serde::{Deserialize, Serialize};

use crate::capability::ProcessorCapability;
use crate::dependency::DependencyItem;
use crate::error::IncrementalError;
use crate::fingerprint::{FullRebuildReason, GlobalFingerprint};
use crate::graph::DependencyGraph;

/// Current manifest format version. A manifest carrying any other version is
/// treated as absent.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Name of the manifest file within the cache directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// What the last successful build knew about one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// The document this fingerprint describes.
    pub path: DocId,
    /// Content hash of the document when it was last built.
    pub content_hash: ContentHash,
    /// Name of the processor that built it.
    pub processor: String,
    /// Output name to artifact key.
    #[serde(default)]
    pub outputs: BTreeMap<String, ContentHash>,
    /// Facts the document's steps reported when it was last built.
    #[serde(default)]
    pub dependencies: Vec<DependencyItem>,
}

impl FileFingerprint {
    /// Creates a fingerprint with no outputs and no dependencies.
    pub fn new(path: DocId, content_hash: ContentHash, processor: &str) -> Self {
        Self {
            path,
            content_hash,
            processor: processor.to_string(),
            outputs: BTreeMap::new(),
            dependencies: Vec::new(),
        }
    }
}

/// How the build that wrote a manifest went.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatus {
    /// Whether the build reused prior state.
    pub incremental: bool,
    /// Why the build was not incremental, if it was not.
    #[serde(default)]
    pub reasons: Vec<FullRebuildReason>,
    /// Documents whose steps failed, with the failure message.
    #[serde(default)]
    pub failures: BTreeMap<DocId, String>,
}

/// Why a prior manifest could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManifestUnavailable {
    /// No manifest file exists.
    NotFound,
    /// The file exists but could not be read or parsed.
    Corrupt {
        /// Description of the problem.
        reason: String,
    },
    /// The file was written by an incompatible manifest format.
    VersionMismatch {
        /// The version this build understands.
        expected: u32,
        /// The version recorded in the file.
        found: u32,
    },
}

impl fmt::Display for ManifestUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestUnavailable::NotFound => write!(f, "manifest not found"),
            ManifestUnavailable::Corrupt { reason } => write!(f, "manifest is corrupt: {reason}"),
            ManifestUnavailable::VersionMismatch { expected, found } => {
                write!(f, "manifest format version {found}, expected {expected}")
            }
        }
    }
}

/// Reads only the version so an incompatible layout is not misreported as corrupt.
#[derive(Deserialize)]
struct VersionHeader {
    format_version: u32,
}

/// The complete persisted state of one build cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Manifest format version.
    pub format_version: u32,
    /// Build-wide fingerprint at the time of the build.
    pub global: GlobalFingerprint,
    /// Per-document state for every document that built or was reused successfully.
    pub fingerprints: BTreeMap<DocId, FileFingerprint>,
    /// Every dependency fact known at the end of the build.
    pub graph: DependencyGraph,
    /// Capabilities of every registered processor.
    pub processors: BTreeMap<String, ProcessorCapability>,
    /// Outcome of the build.
    pub status: BuildStatus,
}

impl BuildManifest {
    /// Creates an empty manifest for a build with the given fingerprint.
    pub fn new(global: GlobalFingerprint) -> Self {
        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            global,
            fingerprints: BTreeMap::new(),
            graph: DependencyGraph::new(),
            processors: BTreeMap::new(),
            status: BuildStatus::default(),
        }
    }

    /// Loads a manifest from `path`.
    ///
    /// Never fails hard: every problem is described by the returned
    /// [`ManifestUnavailable`], which callers treat as "no prior state".
    pub fn load(path: &Path) -> Result<Self, ManifestUnavailable> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestUnavailable::NotFound)
            }
            Err(e) => {
                return Err(ManifestUnavailable::Corrupt {
                    reason: e.to_string(),
                })
            }
        };

        let corrupt = |e: serde_json::Error| ManifestUnavailable::Corrupt {
            reason: e.to_string(),
        };
        let header: VersionHeader = serde_json::from_str(&content).map_err(corrupt)?;
        if header.format_version != MANIFEST_FORMAT_VERSION {
            return Err(ManifestUnavailable::VersionMismatch {
                expected: MANIFEST_FORMAT_VERSION,
                found: header.format_version,
            });
        }
        let manifest: Self = serde_json::from_str(&content).map_err(corrupt)?;
        manifest.check_graph()?;
        Ok(manifest)
    }

    /// Verifies that the stored graph holds exactly the facts recorded by the
    /// document fingerprints.
    fn check_graph(&self) -> Result<(), ManifestUnavailable> {
        let mut recorded = DependencyGraph::new();
        recorded
            .report(
                self.fingerprints
                    .values()
                    .flat_map(|fp| fp.dependencies.iter().cloned()),
            )
            .map_err(|e| ManifestUnavailable::Corrupt {
                reason: e.to_string(),
            })?;
        if recorded != self.graph {
            return Err(ManifestUnavailable::Corrupt {
                reason: format!(
                    "dependency graph has {} facts, documents record {}",
                    self.graph.len(),
                    recorded.len()
                ),
            });
        }
        Ok(())
    }

    /// Saves the manifest to `path`, replacing any previous one atomically.
    ///
    /// The JSON is written to `<path>.tmp`, synced, then renamed over `path`,
    /// so an interrupted save leaves the previous manifest intact.
    pub fn save(&self, path: &Path) -> Result<(), IncrementalError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |e: std::io::Error| IncrementalError::Io { path, source: e }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            IncrementalError::Serialization {
                reason: e.to_string(),
            }
        })?;

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = Path::new(&tmp_name);
        {
            let mut file = std::fs::File::create(tmp).map_err(io_err(tmp))?;
            file.write_all(json.as_bytes()).map_err(io_err(tmp))?;
            file.sync_all().map_err(io_err(tmp))?;
        }
        std::fs::rename(tmp, path).map_err(io_err(path))?;

        tracing::debug!(path = %path.display(), documents = self.fingerprints.len(), "manifest saved");
        Ok(())
    }

    /// Returns every artifact key referenced by a fingerprint.
    pub fn live_outputs(&self) -> BTreeSet<ContentHash> {
        self.fingerprints
            .values()
            .flat_map(|fp| fp.outputs.values().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::DependencyKind;

    fn global() -> GlobalFingerprint {
        GlobalFingerprint::new("cfg", "tpl", "0.1.0")
    }

    fn sample() -> BuildManifest {
        let mut m = BuildManifest::new(global());
        let mut fp = FileFingerprint::new(
            DocId::new("guide/intro.md"),
            ContentHash::from_bytes(b"# Intro"),
            "markdown",
        );
        fp.outputs
            .insert("html".to_string(), ContentHash::from_bytes(b"<h1>Intro</h1>"));
        fp.dependencies.push(DependencyItem::new(
            "guide/intro.md",
            "guide/setup.md",
            DependencyKind::File,
        ));
        m.graph.report(fp.dependencies.clone()).unwrap();
        m.fingerprints.insert(fp.path.clone(), fp);
        m.status.incremental = true;
        m
    }

    #[test]
    fn new_manifest_is_empty() {
        let m = BuildManifest::new(global());
        assert_eq!(m.format_version, MANIFEST_FORMAT_VERSION);
        assert!(m.fingerprints.is_empty());
        assert!(m.graph.is_empty());
        assert!(!m.status.incremental);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        let m = sample();
        m.save(&path).unwrap();
        assert_eq!(BuildManifest::load(&path).unwrap(), m);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn identical_manifests_write_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        sample().save(&a).unwrap();
        sample().save(&b).unwrap();
        assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
    }

    #[test]
    fn load_nonexistent_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            BuildManifest::load(&dir.path().join(MANIFEST_FILE)),
            Err(ManifestUnavailable::NotFound)
        );
    }

    #[test]
    fn load_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        std::fs::write(&path, "not valid json {{{").unwrap();
        assert!(matches!(
            BuildManifest::load(&path),
            Err(ManifestUnavailable::Corrupt { .. })
        ));
    }

    #[test]
    fn load_other_version_is_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        std::fs::write(&path, r#"{"format_version": 7, "something": "else"}"#).unwrap();
        assert_eq!(
            BuildManifest::load(&path),
            Err(ManifestUnavailable::VersionMismatch {
                expected: MANIFEST_FORMAT_VERSION,
                found: 7,
            })
        );
    }

    #[test]
    fn load_rejects_invalid_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        sample().save(&path).unwrap();
        let tampered = std::fs::read_to_string(&path)
            .unwrap()
            .replace("\"guide/setup.md\"", "\"\"");
        std::fs::write(&path, tampered).unwrap();
        assert!(matches!(
            BuildManifest::load(&path),
            Err(ManifestUnavailable::Corrupt { .. })
        ));
    }

    #[test]
    fn load_rejects_graph_out_of_sync_with_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        let mut m = sample();
        m.graph
            .report([DependencyItem::new("a.md", "b.md", DependencyKind::Include)])
            .unwrap();
        m.save(&path).unwrap();
        assert_eq!(
            BuildManifest::load(&path),
            Err(ManifestUnavailable::Corrupt {
                reason: "dependency graph has 2 facts, documents record 1".to_string(),
            })
        );

        let mut m = sample();
        m.fingerprints.clear();
        m.save(&path).unwrap();
        assert!(matches!(
            BuildManifest::load(&path),
            Err(ManifestUnavailable::Corrupt { .. })
        ));
    }

    #[test]
    fn save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deeply").join("nested").join(MANIFEST_FILE);
        BuildManifest::new(global()).save(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn live_outputs_collects_all_keys() {
        let m = sample();
        assert_eq!(
            m.live_outputs(),
            BTreeSet::from([ContentHash::from_bytes(b"<h1>Intro</h1>")])
        );
    }

    #[test]
    fn unavailable_display() {
        assert_eq!(ManifestUnavailable::NotFound.to_string(), "manifest not found");
        let mismatch = ManifestUnavailable::VersionMismatch {
            expected: 1,
            found: 3,
        };
        assert_eq!(mismatch.to_string(), "manifest format version 3, expected 1");
    }
}
