//! Configuration types deserialized from `folio.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// The top-level project configuration parsed from `folio.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Build directories and parallelism.
    #[serde(default)]
    pub build: BuildConfig,
    /// Inputs folded into the global fingerprint besides the config itself.
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
    /// Named document processors, keyed by processor name.
    #[serde(default)]
    pub processors: BTreeMap<String, ProcessorConfig>,
}

/// Core project metadata required in every `folio.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
    /// The project version string.
    #[serde(default)]
    pub version: String,
}

/// Directory layout and worker settings for a build.
#[derive(Debug, Deserialize)]
pub struct BuildConfig {
    /// Directory containing the documents, relative to the project root.
    #[serde(default = "default_source_dir")]
    pub source_dir: String,
    /// Directory receiving rendered outputs.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Directory holding the build manifest and cached artifacts.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// Worker threads for build steps. `0` lets the pool decide.
    #[serde(default)]
    pub jobs: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            output_dir: default_output_dir(),
            cache_dir: default_cache_dir(),
            jobs: 0,
        }
    }
}

fn default_source_dir() -> String {
    "docs".to_string()
}

fn default_output_dir() -> String {
    "_site".to_string()
}

fn default_cache_dir() -> String {
    ".folio-cache".to_string()
}

/// Extra inputs whose content invalidates every document when it changes.
#[derive(Debug, Default, Deserialize)]
pub struct FingerprintConfig {
    /// Template files or directories (e.g. `"templates"`).
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub templates: Vec<String>,
}

/// A document processor: which files it claims and how it may be built.
#[derive(Debug, Deserialize)]
pub struct ProcessorConfig {
    /// File extensions (without the dot) handled by this processor.
    #[serde(deserialize_with = "deserialize_string_or_vec")]
    pub extensions: Vec<String>,
    /// Whether this processor's steps may be skipped for unchanged documents.
    #[serde(default = "default_true")]
    pub incremental: bool,
}

fn default_true() -> bool {
    true
}

impl ProjectConfig {
    /// Returns the name of the processor claiming files with `extension`.
    pub fn processor_for_extension(&self, extension: &str) -> Option<&str> {
        self.processors
            .iter()
            .find(|(_, p)| {
                p.extensions
                    .iter()
                    .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(extension))
            })
            .map(|(name, _)| name.as_str())
    }
}

/// Deserializes a field that can be either a single string or a list of strings.
///
/// Allows both `extensions = "md"` and `extensions = ["md", "markdown"]`.
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}
