//! Content-addressed storage for build step outputs.
//!
//! Every output a build step produces is stored once under its own content
//! hash at `<cache_dir>/outputs/<hash>.out`, prefixed with a small header
//! (magic bytes, format version, tool version, payload checksum) so that a
//! damaged or foreign file is detected instead of being served as a cached
//! output.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use folio_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::IncrementalError;

/// Magic bytes identifying a Folio cached output.
const ARTIFACT_MAGIC: [u8; 4] = *b"FOLI";

/// Current artifact format version. Increment on breaking changes to
/// the header or payload format.
const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Subdirectory of the cache holding outputs.
const OUTPUT_SUBDIR: &str = "outputs";

/// File extension for stored outputs.
const OUTPUT_EXT: &str = "out";

/// Header prepended to every stored output for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Magic bytes: must be `b"FOLI"`.
    pub magic: [u8; 4],

    /// Artifact format version.
    pub format_version: u32,

    /// Tool version that produced this artifact.
    pub tool_version: String,

    /// Content hash of the payload data.
    pub checksum: ContentHash,
}

/// Content-addressed store for build outputs.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    /// Directory holding the output files.
    dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `<cache_dir>/outputs`.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            dir: cache_dir.join(OUTPUT_SUBDIR),
        }
    }

    /// Returns the file path for the output with the given hash.
    pub fn artifact_path(&self, key: &ContentHash) -> PathBuf {
        self.dir.join(format!("{key}.{OUTPUT_EXT}"))
    }

    /// Stores `data` and returns its content hash, which is also its key.
    ///
    /// A valid existing file for the same payload is kept. A damaged one is
    /// replaced through a temporary file and a rename.
    pub fn write_artifact(
        &self,
        data: &[u8],
        tool_version: &str,
    ) -> Result<ContentHash, IncrementalError> {
        let key = ContentHash::from_bytes(data);
        if self.contains(&key) {
            return Ok(key);
        }
        let path = self.artifact_path(&key);

        std::fs::create_dir_all(&self.dir).map_err(|e| IncrementalError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let header = ArtifactHeader {
            magic: ARTIFACT_MAGIC,
            format_version: ARTIFACT_FORMAT_VERSION,
            tool_version: tool_version.to_string(),
            checksum: key,
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| IncrementalError::Serialization {
                reason: e.to_string(),
            })?;

        // 4-byte header length (little-endian) + header + payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + data.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(data);

        let tmp = path.with_extension(format!("{OUTPUT_EXT}.tmp"));
        std::fs::write(&tmp, &output).map_err(|e| IncrementalError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| IncrementalError::Io { path, source: e })?;
        Ok(key)
    }

    /// Reads and validates the output stored under `key`.
    pub fn read_artifact(&self, key: &ContentHash) -> Result<Vec<u8>, IncrementalError> {
        let path = self.artifact_path(key);
        let raw = std::fs::read(&path).map_err(|e| IncrementalError::Io {
            path: path.clone(),
            source: e,
        })?;
        let invalid = |reason: &str| IncrementalError::InvalidHeader {
            path: path.clone(),
            reason: reason.to_string(),
        };

        let len_bytes: [u8; 4] = raw
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| invalid("truncated header length"))?;
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        let header_bytes = raw
            .get(4..4 + header_len)
            .ok_or_else(|| invalid("truncated header"))?;

        let (header, _): (ArtifactHeader, usize) =
            bincode::serde::decode_from_slice(header_bytes, bincode::config::standard())
                .map_err(|e| invalid(&e.to_string()))?;

        if header.magic != ARTIFACT_MAGIC {
            return Err(invalid("bad magic bytes"));
        }
        if header.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(invalid(&format!(
                "format version {}, expected {ARTIFACT_FORMAT_VERSION}",
                header.format_version
            )));
        }

        let payload = &raw[4 + header_len..];
        let actual = ContentHash::from_bytes(payload);
        if actual != header.checksum || actual != *key {
            return Err(IncrementalError::ChecksumMismatch {
                path,
                expected: key.to_string(),
                actual: actual.to_string(),
            });
        }

        Ok(payload.to_vec())
    }

    /// Returns `true` if a valid output is stored under `key`.
    pub fn contains(&self, key: &ContentHash) -> bool {
        self.read_artifact(key).is_ok()
    }

    /// Removes every stored output whose key is not in `live`.
    ///
    /// Returns the number of files removed.
    pub fn gc(&self, live: &BTreeSet<ContentHash>) -> Result<usize, IncrementalError> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |e: std::io::Error| IncrementalError::Io { path, source: e }
        };

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir).map_err(io_err(&self.dir))? {
            let path = entry.map_err(io_err(&self.dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(OUTPUT_EXT) {
                continue;
            }
            let is_live = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<ContentHash>().ok())
                .is_some_and(|key| live.contains(&key));
            if !is_live {
                std::fs::remove_file(&path).map_err(io_err(&path))?;
                removed += 1;
            }
        }

        tracing::debug!(removed, live = live.len(), "artifact gc finished");
        Ok(removed)
    }
}
