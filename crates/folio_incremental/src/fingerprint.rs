//! Build-wide fingerprints and the reasons a build cannot be incremental.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::manifest::ManifestUnavailable;

/// A build-wide version vector. Any component differing from the prior
/// build's forces every document to rebuild.
///
/// The components are opaque to the planner and only compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalFingerprint {
    /// Hash of the normalized project configuration.
    pub config_hash: String,
    /// Hash over every template the rendering steps may consult.
    pub template_hash: String,
    /// Version of the tool producing the build.
    pub tool_version: String,
}

impl GlobalFingerprint {
    /// Creates a fingerprint from its three components.
    pub fn new(
        config_hash: impl Into<String>,
        template_hash: impl Into<String>,
        tool_version: impl Into<String>,
    ) -> Self {
        Self {
            config_hash: config_hash.into(),
            template_hash: template_hash.into(),
            tool_version: tool_version.into(),
        }
    }

    /// Lists every component of `self` that differs from `previous`.
    pub fn compare(&self, previous: &GlobalFingerprint) -> Vec<FullRebuildReason> {
        let mut reasons = Vec::new();
        if self.config_hash != previous.config_hash {
            reasons.push(FullRebuildReason::ConfigChanged);
        }
        if self.template_hash != previous.template_hash {
            reasons.push(FullRebuildReason::TemplatesChanged);
        }
        if self.tool_version != previous.tool_version {
            reasons.push(FullRebuildReason::ToolVersionChanged {
                previous: previous.tool_version.clone(),
                current: self.tool_version.clone(),
            });
        }
        reasons
    }
}

/// Why a build fell back to rebuilding every document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FullRebuildReason {
    /// No usable manifest from a prior build.
    NoPriorState {
        /// Why the prior manifest could not be used.
        cause: ManifestUnavailable,
    },
    /// The project configuration changed.
    ConfigChanged,
    /// At least one template changed.
    TemplatesChanged,
    /// The tool was upgraded or downgraded.
    ToolVersionChanged {
        /// The version recorded in the prior manifest.
        previous: String,
        /// The running version.
        current: String,
    },
    /// The caller asked for a full rebuild.
    Requested,
}

impl fmt::Display for FullRebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FullRebuildReason::NoPriorState { cause } => {
                write!(f, "no prior incremental state ({cause})")
            }
            FullRebuildReason::ConfigChanged => write!(f, "configuration changed"),
            FullRebuildReason::TemplatesChanged => write!(f, "templates changed"),
            FullRebuildReason::ToolVersionChanged { previous, current } => {
                write!(f, "tool version changed from {previous} to {current}")
            }
            FullRebuildReason::Requested => write!(f, "full rebuild requested"),
        }
    }
}
