//! The contract between the incremental core and opaque build steps.
//!
//! Rendering, template expansion, metadata extraction and the like live
//! behind [`BuildStep`]. The core only tells a step which document to build
//! and what it produced last time, and records what the step reports back.

use std::collections::BTreeMap;

use folio_common::{ContentHash, DocId};

use crate::change::ChangeKind;
use crate::dependency::DependencyItem;

/// Everything a step receives for one document.
///
/// Passed explicitly to each invocation so steps for different documents can
/// run on different worker threads without sharing mutable state.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// The document being built.
    pub document: &'a DocId,
    /// How the document changed since the last build.
    pub change: ChangeKind,
    /// Output hashes recorded for this document by the last successful build.
    pub previous_outputs: &'a BTreeMap<String, ContentHash>,
    /// Outputs produced by earlier steps of the same processor in this cycle.
    pub upstream: &'a BTreeMap<String, Vec<u8>>,
}

/// What a step hands back on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    /// Named output payloads. A later step may overwrite an earlier one's name.
    pub produced_outputs: BTreeMap<String, Vec<u8>>,
    /// Dependency facts discovered while building the document.
    pub dependency_items: Vec<DependencyItem>,
}

impl StepOutput {
    /// Creates an empty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named output payload.
    pub fn with_output(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.produced_outputs.insert(name.into(), data.into());
        self
    }

    /// Adds a dependency fact.
    pub fn with_dependency(mut self, item: DependencyItem) -> Self {
        self.dependency_items.push(item);
        self
    }
}

/// A step failed for one document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StepError {
    /// Description of the failure.
    pub message: String,
}

impl StepError {
    /// Creates a step error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One stage of a document processor.
///
/// Implementations declare once, at registration, whether they are safe to
/// skip for unchanged documents. A processor containing any step that is not
/// rebuilds all of its documents on every cycle.
pub trait BuildStep: Send + Sync {
    /// A stable, human-readable step name.
    fn name(&self) -> &str;

    /// Whether outputs of this step may be reused when its inputs are unchanged.
    fn supports_incremental(&self) -> bool;

    /// Builds one document.
    fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutput, StepError>;
}
