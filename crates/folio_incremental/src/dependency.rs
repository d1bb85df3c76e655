//! Cross-document dependency facts.

use std::fmt;

use folio_common::DocId;
use serde::{Deserialize, Serialize};

/// The semantic category of a cross-document dependency.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum DependencyKind {
    /// The source textually embeds the target. Reachability passes through it.
    Include,
    /// The source links to the target file.
    File,
    /// The source references an anchor inside the target.
    Bookmark,
    /// The source references structured data described by the target.
    Metadata,
}

impl DependencyKind {
    /// Returns `true` for kinds that let reachability continue past the edge.
    ///
    /// Only [`Include`](DependencyKind::Include) is pass-through; every other
    /// kind terminates propagation at the hop where it appears.
    pub fn is_pass_through(self) -> bool {
        self == DependencyKind::Include
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            DependencyKind::Include => "include",
            DependencyKind::File => "file",
            DependencyKind::Bookmark => "bookmark",
            DependencyKind::Metadata => "metadata",
        })
    }
}

/// An immutable dependency fact recorded by a build step.
///
/// Equality covers the full tuple, so the same `(from, to, kind)` reported
/// through two different nodes is kept twice while an exact repeat is not.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct DependencyItem {
    /// The document that depends on `to`.
    pub from: DocId,
    /// The document being depended upon.
    pub to: DocId,
    /// The relation between the two documents.
    pub kind: DependencyKind,
    /// The syntax node that produced the fact, for diagnostics only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via_node: Option<String>,
}

impl DependencyItem {
    /// Creates a fact without a diagnostic node.
    pub fn new(from: impl Into<DocId>, to: impl Into<DocId>, kind: DependencyKind) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            via_node: None,
        }
    }

    /// Attaches the syntax node that produced this fact.
    pub fn via(mut self, node: impl Into<String>) -> Self {
        self.via_node = Some(node.into());
        self
    }

    /// Checks the fact for contract violations.
    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if self.from.is_empty() {
            return Err("empty source");
        }
        if self.to.is_empty() {
            return Err("empty target");
        }
        Ok(())
    }
}

impl fmt::Display for DependencyItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' -{}-> '{}'", self.from, self.kind, self.to)?;
        if let Some(node) = &self.via_node {
            write!(f, " (via {node})")?;
        }
        Ok(())
    }
}

/// A dependency derived by closure over the [`DependencyGraph`](crate::DependencyGraph).
///
/// Never recorded directly. `kind` is always the kind of the edge that ended
/// the walk, never the `Include` edges that carried reachability to it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct ExpandedDependencyItem {
    /// The document that (transitively) depends on `to`.
    pub from: DocId,
    /// The document being depended upon.
    pub to: DocId,
    /// The kind of the terminal edge.
    pub kind: DependencyKind,
}

impl ExpandedDependencyItem {
    /// Creates an expanded item.
    pub fn new(from: impl Into<DocId>, to: impl Into<DocId>, kind: DependencyKind) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
        }
    }
}

impl fmt::Display for ExpandedDependencyItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -{}-> {}", self.from, self.kind, self.to)
    }
}
