//! Append-only store of dependency facts reported during one build cycle.

use std::collections::{BTreeMap, BTreeSet};

use folio_common::DocId;
use serde::{Deserialize, Serialize};

use crate::dependency::DependencyItem;
use crate::error::IncrementalError;

/// A multi-relation set of [`DependencyItem`]s indexed by both endpoints.
///
/// Insertion has set semantics on the full item tuple, so reporting the same
/// fact twice is a no-op. Iteration is always in sorted order so that closures,
/// manifests and test expectations are deterministic.
///
/// Serialized as a flat, sorted list of items. Deserialization re-validates
/// every item, so a tampered manifest is rejected rather than admitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<DependencyItem>", try_from = "Vec<DependencyItem>")]
pub struct DependencyGraph {
    from_index: BTreeMap<DocId, BTreeSet<DependencyItem>>,
    to_index: BTreeMap<DocId, BTreeSet<DependencyItem>>,
    len: usize,
}

impl DependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a batch of facts, returning how many were not already present.
    ///
    /// The batch is validated as a whole before anything is inserted: if any
    /// item has an empty endpoint the graph is left untouched and the first
    /// offending item is returned in the error.
    pub fn report(
        &mut self,
        items: impl IntoIterator<Item = DependencyItem>,
    ) -> Result<usize, IncrementalError> {
        let items: Vec<DependencyItem> = items.into_iter().collect();
        for item in &items {
            item.validate()
                .map_err(|reason| IncrementalError::InvalidDependency {
                    item: Box::new(item.clone()),
                    reason,
                })?;
        }

        let mut added = 0;
        for item in items {
            if self.insert(item) {
                added += 1;
            }
        }
        Ok(added)
    }

    fn insert(&mut self, item: DependencyItem) -> bool {
        let inserted = self
            .from_index
            .entry(item.from.clone())
            .or_default()
            .insert(item.clone());
        if inserted {
            self.to_index.entry(item.to.clone()).or_default().insert(item);
            self.len += 1;
        }
        inserted
    }

    /// Iterates over the facts whose source is `node`.
    pub fn items_from<'a>(&'a self, node: &str) -> impl Iterator<Item = &'a DependencyItem> + 'a {
        self.from_index.get(node).into_iter().flatten()
    }

    /// Iterates over the facts whose target is `node`.
    pub fn items_to<'a>(&'a self, node: &str) -> impl Iterator<Item = &'a DependencyItem> + 'a {
        self.to_index.get(node).into_iter().flatten()
    }

    /// Iterates over every fact, ordered by source.
    pub fn iter(&self) -> impl Iterator<Item = &DependencyItem> {
        self.from_index.values().flatten()
    }

    /// Iterates over every document that is the source of at least one fact.
    pub fn sources(&self) -> impl Iterator<Item = &DocId> {
        self.from_index.keys()
    }

    /// Returns every document mentioned as either endpoint, sorted.
    pub fn nodes(&self) -> BTreeSet<&DocId> {
        self.from_index.keys().chain(self.to_index.keys()).collect()
    }

    /// Returns the number of distinct facts.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no facts have been reported.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl From<DependencyGraph> for Vec<DependencyItem> {
    fn from(graph: DependencyGraph) -> Self {
        graph.from_index.into_values().flatten().collect()
    }
}

impl TryFrom<Vec<DependencyItem>> for DependencyGraph {
    type Error = IncrementalError;

    fn try_from(items: Vec<DependencyItem>) -> Result<Self, Self::Error> {
        let mut graph = DependencyGraph::new();
        graph.report(items)?;
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::DependencyKind;

    fn item(from: &str, to: &str, kind: DependencyKind) -> DependencyItem {
        DependencyItem::new(from, to, kind)
    }

    #[test]
    fn empty_graph() {
        let graph = DependencyGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.items_from("a.md").count(), 0);
        assert_eq!(graph.items_to("a.md").count(), 0);
    }

    #[test]
    fn report_is_idempotent() {
        let mut graph = DependencyGraph::new();
        let added = graph
            .report([item("a.md", "b.md", DependencyKind::File)])
            .unwrap();
        assert_eq!(added, 1);
        let added = graph
            .report([
                item("a.md", "b.md", DependencyKind::File),
                item("a.md", "b.md", DependencyKind::File),
            ])
            .unwrap();
        assert_eq!(added, 0);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn kinds_coexist_for_same_pair() {
        let mut graph = DependencyGraph::new();
        graph
            .report([
                item("b.md", "c.md", DependencyKind::File),
                item("b.md", "c.md", DependencyKind::Bookmark),
            ])
            .unwrap();
        assert_eq!(graph.len(), 2);
        let kinds: Vec<_> = graph.items_to("c.md").map(|i| i.kind).collect();
        assert_eq!(kinds, vec![DependencyKind::File, DependencyKind::Bookmark]);
    }

    #[test]
    fn iteration_is_sorted() {
        let mut graph = DependencyGraph::new();
        graph
            .report([
                item("z.md", "a.md", DependencyKind::File),
                item("a.md", "z.md", DependencyKind::File),
                item("a.md", "m.md", DependencyKind::Include),
            ])
            .unwrap();
        let order: Vec<String> = graph.iter().map(|i| i.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "'a.md' -include-> 'm.md'",
                "'a.md' -file-> 'z.md'",
                "'z.md' -file-> 'a.md'",
            ]
        );
    }

    #[test]
    fn invalid_batch_is_rejected_whole() {
        let mut graph = DependencyGraph::new();
        let err = graph
            .report([
                item("a.md", "b.md", DependencyKind::File),
                item("a.md", "", DependencyKind::File),
            ])
            .unwrap_err();
        assert!(matches!(err, IncrementalError::InvalidDependency { reason: "empty target", .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn self_loop_is_stored() {
        let mut graph = DependencyGraph::new();
        graph.report([item("a.md", "a.md", DependencyKind::Include)]).unwrap();
        assert_eq!(graph.items_from("a.md").count(), 1);
        assert_eq!(graph.items_to("a.md").count(), 1);
        assert_eq!(graph.nodes().len(), 1);
    }

    #[test]
    fn serde_roundtrip_and_validation() {
        let mut graph = DependencyGraph::new();
        graph
            .report([
                item("a.md", "b.md", DependencyKind::Include),
                item("b.md", "c.md", DependencyKind::File).via("link#3"),
            ])
            .unwrap();
        let json = serde_json::to_string(&graph).unwrap();
        let back: DependencyGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back, graph);

        let bad = r#"[{"from":"a.md","to":"","kind":"File"}]"#;
        assert!(serde_json::from_str::<DependencyGraph>(bad).is_err());
    }
}
