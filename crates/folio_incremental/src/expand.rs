//! Kind-aware transitive closure over a dependency graph snapshot.
//!
//! Only `Include` edges propagate. A terminal edge `M -k-> T` is attributed to
//! every document that reaches `M` purely through `Include` edges, as
//! `(ancestor, T, k)`. The closure is computed once per snapshot by collapsing
//! the `Include` subgraph into strongly connected components and folding their
//! terminal sets in reverse topological order, so `Include` cycles terminate
//! naturally and every member of a cycle sees every terminal edge of the cycle.

use std::collections::{BTreeSet, HashMap};

use folio_common::DocId;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::dependency::{DependencyKind, ExpandedDependencyItem};
use crate::graph::DependencyGraph;

/// Read-only, precomputed closure answering "what does X depend on" and
/// "what depends on X" in O(1) per query.
#[derive(Debug, Clone, Default)]
pub struct ExpandedDependencyMap {
    from_index: HashMap<DocId, Vec<ExpandedDependencyItem>>,
    to_index: HashMap<DocId, Vec<ExpandedDependencyItem>>,
    len: usize,
}

impl ExpandedDependencyMap {
    /// Computes the closure of `graph`.
    pub fn build(graph: &DependencyGraph) -> Self {
        let mut include_graph: DiGraph<&DocId, ()> = DiGraph::new();
        let mut index: HashMap<&DocId, NodeIndex> = HashMap::new();
        for source in graph.sources() {
            let idx = include_graph.add_node(source);
            index.insert(source, idx);
        }
        for item in graph.iter().filter(|i| i.kind.is_pass_through()) {
            let from = index[&item.from];
            let to = *index
                .entry(&item.to)
                .or_insert_with(|| include_graph.add_node(&item.to));
            include_graph.update_edge(from, to, ());
        }

        // Components come out successors-first, so every component a member
        // includes has already been folded when we reach it.
        let components = tarjan_scc(&include_graph);
        let mut component_of = vec![0usize; include_graph.node_count()];
        for (c, members) in components.iter().enumerate() {
            for node in members {
                component_of[node.index()] = c;
            }
        }

        let mut terminals: Vec<BTreeSet<(&DocId, DependencyKind)>> =
            Vec::with_capacity(components.len());
        for (c, members) in components.iter().enumerate() {
            let mut reached = BTreeSet::new();
            for &node in members {
                for item in graph.items_from(include_graph[node].as_str()) {
                    if !item.kind.is_pass_through() {
                        reached.insert((&item.to, item.kind));
                        continue;
                    }
                    let succ = component_of[index[&item.to].index()];
                    if succ != c {
                        debug_assert!(succ < c, "components must be in reverse topological order");
                        reached.extend(terminals[succ].iter().copied());
                    }
                }
            }
            terminals.push(reached);
        }

        let mut map = Self::default();
        for source in graph.sources() {
            let mut items: BTreeSet<ExpandedDependencyItem> = graph
                .items_from(source.as_str())
                .filter(|i| i.kind.is_pass_through())
                .map(|i| ExpandedDependencyItem::new(source.clone(), i.to.clone(), i.kind))
                .collect();
            let component = component_of[index[source].index()];
            items.extend(
                terminals[component]
                    .iter()
                    .map(|&(to, kind)| ExpandedDependencyItem::new(source.clone(), to.clone(), kind)),
            );

            for item in &items {
                map.to_index
                    .entry(item.to.clone())
                    .or_default()
                    .push(item.clone());
            }
            map.len += items.len();
            map.from_index.insert(source.clone(), items.into_iter().collect());
        }
        for items in map.to_index.values_mut() {
            items.sort();
        }

        tracing::debug!(
            facts = graph.len(),
            expanded = map.len,
            components = components.len(),
            "expanded dependency map built"
        );
        map
    }

    /// Returns everything `node` depends on, directly or through `Include` edges.
    ///
    /// Unknown nodes yield an empty slice.
    pub fn dependencies_from(&self, node: &str) -> &[ExpandedDependencyItem] {
        self.from_index.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns every expanded item whose target is `node`.
    ///
    /// Unknown nodes yield an empty slice.
    pub fn dependencies_to(&self, node: &str) -> &[ExpandedDependencyItem] {
        self.to_index.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the documents that must be rebuilt because `changed` changed.
    ///
    /// Every source of an expanded item targeting a changed document is
    /// impacted. Sources reached through an `Include` item are themselves
    /// treated as changed, since their rendered content embeds the change;
    /// sources reached through terminal kinds are not walked further.
    pub fn impact_of<'a>(&self, changed: impl IntoIterator<Item = &'a DocId>) -> BTreeSet<DocId> {
        let mut impacted = BTreeSet::new();
        let mut walked: BTreeSet<&str> = BTreeSet::new();
        let mut worklist: Vec<&str> = changed.into_iter().map(DocId::as_str).collect();
        while let Some(doc) = worklist.pop() {
            for item in self.dependencies_to(doc) {
                impacted.insert(item.from.clone());
                if item.kind.is_pass_through() && walked.insert(item.from.as_str()) {
                    worklist.push(item.from.as_str());
                }
            }
        }
        impacted
    }

    /// Returns the total number of expanded items.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the closure is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
