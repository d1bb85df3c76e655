//! Per-document change classification.
//!
//! Compares current content hashes against the prior manifest's fingerprints
//! to decide which documents were created, updated, deleted or left alone
//! since the last build. A host with better provenance than local hashing can
//! supply an override map that takes precedence for the paths it lists.

use std::collections::BTreeMap;
use std::fmt;

use folio_common::{ContentHash, DocId};
use serde::{Deserialize, Serialize};

use crate::manifest::FileFingerprint;

/// How a document changed since the last build.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Present now, absent from the prior build.
    Created,
    /// Present in both builds with different content.
    Updated,
    /// Present in the prior build, absent now.
    Deleted,
    /// Present in both builds with identical content.
    Unchanged,
}

impl ChangeKind {
    /// Returns `true` for every kind except [`Unchanged`](ChangeKind::Unchanged).
    pub fn is_change(self) -> bool {
        self != ChangeKind::Unchanged
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Updated => write!(f, "updated"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Caller-declared change kinds, keyed by document.
pub type ChangeOverrides = BTreeMap<DocId, ChangeKind>;

/// The classification of every document known to either build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: BTreeMap<DocId, ChangeKind>,
}

impl ChangeSet {
    /// Returns the change kind recorded for `doc`, if it is known to either build.
    pub fn kind(&self, doc: &str) -> Option<ChangeKind> {
        self.changes.get(doc).copied()
    }

    /// Iterates over every classified document in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&DocId, ChangeKind)> {
        self.changes.iter().map(|(doc, kind)| (doc, *kind))
    }

    /// Iterates over documents whose kind is not `Unchanged`.
    pub fn directly_changed(&self) -> impl Iterator<Item = &DocId> {
        self.of_kind_where(ChangeKind::is_change)
    }

    /// Iterates over documents classified exactly as `kind`.
    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &DocId> {
        self.of_kind_where(move |k| k == kind)
    }

    fn of_kind_where(&self, pred: impl Fn(ChangeKind) -> bool) -> impl Iterator<Item = &DocId> {
        self.changes
            .iter()
            .filter(move |(_, kind)| pred(**kind))
            .map(|(doc, _)| doc)
    }

    /// Returns the number of documents of each kind as `(created, updated, deleted, unchanged)`.
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        self.changes
            .values()
            .fold((0, 0, 0, 0), |(c, u, d, n), kind| match kind {
                ChangeKind::Created => (c + 1, u, d, n),
                ChangeKind::Updated => (c, u + 1, d, n),
                ChangeKind::Deleted => (c, u, d + 1, n),
                ChangeKind::Unchanged => (c, u, d, n + 1),
            })
    }

    /// Returns `true` if no document changed.
    pub fn is_empty(&self) -> bool {
        self.directly_changed().next().is_none()
    }
}

/// Classifies documents against prior fingerprints, honoring overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector<'a> {
    overrides: Option<&'a ChangeOverrides>,
}

impl<'a> ChangeDetector<'a> {
    /// Creates a detector relying solely on content hashes.
    pub fn new() -> Self {
        Self { overrides: None }
    }

    /// Makes `overrides` authoritative for the documents it lists.
    pub fn with_overrides(overrides: &'a ChangeOverrides) -> Self {
        Self {
            overrides: Some(overrides),
        }
    }

    /// Classifies every document present in `current` or `previous`.
    ///
    /// An override wins even against conflicting hashes, with two limits: a
    /// document absent from `current` stays `Deleted` whatever the override
    /// says, and overrides naming a document that exists in neither build are
    /// ignored.
    pub fn detect(
        &self,
        current: &BTreeMap<DocId, ContentHash>,
        previous: &BTreeMap<DocId, FileFingerprint>,
    ) -> ChangeSet {
        let mut changes = BTreeMap::new();

        for (doc, hash) in current {
            let detected = match previous.get(doc) {
                Some(fp) if fp.content_hash == *hash => ChangeKind::Unchanged,
                Some(_) => ChangeKind::Updated,
                None => ChangeKind::Created,
            };
            changes.insert(doc.clone(), detected);
        }
        for doc in previous.keys() {
            if !current.contains_key(doc) {
                changes.insert(doc.clone(), ChangeKind::Deleted);
            }
        }

        if let Some(overrides) = self.overrides {
            for (doc, kind) in overrides {
                match changes.get_mut(doc) {
                    Some(_) if !current.contains_key(doc) && *kind != ChangeKind::Deleted => {
                        tracing::debug!(doc = %doc, declared = %kind, "ignoring override for absent document");
                    }
                    Some(detected) => {
                        if *detected != *kind {
                            tracing::debug!(doc = %doc, detected = %detected, declared = %kind, "change override applied");
                        }
                        *detected = *kind;
                    }
                    None => {
                        tracing::debug!(doc = %doc, "ignoring override for unknown document");
                    }
                }
            }
        }

        ChangeSet { changes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(doc: &str, content: &[u8]) -> (DocId, FileFingerprint) {
        let id = DocId::new(doc);
        (
            id.clone(),
            FileFingerprint::new(id, ContentHash::from_bytes(content), "markdown"),
        )
    }

    fn current(entries: &[(&str, &[u8])]) -> BTreeMap<DocId, ContentHash> {
        entries
            .iter()
            .map(|(doc, content)| (DocId::new(doc), ContentHash::from_bytes(content)))
            .collect()
    }

    #[test]
    fn all_new_without_prior() {
        let cs = ChangeDetector::new().detect(
            &current(&[("a.md", b"a"), ("b.md", b"b")]),
            &BTreeMap::new(),
        );
        assert_eq!(cs.counts(), (2, 0, 0, 0));
        assert_eq!(cs.kind("a.md"), Some(ChangeKind::Created));
    }

    #[test]
    fn classifies_every_kind() {
        let previous: BTreeMap<_, _> = [
            fingerprint("same.md", b"same"),
            fingerprint("edited.md", b"old"),
            fingerprint("gone.md", b"gone"),
        ]
        .into_iter()
        .collect();
        let cs = ChangeDetector::new().detect(
            &current(&[("same.md", b"same"), ("edited.md", b"new"), ("fresh.md", b"x")]),
            &previous,
        );
        assert_eq!(cs.kind("same.md"), Some(ChangeKind::Unchanged));
        assert_eq!(cs.kind("edited.md"), Some(ChangeKind::Updated));
        assert_eq!(cs.kind("gone.md"), Some(ChangeKind::Deleted));
        assert_eq!(cs.kind("fresh.md"), Some(ChangeKind::Created));
        assert_eq!(cs.kind("never.md"), None);

        let changed: Vec<&str> = cs.directly_changed().map(DocId::as_str).collect();
        assert_eq!(changed, vec!["edited.md", "fresh.md", "gone.md"]);
        assert!(!cs.is_empty());
    }

    #[test]
    fn unchanged_set_is_empty() {
        let previous: BTreeMap<_, _> = [fingerprint("a.md", b"a")].into_iter().collect();
        let cs = ChangeDetector::new().detect(&current(&[("a.md", b"a")]), &previous);
        assert!(cs.is_empty());
        assert_eq!(cs.of_kind(ChangeKind::Unchanged).count(), 1);
    }

    #[test]
    fn override_beats_matching_hash() {
        let previous: BTreeMap<_, _> = [fingerprint("a.md", b"a")].into_iter().collect();
        let overrides: ChangeOverrides = [(DocId::new("a.md"), ChangeKind::Updated)].into();
        let cs = ChangeDetector::with_overrides(&overrides)
            .detect(&current(&[("a.md", b"a")]), &previous);
        assert_eq!(cs.kind("a.md"), Some(ChangeKind::Updated));
    }

    #[test]
    fn override_beats_differing_hash() {
        let previous: BTreeMap<_, _> = [fingerprint("a.md", b"old")].into_iter().collect();
        let overrides: ChangeOverrides = [(DocId::new("a.md"), ChangeKind::Unchanged)].into();
        let cs = ChangeDetector::with_overrides(&overrides)
            .detect(&current(&[("a.md", b"new")]), &previous);
        assert_eq!(cs.kind("a.md"), Some(ChangeKind::Unchanged));
    }

    #[test]
    fn unlisted_paths_fall_back_to_hashing() {
        let previous: BTreeMap<_, _> =
            [fingerprint("a.md", b"a"), fingerprint("b.md", b"b")].into_iter().collect();
        let overrides: ChangeOverrides = [(DocId::new("a.md"), ChangeKind::Updated)].into();
        let cs = ChangeDetector::with_overrides(&overrides)
            .detect(&current(&[("a.md", b"a"), ("b.md", b"b2")]), &previous);
        assert_eq!(cs.kind("a.md"), Some(ChangeKind::Updated));
        assert_eq!(cs.kind("b.md"), Some(ChangeKind::Updated));
    }

    #[test]
    fn override_cannot_revive_absent_document() {
        let previous: BTreeMap<_, _> =
            [fingerprint("gone.md", b"g"), fingerprint("moved.md", b"m")].into_iter().collect();
        let overrides: ChangeOverrides = [
            (DocId::new("gone.md"), ChangeKind::Unchanged),
            (DocId::new("moved.md"), ChangeKind::Created),
        ]
        .into();
        let cs = ChangeDetector::with_overrides(&overrides).detect(&BTreeMap::new(), &previous);
        assert_eq!(cs.kind("gone.md"), Some(ChangeKind::Deleted));
        assert_eq!(cs.kind("moved.md"), Some(ChangeKind::Deleted));
    }

    #[test]
    fn override_for_unknown_document_is_ignored() {
        let overrides: ChangeOverrides = [(DocId::new("ghost.md"), ChangeKind::Deleted)].into();
        let cs = ChangeDetector::with_overrides(&overrides).detect(&BTreeMap::new(), &BTreeMap::new());
        assert_eq!(cs.kind("ghost.md"), None);
        assert!(cs.is_empty());
    }

    #[test]
    fn change_kind_serde_lowercase() {
        let json = serde_json::to_string(&ChangeKind::Updated).unwrap();
        assert_eq!(json, "\"updated\"");
        let overrides: ChangeOverrides =
            serde_json::from_str(r#"{"docs/a.md": "created", "docs/b.md": "unchanged"}"#).unwrap();
        assert_eq!(overrides[&DocId::new("docs/a.md")], ChangeKind::Created);
    }
}
