//! Change accumulator
//!
//! Folds field-level edits into one nested merge patch. Each entry carries
//! the revision it was recorded at, so a save that captured revision `n` of
//! a field only clears that field if nobody edited it while the request was
//! in flight.

use crate::path::{FieldPath, Segment};
use crate::MergePatch;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    revision: u64,
}

/// Pending field edits for one resource
#[derive(Debug, Default)]
pub struct ChangeAccumulator {
    entries: BTreeMap<FieldPath, Entry>,
    next_revision: u64,
}

/// A patch together with the revisions it was built from
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPatch {
    pub patch: MergePatch,
    revisions: Vec<(FieldPath, u64)>,
}

impl CapturedPatch {
    /// Paths whose values are carried by this patch
    pub fn paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.revisions.iter().map(|(path, _)| path)
    }
}

impl ChangeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` at `path`
    ///
    /// Last write wins for the same path. A path that contains, or is
    /// contained by, an already pending path replaces that entry: the newer
    /// edit owns the whole subtree. The same holds for a pending path that
    /// needs the other container type at a shared prefix (`tags.first`
    /// against `tags[0]`), so every entry left is representable in one patch.
    pub fn record(&mut self, path: FieldPath, value: Value) {
        self.entries.retain(|pending, _| {
            pending == &path || !(pending.overlaps(&path) || pending.diverges_in_shape(&path))
        });

        let revision = self.next_revision;
        self.next_revision += 1;
        trace!(%path, revision, "recorded change");
        self.entries.insert(path, Entry { value, revision });
    }

    /// Deep-merge every pending entry into one patch
    ///
    /// Returns `None` when nothing is pending. Calling it repeatedly without
    /// an intervening `record`/`clear` yields identical patches.
    pub fn build(&self) -> Option<MergePatch> {
        if self.entries.is_empty() {
            return None;
        }

        let mut root = Value::Null;
        for (path, entry) in &self.entries {
            insert_at(&mut root, path.segments(), entry.value.clone());
        }
        Some(root)
    }

    /// Build the patch and remember which revisions went into it
    pub fn capture(&self) -> Option<CapturedPatch> {
        let patch = self.build()?;
        let revisions = self
            .entries
            .iter()
            .map(|(path, entry)| (path.clone(), entry.revision))
            .collect();
        Some(CapturedPatch { patch, revisions })
    }

    /// Drop entries that were captured and not edited since
    ///
    /// Returns the number of entries removed.
    pub fn settle(&mut self, captured: &CapturedPatch) -> usize {
        let before = self.entries.len();
        for (path, revision) in &captured.revisions {
            if self.entries.get(path).map(|e| e.revision) == Some(*revision) {
                self.entries.remove(path);
            }
        }
        before - self.entries.len()
    }

    /// Drop pending entries at or below any of `paths`
    pub fn discard<'a>(&mut self, paths: impl IntoIterator<Item = &'a FieldPath>) -> usize {
        let paths: Vec<&FieldPath> = paths.into_iter().collect();
        let before = self.entries.len();
        self.entries
            .retain(|pending, _| !paths.iter().any(|p| pending.starts_with(p)));
        before - self.entries.len()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        self.entries.get(path).map(|entry| &entry.value)
    }

    pub fn paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Write `value` below `target`, creating objects and arrays on the way
fn insert_at(target: &mut Value, segments: &[Segment], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return;
    };

    match head {
        Segment::Key(key) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(map) = target {
                let slot = map.entry(key.clone()).or_insert(Value::Null);
                insert_at(slot, rest, value);
            }
        }
        Segment::Index(index) => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            if let Value::Array(items) = target {
                let Some(len) = index.checked_add(1) else {
                    return;
                };
                if items.len() < len {
                    items.resize(len, Value::Null);
                }
                insert_at(&mut items[*index], rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    fn path(p: &str) -> FieldPath {
        FieldPath::parse(p).unwrap()
    }

    #[test]
    fn test_empty_accumulator_builds_nothing() {
        let acc = ChangeAccumulator::new();
        assert!(acc.build().is_none());
        assert!(acc.capture().is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let mut acc = ChangeAccumulator::new();
        acc.record(path("a"), json!(1));
        acc.record(path("a"), json!(2));

        assert_eq!(acc.len(), 1);
        assert_eq!(acc.build(), Some(json!({ "a": 2 })));
    }

    #[test]
    fn test_siblings_under_shared_prefix_merge() {
        let mut acc = ChangeAccumulator::new();
        acc.record(path("settings.theme"), json!("dark"));
        acc.record(path("settings.font.size"), json!(14));
        acc.record(path("settings.font.family"), json!("mono"));
        acc.record(path("name"), json!("Ada"));

        assert_eq!(
            acc.build(),
            Some(json!({
                "name": "Ada",
                "settings": {
                    "theme": "dark",
                    "font": { "size": 14, "family": "mono" }
                }
            }))
        );
    }

    #[test]
    fn test_indexed_paths_expand_to_arrays() {
        let mut acc = ChangeAccumulator::new();
        acc.record(path("tags[2].label"), json!("c"));
        acc.record(path("tags[0].label"), json!("a"));

        assert_eq!(
            acc.build(),
            Some(json!({
                "tags": [{ "label": "a" }, null, { "label": "c" }]
            }))
        );
    }

    #[test]
    fn test_disjoint_edits_merge_regardless_of_order() {
        let edits = vec![
            ("persona.name", json!("Ada")),
            ("persona.description", json!("curious")),
            ("persona.tags[1]", json!("b")),
            ("settings.temperature", json!(0.7)),
            ("settings.top_p", json!(0.9)),
            ("avatar", json!("ada.png")),
        ];

        let mut reference = ChangeAccumulator::new();
        for (p, v) in &edits {
            reference.record(path(p), v.clone());
        }
        let expected = reference.build();

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..32 {
            let mut shuffled = edits.clone();
            shuffled.shuffle(&mut rng);

            let mut acc = ChangeAccumulator::new();
            for (p, v) in shuffled {
                acc.record(path(p), v);
            }
            assert_eq!(acc.build(), expected);
        }
    }

    #[test]
    fn test_overlapping_path_supersedes_subtree() {
        let mut acc = ChangeAccumulator::new();
        acc.record(path("settings.theme"), json!("dark"));
        acc.record(path("settings.font"), json!("mono"));
        acc.record(path("settings"), json!({ "theme": "light" }));

        assert_eq!(acc.len(), 1);
        assert_eq!(acc.build(), Some(json!({ "settings": { "theme": "light" } })));

        acc.record(path("settings.font"), json!("serif"));
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.build(), Some(json!({ "settings": { "font": "serif" } })));
    }

    #[test]
    fn test_shape_conflict_supersedes_older_entry() {
        let mut acc = ChangeAccumulator::new();
        acc.record(path("tags.first"), json!("x"));
        acc.record(path("tags[0]"), json!("y"));

        assert_eq!(acc.len(), 1);
        assert_eq!(acc.get(&path("tags.first")), None);
        assert_eq!(acc.build(), Some(json!({ "tags": ["y"] })));

        acc.record(path("tags.first"), json!("z"));
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.build(), Some(json!({ "tags": { "first": "z" } })));
    }

    #[test]
    fn test_captured_entries_are_all_carried_by_the_patch() {
        let edits = vec![
            ("tags.first", json!("x")),
            ("tags[0]", json!("y")),
            ("tags[2].label", json!("c")),
            ("profile.name", json!("Ada")),
            ("profile[1]", json!("odd")),
            ("mode", json!("chat")),
        ];

        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..32 {
            let mut shuffled = edits.clone();
            shuffled.shuffle(&mut rng);

            let mut acc = ChangeAccumulator::new();
            for (p, v) in shuffled {
                acc.record(path(p), v);
            }

            let captured = acc.capture().unwrap();
            for pending in captured.paths() {
                let pointer: String = pending
                    .segments()
                    .iter()
                    .map(|segment| match segment {
                        Segment::Key(key) => format!("/{}", key),
                        Segment::Index(index) => format!("/{}", index),
                    })
                    .collect();
                assert_eq!(
                    captured.patch.pointer(&pointer),
                    acc.get(pending),
                    "{} missing from {}",
                    pending,
                    captured.patch
                );
            }

            assert_eq!(acc.settle(&captured), captured.paths().count());
            assert!(acc.is_empty());
        }
    }

    #[test]
    fn test_largest_index_builds_without_overflow() {
        let mut acc = ChangeAccumulator::new();
        acc.record(path("tags[9999]"), json!("last"));

        let patch = acc.build().unwrap();
        let tags = patch["tags"].as_array().unwrap();
        assert_eq!(tags.len(), crate::path::MAX_INDEX + 1);
        assert_eq!(tags[crate::path::MAX_INDEX], json!("last"));
        assert!(FieldPath::from_segments([
            Segment::Key("tags".into()),
            Segment::Index(usize::MAX)
        ])
        .is_err());
    }

    #[test]
    fn test_build_is_idempotent() {
        let mut acc = ChangeAccumulator::new();
        acc.record(path("a.b"), json!(1));
        acc.record(path("a.c[1]"), json!(true));

        let first = acc.build();
        let second = acc.build();
        assert_eq!(first, second);
        assert_eq!(acc.len(), 2);
    }

    #[test]
    fn test_settle_keeps_edits_made_after_capture() {
        let mut acc = ChangeAccumulator::new();
        acc.record(path("a"), json!(1));
        acc.record(path("b"), json!(1));

        let captured = acc.capture().unwrap();
        acc.record(path("b"), json!(2));
        acc.record(path("c"), json!(3));

        assert_eq!(acc.settle(&captured), 1);
        assert_eq!(acc.build(), Some(json!({ "b": 2, "c": 3 })));
    }

    #[test]
    fn test_discard_removes_subtrees() {
        let mut acc = ChangeAccumulator::new();
        acc.record(path("profile.name"), json!("x"));
        acc.record(path("profile.bio"), json!("y"));
        acc.record(path("mode"), json!("chat"));

        assert_eq!(acc.discard([&path("profile")]), 2);
        assert_eq!(acc.build(), Some(json!({ "mode": "chat" })));

        acc.clear();
        assert!(acc.is_empty());
    }
}
