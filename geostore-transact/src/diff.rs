//! Transaction-local change sets.
//!
//! A [`Diff`] records, per feature id, how a transaction changed the
//! committed features of one type:
//!
//! - `Added(feature)`: created in this transaction, not in the base stream
//! - `Modified(feature)`: replaces the base record with the same id
//! - `Removed`: tombstone for a base record
//!
//! An id with no entry is unmodified. Entries iterate in the order their id
//! first entered the diff; updating an existing entry keeps its position.
//!
//! # Snapshots
//!
//! The live state sits behind an `Arc` inside the diff's mutex. A
//! [`DiffSnapshot`] is a clone of that `Arc`, so taking one is O(1) and the
//! next mutation copies the state (`Arc::make_mut`) instead of changing what
//! existing snapshots see. Readers always work from a snapshot.
//!
//! # Envelope index
//!
//! Each state lazily builds an [`EnvelopeIndex`] over the non-removed
//! features that have a default geometry. The index lives in a `OnceCell`
//! on the state, so it is built at most once per state and discarded by the
//! next mutation.

use crate::error::{Result, TransactError};
use geostore_core::{Envelope, EnvelopeIndex, Feature, FeatureId, SpatialIndex};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// How a transaction changed one feature id.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Created in this transaction
    Added(Feature),
    /// New value for a base record
    Modified(Feature),
    /// Base record deleted
    Removed,
}

impl Change {
    /// The feature this change makes visible, `None` for a tombstone.
    pub fn feature(&self) -> Option<&Feature> {
        match self {
            Change::Added(f) | Change::Modified(f) => Some(f),
            Change::Removed => None,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, Change::Added(_))
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, Change::Removed)
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    /// Position in diff order
    seq: u64,
    change: Change,
}

#[derive(Debug, Clone, Default)]
struct DiffState {
    changes: FxHashMap<FeatureId, Tracked>,
    /// seq -> id, for first-insertion iteration order
    order: BTreeMap<u64, FeatureId>,
    next_seq: u64,
    index: OnceCell<EnvelopeIndex<u64>>,
}

impl DiffState {
    fn insert(&mut self, id: FeatureId, change: Change) {
        match self.changes.get_mut(&id) {
            Some(tracked) => tracked.change = change,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.order.insert(seq, id.clone());
                self.changes.insert(id, Tracked { seq, change });
            }
        }
    }

    fn erase(&mut self, id: &FeatureId) {
        if let Some(tracked) = self.changes.remove(id) {
            self.order.remove(&tracked.seq);
        }
    }

    fn index(&self) -> &EnvelopeIndex<u64> {
        self.index.get_or_init(|| {
            EnvelopeIndex::build(self.order.iter().filter_map(|(seq, id)| {
                let feature = self.changes.get(id)?.change.feature()?;
                Some((feature.bounds()?, *seq))
            }))
        })
    }
}

/// Immutable view of a [`Diff`] at one point in time.
#[derive(Debug, Clone, Default)]
pub struct DiffSnapshot {
    state: Arc<DiffState>,
}

impl DiffSnapshot {
    /// Number of tracked ids, tombstones included.
    pub fn len(&self) -> usize {
        self.state.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.changes.is_empty()
    }

    /// Change recorded for `id`, if any.
    pub fn change(&self, id: &FeatureId) -> Option<&Change> {
        self.state.changes.get(id).map(|t| &t.change)
    }

    /// All entries in diff order.
    pub fn iter(&self) -> impl Iterator<Item = (&FeatureId, &Change)> + '_ {
        self.state
            .order
            .values()
            .filter_map(move |id| Some((id, &self.state.changes.get(id)?.change)))
    }

    /// Features created in this transaction, in diff order.
    pub fn added(&self) -> impl Iterator<Item = &Feature> + '_ {
        self.iter().filter_map(|(_, change)| match change {
            Change::Added(f) => Some(f),
            _ => None,
        })
    }

    /// Modified or removed base ids in diff order; `None` marks a tombstone.
    pub fn modified(&self) -> impl Iterator<Item = (&FeatureId, Option<&Feature>)> + '_ {
        self.iter().filter_map(|(id, change)| match change {
            Change::Added(_) => None,
            Change::Modified(f) => Some((id, Some(f))),
            Change::Removed => Some((id, None)),
        })
    }

    /// Non-removed features whose bounds intersect `envelope`, in diff order.
    /// Features without a geometry never match.
    pub fn query_index(&self, envelope: &Envelope) -> Vec<&Feature> {
        self.index_candidates(envelope)
            .into_iter()
            .filter_map(|seq| self.entry_at(seq).and_then(|(_, change)| change.feature()))
            .collect()
    }

    /// Sequence numbers of index hits, sorted into diff order.
    pub(crate) fn index_candidates(&self, envelope: &Envelope) -> Vec<u64> {
        let mut seqs: Vec<u64> = self
            .state
            .index()
            .query(envelope)
            .into_iter()
            .copied()
            .collect();
        seqs.sort_unstable();
        seqs
    }

    /// Sequence numbers of every non-removed feature whose bounds intersect
    /// `envelope`, found by a linear walk.
    pub(crate) fn scan_candidates(&self, envelope: &Envelope) -> Vec<u64> {
        self.state
            .order
            .iter()
            .filter(|(_, id)| {
                self.state
                    .changes
                    .get(*id)
                    .and_then(|t| t.change.feature())
                    .and_then(Feature::bounds)
                    .is_some_and(|b| b.intersects(envelope))
            })
            .map(|(seq, _)| *seq)
            .collect()
    }

    pub(crate) fn entry_at(&self, seq: u64) -> Option<(&FeatureId, &Change)> {
        let id = self.state.order.get(&seq)?;
        Some((id, &self.state.changes.get(id)?.change))
    }

    /// First entry after `after` in diff order (from the start if `None`).
    pub(crate) fn entry_after(&self, after: Option<u64>) -> Option<(u64, &FeatureId, &Change)> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        let (seq, id) = self.state.order.range((lower, Bound::Unbounded)).next()?;
        Some((*seq, id, &self.state.changes.get(id)?.change))
    }
}

/// Transaction-local change set for one feature type.
///
/// Shared as `Arc<Diff>` between a transaction and the readers built from
/// it; every mutation and index build happens under the diff's lock.
#[derive(Debug, Default)]
pub struct Diff {
    state: Mutex<Arc<DiffState>>,
}

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut DiffState) -> T) -> T {
        let mut guard = self.state.lock();
        let state = Arc::make_mut(&mut guard);
        state.index = OnceCell::new();
        f(state)
    }

    /// Record a feature that is not in the base stream.
    ///
    /// Adding over a tombstone re-creates the base record and is recorded as
    /// a modification. Adding an id that is already visible is an error.
    pub fn add(&self, feature: Feature) -> Result<()> {
        self.add_all(vec![feature])
    }

    /// Record several features as one step; on error nothing is recorded.
    pub fn add_all(&self, features: Vec<Feature>) -> Result<()> {
        let mut guard = self.state.lock();
        let mut batch = FxHashSet::default();
        let mut changes = Vec::with_capacity(features.len());
        for feature in features {
            let id = feature.id().clone();
            let change = match guard.changes.get(&id).map(|t| &t.change) {
                Some(Change::Added(_)) | Some(Change::Modified(_)) => {
                    return Err(TransactError::duplicate_feature(id.as_str()));
                }
                Some(Change::Removed) => Change::Modified(feature),
                None => Change::Added(feature),
            };
            if !batch.insert(id.clone()) {
                return Err(TransactError::duplicate_feature(id.as_str()));
            }
            tracing::trace!(id = %id, added = change.is_added(), "diff add");
            changes.push((id, change));
        }
        if changes.is_empty() {
            return Ok(());
        }
        let state = Arc::make_mut(&mut guard);
        state.index = OnceCell::new();
        for (id, change) in changes {
            state.insert(id, change);
        }
        Ok(())
    }

    /// Record a new value for `feature.id()`.
    ///
    /// An id added in this transaction stays added with the new value;
    /// anything else becomes a modification of the base record.
    pub fn put(&self, feature: Feature) {
        let id = feature.id().clone();
        self.mutate(|state| {
            let added = state.changes.get(&id).is_some_and(|t| t.change.is_added());
            tracing::trace!(id = %id, added, "diff put");
            let change = if added {
                Change::Added(feature)
            } else {
                Change::Modified(feature)
            };
            state.insert(id, change);
        })
    }

    /// Remove `id`. An id added in this transaction is erased outright;
    /// anything else becomes a tombstone.
    pub fn remove(&self, id: &FeatureId) {
        self.mutate(|state| {
            let added = state.changes.get(id).is_some_and(|t| t.change.is_added());
            tracing::trace!(id = %id, erased = added, "diff remove");
            if added {
                state.erase(id);
            } else {
                state.insert(id.clone(), Change::Removed);
            }
        })
    }

    /// Drop every change.
    pub fn clear(&self) {
        *self.state.lock() = Arc::new(DiffState::default());
    }

    /// Immutable view of the current state.
    pub fn snapshot(&self) -> DiffSnapshot {
        DiffSnapshot {
            state: Arc::clone(&self.state.lock()),
        }
    }

    /// Non-removed features whose bounds intersect `envelope`, in diff order.
    pub fn query_index(&self, envelope: &Envelope) -> Vec<Feature> {
        // Build under the lock so concurrent callers share one index.
        let guard = self.state.lock();
        let snapshot = DiffSnapshot {
            state: Arc::clone(&guard),
        };
        snapshot.state.index();
        drop(guard);
        snapshot
            .query_index(envelope)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
