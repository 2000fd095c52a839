//! Diff overlay reader.
//!
//! [`DiffFeatureReader`] merges a base reader (committed features) with a
//! [`DiffSnapshot`] (uncommitted changes) and a filter, yielding each matching
//! feature id at most once:
//!
//! 1. **Base phase**: every base feature's id is marked seen. Tombstoned ids
//!    are skipped, ids with a replacement in the diff are tested (and
//!    yielded) using the replacement, and unchanged features are tested as is.
//! 2. **Diff phase**: changed features not yet seen are tested and yielded.
//!    Which features are visited depends on the filter's [`QueryMode`]:
//!    - `Ids`: the listed ids, in filter order
//!    - `Spatial`: envelope index hits (or a linear scan for small diffs), in
//!      diff order
//!    - `General`: added features, then modified ones, in diff order
//!
//! A filter that simplifies to `Exclude` short-circuits: the reader is empty
//! and never touches the base reader or the diff.

use crate::diff::{Change, DiffSnapshot};
use geostore_core::{Error, Feature, FeatureId, FeatureReader, FeatureType, ReaderState, Result};
use geostore_filter::{classify, Filter, QueryMode};
use rustc_hash::FxHashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Base,
    Diff,
    Done,
}

/// Position within the diff phase.
#[derive(Debug)]
enum DiffCursor {
    /// Next index into the id list
    Ids { pos: usize },
    /// Candidate sequence numbers and next index
    Candidates { seqs: Vec<u64>, pos: usize },
    /// Walking added entries first, then the rest
    General { added_pass: bool, after: Option<u64> },
}

/// Base errors end the reader; protocol errors from the base are reported
/// as data source failures.
fn base_error(err: Error) -> Error {
    if err.is_fatal() {
        err
    } else {
        Error::data_source(format!("base reader: {}", err))
    }
}

/// Forward-only reader over base features overlaid with a diff snapshot.
pub struct DiffFeatureReader<R: FeatureReader> {
    base: R,
    diff: Option<DiffSnapshot>,
    filter: Filter,
    mode: QueryMode,
    seen: FxHashSet<FeatureId>,
    next: Option<Feature>,
    phase: Phase,
    cursor: Option<DiffCursor>,
    spatial_index_min_size: usize,
    returned: usize,
    state: ReaderState,
}

impl<R: FeatureReader> DiffFeatureReader<R> {
    /// Create a reader; `None` filters match everything.
    pub fn new(base: R, diff: DiffSnapshot, filter: Option<Filter>) -> Self {
        let filter = filter.unwrap_or(Filter::Include).simplify();
        // the diff index covers default geometries only
        let mode = classify(
            &filter,
            base.feature_type()
                .default_geometry()
                .map(|d| &*d.name),
        );

        let span = tracing::debug_span!(
            "diff_reader_open",
            mode = mode.name(),
            diff_len = diff.len()
        );
        let _guard = span.enter();

        let (phase, state) = if mode == QueryMode::Empty {
            tracing::debug!("filter excludes everything, skipping base and diff");
            (Phase::Done, ReaderState::Exhausted)
        } else {
            tracing::debug!(filter = %filter, "diff reader opened");
            (Phase::Base, ReaderState::Open)
        };

        Self {
            base,
            diff: Some(diff),
            filter,
            mode,
            seen: FxHashSet::default(),
            next: None,
            phase,
            cursor: None,
            spatial_index_min_size: 0,
            returned: 0,
            state,
        }
    }

    /// Diffs with fewer entries than `size` are scanned linearly in spatial
    /// mode instead of through the envelope index. Output is the same.
    pub fn with_spatial_index_min_size(mut self, size: usize) -> Self {
        self.spatial_index_min_size = size;
        self
    }

    /// Mode chosen for the filter.
    pub fn mode(&self) -> &QueryMode {
        &self.mode
    }

    fn advance(&mut self) -> Result<bool> {
        loop {
            match self.phase {
                Phase::Base => {
                    if let Some(feature) = self.next_from_base()? {
                        self.next = Some(feature);
                        return Ok(true);
                    }
                    self.phase = Phase::Diff;
                }
                Phase::Diff => {
                    if let Some(feature) = self.next_from_diff()? {
                        self.next = Some(feature);
                        return Ok(true);
                    }
                    self.phase = Phase::Done;
                }
                Phase::Done => {
                    tracing::trace!(returned = self.returned, "diff reader exhausted");
                    self.state = ReaderState::Exhausted;
                    return Ok(false);
                }
            }
        }
    }

    fn next_from_base(&mut self) -> Result<Option<Feature>> {
        let diff = self.diff.as_ref().ok_or(Error::ReaderClosed)?;
        while self.base.has_next().map_err(base_error)? {
            let feature = self.base.next().map_err(base_error)?;
            let id = feature.id().clone();
            let candidate = match diff.change(&id) {
                Some(Change::Removed) => None,
                Some(change) => change.feature().cloned(),
                None => Some(feature),
            };
            self.seen.insert(id);
            if let Some(candidate) = candidate {
                if self.filter.evaluate(&candidate)? {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }

    fn next_from_diff(&mut self) -> Result<Option<Feature>> {
        let diff = self.diff.as_ref().ok_or(Error::ReaderClosed)?;
        let min_size = self.spatial_index_min_size;
        let cursor = self.cursor.get_or_insert_with(|| match &self.mode {
            QueryMode::Ids(_) => DiffCursor::Ids { pos: 0 },
            QueryMode::Spatial { envelope, .. } => {
                let seqs = if diff.len() < min_size {
                    diff.scan_candidates(envelope)
                } else {
                    diff.index_candidates(envelope)
                };
                tracing::trace!(candidates = seqs.len(), "spatial diff candidates");
                DiffCursor::Candidates { seqs, pos: 0 }
            }
            QueryMode::General | QueryMode::Empty => DiffCursor::General {
                added_pass: true,
                after: None,
            },
        });

        match cursor {
            DiffCursor::Ids { pos } => {
                let QueryMode::Ids(ids) = &self.mode else {
                    return Ok(None);
                };
                while let Some(id) = ids.get(*pos) {
                    *pos += 1;
                    if self.seen.contains(id) {
                        continue;
                    }
                    if let Some(feature) = diff.change(id).and_then(Change::feature) {
                        self.seen.insert(id.clone());
                        if self.filter.evaluate(feature)? {
                            return Ok(Some(feature.clone()));
                        }
                    }
                }
                Ok(None)
            }
            DiffCursor::Candidates { seqs, pos } => {
                while let Some(seq) = seqs.get(*pos).copied() {
                    *pos += 1;
                    let Some((id, change)) = diff.entry_at(seq) else {
                        continue;
                    };
                    let Some(feature) = change.feature() else {
                        continue;
                    };
                    if !self.seen.insert(id.clone()) {
                        continue;
                    }
                    if self.filter.evaluate(feature)? {
                        return Ok(Some(feature.clone()));
                    }
                }
                Ok(None)
            }
            DiffCursor::General { added_pass, after } => loop {
                let Some((seq, id, change)) = diff.entry_after(*after) else {
                    if *added_pass {
                        *added_pass = false;
                        *after = None;
                        continue;
                    }
                    return Ok(None);
                };
                *after = Some(seq);
                if change.is_added() != *added_pass {
                    continue;
                }
                let Some(feature) = change.feature() else {
                    continue;
                };
                if !self.seen.insert(id.clone()) {
                    continue;
                }
                if self.filter.evaluate(feature)? {
                    return Ok(Some(feature.clone()));
                }
            },
        }
    }
}

impl<R: FeatureReader> FeatureReader for DiffFeatureReader<R> {
    fn feature_type(&self) -> &Arc<FeatureType> {
        self.base.feature_type()
    }

    fn has_next(&mut self) -> Result<bool> {
        self.state.check()?;
        if self.next.is_some() {
            return Ok(true);
        }
        if self.state == ReaderState::Exhausted {
            return Ok(false);
        }
        match self.advance() {
            Ok(found) => Ok(found),
            Err(e) => {
                tracing::debug!(error = %e, "diff reader failed");
                self.state = ReaderState::Failed;
                self.next = None;
                Err(e)
            }
        }
    }

    fn next(&mut self) -> Result<Feature> {
        if !self.has_next()? {
            return Err(Error::NoSuchElement);
        }
        let feature = self.next.take().ok_or(Error::NoSuchElement)?;
        self.returned += 1;
        Ok(feature)
    }

    fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }
        self.base.close();
        self.diff = None;
        self.next = None;
        self.cursor = None;
        self.seen = FxHashSet::default();
        self.state = ReaderState::Closed;
    }
}
