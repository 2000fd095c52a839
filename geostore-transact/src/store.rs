//! In-memory feature store.
//!
//! Committed features for each type live in an `Arc`'d, insertion-ordered
//! collection behind the store's `RwLock`. Readers capture the `Arc` and
//! iterate it without holding the lock; writers replace it copy-on-write.
//!
//! Writes through an auto-commit [`Transaction`] apply immediately. Writes
//! through any other transaction go to that transaction's per-type
//! [`Diff`](crate::Diff) and become visible to other readers on
//! [`MemoryDataStore::commit`].

use crate::config::MemoryStoreConfig;
use crate::diff::Change;
use crate::diff_reader::DiffFeatureReader;
use crate::error::{Result, TransactError};
use crate::transaction::Transaction;
use geostore_core::{
    read_all, AttributeValue, BoxedFeatureReader, Envelope, Error, Feature, FeatureId,
    FeatureReader, FeatureType, GenericName, MaxFeaturesReader, ReaderState,
};
use geostore_filter::{Filter, FilteringReader};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// Read request against one feature type.
#[derive(Debug, Clone)]
pub struct Query {
    pub type_name: String,
    pub filter: Filter,
    pub max_features: Option<usize>,
}

impl Query {
    /// Every feature of `type_name`.
    pub fn all(type_name: impl Into<String>) -> Self {
        Self::filtered(type_name, Filter::Include)
    }

    pub fn filtered(type_name: impl Into<String>, filter: Filter) -> Self {
        Self {
            type_name: type_name.into(),
            filter,
            max_features: None,
        }
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }
}

/// Committed features of one type, in insertion order.
#[derive(Debug, Clone, Default)]
struct Committed {
    seq_of: FxHashMap<FeatureId, u64>,
    features: BTreeMap<u64, Feature>,
    next_seq: u64,
}

impl Committed {
    fn contains(&self, id: &FeatureId) -> bool {
        self.seq_of.contains_key(id)
    }

    /// Insert or replace; a replaced feature keeps its position.
    fn upsert(&mut self, feature: Feature) {
        match self.seq_of.get(feature.id()) {
            Some(seq) => {
                self.features.insert(*seq, feature);
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.seq_of.insert(feature.id().clone(), seq);
                self.features.insert(seq, feature);
            }
        }
    }

    fn remove(&mut self, id: &FeatureId) -> bool {
        match self.seq_of.remove(id) {
            Some(seq) => self.features.remove(&seq).is_some(),
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.features.len()
    }
}

/// Reader over a captured snapshot of committed features.
struct CommittedReader {
    feature_type: Arc<FeatureType>,
    features: Option<Arc<Committed>>,
    after: Option<u64>,
    state: ReaderState,
}

impl CommittedReader {
    fn new(feature_type: Arc<FeatureType>, features: Arc<Committed>) -> Self {
        Self {
            feature_type,
            features: Some(features),
            after: None,
            state: ReaderState::Open,
        }
    }

    fn peek(&self) -> Option<(u64, &Feature)> {
        let features = self.features.as_ref()?;
        let lower = self.after.map_or(Bound::Unbounded, Bound::Excluded);
        features
            .features
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(seq, f)| (*seq, f))
    }
}

impl FeatureReader for CommittedReader {
    fn feature_type(&self) -> &Arc<FeatureType> {
        &self.feature_type
    }

    fn has_next(&mut self) -> geostore_core::Result<bool> {
        self.state.check()?;
        Ok(self.peek().is_some())
    }

    fn next(&mut self) -> geostore_core::Result<Feature> {
        self.state.check()?;
        match self.peek().map(|(seq, f)| (seq, f.clone())) {
            Some((seq, feature)) => {
                self.after = Some(seq);
                Ok(feature)
            }
            None => {
                self.state = ReaderState::Exhausted;
                Err(Error::NoSuchElement)
            }
        }
    }

    fn close(&mut self) {
        self.features = None;
        self.state = ReaderState::Closed;
    }
}

#[derive(Debug)]
struct TypeEntry {
    schema: Arc<FeatureType>,
    features: Arc<Committed>,
    next_fid: u64,
}

/// Local part of a possibly qualified type name.
fn type_key(type_name: &str) -> &str {
    type_name
        .rsplit_once(':')
        .map_or(type_name, |(_, local)| local)
}

fn same_schema(a: &Arc<FeatureType>, b: &Arc<FeatureType>) -> bool {
    Arc::ptr_eq(a, b) || **a == **b
}

/// In-memory data store with transaction-scoped diffs.
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    config: MemoryStoreConfig,
    types: RwLock<FxHashMap<String, TypeEntry>>,
}

impl MemoryDataStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self {
            config,
            types: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn config(&self) -> &MemoryStoreConfig {
        &self.config
    }

    /// Register a feature type. Type names are unique by local part.
    pub fn create_schema(&self, schema: Arc<FeatureType>) -> Result<()> {
        let key = schema.type_name().to_string();
        let mut types = self.types.write();
        if types.contains_key(&key) {
            return Err(TransactError::DuplicateType(key));
        }
        tracing::debug!(type_name = %key, attributes = schema.attribute_count(), "schema created");
        types.insert(
            key,
            TypeEntry {
                schema,
                features: Arc::new(Committed::default()),
                next_fid: 1,
            },
        );
        Ok(())
    }

    pub fn schema(&self, type_name: &str) -> Result<Arc<FeatureType>> {
        self.types
            .read()
            .get(type_key(type_name))
            .map(|entry| entry.schema.clone())
            .ok_or_else(|| TransactError::unknown_type(type_name))
    }

    /// Registered type names, sorted. Unqualified names take the configured
    /// namespace.
    pub fn type_names(&self) -> Vec<GenericName> {
        let types = self.types.read();
        let mut names: Vec<GenericName> = types
            .values()
            .map(|entry| {
                let name = entry.schema.name();
                if name.is_qualified() {
                    name.clone()
                } else {
                    name.with_namespace(self.config.namespace.as_deref())
                }
            })
            .collect();
        names.sort();
        names
    }

    fn base_reader(&self, type_name: &str) -> Result<CommittedReader> {
        let types = self.types.read();
        let entry = types
            .get(type_key(type_name))
            .ok_or_else(|| TransactError::unknown_type(type_name))?;
        Ok(CommittedReader::new(
            entry.schema.clone(),
            entry.features.clone(),
        ))
    }

    /// Reader for `query` as seen through `txn`.
    ///
    /// Auto-commit transactions, and transactions that have not touched the
    /// type, read committed features directly. Otherwise the transaction's
    /// pending changes are overlaid on a snapshot taken now.
    pub fn feature_reader(&self, txn: &Transaction, query: &Query) -> Result<BoxedFeatureReader> {
        let base = self.base_reader(&query.type_name)?;
        let key = type_key(&query.type_name);

        let reader: BoxedFeatureReader = if txn.is_auto_commit() {
            Box::new(FilteringReader::new(base, query.filter.clone()))
        } else {
            txn.ensure_open()?;
            match txn.existing_diff(key) {
                Some(diff) => Box::new(
                    DiffFeatureReader::new(base, diff.snapshot(), Some(query.filter.clone()))
                        .with_spatial_index_min_size(self.config.spatial_index_min_size),
                ),
                None => Box::new(FilteringReader::new(base, query.filter.clone())),
            }
        };

        Ok(match query.max_features {
            Some(max) => Box::new(MaxFeaturesReader::new(reader, max)),
            None => reader,
        })
    }

    /// Features matching `filter` as seen through `txn`.
    fn read_matching(&self, txn: &Transaction, type_name: &str, filter: &Filter) -> Result<Vec<Feature>> {
        let mut reader = self.feature_reader(txn, &Query::filtered(type_name, filter.clone()))?;
        Ok(read_all(&mut reader)?)
    }

    /// Insert features, returning their ids.
    ///
    /// Ids are generated as `<type><separator><n>` unless
    /// `use_provided_fid` is set, in which case an id already visible through
    /// `txn`, or repeated within the batch, is rejected. The batch is
    /// validated before anything is written: on error nothing is added.
    pub fn add_features(
        &self,
        txn: &Transaction,
        type_name: &str,
        features: Vec<Feature>,
    ) -> Result<Vec<FeatureId>> {
        let key = type_key(type_name);
        let mut types = self.types.write();
        txn.ensure_open()?;
        let entry = types
            .get_mut(key)
            .ok_or_else(|| TransactError::unknown_type(type_name))?;
        let diff = if txn.is_auto_commit() {
            None
        } else {
            Some(txn.diff(key)?)
        };
        let pending = diff.as_ref().map(|d| d.snapshot());

        let mut next_fid = entry.next_fid;
        let mut batch = FxHashSet::default();
        let mut staged = Vec::with_capacity(features.len());
        for feature in features {
            if !same_schema(feature.feature_type(), &entry.schema) {
                return Err(Error::schema_mismatch(format!(
                    "feature {} is not of type {}",
                    feature.id(),
                    entry.schema.name()
                ))
                .into());
            }

            let feature = if self.config.use_provided_fid {
                let id = feature.id();
                let removed = pending
                    .as_ref()
                    .and_then(|p| p.change(id))
                    .is_some_and(Change::is_removed);
                let visible = entry.features.contains(id) && !removed;
                if visible || !batch.insert(id.clone()) {
                    return Err(TransactError::duplicate_feature(id.as_str()));
                }
                feature
            } else {
                let id = loop {
                    let candidate = FeatureId::from(format!(
                        "{}{}{}",
                        key, self.config.fid_separator, next_fid
                    ));
                    next_fid += 1;
                    if !entry.features.contains(&candidate) {
                        break candidate;
                    }
                };
                feature.with_id(id)
            };
            staged.push(feature);
        }

        // release the snapshot so the diff can be updated in place
        drop(pending);
        let ids: Vec<FeatureId> = staged.iter().map(|f| f.id().clone()).collect();
        match &diff {
            Some(diff) => diff.add_all(staged)?,
            None => {
                let committed = Arc::make_mut(&mut entry.features);
                for feature in staged {
                    committed.upsert(feature);
                }
            }
        }
        entry.next_fid = next_fid;

        tracing::debug!(
            type_name = key,
            count = ids.len(),
            txn = txn.id(),
            auto_commit = txn.is_auto_commit(),
            "features added"
        );
        Ok(ids)
    }

    /// Set attributes on every feature matching `filter`; returns the number
    /// of features changed.
    pub fn modify_features(
        &self,
        txn: &Transaction,
        type_name: &str,
        values: &[(&str, AttributeValue)],
        filter: &Filter,
    ) -> Result<usize> {
        txn.ensure_open()?;
        let key = type_key(type_name);
        let matching = self.read_matching(txn, key, filter)?;

        let mut updated = Vec::with_capacity(matching.len());
        for feature in matching {
            let mut feature = feature;
            for (name, value) in values {
                feature = feature.with_attribute(name, value.clone())?;
            }
            updated.push(feature);
        }

        let count = updated.len();
        let mut types = self.types.write();
        txn.ensure_open()?;
        if txn.is_auto_commit() {
            let entry = types
                .get_mut(key)
                .ok_or_else(|| TransactError::unknown_type(type_name))?;
            let committed = Arc::make_mut(&mut entry.features);
            for feature in updated {
                committed.upsert(feature);
            }
        } else {
            let diff = txn.diff(key)?;
            for feature in updated {
                diff.put(feature);
            }
        }
        drop(types);
        tracing::debug!(type_name = key, count, txn = txn.id(), "features modified");
        Ok(count)
    }

    /// Remove every feature matching `filter`; returns the number removed.
    pub fn remove_features(&self, txn: &Transaction, type_name: &str, filter: &Filter) -> Result<usize> {
        txn.ensure_open()?;
        let key = type_key(type_name);
        let ids: Vec<FeatureId> = self
            .read_matching(txn, key, filter)?
            .into_iter()
            .map(|f| f.id().clone())
            .collect();

        let mut types = self.types.write();
        txn.ensure_open()?;
        if txn.is_auto_commit() {
            let entry = types
                .get_mut(key)
                .ok_or_else(|| TransactError::unknown_type(type_name))?;
            let committed = Arc::make_mut(&mut entry.features);
            for id in &ids {
                committed.remove(id);
            }
        } else {
            let diff = txn.diff(key)?;
            for id in &ids {
                diff.remove(id);
            }
        }
        drop(types);
        tracing::debug!(type_name = key, count = ids.len(), txn = txn.id(), "features removed");
        Ok(ids.len())
    }

    /// Number of features matching `query` as seen through `txn`.
    pub fn count(&self, txn: &Transaction, query: &Query) -> Result<usize> {
        let mut reader = self.feature_reader(txn, query)?;
        let mut count = 0;
        let result = loop {
            match reader.has_next() {
                Ok(true) => match reader.next() {
                    Ok(_) => count += 1,
                    Err(e) => break Err(e),
                },
                Ok(false) => break Ok(count),
                Err(e) => break Err(e),
            }
        };
        reader.close();
        Ok(result?)
    }

    /// Envelope of the default geometries of features matching `query`;
    /// `None` if no matching feature has a geometry.
    pub fn bounds(&self, txn: &Transaction, query: &Query) -> Result<Option<Envelope>> {
        let mut reader = self.feature_reader(txn, query)?;
        let mut env = Envelope::EMPTY;
        for feature in read_all(&mut reader)? {
            if let Some(b) = feature.bounds() {
                env.expand_to_include(&b);
            }
        }
        Ok((!env.is_empty()).then_some(env))
    }

    /// Apply `txn`'s changes to the committed features and close it.
    ///
    /// An added id that is already committed, or a modified id that no
    /// longer is, is a conflict; on conflict nothing is applied and the
    /// transaction stays open. Store writes through `txn` are serialized
    /// with the commit, so none can land between the snapshot and the close.
    pub fn commit(&self, txn: &Transaction) -> Result<()> {
        if txn.is_auto_commit() {
            return Ok(());
        }
        let mut types = self.types.write();
        txn.ensure_open()?;
        let touched = txn.touched_types();
        let span = tracing::info_span!("store_commit", txn = txn.id(), types = touched.len());
        let _guard = span.enter();

        let snapshots: Vec<(String, _)> = touched
            .into_iter()
            .filter_map(|name| txn.existing_diff(&name).map(|d| (name, d.snapshot())))
            .collect();

        for (name, snapshot) in &snapshots {
            let entry = types
                .get(name.as_str())
                .ok_or_else(|| TransactError::unknown_type(name.as_str()))?;
            for (id, change) in snapshot.iter() {
                let conflict = match change {
                    Change::Added(_) if entry.features.contains(id) => Some("added id already committed"),
                    Change::Modified(_) if !entry.features.contains(id) => {
                        Some("modified id no longer committed")
                    }
                    _ => None,
                };
                if let Some(reason) = conflict {
                    tracing::warn!(type_name = %name, id = %id, reason, "commit conflict");
                    return Err(TransactError::commit_conflict(
                        name.as_str(),
                        format!("{}: {}", id, reason),
                    ));
                }
            }
        }

        for (name, snapshot) in &snapshots {
            let Some(entry) = types.get_mut(name.as_str()) else {
                continue;
            };
            let committed = Arc::make_mut(&mut entry.features);
            let (mut added, mut modified, mut removed) = (0usize, 0usize, 0usize);
            for (id, change) in snapshot.iter() {
                match change {
                    Change::Added(f) => {
                        committed.upsert(f.clone());
                        added += 1;
                    }
                    Change::Modified(f) => {
                        committed.upsert(f.clone());
                        modified += 1;
                    }
                    Change::Removed => {
                        if committed.remove(id) {
                            removed += 1;
                        }
                    }
                }
            }
            tracing::debug!(
                type_name = %name,
                added,
                modified,
                removed,
                total = committed.len(),
                "changes applied"
            );
        }

        txn.close();
        drop(types);
        Ok(())
    }

    /// Discard `txn`'s changes and close it.
    pub fn rollback(&self, txn: &Transaction) -> Result<()> {
        if txn.is_auto_commit() {
            return Ok(());
        }
        let _types = self.types.write();
        txn.ensure_open()?;
        tracing::debug!(txn = txn.id(), types = ?txn.touched_types(), "transaction rolled back");
        txn.close();
        Ok(())
    }
}
