//! Transaction handles.
//!
//! A [`Transaction`] scopes writes made through a
//! [`MemoryDataStore`](crate::MemoryDataStore). Non-auto-commit transactions
//! keep one [`Diff`] per feature type until they are committed or rolled
//! back; after that the handle is closed and rejects further writes.

use crate::diff::Diff;
use crate::error::{Result, TransactError};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct TxnState {
    diffs: FxHashMap<String, Arc<Diff>>,
    closed: bool,
}

/// Write scope for a data store.
#[derive(Debug)]
pub struct Transaction {
    id: u64,
    auto_commit: bool,
    state: Mutex<TxnState>,
}

impl Transaction {
    /// New transaction that buffers writes until commit.
    pub fn new() -> Self {
        Self::with_mode(false)
    }

    /// Handle whose writes apply to the store immediately.
    pub fn auto_commit() -> Self {
        Self::with_mode(true)
    }

    fn with_mode(auto_commit: bool) -> Self {
        Self {
            id: NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed),
            auto_commit,
            state: Mutex::new(TxnState::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Diff for `type_name`, created on first use.
    pub fn diff(&self, type_name: &str) -> Result<Arc<Diff>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransactError::TransactionClosed(self.id));
        }
        Ok(state
            .diffs
            .entry(type_name.to_string())
            .or_insert_with(|| Arc::new(Diff::new()))
            .clone())
    }

    /// Diff for `type_name` if this transaction has touched it.
    pub fn existing_diff(&self, type_name: &str) -> Option<Arc<Diff>> {
        self.state.lock().diffs.get(type_name).cloned()
    }

    /// Names of the feature types with pending changes, sorted.
    pub fn touched_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .diffs
            .iter()
            .filter(|(_, diff)| !diff.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(TransactError::TransactionClosed(self.id))
        } else {
            Ok(())
        }
    }

    /// Clear every diff and reject further writes.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        for diff in state.diffs.values() {
            diff.clear();
        }
        state.diffs.clear();
        state.closed = true;
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ids() {
        let a = Transaction::new();
        let b = Transaction::auto_commit();
        assert_ne!(a.id(), b.id());
        assert!(b.is_auto_commit());
        assert!(!a.is_auto_commit());
    }

    #[test]
    fn test_diff_is_shared_per_type() {
        let txn = Transaction::new();
        let d1 = txn.diff("roads").unwrap();
        let d2 = txn.diff("roads").unwrap();
        assert!(Arc::ptr_eq(&d1, &d2));
        assert!(txn.existing_diff("rivers").is_none());
    }

    #[test]
    fn test_closed_rejects_writes() {
        let txn = Transaction::new();
        let diff = txn.diff("roads").unwrap();
        diff.remove(&"roads.1".into());
        assert_eq!(txn.touched_types(), vec!["roads"]);
        txn.close();
        assert!(diff.is_empty());
        assert!(txn.is_closed());
        assert!(matches!(
            txn.diff("roads"),
            Err(TransactError::TransactionClosed(_))
        ));
    }
}
