//! # geostore transact
//!
//! Transaction-scoped editing of feature collections.
//!
//! This crate provides:
//! - [`Diff`]: the per-transaction, per-type change set, with O(1)
//!   copy-on-write [`DiffSnapshot`]s and a lazily built envelope index
//! - [`DiffFeatureReader`]: a reader that overlays a diff snapshot on a base
//!   reader, filter-consistently and without duplicate ids
//! - [`MemoryDataStore`] and [`Transaction`]: an in-memory store whose
//!   non-auto-commit writes stay private to their transaction until commit
//!
//! ## Quick Start
//!
//! ```
//! use geostore_core::{read_all, AttributeBinding, Feature, FeatureType};
//! use geostore_filter::Filter;
//! use geostore_transact::{MemoryDataStore, MemoryStoreConfig, Query, Transaction};
//!
//! let store = MemoryDataStore::new(MemoryStoreConfig::default());
//! let roads = FeatureType::builder("roads")
//!     .attribute("name", AttributeBinding::String)
//!     .build()?;
//! store.create_schema(roads.clone())?;
//!
//! let txn = Transaction::new();
//! let road = Feature::builder(&roads).set("name", "Main St")?.build("tmp")?;
//! store.add_features(&txn, "roads", vec![road])?;
//!
//! // Visible inside the transaction only
//! assert_eq!(store.count(&txn, &Query::all("roads"))?, 1);
//! assert_eq!(store.count(&Transaction::auto_commit(), &Query::all("roads"))?, 0);
//!
//! store.commit(&txn)?;
//! let mut reader = store.feature_reader(&Transaction::auto_commit(), &Query::filtered("roads", Filter::Include))?;
//! assert_eq!(read_all(&mut reader)?[0].id().as_str(), "roads.1");
//! # Ok::<(), geostore_transact::TransactError>(())
//! ```

pub mod config;
pub mod diff;
pub mod diff_reader;
pub mod error;
pub mod store;
pub mod transaction;

pub use config::MemoryStoreConfig;
pub use diff::{Change, Diff, DiffSnapshot};
pub use diff_reader::DiffFeatureReader;
pub use error::{Result, TransactError};
pub use store::{MemoryDataStore, Query};
pub use transaction::Transaction;
