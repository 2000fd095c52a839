//! # geostore filter
//!
//! Predicates over features.
//!
//! This crate provides:
//! - The [`Filter`]/[`Expr`] tree and its simplifying builders
//! - Evaluation of a filter against a [`Feature`](geostore_core::Feature)
//! - Query-mode classification used to pick a candidate lookup strategy
//! - SQL `WHERE` encoding with a pre/post split for unsupported predicates
//! - [`FilteringReader`], a reader adapter that applies a filter

pub mod classify;
pub mod error;
pub mod eval;
pub mod ir;
pub mod reader;
pub mod sql;

pub use classify::{classify, QueryMode};
pub use error::{FilterError, Result};
pub use ir::{
    literal, property, ArithmeticOp, CompareOp, DistanceOp, Expr, Filter, LikePattern, LikeToken,
    SpatialOp,
};
pub use reader::FilteringReader;
pub use sql::SqlEncoder;
