//! Query-mode classification.
//!
//! Readers that merge an in-memory change set over a base stream use the
//! filter's shape to decide how to find matching changed features:
//! - [`QueryMode::Empty`]: nothing can match, skip all work
//! - [`QueryMode::Ids`]: look the listed ids up directly
//! - [`QueryMode::Spatial`]: query a bounding-box index with the envelope
//! - [`QueryMode::General`]: walk everything
//!
//! Classification only narrows the candidate set. Callers still evaluate the
//! full filter against every candidate.
//!
//! Spatial mode is only chosen for filters on the indexed geometry property;
//! an index over one geometry says nothing about another.

use crate::ir::{Expr, Filter, SpatialOp};
use geostore_core::{AttributeValue, Envelope, FeatureId};
use rustc_hash::FxHashSet;

/// Shape of a filter, as far as candidate lookup is concerned.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryMode {
    /// Filter matches nothing
    Empty,
    /// Only these ids can match, in this order
    Ids(Vec<FeatureId>),
    /// Only features whose envelope intersects `envelope` can match
    Spatial { envelope: Envelope, op: SpatialOp },
    /// No usable structure
    General,
}

impl QueryMode {
    /// Short label for logging.
    pub fn name(&self) -> &'static str {
        match self {
            QueryMode::Empty => "empty",
            QueryMode::Ids(_) => "ids",
            QueryMode::Spatial { .. } => "spatial",
            QueryMode::General => "general",
        }
    }
}

/// Classify `filter` after simplifying it.
///
/// `indexed_geometry` names the geometry property the caller's envelope
/// index is built over; `None` disables spatial mode.
pub fn classify(filter: &Filter, indexed_geometry: Option<&str>) -> QueryMode {
    let simplified = filter.simplify();
    let mode = classify_simplified(&simplified, indexed_geometry);
    tracing::trace!(mode = mode.name(), filter = %simplified, "classified filter");
    mode
}

fn classify_simplified(filter: &Filter, geometry: Option<&str>) -> QueryMode {
    match filter {
        Filter::Exclude => QueryMode::Empty,
        Filter::Id(ids) => QueryMode::Ids(ids.clone()),
        Filter::Or(children) => id_union(children).map_or(QueryMode::General, QueryMode::Ids),
        Filter::And(children) => classify_and(children, geometry),
        Filter::Spatial { .. } => spatial_mode(filter, geometry).unwrap_or(QueryMode::General),
        Filter::Include
        | Filter::Not(_)
        | Filter::Compare { .. }
        | Filter::Between { .. }
        | Filter::Like { .. }
        | Filter::IsNull(_)
        | Filter::Distance { .. } => QueryMode::General,
    }
}

/// Union of the ids when every child is an id filter.
fn id_union(children: &[Filter]) -> Option<Vec<FeatureId>> {
    let mut seen = FxHashSet::default();
    let mut ids = Vec::new();
    for child in children {
        match child {
            Filter::Id(child_ids) => {
                for id in child_ids {
                    if seen.insert(id.clone()) {
                        ids.push(id.clone());
                    }
                }
            }
            _ => return None,
        }
    }
    Some(ids)
}

fn classify_and(children: &[Filter], geometry: Option<&str>) -> QueryMode {
    let mut id_sets = children.iter().filter_map(|child| match child {
        Filter::Id(ids) => Some(ids),
        _ => None,
    });
    if let Some(first) = id_sets.next() {
        let others: Vec<FxHashSet<&FeatureId>> =
            id_sets.map(|ids| ids.iter().collect()).collect();
        let ids: Vec<FeatureId> = first
            .iter()
            .filter(|id| others.iter().all(|set| set.contains(id)))
            .cloned()
            .collect();
        return if ids.is_empty() {
            QueryMode::Empty
        } else {
            QueryMode::Ids(ids)
        };
    }
    children
        .iter()
        .find_map(|child| spatial_mode(child, geometry))
        .unwrap_or(QueryMode::General)
}

/// Spatial mode for `geometry OP literal` (either operand order).
fn spatial_mode(filter: &Filter, geometry: Option<&str>) -> Option<QueryMode> {
    let Filter::Spatial { op, left, right } = filter else {
        return None;
    };
    let (name, literal, op) = match (left, right) {
        (Expr::Property(name), Expr::Literal(value)) => (name, value, *op),
        (Expr::Literal(value), Expr::Property(name)) => (name, value, op.flip()),
        _ => return None,
    };
    if geometry != Some(&**name) {
        return None;
    }
    if !op.is_index_compatible() {
        return None;
    }
    let AttributeValue::Geometry(shape) = literal else {
        return None;
    };
    let envelope = Envelope::from_geometry(shape)?;
    Some(QueryMode::Spatial { envelope, op })
}
