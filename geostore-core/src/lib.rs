//! # geostore core
//!
//! Value types shared by every geostore crate.
//!
//! This crate provides:
//! - The feature model: `FeatureId`, `AttributeValue`, `Feature`, `FeatureType`
//! - Geometry envelopes and WKT parsing
//! - Coordinate reference system and qualified-name value objects
//! - The `FeatureReader` cursor trait and simple in-memory readers
//! - An envelope range index used by transaction overlays
//!
//! ## Design Principles
//!
//! 1. **Immutable features**: edits produce new values; readers never observe
//!    a feature changing under them
//! 2. **One error surface**: every reader reports failures through
//!    [`Error`], whatever produced them
//! 3. **No transforms**: CRS values describe coordinates, they never convert them

pub mod crs;
pub mod error;
pub mod feature;
pub mod feature_type;
pub mod geometry;
pub mod name;
pub mod reader;
pub mod spatial_index;

pub use crs::{AxisOrder, CoordinateReferenceSystem, CrsKind, LinearUnit};
pub use error::{Error, Result};
pub use feature::{AttributeValue, Feature, FeatureBuilder, FeatureId};
pub use feature_type::{AttributeBinding, AttributeDescriptor, FeatureType, FeatureTypeBuilder};
pub use geometry::{parse_wkt, Envelope};
pub use name::GenericName;
pub use reader::{
    read_all, BoxedFeatureReader, CollectionReader, FeatureReader, MaxFeaturesReader, ReaderState,
};
pub use spatial_index::{EnvelopeIndex, SpatialIndex};
