//! Features: identified, typed attribute tuples.
//!
//! A [`Feature`] is immutable once built. Edits (`with_attribute`, `with_id`)
//! return a new feature; the feature type is shared through an `Arc` so clones
//! stay cheap relative to the attribute payload.

use crate::error::{Error, Result};
use crate::feature_type::FeatureType;
use crate::geometry::Envelope;
use geo_types::Geometry;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Feature identifier, unique within a feature type.
///
/// Uses `Arc<str>` so ids can be cloned into seen-sets and diff maps freely.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(Arc<str>);

impl FeatureId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for FeatureId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl Borrow<str> for FeatureId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Boolean(bool),
    Long(i64),
    Double(f64),
    String(Arc<str>),
    Geometry(Geometry<f64>),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Short type label for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Null => "Null",
            AttributeValue::Boolean(_) => "Boolean",
            AttributeValue::Long(_) => "Long",
            AttributeValue::Double(_) => "Double",
            AttributeValue::String(_) => "String",
            AttributeValue::Geometry(_) => "Geometry",
        }
    }

    /// Numeric view; `Long` widens to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Long(v) => Some(*v as f64),
            AttributeValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&Geometry<f64>> {
        match self {
            AttributeValue::Geometry(g) => Some(g),
            _ => None,
        }
    }

    /// Ordering between comparable values.
    ///
    /// `None` when either side is `Null`, the types are incomparable, or a
    /// numeric comparison involves NaN. Long/Long compares exactly; mixed
    /// numeric compares as f64.
    pub fn compare(&self, other: &AttributeValue) -> Option<Ordering> {
        match (self, other) {
            (AttributeValue::Long(a), AttributeValue::Long(b)) => Some(a.cmp(b)),
            (AttributeValue::String(a), AttributeValue::String(b)) => Some(a.cmp(b)),
            (AttributeValue::Boolean(a), AttributeValue::Boolean(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "NULL"),
            AttributeValue::Boolean(v) => write!(f, "{}", v),
            AttributeValue::Long(v) => write!(f, "{}", v),
            AttributeValue::Double(v) => write!(f, "{}", v),
            AttributeValue::String(v) => write!(f, "{}", v),
            AttributeValue::Geometry(g) => match Envelope::from_geometry(g) {
                Some(env) => write!(f, "GEOMETRY[{}]", env),
                None => write!(f, "GEOMETRY[EMPTY]"),
            },
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Boolean(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Long(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Long(v as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Double(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(Arc::from(v))
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(Arc::from(v))
    }
}

impl From<Geometry<f64>> for AttributeValue {
    fn from(v: Geometry<f64>) -> Self {
        AttributeValue::Geometry(v)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(AttributeValue::Null, Into::into)
    }
}

/// An identified feature: values stored positionally against its type.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    id: FeatureId,
    feature_type: Arc<FeatureType>,
    values: Vec<AttributeValue>,
}

impl Feature {
    /// Create a feature from positional values, validating each against the
    /// type's descriptors.
    pub fn new(
        feature_type: Arc<FeatureType>,
        id: impl Into<FeatureId>,
        values: Vec<AttributeValue>,
    ) -> Result<Self> {
        if values.len() != feature_type.attribute_count() {
            return Err(Error::schema_mismatch(format!(
                "type {} has {} attributes, got {} values",
                feature_type.name(),
                feature_type.attribute_count(),
                values.len()
            )));
        }
        for (descriptor, value) in feature_type.descriptors().iter().zip(&values) {
            descriptor.validate(value)?;
        }
        Ok(Self {
            id: id.into(),
            feature_type,
            values,
        })
    }

    pub fn builder(feature_type: &Arc<FeatureType>) -> FeatureBuilder {
        FeatureBuilder::new(feature_type.clone())
    }

    pub fn id(&self) -> &FeatureId {
        &self.id
    }

    pub fn feature_type(&self) -> &Arc<FeatureType> {
        &self.feature_type
    }

    pub fn values(&self) -> &[AttributeValue] {
        &self.values
    }

    /// Value of a named attribute; unknown names are an error.
    pub fn attribute(&self, name: &str) -> Result<&AttributeValue> {
        let idx = self.feature_type.index_of(name).ok_or_else(|| {
            Error::unknown_attribute(format!(
                "'{}' is not an attribute of {}",
                name,
                self.feature_type.name()
            ))
        })?;
        Ok(&self.values[idx])
    }

    pub fn attribute_at(&self, index: usize) -> Option<&AttributeValue> {
        self.values.get(index)
    }

    /// The default geometry, if the type has one and it is set.
    pub fn default_geometry(&self) -> Option<&Geometry<f64>> {
        let idx = self.feature_type.default_geometry_index()?;
        self.values[idx].as_geometry()
    }

    /// Envelope of the default geometry.
    pub fn bounds(&self) -> Option<Envelope> {
        self.default_geometry().and_then(Envelope::from_geometry)
    }

    /// Copy with one attribute replaced.
    pub fn with_attribute(&self, name: &str, value: impl Into<AttributeValue>) -> Result<Self> {
        let idx = self
            .feature_type
            .index_of(name)
            .ok_or_else(|| Error::unknown_attribute(name))?;
        let value = value.into();
        self.feature_type.descriptors()[idx].validate(&value)?;
        let mut values = self.values.clone();
        values[idx] = value;
        Ok(Self {
            id: self.id.clone(),
            feature_type: self.feature_type.clone(),
            values,
        })
    }

    /// Copy under a different id.
    pub fn with_id(&self, id: impl Into<FeatureId>) -> Self {
        Self {
            id: id.into(),
            feature_type: self.feature_type.clone(),
            values: self.values.clone(),
        }
    }
}

/// Builds a feature by attribute name; unset attributes default to `Null`.
#[derive(Debug)]
pub struct FeatureBuilder {
    feature_type: Arc<FeatureType>,
    values: Vec<AttributeValue>,
}

impl FeatureBuilder {
    pub fn new(feature_type: Arc<FeatureType>) -> Self {
        let values = vec![AttributeValue::Null; feature_type.attribute_count()];
        Self {
            feature_type,
            values,
        }
    }

    pub fn set(mut self, name: &str, value: impl Into<AttributeValue>) -> Result<Self> {
        let idx = self
            .feature_type
            .index_of(name)
            .ok_or_else(|| Error::unknown_attribute(name))?;
        self.values[idx] = value.into();
        Ok(self)
    }

    pub fn build(self, id: impl Into<FeatureId>) -> Result<Feature> {
        Feature::new(self.feature_type, id, self.values)
    }
}
