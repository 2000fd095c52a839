//! Feature type (schema) definitions.
//!
//! A [`FeatureType`] is the ordered list of attribute descriptors shared by
//! every feature of one collection, plus the default geometry attribute and
//! its CRS. Feature values are stored positionally against this list.

use crate::crs::CoordinateReferenceSystem;
use crate::error::{Error, Result};
use crate::feature::AttributeValue;
use crate::name::GenericName;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Value type an attribute is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeBinding {
    Boolean,
    Long,
    Double,
    String,
    Geometry,
}

impl AttributeBinding {
    /// Check whether a value may be stored under this binding.
    ///
    /// `Null` is handled by the descriptor's nillable flag, not here.
    /// `Long` values widen into `Double` attributes.
    pub fn accepts(&self, value: &AttributeValue) -> bool {
        matches!(
            (self, value),
            (_, AttributeValue::Null)
                | (AttributeBinding::Boolean, AttributeValue::Boolean(_))
                | (AttributeBinding::Long, AttributeValue::Long(_))
                | (AttributeBinding::Double, AttributeValue::Double(_))
                | (AttributeBinding::Double, AttributeValue::Long(_))
                | (AttributeBinding::String, AttributeValue::String(_))
                | (AttributeBinding::Geometry, AttributeValue::Geometry(_))
        )
    }
}

impl std::fmt::Display for AttributeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttributeBinding::Boolean => "Boolean",
            AttributeBinding::Long => "Long",
            AttributeBinding::Double => "Double",
            AttributeBinding::String => "String",
            AttributeBinding::Geometry => "Geometry",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    pub name: Arc<str>,
    pub binding: AttributeBinding,
    pub nillable: bool,
}

impl AttributeDescriptor {
    pub fn new(name: impl AsRef<str>, binding: AttributeBinding) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            binding,
            nillable: true,
        }
    }

    /// Validate a value against this descriptor.
    pub fn validate(&self, value: &AttributeValue) -> Result<()> {
        if value.is_null() {
            if self.nillable {
                return Ok(());
            }
            return Err(Error::schema_mismatch(format!(
                "attribute '{}' is not nillable",
                self.name
            )));
        }
        if !self.binding.accepts(value) {
            return Err(Error::schema_mismatch(format!(
                "attribute '{}' expects {}, got {}",
                self.name,
                self.binding,
                value.type_name()
            )));
        }
        Ok(())
    }
}

/// Schema shared by all features of a collection.
#[derive(Debug, Clone)]
pub struct FeatureType {
    name: GenericName,
    descriptors: Vec<AttributeDescriptor>,
    positions: FxHashMap<Arc<str>, usize>,
    default_geometry: Option<usize>,
    crs: Option<CoordinateReferenceSystem>,
}

impl FeatureType {
    pub fn builder(name: impl Into<GenericName>) -> FeatureTypeBuilder {
        FeatureTypeBuilder::new(name.into())
    }

    pub fn name(&self) -> &GenericName {
        &self.name
    }

    /// Local part of the name, used as the store key.
    pub fn type_name(&self) -> &str {
        self.name.local_part()
    }

    pub fn descriptors(&self) -> &[AttributeDescriptor] {
        &self.descriptors
    }

    pub fn attribute_count(&self) -> usize {
        self.descriptors.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn descriptor(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.index_of(name).map(|i| &self.descriptors[i])
    }

    pub fn default_geometry(&self) -> Option<&AttributeDescriptor> {
        self.default_geometry.map(|i| &self.descriptors[i])
    }

    pub(crate) fn default_geometry_index(&self) -> Option<usize> {
        self.default_geometry
    }

    pub fn crs(&self) -> Option<&CoordinateReferenceSystem> {
        self.crs.as_ref()
    }
}

impl PartialEq for FeatureType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.descriptors == other.descriptors
            && self.default_geometry == other.default_geometry
            && self.crs == other.crs
    }
}

#[derive(Debug)]
pub struct FeatureTypeBuilder {
    name: GenericName,
    descriptors: Vec<AttributeDescriptor>,
    default_geometry: Option<Arc<str>>,
    crs: Option<CoordinateReferenceSystem>,
}

impl FeatureTypeBuilder {
    fn new(name: GenericName) -> Self {
        Self {
            name,
            descriptors: Vec::new(),
            default_geometry: None,
            crs: None,
        }
    }

    /// Add a nillable attribute.
    pub fn attribute(mut self, name: impl AsRef<str>, binding: AttributeBinding) -> Self {
        self.descriptors.push(AttributeDescriptor::new(name, binding));
        self
    }

    /// Add an attribute that rejects `Null`.
    pub fn required(mut self, name: impl AsRef<str>, binding: AttributeBinding) -> Self {
        let mut descriptor = AttributeDescriptor::new(name, binding);
        descriptor.nillable = false;
        self.descriptors.push(descriptor);
        self
    }

    /// Add a geometry attribute and make it the default geometry.
    pub fn geometry(
        mut self,
        name: impl AsRef<str>,
        crs: Option<CoordinateReferenceSystem>,
    ) -> Self {
        let descriptor = AttributeDescriptor::new(name, AttributeBinding::Geometry);
        self.default_geometry = Some(descriptor.name.clone());
        self.descriptors.push(descriptor);
        self.crs = crs;
        self
    }

    /// Choose which geometry attribute is the default.
    pub fn default_geometry(mut self, name: impl AsRef<str>) -> Self {
        self.default_geometry = Some(Arc::from(name.as_ref()));
        self
    }

    pub fn build(self) -> Result<Arc<FeatureType>> {
        let mut positions = FxHashMap::default();
        for (i, d) in self.descriptors.iter().enumerate() {
            if positions.insert(d.name.clone(), i).is_some() {
                return Err(Error::schema_mismatch(format!(
                    "duplicate attribute '{}' in type {}",
                    d.name, self.name
                )));
            }
        }

        let default_geometry = match &self.default_geometry {
            None => None,
            Some(geom_name) => {
                let idx = *positions.get(geom_name).ok_or_else(|| {
                    Error::unknown_attribute(format!(
                        "default geometry '{}' is not an attribute of {}",
                        geom_name, self.name
                    ))
                })?;
                if self.descriptors[idx].binding != AttributeBinding::Geometry {
                    return Err(Error::schema_mismatch(format!(
                        "default geometry '{}' is not bound to Geometry",
                        geom_name
                    )));
                }
                Some(idx)
            }
        };

        Ok(Arc::new(FeatureType {
            name: self.name,
            descriptors: self.descriptors,
            positions,
            default_geometry,
            crs: self.crs,
        }))
    }
}
