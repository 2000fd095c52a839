//! Coordinate reference system value objects.
//!
//! CRS values here are descriptive only: they identify the coordinate space of
//! a feature type's geometries so that stores and clients can agree on it. No
//! coordinate transformation is performed anywhere in geostore.
//!
//! # Identifier forms
//!
//! [`CoordinateReferenceSystem::decode`] accepts:
//!
//! - `EPSG:4326`
//! - `urn:ogc:def:crs:EPSG::4326` and `urn:ogc:def:crs:EPSG:6.6:4326`
//! - `http://www.opengis.net/def/crs/EPSG/0/4326`
//! - `http://www.opengis.net/gml/srs/epsg.xml#4326`
//! - `CRS:84` (WGS84, longitude first)
//!
//! EPSG geographic systems decode with the authority's north/east axis order;
//! use [`CoordinateReferenceSystem::decode_lon_lat`] to force east/north.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const EPSG: &str = "EPSG";
pub const CRS_AUTHORITY: &str = "CRS";

/// Broad classification of a reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsKind {
    /// Latitude/longitude on an ellipsoid.
    Geographic2D,
    /// Map projection onto a plane.
    Projected,
    /// Local cartesian plane with no earth reference.
    Engineering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisOrder {
    /// x = easting/longitude, y = northing/latitude
    EastNorth,
    /// x = northing/latitude, y = easting/longitude
    NorthEast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinearUnit {
    Degree,
    Metre,
}

/// A coordinate reference system identified by authority and code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoordinateReferenceSystem {
    authority: Arc<str>,
    code: u32,
    name: Arc<str>,
    kind: CrsKind,
    axis_order: AxisOrder,
    unit: LinearUnit,
}

struct KnownCrs {
    name: String,
    kind: CrsKind,
    unit: LinearUnit,
}

/// Built-in EPSG registry.
fn lookup_epsg(code: u32) -> Option<KnownCrs> {
    let geographic = |name: &str| KnownCrs {
        name: name.to_string(),
        kind: CrsKind::Geographic2D,
        unit: LinearUnit::Degree,
    };
    let projected = |name: String| KnownCrs {
        name,
        kind: CrsKind::Projected,
        unit: LinearUnit::Metre,
    };

    match code {
        4326 => Some(geographic("WGS 84")),
        4269 => Some(geographic("NAD83")),
        4258 => Some(geographic("ETRS89")),
        3857 => Some(projected("WGS 84 / Pseudo-Mercator".to_string())),
        900913 => Some(projected("Google Maps Global Mercator".to_string())),
        3395 => Some(projected("WGS 84 / World Mercator".to_string())),
        32601..=32660 => Some(projected(format!("WGS 84 / UTM zone {}N", code - 32600))),
        32701..=32760 => Some(projected(format!("WGS 84 / UTM zone {}S", code - 32700))),
        404000 => Some(KnownCrs {
            name: "Wildcard 2D cartesian plane in metric unit".to_string(),
            kind: CrsKind::Engineering,
            unit: LinearUnit::Metre,
        }),
        _ => None,
    }
}

/// Codes that are historical aliases of another registry entry.
fn canonical_code(code: u32) -> u32 {
    match code {
        900913 => 3857,
        other => other,
    }
}

impl CoordinateReferenceSystem {
    /// WGS84 with longitude first (`CRS:84`).
    pub fn wgs84() -> Self {
        Self {
            authority: Arc::from(CRS_AUTHORITY),
            code: 84,
            name: Arc::from("WGS 84 (lon/lat)"),
            kind: CrsKind::Geographic2D,
            axis_order: AxisOrder::EastNorth,
            unit: LinearUnit::Degree,
        }
    }

    /// Decode an identifier using the authority's axis order.
    pub fn decode(identifier: &str) -> Result<Self> {
        let (authority, code) = split_identifier(identifier)?;
        if authority.eq_ignore_ascii_case(CRS_AUTHORITY) {
            return match code {
                84 => Ok(Self::wgs84()),
                _ => Err(Error::invalid_crs(format!("unknown CRS code: {}", identifier))),
            };
        }
        if !authority.eq_ignore_ascii_case(EPSG) {
            return Err(Error::invalid_crs(format!(
                "unsupported authority '{}' in {}",
                authority, identifier
            )));
        }
        let known = lookup_epsg(code)
            .ok_or_else(|| Error::invalid_crs(format!("unknown EPSG code: {}", code)))?;
        let axis_order = match known.kind {
            CrsKind::Geographic2D => AxisOrder::NorthEast,
            CrsKind::Projected | CrsKind::Engineering => AxisOrder::EastNorth,
        };
        Ok(Self {
            authority: Arc::from(EPSG),
            code,
            name: Arc::from(known.name),
            kind: known.kind,
            axis_order,
            unit: known.unit,
        })
    }

    /// Decode an identifier, forcing longitude/easting first.
    pub fn decode_lon_lat(identifier: &str) -> Result<Self> {
        let mut crs = Self::decode(identifier)?;
        crs.axis_order = AxisOrder::EastNorth;
        Ok(crs)
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CrsKind {
        self.kind
    }

    pub fn axis_order(&self) -> AxisOrder {
        self.axis_order
    }

    pub fn unit(&self) -> LinearUnit {
        self.unit
    }

    pub fn is_geographic(&self) -> bool {
        self.kind == CrsKind::Geographic2D
    }

    /// `AUTHORITY:code` form.
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.authority, self.code)
    }

    /// OGC URN form.
    pub fn urn(&self) -> String {
        format!("urn:ogc:def:crs:{}::{}", self.authority, self.code)
    }

    /// Compare authority and code only, ignoring name, axis order and
    /// historical aliases.
    pub fn equals_ignore_metadata(&self, other: &Self) -> bool {
        self.authority.eq_ignore_ascii_case(&other.authority)
            && canonical_code(self.code) == canonical_code(other.code)
    }
}

impl fmt::Display for CoordinateReferenceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.authority, self.code, self.name)
    }
}

/// Split any supported identifier form into `(authority, code)`.
fn split_identifier(identifier: &str) -> Result<(String, u32)> {
    let text = identifier.trim();
    let invalid = || Error::invalid_crs(format!("malformed CRS identifier: {}", identifier));

    let (authority, code) = if let Some(rest) = strip_prefix_ignore_case(text, "urn:ogc:def:crs:")
    {
        // AUTH:[version]:code
        let parts: Vec<&str> = rest.split(':').collect();
        match parts.as_slice() {
            [auth, code] | [auth, _, code] => (auth.to_string(), *code),
            _ => return Err(invalid()),
        }
    } else if let Some(rest) = strip_prefix_ignore_case(text, "http://www.opengis.net/def/crs/") {
        // AUTH/version/code
        let parts: Vec<&str> = rest.split('/').collect();
        match parts.as_slice() {
            [auth, _, code] => (auth.to_string(), *code),
            _ => return Err(invalid()),
        }
    } else if let Some(rest) =
        strip_prefix_ignore_case(text, "http://www.opengis.net/gml/srs/epsg.xml#")
    {
        (EPSG.to_string(), rest)
    } else {
        let (auth, code) = text.split_once(':').ok_or_else(invalid)?;
        (auth.to_string(), code)
    };

    let code = code.trim().parse::<u32>().map_err(|_| invalid())?;
    Ok((authority, code))
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        text.get(prefix.len()..)
    } else {
        None
    }
}
