//! Filter evaluation against features.
//!
//! Evaluation uses two-valued logic: every predicate is either true or false
//! for a feature. `Null` operands and incomparable types make a comparison
//! false, except `<>` which is true for incomparable non-null values. Errors
//! are reserved for filters that cannot be evaluated against the feature's
//! type at all (unknown properties, arithmetic on non-numbers, bad patterns)
//! and are fatal to the caller.

use crate::error::{FilterError, Result};
use crate::ir::{ArithmeticOp, CompareOp, DistanceOp, Expr, Filter, SpatialOp};
use geo::{Distance, Euclidean, Intersects, Relate};
use geo_types::Geometry;
use geostore_core::{AttributeValue, Envelope, Feature};
use std::borrow::Cow;
use std::cmp::Ordering;

impl Expr {
    /// Compute this expression's value for `feature`.
    pub fn evaluate<'a>(&'a self, feature: &'a Feature) -> Result<Cow<'a, AttributeValue>> {
        match self {
            Expr::Property(name) => {
                let idx = feature
                    .feature_type()
                    .index_of(name)
                    .ok_or_else(|| {
                        FilterError::UnknownProperty(format!(
                            "'{}' is not an attribute of {}",
                            name,
                            feature.feature_type().name()
                        ))
                    })?;
                feature
                    .attribute_at(idx)
                    .map(Cow::Borrowed)
                    .ok_or_else(|| FilterError::UnknownProperty(name.to_string()))
            }
            Expr::Literal(value) => Ok(Cow::Borrowed(value)),
            Expr::Arithmetic { op, left, right } => {
                let l = left.evaluate(feature)?;
                let r = right.evaluate(feature)?;
                arithmetic(*op, &l, &r).map(Cow::Owned)
            }
        }
    }
}

/// `Null` propagates; Long op Long stays integral except for division.
fn arithmetic(op: ArithmeticOp, left: &AttributeValue, right: &AttributeValue) -> Result<AttributeValue> {
    if left.is_null() || right.is_null() {
        return Ok(AttributeValue::Null);
    }
    if let (AttributeValue::Long(a), AttributeValue::Long(b)) = (left, right) {
        let exact = match op {
            ArithmeticOp::Add => a.checked_add(*b),
            ArithmeticOp::Sub => a.checked_sub(*b),
            ArithmeticOp::Mul => a.checked_mul(*b),
            ArithmeticOp::Div => None,
        };
        if let Some(v) = exact {
            return Ok(AttributeValue::Long(v));
        }
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok(AttributeValue::Double(match op {
            ArithmeticOp::Add => a + b,
            ArithmeticOp::Sub => a - b,
            ArithmeticOp::Mul => a * b,
            ArithmeticOp::Div => a / b,
        })),
        _ => Err(FilterError::type_mismatch(format!(
            "cannot apply '{}' to {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn fold_case(value: &AttributeValue) -> Cow<'_, AttributeValue> {
    match value {
        AttributeValue::String(s) => Cow::Owned(AttributeValue::from(s.to_uppercase())),
        other => Cow::Borrowed(other),
    }
}

fn compare_values(op: CompareOp, left: &AttributeValue, right: &AttributeValue, match_case: bool) -> bool {
    if left.is_null() || right.is_null() {
        return false;
    }
    let (left, right) = if match_case {
        (Cow::Borrowed(left), Cow::Borrowed(right))
    } else {
        (fold_case(left), fold_case(right))
    };
    if let (AttributeValue::Geometry(a), AttributeValue::Geometry(b)) = (left.as_ref(), right.as_ref()) {
        return match op {
            CompareOp::Eq => a == b,
            CompareOp::NotEq => a != b,
            _ => false,
        };
    }
    match left.compare(&right) {
        Some(ord) => match op {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::NotEq => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::LtEq => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::GtEq => ord != Ordering::Less,
        },
        None => op == CompareOp::NotEq,
    }
}

/// Geometry operand: `Ok(None)` for `Null`, an error for non-geometry values.
fn geometry_operand<'a>(value: &'a AttributeValue, op: &str) -> Result<Option<&'a Geometry<f64>>> {
    match value {
        AttributeValue::Null => Ok(None),
        AttributeValue::Geometry(g) => Ok(Some(g)),
        other => Err(FilterError::type_mismatch(format!(
            "{} expects geometry operands, got {}",
            op,
            other.type_name()
        ))),
    }
}

fn spatial_relation(op: SpatialOp, a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
    match op {
        SpatialOp::BBox => match (Envelope::from_geometry(a), Envelope::from_geometry(b)) {
            (Some(ea), Some(eb)) => ea.intersects(&eb),
            _ => false,
        },
        SpatialOp::Intersects => a.intersects(b),
        SpatialOp::Disjoint => !a.intersects(b),
        SpatialOp::Contains => a.relate(b).is_contains(),
        SpatialOp::Within => a.relate(b).is_within(),
        SpatialOp::Crosses => a.relate(b).is_crosses(),
        SpatialOp::Overlaps => a.relate(b).is_overlaps(),
        SpatialOp::Touches => a.relate(b).is_touches(),
        SpatialOp::Equals => a.relate(b).is_equal_topo(),
    }
}

fn like_text(value: &AttributeValue) -> Option<Cow<'_, str>> {
    match value {
        AttributeValue::Null | AttributeValue::Geometry(_) => None,
        AttributeValue::String(s) => Some(Cow::Borrowed(s)),
        other => Some(Cow::Owned(other.to_string())),
    }
}

impl Filter {
    /// True if `feature` satisfies this filter.
    pub fn evaluate(&self, feature: &Feature) -> Result<bool> {
        match self {
            Filter::Include => Ok(true),
            Filter::Exclude => Ok(false),
            Filter::And(filters) => {
                for filter in filters {
                    if !filter.evaluate(feature)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or(filters) => {
                for filter in filters {
                    if filter.evaluate(feature)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Not(inner) => Ok(!inner.evaluate(feature)?),
            Filter::Id(ids) => Ok(ids.contains(feature.id())),
            Filter::Compare {
                op,
                left,
                right,
                match_case,
            } => {
                let l = left.evaluate(feature)?;
                let r = right.evaluate(feature)?;
                Ok(compare_values(*op, &l, &r, *match_case))
            }
            Filter::Between { expr, lower, upper } => {
                let v = expr.evaluate(feature)?;
                let lo = lower.evaluate(feature)?;
                let hi = upper.evaluate(feature)?;
                Ok(compare_values(CompareOp::GtEq, &v, &lo, true)
                    && compare_values(CompareOp::LtEq, &v, &hi, true))
            }
            Filter::Like { expr, pattern } => {
                let v = expr.evaluate(feature)?;
                match like_text(&v) {
                    Some(text) => pattern.is_match(&text),
                    None => Ok(false),
                }
            }
            Filter::IsNull(expr) => Ok(expr.evaluate(feature)?.is_null()),
            Filter::Spatial { op, left, right } => {
                let l = left.evaluate(feature)?;
                let r = right.evaluate(feature)?;
                let name = op.name();
                match (geometry_operand(&l, name)?, geometry_operand(&r, name)?) {
                    (Some(a), Some(b)) => Ok(spatial_relation(*op, a, b)),
                    _ => Ok(false),
                }
            }
            Filter::Distance {
                op,
                left,
                right,
                distance,
            } => {
                let l = left.evaluate(feature)?;
                let r = right.evaluate(feature)?;
                let name = match op {
                    DistanceOp::DWithin => "DWITHIN",
                    DistanceOp::Beyond => "BEYOND",
                };
                match (geometry_operand(&l, name)?, geometry_operand(&r, name)?) {
                    (Some(a), Some(b)) => {
                        let d = Euclidean.distance(a, b);
                        Ok(match op {
                            DistanceOp::DWithin => d <= *distance,
                            DistanceOp::Beyond => d > *distance,
                        })
                    }
                    _ => Ok(false),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{literal, property, LikePattern};
    use geostore_core::{parse_wkt, AttributeBinding, FeatureType};
    use std::sync::Arc;

    fn roads() -> Arc<FeatureType> {
        FeatureType::builder("roads")
            .attribute("name", AttributeBinding::String)
            .attribute("speed", AttributeBinding::Long)
            .attribute("width", AttributeBinding::Double)
            .attribute("paved", AttributeBinding::Boolean)
            .geometry("geom", None)
            .build()
            .unwrap()
    }

    fn road(name: Option<&str>, speed: i64, wkt: Option<&str>) -> Feature {
        let ft = roads();
        Feature::builder(&ft)
            .set("name", name)
            .unwrap()
            .set("speed", speed)
            .unwrap()
            .set("width", 7.5)
            .unwrap()
            .set("paved", true)
            .unwrap()
            .set("geom", wkt.map(|w| parse_wkt(w).unwrap()))
            .unwrap()
            .build("roads.1")
            .unwrap()
    }

    #[test]
    fn test_comparisons() {
        let f = road(Some("Main"), 50, None);
        assert!(Filter::equals(property("speed"), literal(50)).evaluate(&f).unwrap());
        assert!(Filter::greater_than(property("width"), literal(7)).evaluate(&f).unwrap());
        assert!(Filter::less_or_equal(property("speed"), literal(50.0)).evaluate(&f).unwrap());
        assert!(!Filter::equals(property("name"), literal("main")).evaluate(&f).unwrap());
        assert!(Filter::compare_ignore_case(CompareOp::Eq, property("name"), literal("main"))
            .evaluate(&f)
            .unwrap());
        assert!(Filter::between(property("speed"), literal(10), literal(50))
            .evaluate(&f)
            .unwrap());
    }

    #[test]
    fn test_null_and_mismatch() {
        let f = road(None, 50, None);
        assert!(!Filter::equals(property("name"), literal("x")).evaluate(&f).unwrap());
        assert!(!Filter::not_equals(property("name"), literal("x")).evaluate(&f).unwrap());
        assert!(Filter::is_null(property("name")).evaluate(&f).unwrap());

        // type mismatch: only <> holds
        assert!(!Filter::equals(property("speed"), literal("50")).evaluate(&f).unwrap());
        assert!(Filter::not_equals(property("speed"), literal("50")).evaluate(&f).unwrap());
    }

    #[test]
    fn test_unknown_property_is_error() {
        let f = road(Some("Main"), 50, None);
        let err = Filter::equals(property("lanes"), literal(2)).evaluate(&f).unwrap_err();
        assert!(matches!(err, FilterError::UnknownProperty(_)));
    }

    #[test]
    fn test_arithmetic() {
        let f = road(Some("Main"), 50, None);
        let doubled = Expr::arithmetic(ArithmeticOp::Mul, property("speed"), literal(2));
        assert_eq!(doubled.evaluate(&f).unwrap().as_ref(), &AttributeValue::Long(100));

        let halved = Expr::arithmetic(ArithmeticOp::Div, property("speed"), literal(4));
        assert_eq!(halved.evaluate(&f).unwrap().as_ref(), &AttributeValue::Double(12.5));

        let bad = Expr::arithmetic(ArithmeticOp::Add, property("name"), literal(1));
        assert!(matches!(bad.evaluate(&f), Err(FilterError::TypeMismatch(_))));
    }

    #[test]
    fn test_like() {
        let f = road(Some("Main Street"), 50, None);
        assert!(Filter::like(property("name"), "Main%").evaluate(&f).unwrap());
        assert!(!Filter::like(property("name"), "main%").evaluate(&f).unwrap());
        let ci = LikePattern::new("main%").match_case(false);
        assert!(Filter::like_pattern(property("name"), ci).evaluate(&f).unwrap());
        assert!(Filter::like(property("speed"), "5_").evaluate(&f).unwrap());
    }

    #[test]
    fn test_spatial_ops() {
        let f = road(Some("Main"), 50, Some("LINESTRING(0 0, 10 10)"));
        let square = "POLYGON((2 2, 4 2, 4 4, 2 4, 2 2))";
        let far = "POLYGON((20 20, 30 20, 30 30, 20 30, 20 20))";

        let intersects = Filter::spatial_wkt(SpatialOp::Intersects, "geom", square).unwrap();
        assert!(intersects.evaluate(&f).unwrap());
        let crosses = Filter::spatial_wkt(SpatialOp::Crosses, "geom", square).unwrap();
        assert!(crosses.evaluate(&f).unwrap());
        let within = Filter::spatial_wkt(SpatialOp::Within, "geom", square).unwrap();
        assert!(!within.evaluate(&f).unwrap());
        let disjoint = Filter::spatial_wkt(SpatialOp::Disjoint, "geom", far).unwrap();
        assert!(disjoint.evaluate(&f).unwrap());
        let bbox = Filter::bbox("geom", Envelope::new(9.0, 9.0, 12.0, 12.0));
        assert!(bbox.evaluate(&f).unwrap());
    }

    #[test]
    fn test_spatial_null_geometry_is_false() {
        let f = road(Some("Main"), 50, None);
        let bbox = Filter::bbox("geom", Envelope::new(0.0, 0.0, 1.0, 1.0));
        assert!(!bbox.evaluate(&f).unwrap());
        let not_geom = Filter::Spatial {
            op: SpatialOp::Intersects,
            left: property("name"),
            right: literal(parse_wkt("POINT(0 0)").unwrap()),
        };
        assert!(matches!(not_geom.evaluate(&f), Err(FilterError::TypeMismatch(_))));
    }

    #[test]
    fn test_distance() {
        let f = road(Some("Main"), 50, Some("POINT(0 0)"));
        let target = parse_wkt("POINT(3 4)").unwrap();
        assert!(Filter::dwithin("geom", target.clone(), 5.0).evaluate(&f).unwrap());
        assert!(!Filter::beyond("geom", target.clone(), 5.0).evaluate(&f).unwrap());
        assert!(Filter::beyond("geom", target, 4.9).evaluate(&f).unwrap());
    }

    #[test]
    fn test_logic_and_ids() {
        let f = road(Some("Main"), 50, None);
        let fast = Filter::greater_than(property("speed"), literal(40));
        let named = Filter::equals(property("name"), literal("Elm"));
        assert!(Filter::or(vec![named.clone(), fast.clone()]).evaluate(&f).unwrap());
        assert!(!Filter::and(vec![named.clone(), fast]).evaluate(&f).unwrap());
        assert!(Filter::negate(named).evaluate(&f).unwrap());
        assert!(Filter::fids(["roads.1", "roads.9"]).evaluate(&f).unwrap());
        assert!(!Filter::fids(["roads.2"]).evaluate(&f).unwrap());
    }
}
