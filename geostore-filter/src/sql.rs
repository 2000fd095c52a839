//! SQL `WHERE` clause encoding.
//!
//! [`SqlEncoder`] renders the attribute part of the filter language as SQL.
//! Spatial and distance predicates have no portable SQL form and are
//! reported as [`FilterError::Unsupported`]; use [`SqlEncoder::split`] to
//! separate them out for in-memory evaluation.

use crate::error::{FilterError, Result};
use crate::ir::{Expr, Filter, LikeToken};
use geostore_core::AttributeValue;
use std::fmt::Write;

const LIKE_ESCAPE: char = '\\';

/// Encodes filters as SQL `WHERE` fragments.
#[derive(Debug, Clone)]
pub struct SqlEncoder {
    fid_column: String,
    fid_prefix: Option<String>,
}

impl Default for SqlEncoder {
    fn default() -> Self {
        Self {
            fid_column: "fid".to_string(),
            fid_prefix: None,
        }
    }
}

impl SqlEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column holding feature ids.
    pub fn with_fid_column(mut self, column: impl Into<String>) -> Self {
        self.fid_column = column.into();
        self
    }

    /// Prefix stripped from feature ids before encoding (e.g. `roads.`).
    pub fn with_fid_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.fid_prefix = Some(prefix.into());
        self
    }

    /// Encode `filter` as a `WHERE` clause body.
    pub fn encode(&self, filter: &Filter) -> Result<String> {
        let mut out = String::new();
        self.write_filter(&mut out, filter)?;
        Ok(out)
    }

    /// True if `filter` can be encoded in full.
    pub fn supports(&self, filter: &Filter) -> bool {
        self.encode(filter).is_ok()
    }

    /// Split `filter` into `(pre, post)` where `pre` is encodable and
    /// `pre AND post` is equivalent to `filter`.
    ///
    /// Only top-level AND children are separated; an OR or NOT with any
    /// unsupported part goes to `post` whole.
    pub fn split(&self, filter: &Filter) -> (Filter, Filter) {
        match filter.simplify() {
            Filter::And(children) => {
                let (pre, post): (Vec<Filter>, Vec<Filter>) =
                    children.into_iter().partition(|child| self.supports(child));
                (Filter::and(pre), Filter::and(post))
            }
            other if self.supports(&other) => (other, Filter::Include),
            other => (Filter::Include, other),
        }
    }

    fn write_filter(&self, out: &mut String, filter: &Filter) -> Result<()> {
        match filter {
            Filter::Include => out.push_str("1 = 1"),
            Filter::Exclude => out.push_str("0 = 1"),
            Filter::And(children) => self.write_joined(out, children, " AND ")?,
            Filter::Or(children) => self.write_joined(out, children, " OR ")?,
            Filter::Not(inner) => {
                out.push_str("NOT (");
                self.write_filter(out, inner)?;
                out.push(')');
            }
            Filter::Id(ids) => {
                write_identifier(out, &self.fid_column);
                out.push_str(" IN (");
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_string(out, self.strip_fid(id.as_str()));
                }
                out.push(')');
            }
            Filter::Compare {
                op,
                left,
                right,
                match_case,
            } => {
                self.write_operand(out, left, !*match_case)?;
                let _ = write!(out, " {} ", op);
                self.write_operand(out, right, !*match_case)?;
            }
            Filter::Between { expr, lower, upper } => {
                self.write_expr(out, expr)?;
                out.push_str(" BETWEEN ");
                self.write_expr(out, lower)?;
                out.push_str(" AND ");
                self.write_expr(out, upper)?;
            }
            Filter::Like { expr, pattern } => {
                let mut escaped = false;
                let mut sql_pattern = String::new();
                for token in pattern.tokens()? {
                    match token {
                        LikeToken::AnyRun => sql_pattern.push('%'),
                        LikeToken::AnyChar => sql_pattern.push('_'),
                        LikeToken::Literal(c) => {
                            if c == '%' || c == '_' || c == LIKE_ESCAPE {
                                sql_pattern.push(LIKE_ESCAPE);
                                escaped = true;
                            }
                            sql_pattern.push(c);
                        }
                    }
                }
                let upper = !pattern.is_match_case();
                self.write_operand(out, expr, upper)?;
                out.push_str(" LIKE ");
                if upper {
                    out.push_str("UPPER(");
                    write_string(out, &sql_pattern);
                    out.push(')');
                } else {
                    write_string(out, &sql_pattern);
                }
                if escaped {
                    out.push_str(" ESCAPE ");
                    write_string(out, "\\");
                }
            }
            Filter::IsNull(expr) => {
                self.write_expr(out, expr)?;
                out.push_str(" IS NULL");
            }
            Filter::Spatial { op, .. } => {
                return Err(FilterError::unsupported(format!("spatial operator {}", op)))
            }
            Filter::Distance { op, .. } => {
                return Err(FilterError::unsupported(format!("distance operator {}", op)))
            }
        }
        Ok(())
    }

    fn write_joined(&self, out: &mut String, children: &[Filter], sep: &str) -> Result<()> {
        out.push('(');
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                out.push_str(sep);
            }
            self.write_filter(out, child)?;
        }
        out.push(')');
        Ok(())
    }

    fn write_operand(&self, out: &mut String, expr: &Expr, upper: bool) -> Result<()> {
        if upper {
            out.push_str("UPPER(");
            self.write_expr(out, expr)?;
            out.push(')');
            Ok(())
        } else {
            self.write_expr(out, expr)
        }
    }

    fn write_expr(&self, out: &mut String, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Property(name) => write_identifier(out, name),
            Expr::Literal(value) => write_literal(out, value)?,
            Expr::Arithmetic { op, left, right } => {
                out.push('(');
                self.write_expr(out, left)?;
                let _ = write!(out, " {} ", op);
                self.write_expr(out, right)?;
                out.push(')');
            }
        }
        Ok(())
    }

    fn strip_fid<'a>(&self, id: &'a str) -> &'a str {
        match &self.fid_prefix {
            Some(prefix) => id.strip_prefix(prefix.as_str()).unwrap_or(id),
            None => id,
        }
    }
}

fn write_identifier(out: &mut String, name: &str) {
    out.push('"');
    out.push_str(&name.replace('"', "\"\""));
    out.push('"');
}

fn write_string(out: &mut String, value: &str) {
    out.push('\'');
    out.push_str(&value.replace('\'', "''"));
    out.push('\'');
}

fn write_literal(out: &mut String, value: &AttributeValue) -> Result<()> {
    match value {
        AttributeValue::Null => out.push_str("NULL"),
        AttributeValue::Boolean(true) => out.push_str("TRUE"),
        AttributeValue::Boolean(false) => out.push_str("FALSE"),
        AttributeValue::Long(v) => {
            let _ = write!(out, "{}", v);
        }
        AttributeValue::Double(v) if v.is_finite() => {
            let _ = write!(out, "{:?}", v);
        }
        AttributeValue::Double(v) => {
            return Err(FilterError::unsupported(format!("non-finite literal {}", v)))
        }
        AttributeValue::String(s) => write_string(out, s),
        AttributeValue::Geometry(_) => {
            return Err(FilterError::unsupported("geometry literal"))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{literal, property, ArithmeticOp, CompareOp, LikePattern, SpatialOp};
    use geostore_core::Envelope;

    #[test]
    fn test_constants_and_logic() {
        let enc = SqlEncoder::new();
        assert_eq!(enc.encode(&Filter::Include).unwrap(), "1 = 1");
        assert_eq!(enc.encode(&Filter::Exclude).unwrap(), "0 = 1");
        let f = Filter::or(vec![
            Filter::equals(property("name"), literal("O'Hare")),
            Filter::negate(Filter::is_null(property("speed"))),
        ]);
        assert_eq!(
            enc.encode(&f).unwrap(),
            r#"("name" = 'O''Hare' OR NOT ("speed" IS NULL))"#
        );
    }

    #[test]
    fn test_literals() {
        let enc = SqlEncoder::new();
        let f = Filter::and(vec![
            Filter::greater_than(property("speed"), literal(50)),
            Filter::less_than(property("width"), literal(7.5)),
            Filter::equals(property("paved"), literal(true)),
            Filter::between(property("lanes"), literal(1), literal(4.0)),
        ]);
        assert_eq!(
            enc.encode(&f).unwrap(),
            r#"("speed" > 50 AND "width" < 7.5 AND "paved" = TRUE AND "lanes" BETWEEN 1 AND 4.0)"#
        );
    }

    #[test]
    fn test_ids_with_prefix() {
        let enc = SqlEncoder::new()
            .with_fid_column("road_id")
            .with_fid_prefix("roads.");
        assert_eq!(
            enc.encode(&Filter::fids(["roads.12", "other.3"])).unwrap(),
            r#""road_id" IN ('12', 'other.3')"#
        );
    }

    #[test]
    fn test_case_insensitive() {
        let enc = SqlEncoder::new();
        let f = Filter::compare_ignore_case(CompareOp::Eq, property("name"), literal("main"));
        assert_eq!(enc.encode(&f).unwrap(), r#"UPPER("name") = UPPER('main')"#);

        let like = Filter::like_pattern(property("name"), LikePattern::new("ma%").match_case(false));
        assert_eq!(enc.encode(&like).unwrap(), r#"UPPER("name") LIKE UPPER('ma%')"#);
    }

    #[test]
    fn test_like_translation() {
        let enc = SqlEncoder::new();
        let f = Filter::like_pattern(
            property("code"),
            LikePattern::with_wildcards("A*_?", '*', '?', '!'),
        );
        assert_eq!(
            enc.encode(&f).unwrap(),
            r#""code" LIKE 'A%\__' ESCAPE '\'"#
        );
    }

    #[test]
    fn test_arithmetic() {
        let enc = SqlEncoder::new();
        let f = Filter::greater_than(
            Expr::arithmetic(ArithmeticOp::Mul, property("speed"), literal(2)),
            literal(100),
        );
        assert_eq!(enc.encode(&f).unwrap(), r#"("speed" * 2) > 100"#);
    }

    #[test]
    fn test_spatial_unsupported() {
        let enc = SqlEncoder::new();
        let f = Filter::bbox("geom", Envelope::new(0.0, 0.0, 1.0, 1.0));
        assert!(matches!(enc.encode(&f), Err(FilterError::Unsupported(_))));
        let f = Filter::spatial_wkt(SpatialOp::Within, "geom", "POINT(1 1)").unwrap();
        assert!(!enc.supports(&f));
    }

    #[test]
    fn test_split() {
        let enc = SqlEncoder::new();
        let attr = Filter::greater_than(property("speed"), literal(50));
        let bbox = Filter::bbox("geom", Envelope::new(0.0, 0.0, 1.0, 1.0));

        let (pre, post) = enc.split(&Filter::and(vec![attr.clone(), bbox.clone()]));
        assert_eq!(pre, attr);
        assert_eq!(post, bbox);

        let or = Filter::or(vec![attr.clone(), bbox.clone()]);
        let (pre, post) = enc.split(&or);
        assert_eq!(pre, Filter::Include);
        assert_eq!(post, or);

        let (pre, post) = enc.split(&attr);
        assert_eq!(pre, attr);
        assert_eq!(post, Filter::Include);
    }
}
