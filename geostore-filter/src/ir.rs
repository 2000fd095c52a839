//! Filter expression tree.
//!
//! A [`Filter`] is a boolean predicate over a [`Feature`](geostore_core::Feature);
//! an [`Expr`] computes a value from one. Trees are immutable and are combined
//! through the simplifying builders [`Filter::and`], [`Filter::or`] and
//! [`Filter::negate`], which flatten nested combinators and fold constant
//! children:
//!
//! - `AND` drops `Include` children and collapses to `Exclude` on any `Exclude`
//! - `OR` drops `Exclude` children and collapses to `Include` on any `Include`
//! - `NOT` folds `Include`/`Exclude` and removes double negation
//!
//! [`Filter::simplify`] applies the same rules bottom-up to a hand-built tree.

use crate::error::{FilterError, Result};
use geostore_core::{parse_wkt, AttributeValue, Envelope, FeatureId};
use geo_types::Geometry;
use once_cell::sync::OnceCell;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Equal to (=)
    Eq,
    /// Not equal to (!=)
    NotEq,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    LtEq,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    GtEq,
}

impl CompareOp {
    /// Get the negation of this operator.
    pub fn negate(&self) -> Self {
        match self {
            Self::Eq => Self::NotEq,
            Self::NotEq => Self::Eq,
            Self::Lt => Self::GtEq,
            Self::LtEq => Self::Gt,
            Self::Gt => Self::LtEq,
            Self::GtEq => Self::Lt,
        }
    }

    /// Operator with its operands swapped (`a < b` == `b > a`).
    pub fn flip(&self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::NotEq => Self::NotEq,
            Self::Lt => Self::Gt,
            Self::LtEq => Self::GtEq,
            Self::Gt => Self::Lt,
            Self::GtEq => Self::LtEq,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::NotEq => write!(f, "<>"),
            Self::Lt => write!(f, "<"),
            Self::LtEq => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::GtEq => write!(f, ">="),
        }
    }
}

/// Binary spatial operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialOp {
    /// Envelopes intersect
    BBox,
    Intersects,
    Disjoint,
    Contains,
    Within,
    Crosses,
    Overlaps,
    Touches,
    Equals,
}

impl SpatialOp {
    /// True if every match of this operator has an envelope intersecting the
    /// literal's envelope, so a bounding-box index lookup finds all candidates.
    pub fn is_index_compatible(&self) -> bool {
        !matches!(self, SpatialOp::Disjoint)
    }

    /// Operator with its operands swapped.
    pub fn flip(&self) -> Self {
        match self {
            SpatialOp::Contains => SpatialOp::Within,
            SpatialOp::Within => SpatialOp::Contains,
            other => *other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SpatialOp::BBox => "BBOX",
            SpatialOp::Intersects => "INTERSECTS",
            SpatialOp::Disjoint => "DISJOINT",
            SpatialOp::Contains => "CONTAINS",
            SpatialOp::Within => "WITHIN",
            SpatialOp::Crosses => "CROSSES",
            SpatialOp::Overlaps => "OVERLAPS",
            SpatialOp::Touches => "TOUCHES",
            SpatialOp::Equals => "EQUALS",
        }
    }
}

impl fmt::Display for SpatialOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Distance operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceOp {
    /// Within the given distance (inclusive)
    DWithin,
    /// Strictly beyond the given distance
    Beyond,
}

impl fmt::Display for DistanceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceOp::DWithin => write!(f, "DWITHIN"),
            DistanceOp::Beyond => write!(f, "BEYOND"),
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithmeticOp::Add => write!(f, "+"),
            ArithmeticOp::Sub => write!(f, "-"),
            ArithmeticOp::Mul => write!(f, "*"),
            ArithmeticOp::Div => write!(f, "/"),
        }
    }
}

/// Value expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Attribute of the evaluated feature, by name
    Property(Arc<str>),
    /// Constant value
    Literal(AttributeValue),
    /// Numeric arithmetic
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn arithmetic(op: ArithmeticOp, left: Expr, right: Expr) -> Self {
        Expr::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Property name, if this is a property reference.
    pub fn as_property(&self) -> Option<&str> {
        match self {
            Expr::Property(name) => Some(name),
            _ => None,
        }
    }

    /// Literal value, if this is a constant.
    pub fn as_literal(&self) -> Option<&AttributeValue> {
        match self {
            Expr::Literal(value) => Some(value),
            _ => None,
        }
    }

    fn collect_properties<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Property(name) => names.push(name),
            Expr::Literal(_) => {}
            Expr::Arithmetic { left, right, .. } => {
                left.collect_properties(names);
                right.collect_properties(names);
            }
        }
    }
}

/// Property reference expression.
pub fn property(name: impl AsRef<str>) -> Expr {
    Expr::Property(Arc::from(name.as_ref()))
}

/// Literal expression.
pub fn literal(value: impl Into<AttributeValue>) -> Expr {
    Expr::Literal(value.into())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Property(name) => write!(f, "{}", name),
            Expr::Literal(AttributeValue::String(s)) => write!(f, "'{}'", s.replace('\'', "''")),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Arithmetic { op, left, right } => write!(f, "({} {} {})", left, op, right),
        }
    }
}

/// One element of a parsed LIKE pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeToken {
    /// Any run of characters, including none
    AnyRun,
    /// Exactly one character
    AnyChar,
    Literal(char),
}

/// LIKE pattern with configurable wildcard characters.
///
/// The compiled regex is cached on first use and shared by clones made after
/// that point.
#[derive(Debug, Clone)]
pub struct LikePattern {
    pattern: String,
    wildcard: char,
    single_char: char,
    escape: char,
    match_case: bool,
    compiled: OnceCell<Regex>,
}

impl LikePattern {
    /// Pattern using `%`, `_` and `\` as wildcard, single-char and escape.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self::with_wildcards(pattern, '%', '_', '\\')
    }

    pub fn with_wildcards(
        pattern: impl Into<String>,
        wildcard: char,
        single_char: char,
        escape: char,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            wildcard,
            single_char,
            escape,
            match_case: true,
            compiled: OnceCell::new(),
        }
    }

    pub fn match_case(mut self, match_case: bool) -> Self {
        self.match_case = match_case;
        self.compiled = OnceCell::new();
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn wildcard(&self) -> char {
        self.wildcard
    }

    pub fn single_char(&self) -> char {
        self.single_char
    }

    pub fn escape(&self) -> char {
        self.escape
    }

    pub fn is_match_case(&self) -> bool {
        self.match_case
    }

    /// Parse the pattern. A trailing escape character is an error.
    pub fn tokens(&self) -> Result<Vec<LikeToken>> {
        let mut tokens = Vec::with_capacity(self.pattern.len());
        let mut chars = self.pattern.chars();
        while let Some(ch) = chars.next() {
            if ch == self.escape {
                match chars.next() {
                    Some(escaped) => tokens.push(LikeToken::Literal(escaped)),
                    None => {
                        return Err(FilterError::invalid_pattern(format!(
                            "'{}' ends with the escape character",
                            self.pattern
                        )))
                    }
                }
            } else if ch == self.wildcard {
                tokens.push(LikeToken::AnyRun);
            } else if ch == self.single_char {
                tokens.push(LikeToken::AnyChar);
            } else {
                tokens.push(LikeToken::Literal(ch));
            }
        }
        Ok(tokens)
    }

    /// Anchored regex equivalent of the pattern, compiled once.
    pub fn regex(&self) -> Result<&Regex> {
        self.compiled.get_or_try_init(|| {
            let mut re = String::from(if self.match_case { "(?s)^" } else { "(?is)^" });
            let mut buf = [0u8; 4];
            for token in self.tokens()? {
                match token {
                    LikeToken::AnyRun => re.push_str(".*"),
                    LikeToken::AnyChar => re.push('.'),
                    LikeToken::Literal(c) => re.push_str(&regex::escape(c.encode_utf8(&mut buf))),
                }
            }
            re.push('$');
            Regex::new(&re).map_err(|e| FilterError::invalid_pattern(e.to_string()))
        })
    }

    pub fn is_match(&self, text: &str) -> Result<bool> {
        Ok(self.regex()?.is_match(text))
    }
}

impl PartialEq for LikePattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
            && self.wildcard == other.wildcard
            && self.single_char == other.single_char
            && self.escape == other.escape
            && self.match_case == other.match_case
    }
}

/// Boolean predicate over a feature.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every feature
    Include,
    /// Matches no feature
    Exclude,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// Feature id is one of the listed ids
    Id(Vec<FeatureId>),
    Compare {
        op: CompareOp,
        left: Expr,
        right: Expr,
        /// String comparisons are case-sensitive when true
        match_case: bool,
    },
    /// `lower <= expr <= upper`
    Between {
        expr: Expr,
        lower: Expr,
        upper: Expr,
    },
    Like {
        expr: Expr,
        pattern: LikePattern,
    },
    IsNull(Expr),
    Spatial {
        op: SpatialOp,
        left: Expr,
        right: Expr,
    },
    Distance {
        op: DistanceOp,
        left: Expr,
        right: Expr,
        distance: f64,
    },
}

impl Filter {
    /// Create a logical AND of filters.
    pub fn and(filters: Vec<Filter>) -> Self {
        // Flatten nested ANDs and filter out Include
        let mut flattened = Vec::new();
        for filter in filters {
            match filter {
                Filter::Include => continue,
                Filter::Exclude => return Filter::Exclude,
                Filter::And(inner) => flattened.extend(inner),
                other => flattened.push(other),
            }
        }

        match flattened.len() {
            0 => Filter::Include,
            1 => flattened.pop().unwrap_or(Filter::Include),
            _ => Filter::And(flattened),
        }
    }

    /// Create a logical OR of filters.
    pub fn or(filters: Vec<Filter>) -> Self {
        // Flatten nested ORs and filter out Exclude
        let mut flattened = Vec::new();
        for filter in filters {
            match filter {
                Filter::Exclude => continue,
                Filter::Include => return Filter::Include,
                Filter::Or(inner) => flattened.extend(inner),
                other => flattened.push(other),
            }
        }

        match flattened.len() {
            0 => Filter::Exclude,
            1 => flattened.pop().unwrap_or(Filter::Exclude),
            _ => Filter::Or(flattened),
        }
    }

    /// Create a logical NOT.
    pub fn negate(filter: Filter) -> Self {
        match filter {
            Filter::Include => Filter::Exclude,
            Filter::Exclude => Filter::Include,
            Filter::Not(inner) => *inner,
            other => Filter::Not(Box::new(other)),
        }
    }

    /// Identifier filter. Duplicate ids are dropped, keeping first-seen
    /// order; an empty set matches nothing.
    pub fn fids<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FeatureId>,
    {
        let mut seen = FxHashSet::default();
        let ids: Vec<FeatureId> = ids
            .into_iter()
            .map(Into::into)
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if ids.is_empty() {
            Filter::Exclude
        } else {
            Filter::Id(ids)
        }
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Filter::Compare {
            op,
            left,
            right,
            match_case: true,
        }
    }

    /// Comparison where string operands compare case-insensitively.
    pub fn compare_ignore_case(op: CompareOp, left: Expr, right: Expr) -> Self {
        Filter::Compare {
            op,
            left,
            right,
            match_case: false,
        }
    }

    pub fn equals(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Eq, left, right)
    }

    pub fn not_equals(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::NotEq, left, right)
    }

    pub fn less_than(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Lt, left, right)
    }

    pub fn less_or_equal(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::LtEq, left, right)
    }

    pub fn greater_than(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Gt, left, right)
    }

    pub fn greater_or_equal(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::GtEq, left, right)
    }

    pub fn between(expr: Expr, lower: Expr, upper: Expr) -> Self {
        Filter::Between { expr, lower, upper }
    }

    /// LIKE with the default `%`, `_` and `\` pattern characters.
    pub fn like(expr: Expr, pattern: impl Into<String>) -> Self {
        Filter::Like {
            expr,
            pattern: LikePattern::new(pattern),
        }
    }

    pub fn like_pattern(expr: Expr, pattern: LikePattern) -> Self {
        Filter::Like { expr, pattern }
    }

    pub fn is_null(expr: Expr) -> Self {
        Filter::IsNull(expr)
    }

    /// Bounding-box filter on a geometry property. An empty envelope matches
    /// nothing.
    pub fn bbox(property_name: impl AsRef<str>, envelope: Envelope) -> Self {
        match envelope.to_polygon() {
            Some(polygon) => Filter::Spatial {
                op: SpatialOp::BBox,
                left: property(property_name),
                right: literal(Geometry::Polygon(polygon)),
            },
            None => Filter::Exclude,
        }
    }

    pub fn spatial(op: SpatialOp, property_name: impl AsRef<str>, geometry: Geometry<f64>) -> Self {
        Filter::Spatial {
            op,
            left: property(property_name),
            right: literal(geometry),
        }
    }

    /// Spatial filter against a WKT literal.
    pub fn spatial_wkt(op: SpatialOp, property_name: impl AsRef<str>, wkt: &str) -> Result<Self> {
        let geometry = parse_wkt(wkt).map_err(|e| FilterError::InvalidGeometry(e.to_string()))?;
        Ok(Self::spatial(op, property_name, geometry))
    }

    pub fn dwithin(property_name: impl AsRef<str>, geometry: Geometry<f64>, distance: f64) -> Self {
        Filter::Distance {
            op: DistanceOp::DWithin,
            left: property(property_name),
            right: literal(geometry),
            distance,
        }
    }

    pub fn beyond(property_name: impl AsRef<str>, geometry: Geometry<f64>, distance: f64) -> Self {
        Filter::Distance {
            op: DistanceOp::Beyond,
            left: property(property_name),
            right: literal(geometry),
            distance,
        }
    }

    /// Check if this filter matches everything.
    pub fn is_include(&self) -> bool {
        matches!(self, Filter::Include)
    }

    /// Check if this filter matches nothing.
    pub fn is_exclude(&self) -> bool {
        matches!(self, Filter::Exclude)
    }

    /// Re-apply the builder simplifications bottom-up.
    pub fn simplify(&self) -> Filter {
        match self {
            Filter::And(children) => Filter::and(children.iter().map(Filter::simplify).collect()),
            Filter::Or(children) => Filter::or(children.iter().map(Filter::simplify).collect()),
            Filter::Not(inner) => Filter::negate(inner.simplify()),
            Filter::Id(ids) => Filter::fids(ids.iter().cloned()),
            other => other.clone(),
        }
    }

    /// Get all property names referenced by this filter, sorted.
    pub fn referenced_properties(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_properties(&mut names);
        let mut names: Vec<String> = names.into_iter().map(str::to_owned).collect();
        names.sort();
        names.dedup();
        names
    }

    fn collect_properties<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Filter::Include | Filter::Exclude | Filter::Id(_) => {}
            Filter::Not(inner) => inner.collect_properties(names),
            Filter::And(filters) | Filter::Or(filters) => {
                for filter in filters {
                    filter.collect_properties(names);
                }
            }
            Filter::Compare { left, right, .. }
            | Filter::Spatial { left, right, .. }
            | Filter::Distance { left, right, .. } => {
                left.collect_properties(names);
                right.collect_properties(names);
            }
            Filter::Between { expr, lower, upper } => {
                expr.collect_properties(names);
                lower.collect_properties(names);
                upper.collect_properties(names);
            }
            Filter::Like { expr, .. } | Filter::IsNull(expr) => expr.collect_properties(names),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, filters: &[Filter], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", sep)?;
        }
        write!(f, "{}", filter)?;
    }
    write!(f, ")")
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Include => write!(f, "INCLUDE"),
            Filter::Exclude => write!(f, "EXCLUDE"),
            Filter::And(filters) => write_joined(f, filters, "AND"),
            Filter::Or(filters) => write_joined(f, filters, "OR"),
            Filter::Not(inner) => write!(f, "NOT ({})", inner),
            Filter::Id(ids) => {
                write!(f, "IN (")?;
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}'", id)?;
                }
                write!(f, ")")
            }
            Filter::Compare {
                op,
                left,
                right,
                match_case,
            } => {
                if *match_case {
                    write!(f, "{} {} {}", left, op, right)
                } else {
                    write!(f, "UPPER({}) {} UPPER({})", left, op, right)
                }
            }
            Filter::Between { expr, lower, upper } => {
                write!(f, "{} BETWEEN {} AND {}", expr, lower, upper)
            }
            Filter::Like { expr, pattern } => {
                let keyword = if pattern.is_match_case() { "LIKE" } else { "ILIKE" };
                write!(f, "{} {} '{}'", expr, keyword, pattern.pattern().replace('\'', "''"))
            }
            Filter::IsNull(expr) => write!(f, "{} IS NULL", expr),
            Filter::Spatial { op, left, right } => write!(f, "{}({}, {})", op, left, right),
            Filter::Distance {
                op,
                left,
                right,
                distance,
            } => write!(f, "{}({}, {}, {})", op, left, right, distance),
        }
    }
}
