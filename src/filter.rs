//! Row selection: the year filter applied while decoding, and boolean predicates applied
//! to typed batches.
//!
//! # Year filter
//!
//! [`YearFilter`] is a tagged variant with a single evaluation function,
//! [`YearFilter::admits`]. A one-element set behaves exactly like a single year.
//!
//! # Predicates
//!
//! A [`Predicate`] is a small expression tree over dataset columns. It can be built in
//! code:
//!
//! ```
//! use seer_ingest::batch::Column;
//! use seer_ingest::filter::col;
//!
//! let p = col(Column::Race).eq("White")
//!     .and(col(Column::Sex).eq("Female"))
//!     .and(col(Column::Age).between(50, 75));
//! # let _ = p;
//! ```
//!
//! or parsed from clauses such as `Race=White`, `Age=50..75`, `State=CA|NV`, or
//! `Population>=1000` (see [`Predicate::parse_clauses`]).
//!
//! Comparisons on categorical columns are resolved once per batch against the column
//! dictionary and then evaluated over the codes.

use crate::batch::{Column, DictColumn, TypedBatch};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which data years a run keeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum YearFilter {
    /// Every year is admitted.
    #[default]
    None,
    /// Only this year is admitted.
    Single(i16),
    /// Only years in this set are admitted.
    Many(BTreeSet<i16>),
}

impl YearFilter {
    #[must_use]
    pub fn admits(&self, year: i16) -> bool {
        match self {
            Self::None => true,
            Self::Single(only) => *only == year,
            Self::Many(years) => years.contains(&year),
        }
    }

    /// Filter from a list of years: empty admits everything, one year is
    /// [`YearFilter::Single`], more is [`YearFilter::Many`].
    #[must_use]
    pub fn from_years(years: impl IntoIterator<Item = i16>) -> Self {
        let years: BTreeSet<i16> = years.into_iter().collect();
        match years.len() {
            0 => Self::None,
            1 => years.first().map_or(Self::None, |&y| Self::Single(y)),
            _ => Self::Many(years),
        }
    }
}

impl From<i16> for YearFilter {
    fn from(year: i16) -> Self {
        Self::Single(year)
    }
}

impl From<Option<i16>> for YearFilter {
    fn from(year: Option<i16>) -> Self {
        year.map_or(Self::None, Self::Single)
    }
}

impl From<BTreeSet<i16>> for YearFilter {
    fn from(years: BTreeSet<i16>) -> Self {
        Self::Many(years)
    }
}

impl From<Vec<i16>> for YearFilter {
    fn from(years: Vec<i16>) -> Self {
        Self::Many(years.into_iter().collect())
    }
}

impl FromIterator<i16> for YearFilter {
    /// Collect into [`YearFilter::Many`]; an empty iterator admits no year.
    fn from_iter<I: IntoIterator<Item = i16>>(iter: I) -> Self {
        Self::Many(iter.into_iter().collect())
    }
}

impl fmt::Display for YearFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("all years"),
            Self::Single(year) => write!(f, "{year}"),
            Self::Many(years) => {
                let years: Vec<String> = years.iter().map(ToString::to_string).collect();
                write!(f, "{{{}}}", years.join(", "))
            }
        }
    }
}

/// Literal compared against a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i64),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

macro_rules! int_value {
    ($($t:ty),+) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::Int(i64::from(v))
            }
        })+
    };
}

int_value!(u8, i16, i32, i64);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<crate::record::Race> for Value {
    fn from(v: crate::record::Race) -> Self {
        Self::Str(v.label().to_string())
    }
}

impl From<crate::record::Origin> for Value {
    fn from(v: crate::record::Origin) -> Self {
        Self::Str(v.label().to_string())
    }
}

impl From<crate::record::Sex> for Value {
    fn from(v: crate::record::Sex) -> Self {
        Self::Str(v.label().to_string())
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    const fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord.is_eq(),
            Self::Ne => ord.is_ne(),
            Self::Lt => ord.is_lt(),
            Self::Le => ord.is_le(),
            Self::Gt => ord.is_gt(),
            Self::Ge => ord.is_ge(),
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Boolean expression over the columns of a [`TypedBatch`].
///
/// Comparing a numeric column with a string literal, or a categorical column with an
/// integer literal, never matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every row.
    True,
    Compare {
        column: Column,
        op: CmpOp,
        value: Value,
    },
    /// Inclusive range.
    Between {
        column: Column,
        low: Value,
        high: Value,
    },
    In {
        column: Column,
        values: Vec<Value>,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

/// Start a predicate on `column`.
#[must_use]
pub const fn col(column: Column) -> ColumnRef {
    ColumnRef(column)
}

/// Builder handle returned by [`col`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRef(Column);

impl ColumnRef {
    fn compare(self, op: CmpOp, value: impl Into<Value>) -> Predicate {
        Predicate::Compare {
            column: self.0,
            op,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> Predicate {
        self.compare(CmpOp::Eq, value)
    }

    #[must_use]
    pub fn ne(self, value: impl Into<Value>) -> Predicate {
        self.compare(CmpOp::Ne, value)
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Predicate {
        self.compare(CmpOp::Lt, value)
    }

    #[must_use]
    pub fn le(self, value: impl Into<Value>) -> Predicate {
        self.compare(CmpOp::Le, value)
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Predicate {
        self.compare(CmpOp::Gt, value)
    }

    #[must_use]
    pub fn ge(self, value: impl Into<Value>) -> Predicate {
        self.compare(CmpOp::Ge, value)
    }

    #[must_use]
    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Predicate {
        Predicate::Between {
            column: self.0,
            low: low.into(),
            high: high.into(),
        }
    }

    #[must_use]
    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Predicate {
        Predicate::In {
            column: self.0,
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl Predicate {
    #[must_use]
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// Selection mask with one entry per row of `batch`.
    #[must_use]
    pub fn evaluate(&self, batch: &TypedBatch) -> Vec<bool> {
        match self {
            Self::True => vec![true; batch.len()],
            Self::Compare { column, op, value } => {
                column_mask(batch, *column, value, |v| match (v, value) {
                    (Cell::Int(x), Value::Int(y)) => op.holds(x.cmp(y)),
                    (Cell::Str(x), Value::Str(y)) => op.holds(x.cmp(y.as_str())),
                    _ => false,
                })
            }
            Self::Between { column, low, high } => {
                column_mask(batch, *column, low, |v| match (v, low, high) {
                    (Cell::Int(x), Value::Int(lo), Value::Int(hi)) => lo <= &x && &x <= hi,
                    (Cell::Str(x), Value::Str(lo), Value::Str(hi)) => {
                        lo.as_str() <= x && x <= hi.as_str()
                    }
                    _ => false,
                })
            }
            Self::In { column, values } => {
                let sample = values.first().cloned().unwrap_or(Value::Int(0));
                column_mask(batch, *column, &sample, |v| {
                    values.iter().any(|candidate| match (v, candidate) {
                        (Cell::Int(x), Value::Int(y)) => x == *y,
                        (Cell::Str(x), Value::Str(y)) => x == y.as_str(),
                        _ => false,
                    })
                })
            }
            Self::And(a, b) => zip_masks(a.evaluate(batch), &b.evaluate(batch), |x, y| x && y),
            Self::Or(a, b) => zip_masks(a.evaluate(batch), &b.evaluate(batch), |x, y| x || y),
            Self::Not(inner) => inner.evaluate(batch).into_iter().map(|k| !k).collect(),
        }
    }

    /// Parse clauses and AND them together. No clauses yields [`Predicate::True`].
    ///
    /// # Errors
    ///
    /// Returns the first clause that fails to parse.
    pub fn parse_clauses<S: AsRef<str>>(
        clauses: impl IntoIterator<Item = S>,
    ) -> Result<Predicate, PredicateParseError> {
        let mut parsed = clauses
            .into_iter()
            .map(|c| c.as_ref().parse::<Predicate>());
        let Some(first) = parsed.next() else {
            return Ok(Predicate::True);
        };
        parsed.try_fold(first?, |acc, next| Ok(acc.and(next?)))
    }
}

impl std::ops::Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("true"),
            Self::Compare { column, op, value } => write!(f, "{column}{}{value}", op.symbol()),
            Self::Between { column, low, high } => write!(f, "{column}={low}..{high}"),
            Self::In { column, values } => {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{column}={}", values.join("|"))
            }
            Self::And(a, b) => write!(f, "({a} AND {b})"),
            Self::Or(a, b) => write!(f, "({a} OR {b})"),
            Self::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

/// Borrowed cell value seen by a predicate.
#[derive(Clone, Copy)]
enum Cell<'a> {
    Int(i64),
    Str(&'a str),
}

/// Evaluate `test` over one column. Categorical columns are tested once per dictionary
/// entry; a literal of the wrong kind short-circuits to an all-false mask.
fn column_mask(
    batch: &TypedBatch,
    column: Column,
    literal: &Value,
    test: impl Fn(Cell<'_>) -> bool,
) -> Vec<bool> {
    let kind_matches = matches!(
        (column.is_categorical(), literal),
        (true, Value::Str(_)) | (false, Value::Int(_))
    );
    if !kind_matches {
        return vec![false; batch.len()];
    }
    match batch.dictionary(column) {
        Some(dict) => dictionary_mask(dict, |s| test(Cell::Str(s))),
        None => (0..batch.len())
            .map(|row| batch.integer(column, row).is_some_and(|v| test(Cell::Int(v))))
            .collect(),
    }
}

fn dictionary_mask(dict: &DictColumn, test: impl Fn(&str) -> bool) -> Vec<bool> {
    let matches: Vec<bool> = dict.values().iter().map(|v| test(v.as_str())).collect();
    dict.codes().iter().map(|&c| matches[c as usize]).collect()
}

fn zip_masks(mut left: Vec<bool>, right: &[bool], op: impl Fn(bool, bool) -> bool) -> Vec<bool> {
    for (l, &r) in left.iter_mut().zip(right) {
        *l = op(*l, r);
    }
    left
}

/// Apply an optional predicate to a batch.
///
/// Without a predicate the batch is returned as is. Rows that survive keep their order.
#[must_use]
pub fn apply(batch: TypedBatch, predicate: Option<&Predicate>) -> TypedBatch {
    let Some(predicate) = predicate else {
        return batch;
    };
    let mask = predicate.evaluate(&batch);
    if mask.iter().all(|&k| k) {
        batch
    } else {
        batch.select(&mask)
    }
}

/// A predicate clause that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateParseError {
    #[error("clause {0:?} has no comparison operator")]
    MissingOperator(String),
    #[error("unknown column {0:?}")]
    UnknownColumn(String),
    #[error("column {column} expects an integer, got {value:?}")]
    InvalidValue { column: Column, value: String },
    #[error("ranges and lists only combine with '=', in clause {0:?}")]
    UnsupportedForm(String),
}

impl FromStr for Predicate {
    type Err = PredicateParseError;

    /// Parse a single clause: `Name<op>Value`, `Name=lo..hi`, or `Name=a|b|c`.
    fn from_str(clause: &str) -> Result<Self, Self::Err> {
        let start = clause
            .find(['=', '!', '<', '>'])
            .ok_or_else(|| PredicateParseError::MissingOperator(clause.to_string()))?;
        let rest = &clause[start..];
        let (op, width) = [
            ("!=", CmpOp::Ne),
            ("<=", CmpOp::Le),
            (">=", CmpOp::Ge),
            ("=", CmpOp::Eq),
            ("<", CmpOp::Lt),
            (">", CmpOp::Gt),
        ]
        .into_iter()
        .find(|(sym, _)| rest.starts_with(sym))
        .map(|(sym, op)| (op, sym.len()))
        .ok_or_else(|| PredicateParseError::MissingOperator(clause.to_string()))?;

        let name = clause[..start].trim();
        let column = Column::from_name(name)
            .ok_or_else(|| PredicateParseError::UnknownColumn(name.to_string()))?;
        let text = rest[width..].trim();
        let literal = |s: &str| parse_value(column, s.trim());

        if let Some((low, high)) = text.split_once("..") {
            if op != CmpOp::Eq {
                return Err(PredicateParseError::UnsupportedForm(clause.to_string()));
            }
            return Ok(Predicate::Between {
                column,
                low: literal(low)?,
                high: literal(high)?,
            });
        }
        if text.contains('|') {
            if op != CmpOp::Eq {
                return Err(PredicateParseError::UnsupportedForm(clause.to_string()));
            }
            let values = text.split('|').map(literal).collect::<Result<Vec<_>, _>>()?;
            return Ok(Predicate::In { column, values });
        }
        Ok(Predicate::Compare {
            column,
            op,
            value: literal(text)?,
        })
    }
}

fn parse_value(column: Column, text: &str) -> Result<Value, PredicateParseError> {
    if column.is_categorical() {
        return Ok(Value::Str(text.to_string()));
    }
    text.parse::<i64>()
        .map(Value::Int)
        .map_err(|_| PredicateParseError::InvalidValue {
            column,
            value: text.to_string(),
        })
}
