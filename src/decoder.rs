//! Fixed-width line decoding.
//!
//! A SEER line is two whitespace-separated tokens:
//!
//! | Token | Offset | Width | Field |
//! |---|---|---|---|
//! | 1 | 0 | 4 | `Year` |
//! | 1 | 4 | 2 | `State` |
//! | 1 | 6 | 2 | `StateFIPS` |
//! | 1 | 8 | 3 | `CountyFIPS` |
//! | 2 | 0 | 1 | `RaceCode` |
//! | 2 | 1 | 1 | `OriginCode` |
//! | 2 | 2 | 1 | `SexCode` |
//! | 2 | 3 | 2 | `Age` |
//! | 2 | 5 | rest | `Population` |
//!
//! [`decode`] is pure: it never logs and never panics on bad input. Every failure is a
//! [`SkipReason`] the caller counts before moving on to the next line.

use crate::filter::YearFilter;
use crate::record::{Origin, Race, Record, Sex};
use std::str::FromStr;
use thiserror::Error;

/// Width of the location token (`Year`, `State`, `StateFIPS`, `CountyFIPS`).
pub const LOCATION_WIDTH: usize = 11;

/// Shortest valid demographic token: three code digits, two age digits, one population digit.
pub const MIN_DEMOGRAPHIC_WIDTH: usize = 6;

/// Why a line did not produce a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    /// The line did not split into exactly two tokens.
    #[error("expected 2 whitespace-separated tokens, found {tokens}")]
    MalformedFormat { tokens: usize },
    /// A field was missing, non-numeric, or out of range for its type.
    #[error("{0}")]
    ParseError(String),
    /// The line is valid but its year is excluded by the year filter.
    #[error("year {year} excluded by filter")]
    FilteredOut { year: i16 },
}

/// Counting bucket of a [`SkipReason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipKind {
    Malformed,
    Parse,
    Filtered,
}

impl SkipReason {
    #[must_use]
    pub const fn kind(&self) -> SkipKind {
        match self {
            Self::MalformedFormat { .. } => SkipKind::Malformed,
            Self::ParseError(_) => SkipKind::Parse,
            Self::FilteredOut { .. } => SkipKind::Filtered,
        }
    }
}

/// Decode one line into a [`Record`].
///
/// The year is parsed and checked against `years` before any other field, so lines
/// outside the filter are reported as [`SkipReason::FilteredOut`] even when a later
/// field would not parse.
///
/// # Errors
///
/// Returns the [`SkipReason`] explaining why the line yields no record.
pub fn decode(line: &str, years: &YearFilter) -> Result<Record, SkipReason> {
    let mut tokens = line.split_whitespace();
    let (Some(location), Some(demographics), None) = (tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(SkipReason::MalformedFormat {
            tokens: line.split_whitespace().count(),
        });
    };

    let year: i16 = number("Year", slice("Year", location, 0, 4)?)?;
    if !years.admits(year) {
        return Err(SkipReason::FilteredOut { year });
    }

    if location.len() != LOCATION_WIDTH {
        return Err(SkipReason::ParseError(format!(
            "location token {location:?} has {} characters, expected {LOCATION_WIDTH}",
            location.len()
        )));
    }
    if demographics.len() < MIN_DEMOGRAPHIC_WIDTH {
        return Err(SkipReason::ParseError(format!(
            "demographic token {demographics:?} has {} characters, expected at least {MIN_DEMOGRAPHIC_WIDTH}",
            demographics.len()
        )));
    }

    let state = slice("State", location, 4, 6)?;
    let state_fips = slice("StateFIPS", location, 6, 8)?;
    let county_fips = slice("CountyFIPS", location, 8, LOCATION_WIDTH)?;

    let race_code: u8 = number("RaceCode", slice("RaceCode", demographics, 0, 1)?)?;
    let origin_code: u8 = number("OriginCode", slice("OriginCode", demographics, 1, 2)?)?;
    let sex_code: u8 = number("SexCode", slice("SexCode", demographics, 2, 3)?)?;
    let age: u8 = number("Age", slice("Age", demographics, 3, 5)?)?;
    let population: i32 = number("Population", slice("Population", demographics, 5, demographics.len())?)?;

    Ok(Record {
        year,
        state: state.to_string(),
        state_fips: state_fips.to_string(),
        county_fips: county_fips.to_string(),
        race_code,
        race: Race::from_code(year, race_code),
        origin_code,
        origin: Origin::from_code(year, origin_code),
        sex_code,
        sex: Sex::from_code(sex_code),
        age,
        population,
    })
}

/// Byte range `[start, end)` of `token`, rejecting short tokens and non-ASCII boundaries.
fn slice<'a>(field: &str, token: &'a str, start: usize, end: usize) -> Result<&'a str, SkipReason> {
    token.get(start..end).ok_or_else(|| {
        SkipReason::ParseError(format!(
            "{field}: characters {start}..{end} not available in {token:?}"
        ))
    })
}

/// Parse an unsigned run of ASCII digits.
fn number<T: FromStr>(field: &str, text: &str) -> Result<T, SkipReason> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SkipReason::ParseError(format!("{field}: {text:?} is not numeric")));
    }
    text.parse::<T>()
        .map_err(|_| SkipReason::ParseError(format!("{field}: {text:?} is out of range")))
}
