//! Fixtures for tests of SEER ingestion.
//!
//! - [`LineBuilder`] and [`line`] produce fixed-width input lines field by field.
//! - [`sample_lines`] is a small input mixing valid, blank, malformed, and unparseable lines.
//! - [`write_lines`] writes lines to a file, compressed by extension.
//! - [`ok_lines`] and [`FailingLines`] feed [`Pipeline::run_lines`](crate::Pipeline::run_lines).
//! - [`spill_files`] lists what a run left in a staging directory.
//!
//! ```
//! use seer_ingest::testing::LineBuilder;
//!
//! let line = LineBuilder::new().year(2011).age(50).population(123).build();
//! assert_eq!(line, "2011US01001 1025000000123");
//! ```

use crate::io::compression::auto_detect_writer;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Builds one input line. Defaults to a 2011 record for county 01001.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineBuilder {
    year: i16,
    state: String,
    state_fips: String,
    county_fips: String,
    race: u8,
    origin: u8,
    sex: u8,
    age: u8,
    population: i32,
}

impl Default for LineBuilder {
    fn default() -> Self {
        Self {
            year: 2011,
            state: "US".to_string(),
            state_fips: "01".to_string(),
            county_fips: "001".to_string(),
            race: 1,
            origin: 0,
            sex: 2,
            age: 50,
            population: 123,
        }
    }
}

impl LineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn year(mut self, year: i16) -> Self {
        self.year = year;
        self
    }

    /// Two-letter state abbreviation and its two-digit FIPS code.
    #[must_use]
    pub fn state(mut self, state: &str, fips: &str) -> Self {
        self.state = state.to_string();
        self.state_fips = fips.to_string();
        self
    }

    #[must_use]
    pub fn county(mut self, fips: &str) -> Self {
        self.county_fips = fips.to_string();
        self
    }

    #[must_use]
    pub const fn race(mut self, code: u8) -> Self {
        self.race = code;
        self
    }

    #[must_use]
    pub const fn origin(mut self, code: u8) -> Self {
        self.origin = code;
        self
    }

    #[must_use]
    pub const fn sex(mut self, code: u8) -> Self {
        self.sex = code;
        self
    }

    #[must_use]
    pub const fn age(mut self, age: u8) -> Self {
        self.age = age;
        self
    }

    #[must_use]
    pub const fn population(mut self, population: i32) -> Self {
        self.population = population;
        self
    }

    /// Render the line with an eight-digit population.
    #[must_use]
    pub fn build(&self) -> String {
        format!(
            "{:04}{}{}{} {}{}{}{:02}{:08}",
            self.year,
            self.state,
            self.state_fips,
            self.county_fips,
            self.race,
            self.origin,
            self.sex,
            self.age,
            self.population
        )
    }
}

/// Default line with the given year, age, and population.
#[must_use]
pub fn line(year: i16, age: u8, population: i32) -> String {
    LineBuilder::new()
        .year(year)
        .age(age)
        .population(population)
        .build()
}

/// Eight lines in this order:
///
/// | # | content | outcome |
/// |---|---------|---------|
/// | 0 | 2011 US/01001, race 1, sex 2, age 50, pop 123 | record |
/// | 1 | 2011 US/01003, race 2, sex 1, age 30, pop 456 | record |
/// | 2 | blank | ignored |
/// | 3 | 1985 line with a non-numeric origin | parse error |
/// | 4 | 2010 AL/01001, race 1, origin 1, age 85, pop 789 | record |
/// | 5 | a single token | malformed |
/// | 6 | 1985 CA/06037, race 3, sex 1, age 40, pop 1000 | record |
/// | 7 | 2011 CA/06037, race 4, origin 1, age 0, pop 2000 | record |
///
/// Five records (three from 2011), two skipped lines, one blank.
#[must_use]
pub fn sample_lines() -> Vec<String> {
    vec![
        LineBuilder::new().build(),
        LineBuilder::new()
            .county("003")
            .race(2)
            .sex(1)
            .age(30)
            .population(456)
            .build(),
        String::new(),
        "1985US01001 1XX5000005".to_string(),
        LineBuilder::new()
            .year(2010)
            .state("AL", "01")
            .origin(1)
            .age(85)
            .population(789)
            .build(),
        "2011US01001".to_string(),
        LineBuilder::new()
            .year(1985)
            .state("CA", "06")
            .county("037")
            .race(3)
            .sex(1)
            .age(40)
            .population(1000)
            .build(),
        LineBuilder::new()
            .state("CA", "06")
            .county("037")
            .race(4)
            .origin(1)
            .age(0)
            .population(2000)
            .build(),
    ]
}

/// Wrap lines as the infallible `io::Result` stream a line reader produces.
pub fn ok_lines<S: Into<String>>(
    lines: impl IntoIterator<Item = S>,
) -> impl Iterator<Item = io::Result<String>> {
    lines.into_iter().map(|l| Ok(l.into()))
}

/// Yields its lines, then one I/O error, then nothing.
#[derive(Debug)]
pub struct FailingLines {
    lines: std::vec::IntoIter<String>,
    failed: bool,
}

impl FailingLines {
    pub fn new<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        Self {
            lines: lines.into_iter().map(Into::into).collect::<Vec<_>>().into_iter(),
            failed: false,
        }
    }
}

impl Iterator for FailingLines {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(line) = self.lines.next() {
            return Some(Ok(line));
        }
        if self.failed {
            return None;
        }
        self.failed = true;
        Some(Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input truncated")))
    }
}

/// Write `lines` to `path`, one per line; `.gz`/`.zst` paths are compressed.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_lines<S: AsRef<str>>(
    path: impl AsRef<Path>,
    lines: impl IntoIterator<Item = S>,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut out = auto_detect_writer(file, path)?;
    for line in lines {
        writeln!(out, "{}", line.as_ref()).with_context(|| format!("write {}", path.display()))?;
    }
    out.flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

/// Sorted names of the files in `dir`; empty if `dir` does not exist.
///
/// # Errors
///
/// Returns an error if `dir` exists but cannot be listed.
pub fn spill_files(dir: impl AsRef<Path>) -> Result<Vec<String>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read_dir {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read_dir {}", dir.display()))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
