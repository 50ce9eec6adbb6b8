//! Typed columnar batches.
//!
//! A [`TypedBatch`] holds one chunk of decoded records column by column. Numeric fields
//! are stored as fixed-width vectors; the six low-cardinality string fields are
//! dictionary-encoded in a [`DictColumn`]. Batches are never mutated: filtering and
//! concatenation build new batches.

use crate::record::{Origin, Race, Record, Sex};
use std::collections::HashMap;
use std::fmt;

/// Columns of the SEER dataset, in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Year,
    State,
    StateFips,
    CountyFips,
    RaceCode,
    Race,
    OriginCode,
    Origin,
    SexCode,
    Sex,
    Age,
    Population,
}

impl Column {
    pub const ALL: [Column; 12] = [
        Column::Year,
        Column::State,
        Column::StateFips,
        Column::CountyFips,
        Column::RaceCode,
        Column::Race,
        Column::OriginCode,
        Column::Origin,
        Column::SexCode,
        Column::Sex,
        Column::Age,
        Column::Population,
    ];

    /// Canonical column name, as used in exports and Parquet artifacts.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Year => "Year",
            Self::State => "State",
            Self::StateFips => "StateFIPS",
            Self::CountyFips => "CountyFIPS",
            Self::RaceCode => "RaceCode",
            Self::Race => "Race",
            Self::OriginCode => "OriginCode",
            Self::Origin => "Origin",
            Self::SexCode => "SexCode",
            Self::Sex => "Sex",
            Self::Age => "Age",
            Self::Population => "Population",
        }
    }

    /// Look a column up by name, ignoring ASCII case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name.trim()))
    }

    #[must_use]
    pub const fn data_type(self) -> ColumnType {
        match self {
            Self::Year => ColumnType::Int16,
            Self::RaceCode | Self::OriginCode | Self::SexCode | Self::Age => ColumnType::UInt8,
            Self::Population => ColumnType::Int32,
            Self::State
            | Self::StateFips
            | Self::CountyFips
            | Self::Race
            | Self::Origin
            | Self::Sex => ColumnType::Dictionary,
        }
    }

    #[must_use]
    pub const fn is_categorical(self) -> bool {
        matches!(self.data_type(), ColumnType::Dictionary)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Physical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int16,
    UInt8,
    Int32,
    /// UTF-8 strings stored as `u32` codes into a per-column dictionary.
    Dictionary,
}

/// One schema entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    pub column: Column,
    pub data_type: ColumnType,
}

impl Field {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.column.name()
    }
}

/// The fixed schema every batch and dataset carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    fields: &'static [Field],
}

const FIELDS: [Field; 12] = {
    let mut fields = [Field {
        column: Column::Year,
        data_type: ColumnType::Int16,
    }; 12];
    let mut i = 0;
    while i < fields.len() {
        let column = Column::ALL[i];
        fields[i] = Field {
            column,
            data_type: column.data_type(),
        };
        i += 1;
    }
    fields
};

/// Schema of SEER population datasets.
pub const SCHEMA: Schema = Schema { fields: &FIELDS };

impl Schema {
    #[must_use]
    pub const fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// Column names in declared order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.fields.iter().map(Field::name).collect()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Dictionary-encoded string column.
///
/// Dictionary entries are kept in first-seen order; codes index into them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DictColumn {
    codes: Vec<u32>,
    values: Vec<String>,
}

impl DictColumn {
    /// Encode a sequence of strings.
    pub fn encode<'a>(items: impl IntoIterator<Item = &'a str>) -> Self {
        let mut lookup: HashMap<&'a str, u32> = HashMap::new();
        let mut values = Vec::new();
        let codes = items
            .into_iter()
            .map(|item| {
                *lookup.entry(item).or_insert_with(|| {
                    values.push(item.to_string());
                    dictionary_code(values.len() - 1)
                })
            })
            .collect();
        Self { codes, values }
    }

    /// Assemble a column from raw codes and dictionary.
    ///
    /// # Errors
    ///
    /// Returns an error message if any code does not index into `values`.
    pub fn from_parts(codes: Vec<u32>, values: Vec<String>) -> Result<Self, String> {
        if let Some(bad) = codes.iter().find(|&&c| c as usize >= values.len()) {
            return Err(format!(
                "dictionary code {bad} out of range for {} entries",
                values.len()
            ));
        }
        Ok(Self { codes, values })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    #[must_use]
    pub fn codes(&self) -> &[u32] {
        &self.codes
    }

    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Decoded string at `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    #[must_use]
    pub fn get(&self, row: usize) -> &str {
        &self.values[self.codes[row] as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.codes.iter().map(|&c| self.values[c as usize].as_str())
    }

    /// Keep rows whose mask entry is `true`. The dictionary is carried over unchanged.
    #[must_use]
    pub fn select(&self, mask: &[bool]) -> Self {
        Self {
            codes: keep(&self.codes, mask),
            values: self.values.clone(),
        }
    }

    /// Concatenate columns, unifying their dictionaries and remapping codes.
    #[must_use]
    pub fn concat<'a>(parts: impl IntoIterator<Item = &'a DictColumn>) -> Self {
        let mut lookup: HashMap<String, u32> = HashMap::new();
        let mut out = Self::default();
        for part in parts {
            let remap: Vec<u32> = part
                .values
                .iter()
                .map(|v| {
                    if let Some(&code) = lookup.get(v) {
                        return code;
                    }
                    let code = dictionary_code(out.values.len());
                    out.values.push(v.clone());
                    lookup.insert(v.clone(), code);
                    code
                })
                .collect();
            out.codes
                .extend(part.codes.iter().map(|&c| remap[c as usize]));
        }
        out
    }
}

#[allow(clippy::cast_possible_truncation)]
fn dictionary_code(index: usize) -> u32 {
    // Dictionaries hold at most one entry per row and batches are far below u32::MAX rows.
    index as u32
}

fn keep<T: Copy>(values: &[T], mask: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(mask)
        .filter_map(|(&v, &k)| k.then_some(v))
        .collect()
}

/// Columnar, strongly-typed batch of SEER records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypedBatch {
    pub(crate) year: Vec<i16>,
    pub(crate) state: DictColumn,
    pub(crate) state_fips: DictColumn,
    pub(crate) county_fips: DictColumn,
    pub(crate) race_code: Vec<u8>,
    pub(crate) race: DictColumn,
    pub(crate) origin_code: Vec<u8>,
    pub(crate) origin: DictColumn,
    pub(crate) sex_code: Vec<u8>,
    pub(crate) sex: DictColumn,
    pub(crate) age: Vec<u8>,
    pub(crate) population: Vec<i32>,
}

impl TypedBatch {
    /// A batch with the declared schema and no rows.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Cast decoded records into columnar form.
    #[must_use]
    pub fn cast(records: &[Record]) -> Self {
        Self {
            year: records.iter().map(|r| r.year).collect(),
            state: DictColumn::encode(records.iter().map(|r| r.state.as_str())),
            state_fips: DictColumn::encode(records.iter().map(|r| r.state_fips.as_str())),
            county_fips: DictColumn::encode(records.iter().map(|r| r.county_fips.as_str())),
            race_code: records.iter().map(|r| r.race_code).collect(),
            race: DictColumn::encode(records.iter().map(|r| r.race.label())),
            origin_code: records.iter().map(|r| r.origin_code).collect(),
            origin: DictColumn::encode(records.iter().map(|r| r.origin.label())),
            sex_code: records.iter().map(|r| r.sex_code).collect(),
            sex: DictColumn::encode(records.iter().map(|r| r.sex.label())),
            age: records.iter().map(|r| r.age).collect(),
            population: records.iter().map(|r| r.population).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.year.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.year.is_empty()
    }

    #[must_use]
    pub const fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    #[must_use]
    pub fn years(&self) -> &[i16] {
        &self.year
    }

    #[must_use]
    pub fn race_codes(&self) -> &[u8] {
        &self.race_code
    }

    #[must_use]
    pub fn origin_codes(&self) -> &[u8] {
        &self.origin_code
    }

    #[must_use]
    pub fn sex_codes(&self) -> &[u8] {
        &self.sex_code
    }

    #[must_use]
    pub fn ages(&self) -> &[u8] {
        &self.age
    }

    #[must_use]
    pub fn populations(&self) -> &[i32] {
        &self.population
    }

    /// Dictionary column for a categorical `column`; `None` for numeric columns.
    #[must_use]
    pub const fn dictionary(&self, column: Column) -> Option<&DictColumn> {
        match column {
            Column::State => Some(&self.state),
            Column::StateFips => Some(&self.state_fips),
            Column::CountyFips => Some(&self.county_fips),
            Column::Race => Some(&self.race),
            Column::Origin => Some(&self.origin),
            Column::Sex => Some(&self.sex),
            _ => None,
        }
    }

    /// Integer value of a numeric `column` at `row`; `None` for categorical columns.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    #[must_use]
    pub fn integer(&self, column: Column, row: usize) -> Option<i64> {
        let value = match column {
            Column::Year => i64::from(self.year[row]),
            Column::RaceCode => i64::from(self.race_code[row]),
            Column::OriginCode => i64::from(self.origin_code[row]),
            Column::SexCode => i64::from(self.sex_code[row]),
            Column::Age => i64::from(self.age[row]),
            Column::Population => i64::from(self.population[row]),
            _ => return None,
        };
        Some(value)
    }

    /// Text rendering of one cell, as used in reports.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    #[must_use]
    pub fn format_cell(&self, column: Column, row: usize) -> String {
        match self.dictionary(column) {
            Some(dict) => dict.get(row).to_string(),
            None => self
                .integer(column, row)
                .map(|v| v.to_string())
                .unwrap_or_default(),
        }
    }

    /// Rebuild the record at `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    #[must_use]
    pub fn row(&self, row: usize) -> Record {
        Record {
            year: self.year[row],
            state: self.state.get(row).to_string(),
            state_fips: self.state_fips.get(row).to_string(),
            county_fips: self.county_fips.get(row).to_string(),
            race_code: self.race_code[row],
            race: Race::from_label(self.race.get(row)).unwrap_or(Race::Unknown),
            origin_code: self.origin_code[row],
            origin: Origin::from_label(self.origin.get(row)).unwrap_or(Origin::Unknown),
            sex_code: self.sex_code[row],
            sex: Sex::from_label(self.sex.get(row)).unwrap_or(Sex::Unknown),
            age: self.age[row],
            population: self.population[row],
        }
    }

    /// Rows in order, rebuilt as records.
    pub fn rows(&self) -> impl Iterator<Item = Record> + '_ {
        (0..self.len()).map(|i| self.row(i))
    }

    /// Keep rows whose mask entry is `true`, preserving their order.
    #[must_use]
    pub fn select(&self, mask: &[bool]) -> Self {
        debug_assert_eq!(mask.len(), self.len(), "mask length must match batch length");
        Self {
            year: keep(&self.year, mask),
            state: self.state.select(mask),
            state_fips: self.state_fips.select(mask),
            county_fips: self.county_fips.select(mask),
            race_code: keep(&self.race_code, mask),
            race: self.race.select(mask),
            origin_code: keep(&self.origin_code, mask),
            origin: self.origin.select(mask),
            sex_code: keep(&self.sex_code, mask),
            sex: self.sex.select(mask),
            age: keep(&self.age, mask),
            population: keep(&self.population, mask),
        }
    }

    /// Concatenate batches in the given order.
    #[must_use]
    pub fn concat(batches: &[TypedBatch]) -> Self {
        match batches {
            [] => Self::empty(),
            [only] => only.clone(),
            _ => Self {
                year: batches.iter().flat_map(|b| b.year.iter().copied()).collect(),
                state: DictColumn::concat(batches.iter().map(|b| &b.state)),
                state_fips: DictColumn::concat(batches.iter().map(|b| &b.state_fips)),
                county_fips: DictColumn::concat(batches.iter().map(|b| &b.county_fips)),
                race_code: batches.iter().flat_map(|b| b.race_code.iter().copied()).collect(),
                race: DictColumn::concat(batches.iter().map(|b| &b.race)),
                origin_code: batches.iter().flat_map(|b| b.origin_code.iter().copied()).collect(),
                origin: DictColumn::concat(batches.iter().map(|b| &b.origin)),
                sex_code: batches.iter().flat_map(|b| b.sex_code.iter().copied()).collect(),
                sex: DictColumn::concat(batches.iter().map(|b| &b.sex)),
                age: batches.iter().flat_map(|b| b.age.iter().copied()).collect(),
                population: batches.iter().flat_map(|b| b.population.iter().copied()).collect(),
            },
        }
    }

    /// Check that every column has the same number of rows.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first column whose length differs from `Year`.
    pub(crate) fn check_lengths(&self) -> Result<(), String> {
        let expected = self.len();
        let lengths = [
            (Column::State, self.state.len()),
            (Column::StateFips, self.state_fips.len()),
            (Column::CountyFips, self.county_fips.len()),
            (Column::RaceCode, self.race_code.len()),
            (Column::Race, self.race.len()),
            (Column::OriginCode, self.origin_code.len()),
            (Column::Origin, self.origin.len()),
            (Column::SexCode, self.sex_code.len()),
            (Column::Sex, self.sex.len()),
            (Column::Age, self.age.len()),
            (Column::Population, self.population.len()),
        ];
        match lengths.iter().find(|(_, len)| *len != expected) {
            Some((column, len)) => Err(format!(
                "column {column} has {len} rows, expected {expected}"
            )),
            None => Ok(()),
        }
    }
}
