//! Decoded SEER population rows and their coded vocabularies.
//!
//! SEER files store race, Hispanic origin, and sex as single digits. What a digit means
//! depends on the data year: files before 1990 use a three-category race coding and carry
//! no Hispanic origin, later files use the four-category "bridged" race coding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// First data year using the expanded race and Hispanic-origin vocabularies.
pub const EXPANDED_VOCABULARY_YEAR: i16 = 1990;

macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            /// Every label of this vocabulary, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Human-readable label, as stored in typed batches and exports.
            #[must_use]
            pub const fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            /// Inverse of [`label`](Self::label).
            #[must_use]
            pub fn from_label(label: &str) -> Option<Self> {
                match label {
                    $($label => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

vocabulary! {
    /// Race category.
    Race {
        White => "White",
        Black => "Black",
        Other => "Other",
        AmericanIndianAlaskaNative => "American Indian/Alaska Native",
        AsianPacificIslander => "Asian or Pacific Islander",
        Unknown => "Unknown",
    }
}

vocabulary! {
    /// Hispanic origin category.
    Origin {
        NonHispanic => "Non-Hispanic",
        Hispanic => "Hispanic",
        NotApplicable => "Not Applicable",
        Unknown => "Unknown",
    }
}

vocabulary! {
    /// Sex category.
    Sex {
        Male => "Male",
        Female => "Female",
        Unknown => "Unknown",
    }
}

impl Race {
    /// Resolve a race digit using the vocabulary in force for `year`.
    #[must_use]
    pub const fn from_code(year: i16, code: u8) -> Self {
        let expanded = year >= EXPANDED_VOCABULARY_YEAR;
        match (code, expanded) {
            (1, _) => Self::White,
            (2, _) => Self::Black,
            (3, false) => Self::Other,
            (3, true) => Self::AmericanIndianAlaskaNative,
            (4, true) => Self::AsianPacificIslander,
            _ => Self::Unknown,
        }
    }
}

impl Origin {
    /// Resolve an origin digit. Years before 1990 carry no origin information, so the
    /// digit is ignored and the result is always [`Origin::NotApplicable`].
    #[must_use]
    pub const fn from_code(year: i16, code: u8) -> Self {
        if year < EXPANDED_VOCABULARY_YEAR {
            return Self::NotApplicable;
        }
        match code {
            0 => Self::NonHispanic,
            1 => Self::Hispanic,
            9 => Self::NotApplicable,
            _ => Self::Unknown,
        }
    }
}

impl Sex {
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Male,
            2 => Self::Female,
            _ => Self::Unknown,
        }
    }
}

/// One decoded line of a SEER population file.
///
/// Field names serialize exactly as the dataset schema declares them, so a `Record`
/// written through `serde` (CSV export, JSON) carries the canonical column headers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Year")]
    pub year: i16,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "StateFIPS")]
    pub state_fips: String,
    #[serde(rename = "CountyFIPS")]
    pub county_fips: String,
    #[serde(rename = "RaceCode")]
    pub race_code: u8,
    #[serde(rename = "Race")]
    pub race: Race,
    #[serde(rename = "OriginCode")]
    pub origin_code: u8,
    #[serde(rename = "Origin")]
    pub origin: Origin,
    #[serde(rename = "SexCode")]
    pub sex_code: u8,
    #[serde(rename = "Sex")]
    pub sex: Sex,
    #[serde(rename = "Age")]
    pub age: u8,
    #[serde(rename = "Population")]
    pub population: i32,
}
