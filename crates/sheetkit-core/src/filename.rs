//! Spreadsheet file name parsing.
//!
//! Result sheets are named after the day they were recorded, e.g.
//! `2024-03-15-Regional.xlsx`, and tryout sheets carry a trailing round
//! identifier: `2024-03-15-tryout-R2.xlsx`. This module turns such names
//! into positional date tuples.
//!
//! Parsing is purely positional: the first three retained components are
//! taken literally as they appear, and the third one is assumed to start
//! with a two-digit year in the 2000s. No calendar validation is done.

use std::num::{IntErrorKind, ParseIntError};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Extension stripped from file names before splitting.
pub const SPREADSHEET_EXTENSION: &str = ".xlsx";

/// Marker used by [`reformat_file_name`] to detect tryout sheets.
pub const DEFAULT_TRYOUT_MARKER: &str = "tryout";

/// Century prefix prepended to the two-digit year component.
const CENTURY_PREFIX: &str = "20";

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[/\-\s]+").expect("Invalid separator regex"));

/// Errors raised while parsing a file name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FileNameError {
    /// Not enough components left to build a date.
    #[error("file name {file_name:?} has {found} date component(s), expected at least 3")]
    TooFewComponents {
        /// The raw file name.
        file_name: String,
        /// How many components remained after dropping the tryout suffix.
        found: usize,
    },

    /// A date component could not be read as an integer.
    #[error("date component {component:?} in {file_name:?} is not a number: {source}")]
    NotNumeric {
        /// The raw file name.
        file_name: String,
        /// The offending component.
        component: String,
        #[source]
        source: ParseIntError,
    },

    /// A date component is all digits but does not fit in an `i32`.
    #[error("date component {component:?} in {file_name:?} is out of range")]
    OutOfRange {
        file_name: String,
        component: String,
    },
}

/// Date components extracted from a file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileName {
    /// `(date[0], date[1], 20YY)` as integers.
    pub long_date: (i32, i32, i32),
    /// `(date[0], date[1], YY)` as they appear in the name.
    pub short_date: (String, String, String),
    /// Whether the name carries the tryout marker.
    pub is_tryout: bool,
}

/// Strips the spreadsheet extension and splits on runs of `/`, `-` or whitespace.
///
/// Order is preserved. A separator at either end yields an empty component,
/// same as any regex split.
pub fn split_name_components(file_name: &str) -> Vec<String> {
    let stem = file_name
        .strip_suffix(SPREADSHEET_EXTENSION)
        .unwrap_or(file_name);

    SEPARATORS.split(stem).map(str::to_string).collect()
}

/// Alias of [`split_name_components`].
pub fn file_name_split(file_name: &str) -> Vec<String> {
    split_name_components(file_name)
}

/// Parses a file name into long and short date tuples plus the tryout flag.
///
/// When the (case-insensitive) `tryout_marker` appears in the name, the last
/// component is a round identifier and is dropped before reading the date.
pub fn parse_date_and_kind(
    file_name: &str,
    tryout_marker: &str,
) -> Result<ParsedFileName, FileNameError> {
    let is_tryout = file_name
        .to_lowercase()
        .contains(&tryout_marker.to_lowercase());

    let mut components = split_name_components(file_name);
    if is_tryout {
        components.pop();
    }

    let [first, second, third, ..] = components.as_slice() else {
        return Err(FileNameError::TooFewComponents {
            file_name: file_name.to_string(),
            found: components.len(),
        });
    };

    let year_suffix: String = third.chars().take(2).collect();
    let full_year = format!("{CENTURY_PREFIX}{year_suffix}");

    let long_date = (
        parse_component(file_name, first)?,
        parse_component(file_name, second)?,
        parse_component(file_name, &full_year)?,
    );

    Ok(ParsedFileName {
        long_date,
        short_date: (first.clone(), second.clone(), year_suffix),
        is_tryout,
    })
}

/// Same as [`parse_date_and_kind`], with the marker defaulting to `"tryout"`.
pub fn reformat_file_name(
    file_name: &str,
    tryout_marker: Option<&str>,
) -> Result<ParsedFileName, FileNameError> {
    parse_date_and_kind(file_name, tryout_marker.unwrap_or(DEFAULT_TRYOUT_MARKER))
}

fn parse_component(file_name: &str, component: &str) -> Result<i32, FileNameError> {
    component
        .parse::<i32>()
        .map_err(|source| {
            let component = component.to_string();
            let file_name = file_name.to_string();
            if matches!(
                source.kind(),
                IntErrorKind::PosOverflow | IntErrorKind::NegOverflow
            ) {
                FileNameError::OutOfRange {
                    file_name,
                    component,
                }
            } else {
                FileNameError::NotNumeric {
                    file_name,
                    component,
                    source,
                }
            }
        })
}
