//! Stateful value lookups over a parsed table.
//!
//! A [`Searcher`] borrows a table and remembers every row position it has
//! returned. Calling the same search again therefore yields the *next*
//! matching row rather than the same one, and a row found by a column search
//! is never returned by a later any-column search on the same instance.

use std::borrow::Cow;
use std::collections::HashMap;

use roaring::RoaringTreemap;
use tracing::warn;

use crate::OtherHasher;
use crate::error::{Error, Result};
use crate::parse::Cells;

/// Switches that shape a search. All default to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Row 0 holds column names; it is indexed and never searched.
    pub header: bool,
    pub case_sensitive: bool,
    /// Whole-cell equality instead of substring containment.
    pub exact: bool,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn header(mut self, on: bool) -> Self {
        self.header = on;
        self
    }
    pub fn case_sensitive(mut self, on: bool) -> Self {
        self.case_sensitive = on;
        self
    }
    pub fn exact(mut self, on: bool) -> Self {
        self.exact = on;
        self
    }
    /// Reads the marker characters used by the query surface: `h` for
    /// header, `s` for case-sensitive and `m` for exact match. Anything
    /// else is ignored.
    pub fn from_flags(flags: &str) -> Self {
        Self {
            header: flags.contains('h'),
            case_sensitive: flags.contains('s'),
            exact: flags.contains('m'),
        }
    }

    pub fn matches(&self, candidate: &str, target: &str) -> bool {
        let (candidate, target): (Cow<str>, Cow<str>) = if self.case_sensitive {
            (Cow::Borrowed(candidate), Cow::Borrowed(target))
        } else {
            (
                Cow::Owned(candidate.to_lowercase()),
                Cow::Owned(target.to_lowercase()),
            )
        };
        if self.exact {
            candidate == target
        } else {
            candidate.contains(target.as_ref())
        }
    }
}

pub struct Searcher<'a> {
    table: &'a [Cells],
    options: SearchOptions,
    columns: usize,
    headers: Option<HashMap<&'a str, usize, OtherHasher>>,
    matched: RoaringTreemap,
}

impl<'a> Searcher<'a> {
    pub fn new(table: &'a [Cells], options: SearchOptions) -> Self {
        let columns = table.first().map_or(0, Vec::len);
        // later duplicates of a header name overwrite earlier ones
        let headers = options.header.then(|| {
            let mut index = HashMap::<&str, usize, OtherHasher>::default();
            if let Some(names) = table.first() {
                for (position, name) in names.iter().enumerate() {
                    index.insert(name.as_str(), position);
                }
            }
            index
        });
        Self {
            table,
            options,
            columns,
            headers,
            matched: RoaringTreemap::new(),
        }
    }
    pub fn options(&self) -> SearchOptions {
        self.options
    }
    /// Width of row 0, which every column index is checked against.
    pub fn column_count(&self) -> usize {
        self.columns
    }
    /// Positions returned so far, ascending.
    pub fn matched(&self) -> Vec<usize> {
        self.matched.iter().map(|row| row as usize).collect()
    }

    /// Turns a column identifier into a position. Integers are positions and
    /// must lie in `[0, column_count)`; anything else is a header name and
    /// needs the header option.
    pub fn resolve_column(&self, identifier: &str) -> Result<usize> {
        match identifier.parse::<i64>() {
            Ok(index) => usize::try_from(index)
                .ok()
                .filter(|&position| position < self.columns)
                .ok_or_else(|| {
                    Error::ColumnConversion(format!(
                        "invalid column index {index}, table has {} columns",
                        self.columns
                    ))
                }),
            Err(_) => {
                let headers = self.headers.as_ref().ok_or_else(|| {
                    Error::ColumnConversion(format!(
                        "column name '{identifier}' given when headers were not specified"
                    ))
                })?;
                headers.get(identifier).copied().ok_or_else(|| {
                    Error::ColumnConversion(format!("invalid column name '{identifier}'"))
                })
            }
        }
    }

    pub fn matches(&self, candidate: &str, target: &str) -> bool {
        self.options.matches(candidate, target)
    }

    /// Next row, not returned before, whose cell in `column` matches `value`.
    /// A bad column identifier is logged and reported as no match; use
    /// [`Searcher::try_search_column`] to tell the two apart.
    pub fn search_column(&mut self, value: &str, column: &str) -> Option<usize> {
        match self.try_search_column(value, column) {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, column, "error when converting column");
                None
            }
        }
    }

    pub fn try_search_column(&mut self, value: &str, column: &str) -> Result<Option<usize>> {
        let position = self.resolve_column(column)?;
        let found = self.scan().find(|&row| {
            self.table[row]
                .get(position)
                .is_some_and(|cell| self.matches(cell, value))
        });
        Ok(found.map(|row| self.remember(row)))
    }

    /// Next row, not returned before, with a matching cell in any column.
    pub fn search_any(&mut self, value: &str) -> Option<usize> {
        let found = self
            .scan()
            .find(|&row| self.table[row].iter().any(|cell| self.matches(cell, value)));
        found.map(|row| self.remember(row))
    }

    // data rows in ascending order, minus the ones already returned
    fn scan(&self) -> impl Iterator<Item = usize> + '_ {
        let first = usize::from(self.options.header);
        (first..self.table.len()).filter(|&row| !self.matched.contains(row as u64))
    }

    fn remember(&mut self, row: usize) -> usize {
        self.matched.insert(row as u64);
        row
    }
}
