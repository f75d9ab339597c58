//! Line-oriented delimited text parsing.
//!
//! A [`Parser`] owns a buffered reader and a [`RowFactory`]. Every line read
//! is split into cells with [`split_line`] and handed to the factory, whose
//! output becomes the next row of the table. The reader is moved into the
//! parser, so it is released on every exit path.
//!
//! Quoted spans are detected with a lookahead rule: a separator is a field
//! boundary only when an even number of quote characters follows it through
//! the end of the line. Escaped quotes inside a quoted field are not
//! understood, and the quote characters themselves stay in the cell.

use std::io::{self, BufRead};

use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const SEPARATOR: char = ',';
pub const QUOTE: char = '"';

/// The raw cells of one line, in column order.
pub type Cells = Vec<String>;

/// Returned by a [`RowFactory`] that refuses a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryFailure {
    pub message: String,
    pub cells: Cells,
}

impl FactoryFailure {
    pub fn new(message: impl Into<String>, cells: Cells) -> Self {
        Self {
            message: message.into(),
            cells,
        }
    }
}

impl From<FactoryFailure> for Error {
    fn from(f: FactoryFailure) -> Self {
        Error::RowConversion {
            message: f.message,
            cells: f.cells,
        }
    }
}

/// Turns the cells of a line into a row value. Implementations must not
/// depend on previously created rows.
pub trait RowFactory {
    type Row;
    fn create(&self, cells: Cells) -> std::result::Result<Self::Row, FactoryFailure>;
}

/// Keeps the cells as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellRows;

impl RowFactory for CellRows {
    type Row = Cells;
    fn create(&self, cells: Cells) -> std::result::Result<Cells, FactoryFailure> {
        Ok(cells)
    }
}

/// A row whose length differs from the length of the first row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaggedRow {
    pub row: usize,
    pub expected: usize,
    pub found: usize,
}

/// What a parse produced. A stream failure does not throw away the rows
/// already read; they come back as `Partial` together with the error.
#[derive(Debug)]
pub enum ParseOutcome<T> {
    Complete {
        rows: Vec<T>,
        ragged: Vec<RaggedRow>,
    },
    Partial {
        rows: Vec<T>,
        ragged: Vec<RaggedRow>,
        error: io::Error,
    },
}

impl<T> ParseOutcome<T> {
    pub fn rows(&self) -> &[T] {
        match self {
            Self::Complete { rows, .. } | Self::Partial { rows, .. } => rows,
        }
    }
    pub fn into_rows(self) -> Vec<T> {
        match self {
            Self::Complete { rows, .. } | Self::Partial { rows, .. } => rows,
        }
    }
    pub fn ragged(&self) -> &[RaggedRow] {
        match self {
            Self::Complete { ragged, .. } | Self::Partial { ragged, .. } => ragged,
        }
    }
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Partial { .. })
    }
    pub fn error(&self) -> Option<&io::Error> {
        match self {
            Self::Complete { .. } => None,
            Self::Partial { error, .. } => Some(error),
        }
    }
}

pub struct Parser<R, F> {
    reader: R,
    factory: F,
    separator: char,
    quote: char,
}

impl<R: BufRead, F: RowFactory> Parser<R, F> {
    pub fn new(reader: R, factory: F) -> Self {
        Self {
            reader,
            factory,
            separator: SEPARATOR,
            quote: QUOTE,
        }
    }
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }
    pub fn with_quote(mut self, quote: char) -> Self {
        self.quote = quote;
        self
    }

    /// Reads until end of input. Only a factory failure is an `Err`; a read
    /// failure ends the parse early with [`ParseOutcome::Partial`].
    pub fn parse(self) -> Result<ParseOutcome<F::Row>> {
        let Self {
            reader,
            factory,
            separator,
            quote,
        } = self;
        let mut rows = Vec::new();
        let mut ragged = Vec::new();
        let mut expected: Option<usize> = None;
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(error) => {
                    let read = rows.len();
                    warn!(%error, rows = read, "input stream failed, keeping rows read so far");
                    return Ok(ParseOutcome::Partial { rows, ragged, error });
                }
            };
            let cells = split_line(&line, separator, quote);
            let found = cells.len();
            rows.push(factory.create(cells)?);
            let expected = *expected.get_or_insert(found);
            if found != expected {
                let row = rows.len() - 1;
                warn!(row, expected, found, "columns are not equal, searches may miss cells");
                ragged.push(RaggedRow { row, expected, found });
            }
        }
        debug!(rows = rows.len(), ragged = ragged.len(), "parse complete");
        Ok(ParseOutcome::Complete { rows, ragged })
    }
}

/// Splits at every separator that is followed by an even number of quote
/// characters. A line without any split point is returned whole; otherwise
/// trailing empty cells are dropped.
pub fn split_line(line: &str, separator: char, quote: char) -> Cells {
    let mut remaining = line.chars().filter(|&c| c == quote).count();
    let mut cells = Vec::new();
    let mut start = 0;
    for (i, c) in line.char_indices() {
        if c == quote {
            remaining -= 1;
        } else if c == separator && remaining % 2 == 0 {
            cells.push(line[start..i].to_owned());
            start = i + c.len_utf8();
        }
    }
    if cells.is_empty() {
        return vec![line.to_owned()];
    }
    cells.push(line[start..].to_owned());
    while cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    cells
}
