//! csvsearch – load delimited text and look values up in it, one match at a time.
//!
//! The core is two pieces that work together:
//! * [`parse::Parser`] reads a stream line by line, splits each line on
//!   separators that are not inside a quoted span, and turns the cells into
//!   rows through a [`parse::RowFactory`].
//! * [`search::Searcher`] binds to a parsed table and a set of
//!   [`search::SearchOptions`], resolves column identifiers (positions or
//!   header names) and returns matching row positions. It remembers what it
//!   returned, so repeating a search walks through the matches.
//!
//! ## Modules
//! * [`parse`] – Line splitting, the row factory trait and typed parse outcomes.
//! * [`search`] – Options, the match predicate and the stateful searcher.
//! * [`source`] – The currently loaded file, resolved inside a data directory.
//! * [`cache`] – A bounded cache whose entries expire after they were written.
//! * [`census`] – Cached keyed lookups, with a US Census broadband source.
//! * [`server`] – The HTTP surface (`loadcsv`, `viewcsv`, `searchcsv`, `broadband`).
//! * [`settings`] – Layered configuration.
//!
//! ## Parsing
//! A separator only splits a line when an even number of quote characters
//! follows it. The rule does not understand escaped quotes, and quoted cells
//! keep their quote characters. Rows whose length differs from the first row
//! are reported but kept. A failing stream yields the rows read so far as a
//! [`parse::ParseOutcome::Partial`]; a failing row factory aborts the parse.
//!
//! ## Quick Start
//! ```
//! use csvsearch::parse::{CellRows, Parser};
//! use csvsearch::search::{SearchOptions, Searcher};
//! let text = "name,city\nAda,London\nGrace,Arlington\nAlan,London\n";
//! let table = Parser::new(text.as_bytes(), CellRows).parse().unwrap().into_rows();
//! let mut searcher = Searcher::new(&table, SearchOptions::new().header(true));
//! assert_eq!(searcher.search_column("london", "city"), Some(1));
//! assert_eq!(searcher.search_column("london", "city"), Some(3));
//! assert_eq!(searcher.search_column("london", "city"), None);
//! ```

use core::hash::BuildHasherDefault;
use seahash::SeaHasher;

pub mod cache;
pub mod census;
pub mod error;
pub mod parse;
pub mod search;
pub mod server;
pub mod settings;
pub mod source;

pub use error::{Error, Result};

pub type OtherHasher = BuildHasherDefault<SeaHasher>;
