//! The currently loaded CSV file.
//!
//! Requested paths are resolved inside a fixed data directory. Absolute
//! paths and paths that climb out with `..` are refused before anything is
//! opened.

use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::error::{Error, Result};
use crate::parse::{CellRows, Cells, Parser, RaggedRow};

/// A parsed file and what the parser had to say about it.
#[derive(Debug)]
pub struct Loaded {
    pub path: PathBuf,
    pub table: Vec<Cells>,
    pub ragged: Vec<RaggedRow>,
    // the input failed part way and `table` holds what was read before that
    pub partial: bool,
}

#[derive(Debug)]
pub struct CsvSource {
    data_dir: PathBuf,
    current: RwLock<Option<Arc<Loaded>>>,
}

impl CsvSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            current: RwLock::new(None),
        }
    }
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let relative = Path::new(requested);
        if requested.is_empty() {
            return Err(Error::DataSource("no file path given".into()));
        }
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(Error::DataSource(format!(
                "file path '{requested}' must stay inside the data directory"
            )));
        }
        Ok(self.data_dir.join(relative))
    }

    /// Parses the requested file and makes it the current table. A failed
    /// load leaves the previous table in place.
    pub fn load(&self, requested: &str) -> Result<Arc<Loaded>> {
        let path = self.resolve(requested)?;
        let reader = BufReader::new(File::open(&path)?);
        let outcome = Parser::new(reader, CellRows).parse()?;
        let partial = outcome.is_partial();
        let ragged = outcome.ragged().to_vec();
        let loaded = Arc::new(Loaded {
            path,
            table: outcome.into_rows(),
            ragged,
            partial,
        });
        info!(path = %loaded.path.display(), rows = loaded.table.len(), partial, "loaded csv");
        *self
            .current
            .write()
            .map_err(|e| Error::Lock(e.to_string()))? = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    pub fn current(&self) -> Result<Arc<Loaded>> {
        self.current
            .read()
            .map_err(|e| Error::Lock(e.to_string()))?
            .as_ref()
            .map(Arc::clone)
            .ok_or(Error::NotLoaded)
    }
}
