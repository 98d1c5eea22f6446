use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkResult {
    pub framework: String,
    pub rps: f64,
}

/// Benchmark name -> per-framework results.
pub type ResultsCollection = BTreeMap<String, Vec<FrameworkResult>>;

/// JSON results file, rewritten in full on every update.
#[derive(Debug, Clone)]
pub struct ResultsStore {
    path: PathBuf,
}

impl ResultsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ResultsStore { path: path.into() }
    }

    /// A missing or empty file is an empty collection. An unreadable one is an
    /// error so that it never gets overwritten.
    pub fn load(&self) -> Result<ResultsCollection> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(ResultsCollection::new()),
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| Error::persistence(&self.path, e))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ResultsCollection::new()),
            Err(e) => Err(Error::persistence(&self.path, e)),
        }
    }

    /// Replaces the entry for `name` and leaves every other benchmark as is.
    pub fn merge_and_persist(&self, name: &str, results: &[FrameworkResult]) -> Result<()> {
        let mut all = self.load()?;
        all.insert(name.to_string(), results.to_vec());
        self.write(&all)
            .map_err(|e| Error::persistence(&self.path, e))?;
        info!("Updated {} results in {:?}", name, self.path);
        Ok(())
    }

    fn write(&self, all: &ResultsCollection) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, all)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
