//! Source-name to target-name translation
//!
//! The table is read once before any worker starts and is shared read-only
//! afterwards, so lookups need no synchronization.

use crate::error::{Result, SyncError};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMapping {
    entries: HashMap<String, String>,
}

impl NameMapping {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a `source,target` table. The first row is always treated as a
    /// header; rows with fewer than two columns are ignored.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            SyncError::Config(format!(
                "failed to open mapping file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = HashMap::new();
        for record in csv_reader.records() {
            let record = record?;
            if let (Some(source), Some(target)) = (record.get(0), record.get(1)) {
                if source.is_empty() {
                    continue;
                }
                entries.insert(source.to_string(), target.to_string());
            }
        }

        Ok(Self { entries })
    }

    /// Mapped target name, or the source name itself when unmapped
    pub fn resolve(&self, source_name: &str) -> String {
        self.entries
            .get(source_name)
            .cloned()
            .unwrap_or_else(|| source_name.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for NameMapping {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
