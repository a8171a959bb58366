use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    codes,
    error::{Error, Result},
    period::Period,
};

/// One document's aggregated occurrences of one code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Path of the document relative to the documents directory.
    pub document_id: String,
    /// Where the document can be fetched from.
    pub link: String,
    /// Normalized (case-folded, punctuation-stripped) code.
    pub code: String,
    /// Distinct pages the code appears on, ascending.
    pub pages: Vec<u32>,
    /// Total matches of the code across the document.
    pub occurrences: u32,
    pub period: Period,
}

/// Mapping from normalized code to the entries of every document that
/// contains it, in build order.
///
/// Serializes as a plain JSON object. Keys are kept sorted so the same
/// index always produces the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeIndex {
    codes: BTreeMap<String, Vec<IndexEntry>>,
}

impl CodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry under its case-folded code.
    pub fn insert(&mut self, entry: IndexEntry) {
        self.codes
            .entry(entry.code.to_lowercase())
            .or_default()
            .push(entry);
    }

    pub fn get(&self, code: &str) -> Option<&[IndexEntry]> {
        self.codes.get(&code.to_lowercase()).map(Vec::as_slice)
    }

    /// All indexed codes, sorted.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.codes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[IndexEntry])> {
        self.codes
            .iter()
            .map(|(code, entries)| (code.as_str(), entries.as_slice()))
    }

    pub fn code_count(&self) -> usize {
        self.codes.len()
    }

    pub fn entry_count(&self) -> usize {
        self.codes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Check the invariants a build guarantees. Used to reject persisted
    /// files that parse but could not have been produced by a build.
    fn validate(&self) -> std::result::Result<(), String> {
        for (key, entries) in &self.codes {
            if codes::normalize(key).as_deref() != Some(key.as_str()) {
                return Err(format!("key {key:?} is not a normalized code"));
            }
            if entries.is_empty() {
                return Err(format!("key {key:?} has no entries"));
            }
            for entry in entries {
                if entry.code.to_lowercase() != *key {
                    return Err(format!(
                        "entry code {:?} filed under {key:?}",
                        entry.code
                    ));
                }
                if entry.pages.is_empty() {
                    return Err(format!(
                        "entry for {key:?} in {:?} has no pages",
                        entry.document_id
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Persists a [`CodeIndex`] as a single JSON file.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted index.
    ///
    /// Returns `Ok(None)` only when the file does not exist. A file that
    /// exists but does not parse, or breaks the index invariants, is
    /// [`Error::CorruptIndex`].
    pub fn load(&self) -> Result<Option<CodeIndex>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| Error::CorruptIndex {
            path: self.path.clone(),
            reason,
        };
        let index: CodeIndex =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        index.validate().map_err(corrupt)?;

        info!(
            path = %self.path.display(),
            codes = index.code_count(),
            "loaded index"
        );
        Ok(Some(index))
    }

    /// Write the whole index, replacing the previous file atomically.
    pub fn save(&self, index: &CodeIndex) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut bytes = serde_json::to_vec_pretty(index)?;
        bytes.push(b'\n');

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        info!(
            path = %self.path.display(),
            codes = index.code_count(),
            entries = index.entry_count(),
            "saved index"
        );
        Ok(())
    }

    /// Load the persisted index, or run `build` and persist its result if
    /// no index file exists yet. Corruption is returned, never rebuilt over.
    pub fn load_or_build<F>(&self, build: F) -> Result<CodeIndex>
    where
        F: FnOnce() -> Result<CodeIndex>,
    {
        if let Some(index) = self.load()? {
            return Ok(index);
        }
        info!(path = %self.path.display(), "no index file, building");
        let index = build()?;
        self.save(&index)?;
        Ok(index)
    }
}
