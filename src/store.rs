use std::fs;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;
use crate::extract::general::GeneralRecord;

/// One persisted record per plant symbol.
///
/// A characteristics-only document carries just `symbol` and `traits`;
/// the secondary stage fills in the rest. `scientific_name` is a leftover
/// from an older document shape, readable but dropped on merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantDocument {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    pub traits: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_information: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<IndexMap<String, String>>,
}

/// Sole writer of the per-plant output files, sharded by the upper-cased
/// first character of the symbol to keep directory listings bounded.
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn document_path(&self, symbol: &str) -> PathBuf {
        let shard: String = symbol.chars().take(1).flat_map(char::to_uppercase).collect();
        self.root.join(shard).join(format!("{}.json", symbol))
    }

    /// Write a fresh characteristics-only document.
    ///
    /// Overwriting a characteristics-only document is allowed (re-running
    /// stage 1 is idempotent); overwriting one the secondary stage already
    /// filled would lose data and means the coordinator and store disagree
    /// about this symbol, so it halts.
    pub fn create(
        &self,
        symbol: &str,
        traits: &IndexMap<String, String>,
    ) -> Result<(), ScrapeError> {
        if let Some(existing) = self.read_if_exists(symbol)? {
            if existing.general_information.is_some() {
                return Err(ScrapeError::AlreadyExists {
                    symbol: symbol.to_string(),
                });
            }
        }
        self.write(&PlantDocument {
            symbol: symbol.to_string(),
            scientific_name: None,
            common_name: None,
            traits: traits.clone(),
            general_information: None,
            classification: None,
        })
    }

    /// Fold secondary-stage data into an existing document.
    ///
    /// Returns false when the document already has a non-empty common
    /// name: the first completed scrape wins and later runs never clobber
    /// it. The legacy single-valued `scientific_name` goes away here.
    pub fn merge(&self, symbol: &str, record: &GeneralRecord) -> Result<bool, ScrapeError> {
        let mut doc = self
            .read_if_exists(symbol)?
            .ok_or_else(|| ScrapeError::NotFound {
                symbol: symbol.to_string(),
            })?;

        if let Some(name) = &doc.common_name {
            if !name.is_empty() {
                return Ok(false);
            }
        }

        doc.common_name = Some(record.common_name.clone());
        doc.general_information = Some(record.general_info.clone());
        doc.classification = Some(record.classification.clone());
        doc.scientific_name = None;
        self.write(&doc)?;
        Ok(true)
    }

    pub fn read_if_exists(&self, symbol: &str) -> Result<Option<PlantDocument>, ScrapeError> {
        let path = self.document_path(symbol);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| ScrapeError::CorruptState { path, source })
    }

    fn write(&self, doc: &PlantDocument) -> Result<(), ScrapeError> {
        let path = self.document_path(&doc.symbol);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, serde_json::to_string_pretty(doc)?)?;
        Ok(())
    }
}

// ── Tests ──
