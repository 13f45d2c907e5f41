use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;

fn is_false(b: &bool) -> bool {
    !*b
}

/// Per-symbol crawl flags, in the shape persisted to progress.json.
///
/// `done`/`has_data` track the characteristics stage, the `_secondary`
/// pair tracks the general-information stage. `has_data` stays null until
/// the stage has resolved at least once; the secondary keys are absent
/// entirely until that stage runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantProgress {
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub has_data: Option<bool>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub done_secondary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_data_secondary: Option<bool>,
}

/// Symbol -> flags, in seed order. Insertion order is processing order,
/// so a resumed run always walks the same remaining sequence.
pub type Catalog = IndexMap<String, PlantProgress>;

// ── Persistence ──

pub fn load(path: &Path) -> Result<Catalog, ScrapeError> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| ScrapeError::CorruptState {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_or_default(path: &Path) -> Result<Catalog, ScrapeError> {
    if path.exists() {
        load(path)
    } else {
        Ok(Catalog::new())
    }
}

/// Rewrite the whole progress file. Goes through a sibling temp file and a
/// rename so a crash mid-write leaves either the old or the new content.
pub fn save(path: &Path, catalog: &Catalog) -> Result<(), ScrapeError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(catalog)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

// ── Seeding ──

/// Add new symbols with default flags, leaving existing entries untouched.
/// Returns how many were actually inserted.
pub fn seed(catalog: &mut Catalog, symbols: &[String]) -> usize {
    let mut inserted = 0;
    for symbol in symbols {
        if !catalog.contains_key(symbol) {
            catalog.insert(symbol.clone(), PlantProgress::default());
            inserted += 1;
        }
    }
    inserted
}

// ── Pending queries ──

pub fn pending_primary(catalog: &Catalog) -> Vec<String> {
    catalog
        .iter()
        .filter(|(_, p)| !p.done)
        .map(|(s, _)| s.clone())
        .collect()
}

/// Secondary work only exists for symbols the primary stage confirmed
/// have data.
pub fn pending_secondary(catalog: &Catalog) -> Vec<String> {
    catalog
        .iter()
        .filter(|(_, p)| p.done && p.has_data == Some(true) && !p.done_secondary)
        .map(|(s, _)| s.clone())
        .collect()
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub done: usize,
    pub with_data: usize,
    pub secondary_done: usize,
}

pub fn stats(catalog: &Catalog) -> Stats {
    Stats {
        total: catalog.len(),
        done: catalog.values().filter(|p| p.done).count(),
        with_data: catalog
            .values()
            .filter(|p| p.has_data == Some(true))
            .count(),
        secondary_done: catalog.values().filter(|p| p.done_secondary).count(),
    }
}

// ── Tests ──
