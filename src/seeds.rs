use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{info, warn};

/// Column of the USDA download holding the plant symbol.
const SYMBOL_COLUMN: &str = "AcceptedSymbol";
/// Symbols are short alphanumeric codes; anything else is a bad row.
const SYMBOL_PATTERN: &str = r"^[A-Za-z0-9]+$";

/// Read the seed CSV and return unique plant symbols in file order.
pub fn load_symbols(path: &Path) -> Result<Vec<String>> {
    let re = Regex::new(SYMBOL_PATTERN)?;

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open seed file {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let column = headers
        .iter()
        .position(|h| h == SYMBOL_COLUMN)
        .with_context(|| {
            format!(
                "Seed file {} has no '{}' column",
                path.display(),
                SYMBOL_COLUMN
            )
        })?;

    let mut seen = HashSet::new();
    let mut symbols = Vec::new();
    for record in reader.records() {
        let record = record?;
        let symbol = record.get(column).unwrap_or("").trim();
        if symbol.is_empty() {
            continue;
        }
        if !re.is_match(symbol) {
            warn!("Skipping malformed symbol {:?}", symbol);
            continue;
        }
        if seen.insert(symbol.to_string()) {
            symbols.push(symbol.to_string());
        }
    }

    info!("Seed file {}: {} unique symbols", path.display(), symbols.len());
    Ok(symbols)
}

// ── Tests ──
