use std::path::PathBuf;

use thiserror::Error;

/// The three parts a profile page must yield together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilePart {
    CommonName,
    GeneralInfo,
    Classification,
}

impl std::fmt::Display for ProfilePart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProfilePart::CommonName => "common name",
            ProfilePart::GeneralInfo => "general info",
            ProfilePart::Classification => "classification",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Progress file or plant document exists but cannot be parsed.
    /// Never auto-repaired; the operator has to look at the file.
    #[error("state file '{path}' is corrupt: {source}")]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A profile page for a plant known to have characteristics data is
    /// missing a required part. Halts the run: partial secondary records
    /// are worse than no progress.
    #[error("no {part} found for {symbol}")]
    MissingSection { symbol: String, part: ProfilePart },

    /// The ready selector never matched within the wait window.
    #[error("timed out after {waited_ms}ms waiting for '{selector}' on {url}")]
    FetchTimeout {
        url: String,
        selector: String,
        waited_ms: u64,
    },

    /// `create` called for a document the secondary stage already filled.
    #[error("document for {symbol} is already fully populated")]
    AlreadyExists { symbol: String },

    /// `merge` called for a symbol with no characteristics document.
    #[error("no characteristics document found for {symbol}")]
    NotFound { symbol: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
