pub mod characteristics;
pub mod general;

use scraper::ElementRef;

/// Caption keywords, excluded labels and selectors the extractors match
/// against. Site-layout drift is handled by editing this data, not the
/// extraction code.
#[derive(Debug, Clone)]
pub struct ScrapeRules {
    /// Container holding the stage-1 trait tables.
    pub characteristics_container: String,
    /// Tables whose caption contains this (case-insensitive) are skipped.
    pub cultivar_caption: String,
    /// Caption substring marking a general-information table.
    pub general_caption: String,
    /// Caption substring marking a classification table.
    pub classification_caption: String,
    /// General-information labels that are page metadata, not record data.
    pub excluded_info_labels: Vec<String>,
    /// Ready signal for profile pages (stage 2).
    pub table_ready_selector: String,
}

impl Default for ScrapeRules {
    fn default() -> Self {
        Self {
            characteristics_container: "#characteristics".into(),
            cultivar_caption: "cultivar".into(),
            general_caption: "general information".into(),
            classification_caption: "classification".into(),
            excluded_info_labels: vec![
                "Symbol".into(),
                "Native Status".into(),
                "Plant Guide".into(),
            ],
            table_ready_selector: "table".into(),
        }
    }
}

/// Concatenated text of an element, each fragment trimmed, empties dropped.
pub(crate) fn node_text(el: ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}
