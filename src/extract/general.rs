use indexmap::IndexMap;
use scraper::{ElementRef, Html, Selector};

use crate::error::{ProfilePart, ScrapeError};

use super::{node_text, ScrapeRules};

/// Everything the profile page must yield for one plant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralRecord {
    pub common_name: String,
    pub general_info: IndexMap<String, String>,
    pub classification: IndexMap<String, String>,
}

/// Extract the general-information and classification tables plus the
/// common name from a profile page.
///
/// Fails with `MissingSection` if any of the three parts comes up empty: a
/// plant that reached this stage has characteristics data, so a short
/// result means the page layout changed or the render never finished, and
/// the run must halt instead of persisting a partial record.
pub fn extract_general(
    doc: &Html,
    symbol: &str,
    rules: &ScrapeRules,
) -> Result<GeneralRecord, ScrapeError> {
    let table_sel = Selector::parse("table").unwrap();
    let caption_sel = Selector::parse("caption").unwrap();
    let row_sel = Selector::parse("tr").unwrap();
    let th_sel = Selector::parse("th").unwrap();
    let td_sel = Selector::parse("td").unwrap();

    let mut general_info = IndexMap::new();
    let mut classification = IndexMap::new();
    let mut common_name: Option<String> = None;
    let mut seen_general_table = false;

    for table in doc.select(&table_sel) {
        let caption_el = table.select(&caption_sel).next();
        let caption = caption_el.map(node_text).unwrap_or_default().to_lowercase();
        let is_general = caption.contains(&rules.general_caption);
        let is_classification = caption.contains(&rules.classification_caption);
        if !is_general && !is_classification {
            continue;
        }

        for row in table.select(&row_sel) {
            let th = row.select(&th_sel).next();
            let td = row.select(&td_sel).next();
            let (th, td) = match (th, td) {
                (Some(th), Some(td)) => (th, td),
                _ => continue,
            };
            let label = node_text(th);
            let value = node_text(td);

            if is_general {
                // Metadata rows, not record data.
                if rules.excluded_info_labels.iter().any(|l| *l == label) {
                    continue;
                }
                general_info.insert(label, value);
            } else {
                classification.insert(label, value);
            }
        }

        // The display name is the leading text of the first
        // general-information caption; later tables never override it.
        if is_general && !seen_general_table {
            seen_general_table = true;
            common_name = caption_el.and_then(leading_caption_text);
        }
    }

    let common_name = common_name.ok_or_else(|| ScrapeError::MissingSection {
        symbol: symbol.to_string(),
        part: ProfilePart::CommonName,
    })?;
    if general_info.is_empty() {
        return Err(ScrapeError::MissingSection {
            symbol: symbol.to_string(),
            part: ProfilePart::GeneralInfo,
        });
    }
    if classification.is_empty() {
        return Err(ScrapeError::MissingSection {
            symbol: symbol.to_string(),
            part: ProfilePart::Classification,
        });
    }

    Ok(GeneralRecord {
        common_name,
        general_info,
        classification,
    })
}

/// First child of the caption, if it is a text node, trimmed of quotes and
/// whitespace. A caption that opens with markup has no usable name.
fn leading_caption_text(caption: ElementRef) -> Option<String> {
    let first = caption.children().next()?;
    let text = first.value().as_text()?;
    let name = text.text.trim_matches(|c: char| c.is_whitespace() || c == '"');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

// ── Tests ──
