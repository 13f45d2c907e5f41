use indexmap::IndexMap;
use scraper::{Html, Selector};

use super::{node_text, ScrapeRules};

/// Extract trait label/value pairs from a characteristics page.
///
/// A missing container or no qualifying rows yield an empty map, which the
/// coordinator records as "no data" rather than an error. Duplicate labels
/// are last-write-wins in table scan order.
pub fn extract_traits(doc: &Html, rules: &ScrapeRules) -> IndexMap<String, String> {
    let container_sel = Selector::parse(&rules.characteristics_container).unwrap();
    let table_sel = Selector::parse("table").unwrap();
    let caption_sel = Selector::parse("caption").unwrap();
    let row_sel = Selector::parse("tr").unwrap();
    let cell_sel = Selector::parse("td").unwrap();

    let mut traits = IndexMap::new();
    let container = match doc.select(&container_sel).next() {
        Some(c) => c,
        None => return traits,
    };

    for table in container.select(&table_sel) {
        // Cultivar tables describe named varieties, not the species record.
        let caption = table
            .select(&caption_sel)
            .next()
            .map(node_text)
            .unwrap_or_default();
        if caption.to_lowercase().contains(&rules.cultivar_caption) {
            continue;
        }

        for row in table.select(&row_sel) {
            let cells: Vec<_> = row.select(&cell_sel).collect();
            // Anything but a two-cell row is layout, not a trait.
            if let [label, value] = cells[..] {
                traits.insert(node_text(label), node_text(value));
            }
        }
    }

    traits
}

// ── Tests ──
