use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use scraper::Html;
use tracing::{info, warn};

use crate::error::ScrapeError;
use crate::extract::{characteristics, general, ScrapeRules};
use crate::fetch::{self, PageFetcher};
use crate::progress::{self, Catalog};
use crate::store::DocumentStore;

/// Rolling window of per-plant durations for the ETA estimate.
const ETA_WINDOW: usize = 100;

/// Which stages a crawl pass drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePlan {
    /// Characteristics pages only.
    Primary,
    /// General-information pages only.
    Secondary,
    /// Both per plant, each plant finished before the next.
    Both,
}

impl StagePlan {
    fn primary(self) -> bool {
        matches!(self, StagePlan::Primary | StagePlan::Both)
    }
    fn secondary(self) -> bool {
        matches!(self, StagePlan::Secondary | StagePlan::Both)
    }
}

#[derive(Debug, Default)]
pub struct CrawlStats {
    pub processed: usize,
    pub with_data: usize,
    pub no_data: usize,
    pub merged: usize,
}

/// Walk the catalog in seed order and drive the planned stages for every
/// plant that still has work, saving the catalog after each transition so
/// a crash or interrupt loses at most the in-flight plant.
///
/// Secondary-stage failures are systemic (site change, dead network) and
/// abort the whole run; the catalog on disk is already a clean resume
/// point when the error propagates.
pub async fn run_crawl<F: PageFetcher>(
    fetcher: &F,
    store: &DocumentStore,
    rules: &ScrapeRules,
    catalog: &mut Catalog,
    catalog_path: &Path,
    plan: StagePlan,
    limit: Option<usize>,
) -> Result<CrawlStats> {
    let mut symbols = worklist(catalog, plan);
    if let Some(n) = limit {
        symbols.truncate(n);
    }

    let pb = ProgressBar::new(symbols.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut window = VecDeque::with_capacity(ETA_WINDOW);
    let mut stats = CrawlStats::default();

    for (i, symbol) in symbols.iter().enumerate() {
        let started = Instant::now();

        if plan.primary() && !catalog.get(symbol).map(|p| p.done).unwrap_or(false) {
            let has_data = match primary_stage(fetcher, store, rules, symbol).await {
                Ok(has_data) => has_data,
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(e.into());
                }
            };
            let entry = catalog.entry(symbol.clone()).or_default();
            entry.done = true;
            entry.has_data = Some(has_data);
            if has_data {
                stats.with_data += 1;
            } else {
                stats.no_data += 1;
            }
            progress::save(catalog_path, catalog)?;
        }

        let eligible = catalog
            .get(symbol)
            .map(|p| p.done && p.has_data == Some(true) && !p.done_secondary)
            .unwrap_or(false);
        if plan.secondary() && eligible {
            let outcome = secondary_stage(fetcher, store, rules, symbol).await;
            let merged = match outcome {
                Ok(merged) => merged,
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(e.into());
                }
            };
            let entry = catalog.entry(symbol.clone()).or_default();
            entry.done_secondary = true;
            entry.has_data_secondary = Some(true);
            if merged {
                stats.merged += 1;
            }
            progress::save(catalog_path, catalog)?;
        }

        stats.processed += 1;
        if window.len() == ETA_WINDOW {
            window.pop_front();
        }
        window.push_back(started.elapsed());
        let remaining = symbols.len() - (i + 1);
        if let Some(eta) = estimate(&window, remaining) {
            pb.set_message(format!("eta {}", format_eta(eta)));
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(stats)
}

/// Plants with work left under the plan, in catalog order.
fn worklist(catalog: &Catalog, plan: StagePlan) -> Vec<String> {
    match plan {
        StagePlan::Primary => progress::pending_primary(catalog),
        StagePlan::Secondary => progress::pending_secondary(catalog),
        StagePlan::Both => catalog
            .iter()
            .filter(|(_, p)| {
                !p.done || (p.has_data == Some(true) && !p.done_secondary)
            })
            .map(|(s, _)| s.clone())
            .collect(),
    }
}

/// Stage 1: fetch the characteristics page and extract traits.
///
/// Nothing here is fatal. A page that never shows the container, times
/// out, or filters down to zero traits is a plant without a profile, not
/// a broken run.
async fn primary_stage<F: PageFetcher>(
    fetcher: &F,
    store: &DocumentStore,
    rules: &ScrapeRules,
    symbol: &str,
) -> Result<bool, ScrapeError> {
    let url = fetch::characteristics_url(symbol);
    info!("Scraping characteristics: {} -> {}", symbol, url);

    let html = match fetcher.fetch(&url, &rules.characteristics_container).await {
        Ok(html) => html,
        Err(ScrapeError::FetchTimeout { .. }) => {
            warn!("No characteristics container for {}", symbol);
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    let traits = {
        let doc = Html::parse_document(&html);
        characteristics::extract_traits(&doc, rules)
    };
    if traits.is_empty() {
        info!("No characteristics data for {}", symbol);
        return Ok(false);
    }

    info!("Found {} traits for {}", traits.len(), symbol);
    store.create(symbol, &traits)?;
    Ok(true)
}

/// Stage 2: fetch the profile page, extract the general record, merge it.
///
/// Every failure propagates: this stage only runs for plants known to
/// have data, so a timeout or missing section is a structural problem.
/// Returns whether the merge wrote anything (false = an earlier run
/// already named this plant).
async fn secondary_stage<F: PageFetcher>(
    fetcher: &F,
    store: &DocumentStore,
    rules: &ScrapeRules,
    symbol: &str,
) -> Result<bool, ScrapeError> {
    let url = fetch::profile_url(symbol);
    info!("Scraping profile: {} -> {}", symbol, url);

    let html = fetcher.fetch(&url, &rules.table_ready_selector).await?;
    let record = {
        let doc = Html::parse_document(&html);
        general::extract_general(&doc, symbol, rules)
    }?;

    let merged = store.merge(symbol, &record)?;
    if merged {
        info!("Fully scraped {} ({})", record.common_name, symbol);
    } else {
        warn!("{} already has a common name, keeping the stored one", symbol);
    }
    Ok(merged)
}

fn estimate(window: &VecDeque<Duration>, remaining: usize) -> Option<Duration> {
    if window.is_empty() {
        return None;
    }
    let total: Duration = window.iter().sum();
    Some(total / window.len() as u32 * remaining as u32)
}

fn format_eta(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::progress::PlantProgress;

    /// In-memory fetcher: unknown URLs behave like pages that never
    /// render the ready selector.
    #[derive(Default)]
    struct StubFetcher {
        pages: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn with_page(mut self, url: String, html: &str) -> Self {
            self.pages.insert(url, html.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str, ready_selector: &str) -> Result<String, ScrapeError> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(html) => Ok(html.clone()),
                None => Err(ScrapeError::FetchTimeout {
                    url: url.to_string(),
                    selector: ready_selector.to_string(),
                    waited_ms: 0,
                }),
            }
        }
    }

    const ABCD_CHARACTERISTICS: &str = r#"
        <div id="characteristics"><table>
          <tr><td>Height</td><td>1m</td></tr>
        </table></div>"#;

    const ABCD_PROFILE: &str = r#"
        <table>
          <caption>"Foo" <span>General Information</span></caption>
          <tr><th>Duration</th><td>Perennial</td></tr>
        </table>
        <table>
          <caption>Classification</caption>
          <tr><th>Kingdom</th><td>Plantae</td></tr>
        </table>"#;

    // Page exists but has no characteristics container at all.
    const EFGH_CHARACTERISTICS: &str = "<html><body><p>not found</p></body></html>";

    fn seeded_catalog(symbols: &[&str]) -> Catalog {
        let mut catalog = Catalog::new();
        for s in symbols {
            catalog.insert(s.to_string(), PlantProgress::default());
        }
        catalog
    }

    fn full_fetcher() -> StubFetcher {
        StubFetcher::default()
            .with_page(fetch::characteristics_url("ABCD"), ABCD_CHARACTERISTICS)
            .with_page(fetch::profile_url("ABCD"), ABCD_PROFILE)
            .with_page(fetch::characteristics_url("EFGH"), EFGH_CHARACTERISTICS)
    }

    #[tokio::test]
    async fn end_to_end_both_stages() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("progress.json");
        let store = DocumentStore::new(dir.path().join("json"));
        let fetcher = full_fetcher();
        let mut catalog = seeded_catalog(&["ABCD", "EFGH"]);

        let stats = run_crawl(
            &fetcher,
            &store,
            &ScrapeRules::default(),
            &mut catalog,
            &catalog_path,
            StagePlan::Both,
            None,
        )
        .await
        .unwrap();

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.with_data, 1);
        assert_eq!(stats.no_data, 1);
        assert_eq!(stats.merged, 1);

        let abcd = &catalog["ABCD"];
        assert!(abcd.done && abcd.done_secondary);
        assert_eq!(abcd.has_data, Some(true));
        assert_eq!(abcd.has_data_secondary, Some(true));

        let efgh = &catalog["EFGH"];
        assert!(efgh.done && !efgh.done_secondary);
        assert_eq!(efgh.has_data, Some(false));

        // Exactly one document, fully populated
        let doc = store.read_if_exists("ABCD").unwrap().unwrap();
        assert_eq!(doc.common_name.as_deref(), Some("Foo"));
        assert_eq!(doc.traits["Height"], "1m");
        assert_eq!(doc.general_information.unwrap()["Duration"], "Perennial");
        assert_eq!(doc.classification.unwrap()["Kingdom"], "Plantae");
        assert!(store.read_if_exists("EFGH").unwrap().is_none());

        // Catalog on disk matches the in-memory state
        let persisted = progress::load(&catalog_path).unwrap();
        assert_eq!(persisted, catalog);
    }

    #[tokio::test]
    async fn done_plants_are_never_fetched_again() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("progress.json");
        let store = DocumentStore::new(dir.path().join("json"));
        let fetcher = full_fetcher();

        let mut catalog = seeded_catalog(&["EFGH"]);
        catalog.get_mut("EFGH").unwrap().done = true;
        catalog.get_mut("EFGH").unwrap().has_data = Some(false);
        let before = catalog.clone();

        run_crawl(
            &fetcher,
            &store,
            &ScrapeRules::default(),
            &mut catalog,
            &catalog_path,
            StagePlan::Both,
            None,
        )
        .await
        .unwrap();

        assert!(fetcher.calls().is_empty());
        assert_eq!(catalog, before);
    }

    #[tokio::test]
    async fn interrupted_run_resumes_to_the_same_result() {
        let dir = tempfile::tempdir().unwrap();
        let rules = ScrapeRules::default();

        // Uninterrupted reference run
        let ref_path = dir.path().join("ref.json");
        let ref_store = DocumentStore::new(dir.path().join("ref_json"));
        let mut reference = seeded_catalog(&["ABCD", "EFGH"]);
        run_crawl(
            &full_fetcher(),
            &ref_store,
            &rules,
            &mut reference,
            &ref_path,
            StagePlan::Both,
            None,
        )
        .await
        .unwrap();

        // Same crawl, stopped after the first plant and restarted from disk
        let path = dir.path().join("progress.json");
        let store = DocumentStore::new(dir.path().join("json"));
        let mut catalog = seeded_catalog(&["ABCD", "EFGH"]);
        run_crawl(
            &full_fetcher(),
            &store,
            &rules,
            &mut catalog,
            &path,
            StagePlan::Both,
            Some(1),
        )
        .await
        .unwrap();

        let mut resumed = progress::load(&path).unwrap();
        run_crawl(
            &full_fetcher(),
            &store,
            &rules,
            &mut resumed,
            &path,
            StagePlan::Both,
            None,
        )
        .await
        .unwrap();

        assert_eq!(resumed, reference);
        assert_eq!(
            store.read_if_exists("ABCD").unwrap(),
            ref_store.read_if_exists("ABCD").unwrap()
        );
    }

    #[tokio::test]
    async fn missing_section_halts_without_marking_the_plant_done() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("progress.json");
        let store = DocumentStore::new(dir.path().join("json"));

        // Profile page whose general-information caption opens with markup
        let profile = r#"
            <table>
              <caption><span>General Information</span></caption>
              <tr><th>Duration</th><td>Perennial</td></tr>
            </table>
            <table>
              <caption>Classification</caption>
              <tr><th>Kingdom</th><td>Plantae</td></tr>
            </table>"#;
        let fetcher = StubFetcher::default()
            .with_page(fetch::characteristics_url("ABCD"), ABCD_CHARACTERISTICS)
            .with_page(fetch::profile_url("ABCD"), profile);

        let mut catalog = seeded_catalog(&["ABCD"]);
        let err = run_crawl(
            &fetcher,
            &store,
            &ScrapeRules::default(),
            &mut catalog,
            &catalog_path,
            StagePlan::Both,
            None,
        )
        .await
        .unwrap_err();

        match err.downcast_ref::<ScrapeError>() {
            Some(ScrapeError::MissingSection { symbol, .. }) => assert_eq!(symbol, "ABCD"),
            other => panic!("expected MissingSection, got {:?}", other),
        }

        // Stage 1 landed and was flushed; stage 2 left no trace
        let persisted = progress::load(&catalog_path).unwrap();
        assert!(persisted["ABCD"].done);
        assert!(!persisted["ABCD"].done_secondary);
        assert!(persisted["ABCD"].has_data_secondary.is_none());
    }

    #[tokio::test]
    async fn secondary_timeout_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("progress.json");
        let store = DocumentStore::new(dir.path().join("json"));

        // Characteristics page only; the profile page never becomes ready
        let fetcher = StubFetcher::default()
            .with_page(fetch::characteristics_url("ABCD"), ABCD_CHARACTERISTICS);

        let mut catalog = seeded_catalog(&["ABCD"]);
        let err = run_crawl(
            &fetcher,
            &store,
            &ScrapeRules::default(),
            &mut catalog,
            &catalog_path,
            StagePlan::Both,
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::FetchTimeout { .. })
        ));
        assert!(!catalog["ABCD"].done_secondary);
    }

    #[tokio::test]
    async fn primary_timeout_counts_as_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("progress.json");
        let store = DocumentStore::new(dir.path().join("json"));
        let fetcher = StubFetcher::default(); // no pages at all

        let mut catalog = seeded_catalog(&["ABCD"]);
        let stats = run_crawl(
            &fetcher,
            &store,
            &ScrapeRules::default(),
            &mut catalog,
            &catalog_path,
            StagePlan::Primary,
            None,
        )
        .await
        .unwrap();

        assert_eq!(stats.no_data, 1);
        assert!(catalog["ABCD"].done);
        assert_eq!(catalog["ABCD"].has_data, Some(false));
    }

    #[test]
    fn eta_averages_the_rolling_window() {
        let mut window = VecDeque::new();
        assert!(estimate(&window, 5).is_none());

        window.push_back(Duration::from_secs(2));
        window.push_back(Duration::from_secs(4));
        assert_eq!(estimate(&window, 10), Some(Duration::from_secs(30)));
        assert_eq!(format_eta(Duration::from_secs(3725)), "1h 2m 5s");
    }
}
