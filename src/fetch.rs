use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::warn;

use crate::error::ScrapeError;

const BASE_URL: &str = "https://plants.usda.gov/plant-profile";

/// How long to wait for the ready selector before giving up on a page.
const READY_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(1500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("plants_scraper/", env!("CARGO_PKG_VERSION"));

pub fn characteristics_url(symbol: &str) -> String {
    format!("{}/{}/characteristics", BASE_URL, symbol)
}

pub fn profile_url(symbol: &str) -> String {
    format!("{}/{}", BASE_URL, symbol)
}

/// Transport seam. Returns rendered markup for a URL once `ready_selector`
/// matches something in it, or `FetchTimeout` after the bounded wait.
#[async_trait]
pub trait PageFetcher {
    async fn fetch(&self, url: &str, ready_selector: &str) -> Result<String, ScrapeError>;
}

/// reqwest-backed fetcher. The target renders its tables client-side with
/// a server fallback, so readiness is probed by re-requesting until the
/// selector matches; transient HTTP errors count against the same window.
pub struct HttpFetcher {
    client: Client,
    ready_timeout: Duration,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            ready_timeout: READY_TIMEOUT,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, ready_selector: &str) -> Result<String, ScrapeError> {
        let selector = Selector::parse(ready_selector).unwrap();
        let started = Instant::now();

        loop {
            match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => match resp.text().await {
                    Ok(body) => {
                        let ready = {
                            let doc = Html::parse_document(&body);
                            doc.select(&selector).next().is_some()
                        };
                        if ready {
                            return Ok(body);
                        }
                    }
                    Err(e) => warn!("Failed to read body from {}: {}", url, e),
                },
                Ok(resp) => warn!("HTTP {} from {}", resp.status(), url),
                Err(e) => warn!("Request error for {}: {}", url, e),
            }

            if started.elapsed() + POLL_INTERVAL > self.ready_timeout {
                return Err(ScrapeError::FetchTimeout {
                    url: url.to_string(),
                    selector: ready_selector.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

// ── Tests ──
