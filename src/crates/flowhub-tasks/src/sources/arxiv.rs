//! ArXiv discovery via the Atom query API

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::catalogue::CandidateTool;
use crate::error::{Result, TaskError};
use crate::sources::DiscoverySource;

const SOURCE: &str = "arxiv";

fn default_categories() -> Vec<String> {
    ["cs.AI", "cs.CL", "cs.LG"].iter().map(|s| s.to_string()).collect()
}

/// ArXiv crawler for AI tool papers
pub struct ArxivSource {
    client: Client,
    base_url: String,
    categories: Vec<String>,
}

/// One parsed Atom entry
#[derive(Debug, Clone, Default)]
pub(crate) struct ArxivEntry {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub categories: Vec<String>,
}

impl ArxivSource {
    /// Create a crawler with the default category filter
    pub fn new() -> Self {
        Self::with_base_url("http://export.arxiv.org", default_categories())
    }

    /// Create a crawler against a custom endpoint (tests)
    pub fn with_base_url(base_url: impl Into<String>, categories: Vec<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            categories,
        }
    }

    /// Parse the Atom feed into entries
    pub(crate) fn parse_feed(xml: &str) -> Vec<ArxivEntry> {
        use quick_xml::events::Event;
        use quick_xml::Reader;

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut entries = Vec::new();
        let mut current: Option<ArxivEntry> = None;
        let mut text_buffer = String::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if name == "entry" {
                        current = Some(ArxivEntry::default());
                    } else if name == "category" {
                        if let Some(entry) = current.as_mut() {
                            for attr in e.attributes().flatten() {
                                if attr.key.as_ref() == b"term" {
                                    entry
                                        .categories
                                        .push(String::from_utf8_lossy(&attr.value).to_string());
                                }
                            }
                        }
                    }
                }
                Ok(Event::Text(e)) => {
                    text_buffer = e.unescape().unwrap_or_default().to_string();
                }
                Ok(Event::End(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if let Some(entry) = current.as_mut() {
                        match name.as_str() {
                            "id" => entry.id = text_buffer.clone(),
                            "title" => entry.title = text_buffer.clone(),
                            "summary" => entry.summary = text_buffer.clone(),
                            "entry" => {
                                if let Some(entry) = current.take() {
                                    entries.push(entry);
                                }
                            }
                            _ => {}
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(_) => break,
                _ => {}
            }
        }

        entries
    }

    fn entry_to_candidate(entry: ArxivEntry) -> Option<CandidateTool> {
        // Paper id like http://arxiv.org/abs/2406.00001v1 -> 2406.00001
        let slug = entry
            .id
            .rsplit('/')
            .next()?
            .split('v')
            .next()?
            .to_string();
        if slug.is_empty() {
            return None;
        }
        Some(CandidateTool {
            source: SOURCE.to_string(),
            slug,
            raw_payload: json!({
                "title": entry.title,
                "summary": entry.summary,
                "categories": entry.categories,
                "id": entry.id,
            }),
            discovered_at: Utc::now(),
            // Relevance ordering from the feed position is enough
            score: 0,
        })
    }
}

impl Default for ArxivSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoverySource for ArxivSource {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn fetch(&self) -> Result<Vec<CandidateTool>> {
        let search = self
            .categories
            .iter()
            .map(|c| format!("cat:{}", c))
            .collect::<Vec<_>>()
            .join("+OR+");
        let url = format!(
            "{}/api/query?search_query={}&sortBy=submittedDate&sortOrder=descending&max_results=50",
            self.base_url, search
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(TaskError::transport)?;
        if !response.status().is_success() {
            return Err(TaskError::Retryable(format!(
                "arxiv returned {}",
                response.status()
            )));
        }

        let xml = response.text().await.map_err(TaskError::transport)?;
        let candidates: Vec<CandidateTool> = Self::parse_feed(&xml)
            .into_iter()
            .filter_map(Self::entry_to_candidate)
            .collect();
        debug!(count = candidates.len(), "arxiv fetch complete");
        Ok(candidates)
    }

    fn quality_gate(&self, candidate: &CandidateTool) -> bool {
        candidate
            .raw_payload
            .get("categories")
            .and_then(|v| v.as_array())
            .map(|categories| {
                categories
                    .iter()
                    .filter_map(|c| c.as_str())
                    .any(|c| self.categories.iter().any(|want| want == c))
            })
            .unwrap_or(false)
    }
}
