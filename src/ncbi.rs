use std::time::{Duration, Instant};

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use crate::cache::{AssemblyEntry, TaxonomyEntry};
use crate::domain::{AssemblyId, TaxId};
use crate::error::TrafficError;

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const DATASETS_BASE: &str = "https://api.ncbi.nlm.nih.gov/datasets/v2";

/// Resolves taxonomy and assembly metadata from NCBI. Lookups never
/// propagate failures: any timeout, non-success status, or malformed
/// response degrades to an `Unknown` entry carrying the error note, so a
/// single bad lookup cannot stop the rest of a batch.
pub trait TaxonomyResolver: Send + Sync {
    fn resolve_taxon(&self, tax_id: &TaxId) -> TaxonomyEntry;
    fn resolve_assembly(&self, assembly_id: &AssemblyId) -> AssemblyEntry;
    fn assemblies_for_taxon(&self, tax_id: &TaxId) -> Vec<AssemblyId>;
}

/// Caller-side pacing policy for batches of external lookups. NCBI allows
/// roughly three unauthenticated requests per second.
#[derive(Debug, Clone)]
pub struct Pacer {
    min_delay: Duration,
    last_call: Option<Instant>,
}

impl Pacer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_call: None,
        }
    }

    /// Default pacing for NCBI batch drivers.
    pub fn ncbi_default() -> Self {
        Self::new(Duration::from_millis(350))
    }

    /// Zero-delay pacing for tests.
    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Block until at least `min_delay` has passed since the previous
    /// call, then stamp the current call.
    pub fn pace(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                std::thread::sleep(self.min_delay - elapsed);
            }
        }
        self.last_call = Some(Instant::now());
    }
}

#[derive(Clone)]
pub struct NcbiHttpClient {
    client: Client,
}

impl NcbiHttpClient {
    pub fn new() -> Result<Self, TrafficError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("brc-traffic/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TrafficError::Filesystem(err.to_string()))?,
        );

        if let Ok(api_key) = std::env::var("NCBI_API_KEY") {
            if !api_key.trim().is_empty() {
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(api_key.trim())
                        .map_err(|err| TrafficError::Filesystem(err.to_string()))?,
                );
            }
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| TrafficError::NcbiHttp(err.to_string()))?;

        Ok(Self { client })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, TrafficError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(TrafficError::NcbiHttp(err.to_string()));
                }
            }
        }
    }

    fn fetch_text(&self, url: &str) -> Result<String, TrafficError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "NCBI request failed".to_string());
            return Err(TrafficError::NcbiStatus { status, message });
        }
        response
            .text()
            .map_err(|err| TrafficError::NcbiHttp(err.to_string()))
    }

    fn fetch_json(&self, url: &str) -> Result<Value, TrafficError> {
        let response = self.send_with_retries(|| {
            self.client.get(url).header("accept", "application/json")
        })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "NCBI request failed".to_string());
            return Err(TrafficError::NcbiStatus { status, message });
        }
        response
            .json()
            .map_err(|err| TrafficError::NcbiHttp(err.to_string()))
    }

    fn fetch_taxon(&self, tax_id: &TaxId) -> Result<(String, String), TrafficError> {
        let url = format!(
            "{EUTILS_BASE}/efetch.fcgi?db=taxonomy&id={}&retmode=xml",
            tax_id.as_str()
        );
        let xml = self.fetch_text(&url)?;

        let name_re = Regex::new(r"<ScientificName>([^<]+)</ScientificName>").unwrap();
        let lineage_re = Regex::new(r"<Lineage>([^<]+)</Lineage>").unwrap();
        let name = name_re
            .captures(&xml)
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let lineage = lineage_re
            .captures(&xml)
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        Ok((name, lineage))
    }

    fn fetch_assembly(&self, assembly_id: &AssemblyId) -> Result<(Option<String>, String), TrafficError> {
        let url = format!(
            "{DATASETS_BASE}/genome/accession/{}/dataset_report",
            assembly_id.accession()
        );
        let data = self.fetch_json(&url)?;

        let organism = data
            .get("reports")
            .and_then(|v| v.as_array())
            .and_then(|reports| reports.first())
            .and_then(|report| report.get("organism"));
        let Some(organism) = organism else {
            return Ok((None, "Unknown".to_string()));
        };

        let tax_id = organism
            .get("tax_id")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty());
        let name = organism
            .get("organism_name")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string();
        Ok((tax_id, name))
    }
}

impl TaxonomyResolver for NcbiHttpClient {
    fn resolve_taxon(&self, tax_id: &TaxId) -> TaxonomyEntry {
        match self.fetch_taxon(tax_id) {
            Ok((name, lineage)) => {
                debug!("resolved taxon {tax_id}: {name}");
                TaxonomyEntry {
                    name,
                    lineage,
                    fetched_at: iso_timestamp(),
                    error: None,
                }
            }
            Err(err) => TaxonomyEntry {
                name: "Unknown".to_string(),
                lineage: "Unknown".to_string(),
                fetched_at: iso_timestamp(),
                error: Some(err.to_string()),
            },
        }
    }

    fn resolve_assembly(&self, assembly_id: &AssemblyId) -> AssemblyEntry {
        match self.fetch_assembly(assembly_id) {
            Ok((tax_id, name)) => {
                debug!("resolved assembly {assembly_id}: {name}");
                AssemblyEntry {
                    tax_id,
                    name,
                    // Filled from the taxonomy map in a second pass.
                    lineage: "Unknown".to_string(),
                    fetched_at: iso_timestamp(),
                    error: None,
                }
            }
            Err(err) => AssemblyEntry {
                tax_id: None,
                name: "Unknown".to_string(),
                lineage: "Unknown".to_string(),
                fetched_at: iso_timestamp(),
                error: Some(err.to_string()),
            },
        }
    }

    fn assemblies_for_taxon(&self, tax_id: &TaxId) -> Vec<AssemblyId> {
        let url = format!(
            "{DATASETS_BASE}/genome/taxon/{}/dataset_report",
            tax_id.as_str()
        );
        let Ok(data) = self.fetch_json(&url) else {
            return Vec::new();
        };

        data.get("reports")
            .and_then(|v| v.as_array())
            .map(|reports| {
                reports
                    .iter()
                    .filter_map(|report| report.get("accession").and_then(|v| v.as_str()))
                    .map(AssemblyId::from_accession)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
