use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use crate::config::Settings;
use crate::domain::{format_bounce_rate, format_time_padded};
use crate::error::TrafficError;

const METRICS: &str = "visitors,pageviews,bounce_rate,visit_duration";
// The v1 breakdown endpoint caps page size at 1000.
const MAX_PAGE_SIZE: usize = 1000;

/// Breakdown properties fetched by the demographics command, with the
/// file-name slug each one is saved under.
pub const DEMOGRAPHIC_PROPERTIES: &[(&str, &str)] = &[
    ("visit:country", "countries"),
    ("visit:device", "devices"),
    ("visit:browser", "browsers"),
    ("visit:source", "sources"),
];

/// Query window for a stats request: either a Plausible preset period or
/// a custom day range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateRange {
    Period(String),
    Custom { start: NaiveDate, end: NaiveDate },
}

impl DateRange {
    pub fn custom(start: &str, end: &str) -> Result<Self, TrafficError> {
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
            .map_err(|_| TrafficError::InvalidDate(start.to_string()))?;
        let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")
            .map_err(|_| TrafficError::InvalidDate(end.to_string()))?;
        Ok(DateRange::Custom { start, end })
    }

    /// Label used in generated file names, e.g. `2024-10-01-to-2024-10-31`
    /// for custom ranges or `30d-22-dec-2025` for presets.
    pub fn file_label(&self) -> String {
        match self {
            DateRange::Custom { start, end } => format!("{start}-to-{end}"),
            DateRange::Period(period) => {
                let today = chrono::Utc::now().format("%d-%b-%Y").to_string().to_lowercase();
                format!("{period}-{today}")
            }
        }
    }

    fn query_params(&self) -> Vec<(&'static str, String)> {
        match self {
            DateRange::Period(period) => vec![("period", period.clone())],
            DateRange::Custom { start, end } => vec![
                ("period", "custom".to_string()),
                ("date", format!("{start},{end}")),
            ],
        }
    }
}

/// One row of a stats breakdown, keyed by whatever dimension was queried
/// (page path, country, device, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct BreakdownRow {
    pub dimension: String,
    pub visitors: u64,
    pub pageviews: u64,
    pub bounce_rate: Option<f64>,
    pub visit_duration: Option<f64>,
}

pub trait AnalyticsClient: Send + Sync {
    /// Fetch a full breakdown for one property, following pagination
    /// until the API returns a short page.
    fn breakdown(
        &self,
        property: &str,
        range: &DateRange,
        limit: usize,
    ) -> Result<Vec<BreakdownRow>, TrafficError>;
}

#[derive(Clone)]
pub struct PlausibleHttpClient {
    client: Client,
    base_url: String,
    site_id: String,
}

impl PlausibleHttpClient {
    pub fn new(settings: &Settings) -> Result<Self, TrafficError> {
        let api_key = settings.require_api_key()?;
        let site_id = settings.require_site_id()?;
        let base_url = settings.base_url()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("brc-traffic/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TrafficError::Filesystem(err.to_string()))?,
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| TrafficError::MissingApiKey)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| TrafficError::PlausibleHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url,
            site_id,
        })
    }

    fn fetch_page(
        &self,
        property: &str,
        range: &DateRange,
        limit: usize,
        page: usize,
    ) -> Result<Vec<Value>, TrafficError> {
        let url = format!("{}/api/v1/stats/breakdown", self.base_url);
        let mut params: Vec<(&str, String)> = vec![
            ("site_id", self.site_id.clone()),
            ("property", property.to_string()),
            ("metrics", METRICS.to_string()),
            ("limit", limit.to_string()),
            ("page", page.to_string()),
        ];
        params.extend(range.query_params());

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .map_err(|err| TrafficError::PlausibleHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "Plausible request failed".to_string());
            return Err(TrafficError::PlausibleStatus { status, message });
        }

        let body: Value = response
            .json()
            .map_err(|err| TrafficError::PlausibleHttp(err.to_string()))?;
        Ok(body
            .get("results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

impl AnalyticsClient for PlausibleHttpClient {
    fn breakdown(
        &self,
        property: &str,
        range: &DateRange,
        limit: usize,
    ) -> Result<Vec<BreakdownRow>, TrafficError> {
        let page_size = limit.min(MAX_PAGE_SIZE);
        let mut all_rows = Vec::new();
        let mut page = 1usize;

        loop {
            let results = self.fetch_page(property, range, page_size, page)?;
            let short_page = results.len() < page_size;
            debug!("plausible breakdown {property} page {page}: {} rows", results.len());
            for value in &results {
                if let Some(row) = parse_breakdown_row(value) {
                    all_rows.push(row);
                }
            }
            if results.is_empty() || short_page || all_rows.len() >= limit {
                break;
            }
            page += 1;
        }

        all_rows.truncate(limit);
        Ok(all_rows)
    }
}

/// The dimension key is whichever key is not one of the requested
/// metrics (`page` for event:page, `country` for visit:country, ...).
fn parse_breakdown_row(value: &Value) -> Option<BreakdownRow> {
    let object = value.as_object()?;
    let metrics = ["visitors", "pageviews", "bounce_rate", "visit_duration"];
    let dimension = object
        .iter()
        .find(|(key, _)| !metrics.contains(&key.as_str()))
        .map(|(_, v)| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "Unknown".to_string());

    Some(BreakdownRow {
        dimension,
        visitors: object.get("visitors").and_then(|v| v.as_u64()).unwrap_or(0),
        pageviews: object.get("pageviews").and_then(|v| v.as_u64()).unwrap_or(0),
        bounce_rate: object.get("bounce_rate").and_then(|v| v.as_f64()),
        visit_duration: object.get("visit_duration").and_then(|v| v.as_f64()),
    })
}

/// Render a top-pages breakdown as the tab-separated export format the
/// analysis commands consume.
pub fn pages_to_tsv(rows: &[BreakdownRow]) -> String {
    let mut lines = vec!["Page url\tVisitors\tPageviews\tBounce rate\tTime on Page".to_string()];
    for row in rows {
        lines.push(format!(
            "{}\t{}\t{}\t{}\t{}",
            row.dimension,
            row.visitors,
            row.pageviews,
            format_bounce_rate(row.bounce_rate),
            format_time_padded(row.visit_duration),
        ));
    }
    lines.join("\n") + "\n"
}

/// Render a demographics breakdown (country, device, ...) as TSV.
pub fn breakdown_to_tsv(dimension_label: &str, rows: &[BreakdownRow]) -> String {
    let mut lines = vec![format!(
        "{dimension_label}\tVisitors\tPageviews\tBounce Rate\tDuration"
    )];
    for row in rows {
        lines.push(format!(
            "{}\t{}\t{}\t{}\t{}",
            row.dimension,
            row.visitors,
            row.pageviews,
            format_bounce_rate(row.bounce_rate),
            format_time_padded(row.visit_duration),
        ));
    }
    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_row_picks_non_metric_key() {
        let value: Value = serde_json::json!({
            "page": "/data/organisms/9606",
            "visitors": 100,
            "pageviews": 150,
            "bounce_rate": 63.6,
            "visit_duration": 150.0
        });
        let row = parse_breakdown_row(&value).unwrap();
        assert_eq!(row.dimension, "/data/organisms/9606");
        assert_eq!(row.visitors, 100);
        assert_eq!(row.bounce_rate, Some(63.6));
    }

    #[test]
    fn pages_tsv_formats_missing_as_dash() {
        let rows = vec![BreakdownRow {
            dimension: "/about".to_string(),
            visitors: 12,
            pageviews: 15,
            bounce_rate: None,
            visit_duration: Some(125.0),
        }];
        let tsv = pages_to_tsv(&rows);
        assert_eq!(
            tsv,
            "Page url\tVisitors\tPageviews\tBounce rate\tTime on Page\n/about\t12\t15\t-\t2m 05s\n"
        );
    }

    #[test]
    fn custom_range_labels() {
        let range = DateRange::custom("2024-10-01", "2024-10-31").unwrap();
        assert_eq!(range.file_label(), "2024-10-01-to-2024-10-31");
    }

    #[test]
    fn custom_range_rejects_bad_dates() {
        assert!(DateRange::custom("2024-13-01", "2024-10-31").is_err());
    }
}
