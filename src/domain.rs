use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TrafficError;

/// NCBI taxonomy identifier. Always a non-empty string of ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaxId(String);

impl TaxId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxId {
    type Err = TrafficError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(TrafficError::InvalidTaxId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Assembly page identifier as it appears in site URLs. Underscores may
/// stand in for the version dot of the NCBI accession, e.g.
/// `GCA_001008285_1` for accession `GCA_001008285.1`. The id is otherwise
/// an opaque token up to the next `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssemblyId(String);

impl AssemblyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The NCBI accession form of this id: when the token carries a
    /// version suffix after a second underscore, that underscore becomes
    /// the version dot. Ids without a version suffix pass through.
    pub fn accession(&self) -> String {
        let underscores = self.0.matches('_').count();
        if underscores < 2 {
            return self.0.clone();
        }
        match self.0.rsplit_once('_') {
            Some((head, version))
                if !version.is_empty() && version.chars().all(|ch| ch.is_ascii_digit()) =>
            {
                format!("{head}.{version}")
            }
            _ => self.0.clone(),
        }
    }

    /// Inverse of [`accession`](Self::accession): maps an NCBI accession
    /// back to the URL token form used by the site.
    pub fn from_accession(accession: &str) -> Self {
        Self(accession.replace('.', "_"))
    }
}

impl fmt::Display for AssemblyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssemblyId {
    type Err = TrafficError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.contains('/') {
            return Err(TrafficError::InvalidAssemblyId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// One parsed line of a top-pages export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageVisitRow {
    pub url: String,
    pub visitors: u64,
    pub pageviews: u64,
    pub time_on_page: Option<u64>,
}

/// Parse a time-on-page cell like `7m 38s`, `17s`, or `-` into seconds.
pub fn parse_time_on_page(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return None;
    }

    let minutes_re = Regex::new(r"(\d+)m").unwrap();
    let seconds_re = Regex::new(r"(\d+)s").unwrap();

    let mut seconds = 0u64;
    let mut matched = false;
    if let Some(caps) = minutes_re.captures(trimmed) {
        seconds += caps[1].parse::<u64>().unwrap_or(0) * 60;
        matched = true;
    }
    if let Some(caps) = seconds_re.captures(trimmed) {
        seconds += caps[1].parse::<u64>().unwrap_or(0);
        matched = true;
    }

    matched.then_some(seconds)
}

/// Format seconds as `7m 38s` or `17s` for report tables.
pub fn format_time_on_page(seconds: u64) -> String {
    let minutes = seconds / 60;
    let secs = seconds % 60;
    if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Format seconds for export files, zero-padding the seconds field the
/// way the Plausible export does (`2m 05s`). `None` and zero render `-`.
pub fn format_time_padded(seconds: Option<f64>) -> String {
    let seconds = match seconds {
        Some(value) if value > 0.0 => value as u64,
        _ => return "-".to_string(),
    };
    let minutes = seconds / 60;
    let secs = seconds % 60;
    if minutes > 0 {
        format!("{minutes}m {secs:02}s")
    } else {
        format!("{secs}s")
    }
}

/// Format a bounce rate percentage for export files. Missing renders `-`.
pub fn format_bounce_rate(rate: Option<f64>) -> String {
    match rate {
        Some(value) => format!("{}%", value.round() as i64),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_tax_id_valid() {
        let id: TaxId = "9606".parse().unwrap();
        assert_eq!(id.as_str(), "9606");
    }

    #[test]
    fn parse_tax_id_invalid() {
        let err = "GCA_123".parse::<TaxId>().unwrap_err();
        assert_matches!(err, TrafficError::InvalidTaxId(_));
    }

    #[test]
    fn assembly_accession_restores_version_dot() {
        let id: AssemblyId = "GCA_001008285_1".parse().unwrap();
        assert_eq!(id.accession(), "GCA_001008285.1");
    }

    #[test]
    fn assembly_accession_without_version_passes_through() {
        let id: AssemblyId = "GCA_001008285".parse().unwrap();
        assert_eq!(id.accession(), "GCA_001008285");
    }

    #[test]
    fn assembly_from_accession_round_trip() {
        let id = AssemblyId::from_accession("GCF_000005845.2");
        assert_eq!(id.as_str(), "GCF_000005845_2");
        assert_eq!(id.accession(), "GCF_000005845.2");
    }

    #[test]
    fn parse_time_variants() {
        assert_eq!(parse_time_on_page("7m 38s"), Some(458));
        assert_eq!(parse_time_on_page("17s"), Some(17));
        assert_eq!(parse_time_on_page("2m"), Some(120));
        assert_eq!(parse_time_on_page("-"), None);
        assert_eq!(parse_time_on_page(""), None);
    }

    #[test]
    fn format_time_variants() {
        assert_eq!(format_time_on_page(458), "7m 38s");
        assert_eq!(format_time_on_page(17), "17s");
        assert_eq!(format_time_padded(Some(125.0)), "2m 05s");
        assert_eq!(format_time_padded(Some(45.0)), "45s");
        assert_eq!(format_time_padded(None), "-");
        assert_eq!(format_time_padded(Some(0.0)), "-");
    }

    #[test]
    fn format_bounce_variants() {
        assert_eq!(format_bounce_rate(Some(63.6)), "64%");
        assert_eq!(format_bounce_rate(None), "-");
    }
}
