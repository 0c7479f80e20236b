use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum TrafficError {
    #[error("invalid taxonomy id: {0}")]
    InvalidTaxId(String),

    #[error("invalid assembly id: {0}")]
    InvalidAssemblyId(String),

    #[error("invalid month: {0} (expected YYYY-MM)")]
    InvalidMonth(String),

    #[error("invalid date: {0} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("PLAUSIBLE_API_KEY is not set (or still has a placeholder value)")]
    MissingApiKey,

    #[error("PLAUSIBLE_SITE_ID is not set (or still has a placeholder value)")]
    MissingSiteId,

    #[error("invalid API base url: {0}")]
    InvalidBaseUrl(String),

    #[error("failed to read settings file at {0}")]
    SettingsRead(PathBuf),

    #[error("failed to parse settings file: {0}")]
    SettingsParse(String),

    #[error("Plausible request failed: {0}")]
    PlausibleHttp(String),

    #[error("Plausible returned status {status}: {message}")]
    PlausibleStatus { status: u16, message: String },

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("data file not found: {0}")]
    DataFileNotFound(String),

    #[error("data directory not found: {0}")]
    DataDirNotFound(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
