use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    AnalyzeResult, FetchDemographicsResult, FetchMonthlyResult, FetchPagesResult, RefreshResult,
    SummaryResult,
};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch_pages(result: &FetchPagesResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fetch_demographics(result: &FetchDemographicsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fetch_monthly(result: &FetchMonthlyResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_refresh(result: &RefreshResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_analyze(result: &AnalyzeResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_summary(result: &SummaryResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
