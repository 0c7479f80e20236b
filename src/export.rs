use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use regex::Regex;

use crate::domain::{PageVisitRow, parse_time_on_page};
use crate::error::TrafficError;

/// Parse a top-pages export file. The header row is skipped; blank lines,
/// rows with fewer than three columns, and rows with non-numeric
/// visitor/pageview fields are dropped row-by-row without failing the
/// file. No partial-row salvage is attempted.
pub fn read_export(path: &Utf8Path) -> Result<Vec<PageVisitRow>, TrafficError> {
    if !path.as_std_path().exists() {
        return Err(TrafficError::DataFileNotFound(path.to_string()));
    }
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| TrafficError::Filesystem(err.to_string()))?;

    let mut rows = Vec::new();
    for line in content.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 3 {
            continue;
        }
        let (Ok(visitors), Ok(pageviews)) = (parts[1].parse::<u64>(), parts[2].parse::<u64>())
        else {
            continue;
        };
        rows.push(PageVisitRow {
            url: parts[0].to_string(),
            visitors,
            pageviews,
            time_on_page: parts.get(4).and_then(|cell| parse_time_on_page(cell)),
        });
    }
    Ok(rows)
}

pub fn top_pages_file_name(range_label: &str) -> String {
    format!("top-pages-{range_label}.tab")
}

pub fn demographics_file_name(kind: &str, range_label: &str) -> String {
    format!("demographics-{kind}-{range_label}.tab")
}

/// One monthly export discovered in the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthFile {
    pub year: i32,
    pub month: u32,
    pub path: Utf8PathBuf,
}

impl MonthFile {
    pub fn label(&self) -> String {
        month_label(self.year, self.month)
    }
}

/// Scan the data directory for monthly export files
/// (`top-pages-YYYY-MM-DD-to-YYYY-MM-DD.tab`), ordered chronologically by
/// their start month.
pub fn month_files(data_dir: &Utf8Path) -> Result<Vec<MonthFile>, TrafficError> {
    if !data_dir.as_std_path().exists() {
        return Err(TrafficError::DataDirNotFound(data_dir.to_string()));
    }
    let pattern =
        Regex::new(r"^top-pages-(\d{4})-(\d{2})-\d{2}-to-\d{4}-\d{2}-\d{2}\.tab$").unwrap();

    let entries = fs::read_dir(data_dir.as_std_path())
        .map_err(|err| TrafficError::Filesystem(err.to_string()))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| TrafficError::Filesystem(err.to_string()))?;
        let path = match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(path) => path,
            Err(_) => continue,
        };
        let Some(name) = path.file_name() else {
            continue;
        };
        if let Some(caps) = pattern.captures(name) {
            let year: i32 = caps[1].parse().unwrap_or(0);
            let month: u32 = caps[2].parse().unwrap_or(0);
            if (1..=12).contains(&month) {
                files.push(MonthFile { year, month, path });
            }
        }
    }
    files.sort_by_key(|file| (file.year, file.month));
    Ok(files)
}

/// `(2024, 10)` -> `"Oct 2024"`.
pub fn month_label(year: i32, month: u32) -> String {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|date| date.format("%b %Y").to_string())
        .unwrap_or_else(|| format!("{year}-{month:02}"))
}

/// First and last day of a month as `YYYY-MM-DD` strings.
pub fn month_range(year: i32, month: u32) -> Result<(String, String), TrafficError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| TrafficError::InvalidMonth(format!("{year}-{month:02}")))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| TrafficError::InvalidMonth(format!("{year}-{month:02}")))?;
    let last = next.pred_opt().unwrap_or(first);
    Ok((first.to_string(), last.to_string()))
}

/// Parse a `YYYY-MM` month argument.
pub fn parse_month(value: &str) -> Result<(i32, u32), TrafficError> {
    let invalid = || TrafficError::InvalidMonth(value.to_string());
    let (year, month) = value.split_once('-').ok_or_else(invalid)?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month))
}

/// Iterate months from start to end, inclusive.
pub fn iter_months(
    start: (i32, u32),
    end: (i32, u32),
) -> impl Iterator<Item = (i32, u32)> {
    let mut current = start;
    std::iter::from_fn(move || {
        if current > end {
            return None;
        }
        let item = current;
        current = if current.1 == 12 {
            (current.0 + 1, 1)
        } else {
            (current.0, current.1 + 1)
        };
        Some(item)
    })
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn month_range_handles_year_ends() {
        assert_eq!(
            month_range(2024, 12).unwrap(),
            ("2024-12-01".to_string(), "2024-12-31".to_string())
        );
        assert_eq!(
            month_range(2024, 2).unwrap(),
            ("2024-02-01".to_string(), "2024-02-29".to_string())
        );
    }

    #[test]
    fn iter_months_crosses_year_boundary() {
        let months: Vec<(i32, u32)> = iter_months((2024, 11), (2025, 2)).collect();
        assert_eq!(months, vec![(2024, 11), (2024, 12), (2025, 1), (2025, 2)]);
    }

    #[test]
    fn parse_month_rejects_garbage() {
        assert!(parse_month("2024-13").is_err());
        assert!(parse_month("October").is_err());
        assert_eq!(parse_month("2024-10").unwrap(), (2024, 10));
    }

    #[test]
    fn month_files_sorted_by_start_month() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        for name in [
            "top-pages-2025-01-01-to-2025-01-31.tab",
            "top-pages-2024-10-01-to-2024-10-31.tab",
            "top-pages-all-time.tab",
            "demographics-countries-2024-10-01-to-2024-10-31.tab",
        ] {
            std::fs::write(dir.join(name).as_std_path(), "Page url\tVisitors\tPageviews\n")
                .unwrap();
        }

        let files = month_files(&dir).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!((files[0].year, files[0].month), (2024, 10));
        assert_eq!((files[1].year, files[1].month), (2025, 1));
        assert_eq!(files[0].label(), "Oct 2024");
    }

    #[test]
    fn read_export_skips_malformed_rows() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("pages.tab")).unwrap();
        std::fs::write(
            path.as_std_path(),
            "Page url\tVisitors\tPageviews\tBounce rate\tTime on Page\n\
             /data/organisms/9606\t100\t150\t-\t2m 30s\n\
             \n\
             /broken\tnot-a-number\t5\t-\t-\n\
             /short\t3\n\
             /about\t40\t60\t10%\t45s\n",
        )
        .unwrap();

        let rows = read_export(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].url, "/data/organisms/9606");
        assert_eq!(rows[0].time_on_page, Some(150));
        assert_eq!(rows[1].url, "/about");
        assert_eq!(rows[1].time_on_page, Some(45));
    }
}
