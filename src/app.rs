use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::Aggregation;
use crate::cache::{Snapshot, TaxonomyCache, source_data_hash};
use crate::config::Settings;
use crate::domain::{AssemblyId, TaxId};
use crate::error::TrafficError;
use crate::export::{
    demographics_file_name, iter_months, month_files, month_range, parse_month, read_export,
    top_pages_file_name,
};
use crate::ncbi::{Pacer, TaxonomyResolver};
use crate::plausible::{
    AnalyticsClient, DEMOGRAPHIC_PROPERTIES, DateRange, breakdown_to_tsv, pages_to_tsv,
};
use crate::report::{
    MonthSummary, render_monthly_summary, render_organism_analysis, render_workflow_analysis,
};
use crate::router::{PageCategory, PageRouter};
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct FetchPagesResult {
    pub rows: usize,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchDemographicsResult {
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthFetchItem {
    pub month: String,
    pub action: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchMonthlyResult {
    pub items: Vec<MonthFetchItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshResult {
    pub required_tax_ids: usize,
    pub required_assembly_ids: usize,
    pub fetched_tax_ids: usize,
    pub fetched_assembly_ids: usize,
    pub snapshot_path: Option<String>,
    pub up_to_date: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResult {
    pub organism_report: String,
    pub workflow_report: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResult {
    pub months: usize,
    pub path: Option<String>,
    #[serde(skip)]
    pub report: String,
}

pub struct App<A: AnalyticsClient, R: TaxonomyResolver> {
    store: Store,
    settings: Settings,
    analytics: A,
    resolver: R,
    pacer: Pacer,
    router: PageRouter,
}

impl<A: AnalyticsClient, R: TaxonomyResolver> App<A, R> {
    pub fn new(store: Store, settings: Settings, analytics: A, resolver: R, pacer: Pacer) -> Self {
        Self {
            store,
            settings,
            analytics,
            resolver,
            pacer,
            router: PageRouter::new(),
        }
    }

    pub fn fetch_pages(
        &self,
        range: &DateRange,
        limit: usize,
        output: Option<Utf8PathBuf>,
    ) -> Result<FetchPagesResult, TrafficError> {
        let rows = self.analytics.breakdown("event:page", range, limit)?;
        if rows.is_empty() {
            warn!("no results returned from the analytics API");
        }

        let path = match output {
            Some(path) => path,
            None => {
                self.store.ensure_data_dir()?;
                self.store
                    .export_path(&top_pages_file_name(&range.file_label()))
            }
        };
        Store::write_text_atomic(&path, &pages_to_tsv(&rows))?;
        info!("saved {} pages to {path}", rows.len());

        Ok(FetchPagesResult {
            rows: rows.len(),
            path: path.to_string(),
        })
    }

    pub fn fetch_demographics(
        &self,
        range: &DateRange,
    ) -> Result<FetchDemographicsResult, TrafficError> {
        self.store.ensure_data_dir()?;
        let label = range.file_label();
        let mut files = Vec::new();

        for &(property, kind) in DEMOGRAPHIC_PROPERTIES {
            let rows = self.analytics.breakdown(property, range, 1000)?;
            if rows.is_empty() {
                info!("no data found for {kind}");
                continue;
            }
            let path = self.store.export_path(&demographics_file_name(kind, &label));
            let label_cell = property.strip_prefix("visit:").unwrap_or(property);
            Store::write_text_atomic(&path, &breakdown_to_tsv(label_cell, &rows))?;
            info!("saved {} rows to {path}", rows.len());
            files.push(path.to_string());
        }

        Ok(FetchDemographicsResult { files })
    }

    /// Fetch per-month exports (pages plus demographics) for the given
    /// month range, skipping months whose files already exist. The end
    /// month defaults to the previous calendar month so only complete
    /// months are fetched.
    pub fn fetch_monthly(
        &self,
        start_month: Option<&str>,
        end_month: Option<&str>,
        include_all_time: bool,
    ) -> Result<FetchMonthlyResult, TrafficError> {
        let start = match start_month {
            Some(month) => parse_month(month)?,
            None => parse_month(&self.settings.site_launch_month)?,
        };
        let end = match end_month {
            Some(month) => parse_month(month)?,
            None => previous_month(),
        };

        self.store.ensure_data_dir()?;
        let mut items = Vec::new();

        for (year, month) in iter_months(start, end) {
            let (first_day, last_day) = month_range(year, month)?;
            let month_name = crate::export::month_label(year, month);
            let range = DateRange::custom(&first_day, &last_day)?;

            let pages_path = self
                .store
                .export_path(&top_pages_file_name(&range.file_label()));
            if pages_path.as_std_path().exists() {
                info!("{month_name}: export already exists");
                items.push(MonthFetchItem {
                    month: month_name.clone(),
                    action: "exists".to_string(),
                    path: pages_path.to_string(),
                });
            } else {
                info!("{month_name}: fetching pages {first_day} to {last_day}");
                let result = self.fetch_pages(&range, 10_000, Some(pages_path.clone()))?;
                items.push(MonthFetchItem {
                    month: month_name.clone(),
                    action: "fetched".to_string(),
                    path: result.path,
                });
            }

            // One file stands proxy for the whole demographics set.
            let demographics_probe = self
                .store
                .export_path(&demographics_file_name("countries", &range.file_label()));
            if !demographics_probe.as_std_path().exists() {
                info!("{month_name}: fetching demographics");
                self.fetch_demographics(&range)?;
            }
        }

        if include_all_time {
            let start_day = format!("{}-01", self.settings.site_launch_month);
            let end_day = chrono::Utc::now().format("%Y-%m-%d").to_string();
            let range = DateRange::custom(&start_day, &end_day)?;

            let all_time_path = self.store.export_path("top-pages-all-time.tab");
            if all_time_path.as_std_path().exists() {
                info!("all-time export already exists (delete the file to re-fetch)");
                items.push(MonthFetchItem {
                    month: "all-time".to_string(),
                    action: "exists".to_string(),
                    path: all_time_path.to_string(),
                });
            } else {
                let result = self.fetch_pages(&range, 10_000, Some(all_time_path))?;
                items.push(MonthFetchItem {
                    month: "all-time".to_string(),
                    action: "fetched".to_string(),
                    path: result.path,
                });
            }
            // "All time" shifts daily, so demographics are always refreshed.
            self.fetch_demographics(&range)?;
        }

        Ok(FetchMonthlyResult { items })
    }

    /// Scan every fetched export for required IDs and bring the taxonomy
    /// cache up to cover them, saving a new versioned snapshot when
    /// anything was missing. Individual lookup failures degrade to
    /// `Unknown` entries and never abort the batch.
    pub fn refresh_taxonomy(
        &mut self,
        force: bool,
        base_version: Option<&str>,
    ) -> Result<RefreshResult, TrafficError> {
        let (tax_ids, assembly_ids) = self.scan_required_ids()?;
        info!(
            "found {} unique tax ids and {} unique assembly ids",
            tax_ids.len(),
            assembly_ids.len()
        );

        let cache = TaxonomyCache::new(self.store.cache_dir().to_owned());
        let mut snapshot = if force {
            Snapshot::default()
        } else {
            cache.load(base_version)
        };

        let missing = TaxonomyCache::scan_missing(&snapshot, &tax_ids, &assembly_ids);
        if missing.is_empty() && !force {
            info!("current snapshot covers all required ids");
            return Ok(RefreshResult {
                required_tax_ids: tax_ids.len(),
                required_assembly_ids: assembly_ids.len(),
                fetched_tax_ids: 0,
                fetched_assembly_ids: 0,
                snapshot_path: None,
                up_to_date: true,
            });
        }

        info!(
            "fetching {} tax ids and {} assembly ids",
            missing.tax_ids.len(),
            missing.assembly_ids.len()
        );
        for (index, tax_id) in missing.tax_ids.iter().enumerate() {
            self.pacer.pace();
            info!("[{}/{}] tax id {tax_id}", index + 1, missing.tax_ids.len());
            let entry = self.resolver.resolve_taxon(tax_id);
            snapshot.taxonomy.insert(tax_id.as_str().to_string(), entry);
        }
        for (index, assembly_id) in missing.assembly_ids.iter().enumerate() {
            self.pacer.pace();
            info!(
                "[{}/{}] assembly {assembly_id}",
                index + 1,
                missing.assembly_ids.len()
            );
            let entry = self.resolver.resolve_assembly(assembly_id);
            snapshot
                .assembly
                .insert(assembly_id.as_str().to_string(), entry);
        }

        snapshot.fill_assembly_lineages();
        snapshot.source_data_hash = Some(source_data_hash(&tax_ids, &assembly_ids));

        let path = cache.save(&mut snapshot, None)?;
        info!("saved snapshot {path}");

        Ok(RefreshResult {
            required_tax_ids: tax_ids.len(),
            required_assembly_ids: assembly_ids.len(),
            fetched_tax_ids: missing.tax_ids.len(),
            fetched_assembly_ids: missing.assembly_ids.len(),
            snapshot_path: Some(path.to_string()),
            up_to_date: false,
        })
    }

    /// Render the organism and workflow analysis reports for one export.
    pub fn analyze(
        &mut self,
        input: &Utf8Path,
        output_dir: Option<&Utf8Path>,
    ) -> Result<AnalyzeResult, TrafficError> {
        let rows = read_export(input)?;
        let agg = Aggregation::from_rows(&rows, &self.router);
        let snapshot = self.load_snapshot();

        // Organisms whose assemblies show up in this export's assembly
        // pages: one taxon listing per organism, paced like any other
        // NCBI batch.
        let assembly_ids_in_data: BTreeSet<AssemblyId> = agg
            .assembly_pages
            .iter()
            .map(|page| page.assembly_id.clone())
            .collect();
        let mut organisms_with_assembly_visits: BTreeSet<TaxId> = BTreeSet::new();
        for tax_id in agg.unique_tax_ids() {
            self.pacer.pace();
            let assemblies = self.resolver.assemblies_for_taxon(&tax_id);
            if assemblies
                .iter()
                .any(|assembly| assembly_ids_in_data.contains(assembly))
            {
                organisms_with_assembly_visits.insert(tax_id);
            }
        }

        let organism_report = render_organism_analysis(
            &agg,
            &snapshot,
            &organisms_with_assembly_visits,
            &self.settings,
        );
        let workflow_report = render_workflow_analysis(&agg, &snapshot, &self.settings);

        let stem = input.file_stem().unwrap_or("analysis");
        let output_dir = match output_dir {
            Some(dir) => dir.to_owned(),
            None => {
                self.store.ensure_output_dir()?;
                self.store.output_dir().to_owned()
            }
        };
        let organism_path = output_dir.join(format!("{stem}-organism-analysis.txt"));
        let workflow_path = output_dir.join(format!("{stem}-workflow-analysis.txt"));
        Store::write_text_atomic(&organism_path, &organism_report)?;
        Store::write_text_atomic(&workflow_path, &workflow_report)?;

        Ok(AnalyzeResult {
            organism_report: organism_path.to_string(),
            workflow_report: workflow_path.to_string(),
        })
    }

    /// Cross-month summary over every monthly export in the data
    /// directory, classified through the latest taxonomy snapshot.
    pub fn summary(&self, output: Option<&Utf8Path>) -> Result<SummaryResult, TrafficError> {
        let files = month_files(self.store.data_dir())?;
        if files.is_empty() {
            return Err(TrafficError::DataFileNotFound(format!(
                "no monthly export files in {}",
                self.store.data_dir()
            )));
        }

        let snapshot = self.load_snapshot();
        let mut months = Vec::new();
        for file in &files {
            info!("processing {}", file.label());
            let rows = read_export(&file.path)?;
            let agg = Aggregation::from_rows(&rows, &self.router);
            months.push(MonthSummary::build(file.label(), &agg, &snapshot));
        }

        let report = render_monthly_summary(&months);
        let path = match output {
            Some(path) => {
                Store::write_text_atomic(path, &report)?;
                info!("report saved to {path}");
                Some(path.to_string())
            }
            None => None,
        };

        Ok(SummaryResult {
            months: months.len(),
            path,
            report,
        })
    }

    /// Unique tax and assembly IDs across every fetched export. Assembly
    /// IDs are collected from assembly and workflow pages alike, since
    /// both need lineage for community rollups.
    fn scan_required_ids(&self) -> Result<(Vec<TaxId>, Vec<AssemblyId>), TrafficError> {
        let data_dir = self.store.data_dir();
        if !data_dir.as_std_path().exists() {
            return Err(TrafficError::DataDirNotFound(data_dir.to_string()));
        }

        let mut tax_ids: BTreeSet<TaxId> = BTreeSet::new();
        let mut assembly_ids: BTreeSet<AssemblyId> = BTreeSet::new();

        let entries = std::fs::read_dir(data_dir.as_std_path())
            .map_err(|err| TrafficError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| TrafficError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            let Some(name) = path.file_name() else {
                continue;
            };
            if !name.starts_with("top-pages-") || !name.ends_with(".tab") {
                continue;
            }
            for row in read_export(&path)? {
                match self.router.classify(&row.url) {
                    PageCategory::Organism(tax_id) => {
                        tax_ids.insert(tax_id);
                    }
                    PageCategory::Assembly(assembly_id) => {
                        assembly_ids.insert(assembly_id);
                    }
                    PageCategory::Workflow(assembly_id, _) => {
                        assembly_ids.insert(assembly_id);
                    }
                    _ => {}
                }
            }
        }

        Ok((
            tax_ids.into_iter().collect(),
            assembly_ids.into_iter().collect(),
        ))
    }

    /// Taxonomy enrichment is an enhancement, not a correctness
    /// dependency: a missing or unreadable cache yields an empty snapshot
    /// and every lookup degrades to `Unknown`.
    fn load_snapshot(&self) -> Snapshot {
        TaxonomyCache::new(self.store.cache_dir().to_owned()).load(None)
    }
}

fn previous_month() -> (i32, u32) {
    use chrono::Datelike;
    let today = chrono::Utc::now();
    if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    }
}
