use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use brc_traffic_reports::app::App;
use brc_traffic_reports::cache::{AssemblyEntry, TaxonomyEntry};
use brc_traffic_reports::config::SettingsLoader;
use brc_traffic_reports::domain::{AssemblyId, TaxId};
use brc_traffic_reports::error::TrafficError;
use brc_traffic_reports::ncbi::{NcbiHttpClient, Pacer, TaxonomyResolver};
use brc_traffic_reports::output::JsonOutput;
use brc_traffic_reports::plausible::{
    AnalyticsClient, BreakdownRow, DateRange, PlausibleHttpClient,
};
use brc_traffic_reports::store::Store;

const PERIOD_PRESETS: &[&str] = &[
    "day", "7d", "28d", "30d", "91d", "month", "6mo", "12mo", "year", "all",
];

#[derive(Parser)]
#[command(name = "brc-traffic")]
#[command(about = "Fetch, classify, and report web traffic for a genomics data-browsing site")]
#[command(version, author)]
struct Cli {
    /// Settings file path (default: brc-traffic.json if present)
    #[arg(long, global = true)]
    settings: Option<String>,

    /// Override the fetched-data directory (default: data/fetched)
    #[arg(long, global = true)]
    data_dir: Option<Utf8PathBuf>,

    /// Override the taxonomy cache directory (default: .taxonomy_cache)
    #[arg(long, global = true)]
    cache_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch data from the analytics API")]
    Fetch(FetchArgs),
    #[command(about = "Manage the taxonomy cache")]
    Taxonomy(TaxonomyArgs),
    #[command(about = "Generate organism and workflow analysis reports for one export")]
    Analyze(AnalyzeArgs),
    #[command(about = "Generate the cross-month traffic summary")]
    Summary(SummaryArgs),
}

#[derive(Args)]
struct FetchArgs {
    #[command(subcommand)]
    command: FetchCommand,
}

#[derive(Subcommand)]
enum FetchCommand {
    #[command(about = "Fetch top pages for a date range")]
    Pages(RangeArgs),
    #[command(about = "Fetch country/device/browser/source breakdowns")]
    Demographics(DemographicsArgs),
    #[command(about = "Fetch per-month exports, skipping months already on disk")]
    Monthly(MonthlyArgs),
}

#[derive(Args, Clone)]
struct RangeArgs {
    /// Preset period (day, 7d, 28d, 30d, 91d, month, 6mo, 12mo, year, all)
    #[arg(long, conflicts_with_all = ["start", "end"])]
    period: Option<String>,

    /// Start date (YYYY-MM-DD); requires --end
    #[arg(long, requires = "end")]
    start: Option<String>,

    /// End date (YYYY-MM-DD); requires --start
    #[arg(long, requires = "start")]
    end: Option<String>,

    /// Maximum number of pages to fetch
    #[arg(long, default_value_t = 10_000)]
    limit: usize,

    /// Output file path (default: auto-generated in the data directory)
    #[arg(long, short)]
    output: Option<Utf8PathBuf>,
}

#[derive(Args, Clone)]
struct DemographicsArgs {
    #[arg(long, conflicts_with_all = ["start", "end"])]
    period: Option<String>,

    #[arg(long, requires = "end")]
    start: Option<String>,

    #[arg(long, requires = "start")]
    end: Option<String>,
}

#[derive(Args, Clone)]
struct MonthlyArgs {
    /// Start month (YYYY-MM; default: site launch month)
    #[arg(long)]
    start_month: Option<String>,

    /// End month (YYYY-MM; default: previous month)
    #[arg(long)]
    end_month: Option<String>,

    /// Also fetch an all-time export
    #[arg(long)]
    include_all_time: bool,
}

#[derive(Args)]
struct TaxonomyArgs {
    #[command(subcommand)]
    command: TaxonomyCommand,
}

#[derive(Subcommand)]
enum TaxonomyCommand {
    #[command(about = "Fetch missing taxonomy/assembly entries and save a new snapshot")]
    Refresh(RefreshArgs),
}

#[derive(Args, Clone)]
struct RefreshArgs {
    /// Re-fetch everything into a fresh snapshot
    #[arg(long)]
    force_refresh: bool,

    /// Use a specific cache version as the base snapshot
    #[arg(long)]
    cache_version: Option<String>,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Tab-separated export file to analyze
    input: Utf8PathBuf,

    /// Directory for the rendered reports (default: output/)
    #[arg(long)]
    output_dir: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct SummaryArgs {
    /// Output file (default: print to stdout)
    #[arg(long, short)]
    output: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<TrafficError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &TrafficError) -> u8 {
    match error {
        TrafficError::MissingApiKey
        | TrafficError::MissingSiteId
        | TrafficError::InvalidBaseUrl(_)
        | TrafficError::SettingsRead(_)
        | TrafficError::SettingsParse(_)
        | TrafficError::DataFileNotFound(_)
        | TrafficError::DataDirNotFound(_) => 2,
        TrafficError::PlausibleHttp(_)
        | TrafficError::PlausibleStatus { .. }
        | TrafficError::NcbiHttp(_)
        | TrafficError::NcbiStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = SettingsLoader::resolve(cli.settings.as_deref()).into_diagnostic()?;
    let store = build_store(cli.data_dir.as_deref(), cli.cache_dir.as_deref()).into_diagnostic()?;

    match cli.command {
        Commands::Fetch(args) => match args.command {
            FetchCommand::Pages(range_args) => {
                let range =
                    resolve_range(&range_args.period, &range_args.start, &range_args.end)?;
                let analytics = PlausibleHttpClient::new(&settings).into_diagnostic()?;
                let app = App::new(store, settings, analytics, NopResolver, Pacer::unpaced());
                let result = app
                    .fetch_pages(&range, range_args.limit, range_args.output)
                    .into_diagnostic()?;
                JsonOutput::print_fetch_pages(&result).into_diagnostic()?;
                Ok(())
            }
            FetchCommand::Demographics(demo_args) => {
                let range = resolve_range(&demo_args.period, &demo_args.start, &demo_args.end)?;
                let analytics = PlausibleHttpClient::new(&settings).into_diagnostic()?;
                let app = App::new(store, settings, analytics, NopResolver, Pacer::unpaced());
                let result = app.fetch_demographics(&range).into_diagnostic()?;
                JsonOutput::print_fetch_demographics(&result).into_diagnostic()?;
                Ok(())
            }
            FetchCommand::Monthly(monthly_args) => {
                let analytics = PlausibleHttpClient::new(&settings).into_diagnostic()?;
                let app = App::new(store, settings, analytics, NopResolver, Pacer::unpaced());
                let result = app
                    .fetch_monthly(
                        monthly_args.start_month.as_deref(),
                        monthly_args.end_month.as_deref(),
                        monthly_args.include_all_time,
                    )
                    .into_diagnostic()?;
                JsonOutput::print_fetch_monthly(&result).into_diagnostic()?;
                Ok(())
            }
        },
        Commands::Taxonomy(args) => match args.command {
            TaxonomyCommand::Refresh(refresh_args) => {
                let resolver = NcbiHttpClient::new().into_diagnostic()?;
                let mut app =
                    App::new(store, settings, NopAnalytics, resolver, Pacer::ncbi_default());
                let result = app
                    .refresh_taxonomy(
                        refresh_args.force_refresh,
                        refresh_args.cache_version.as_deref(),
                    )
                    .into_diagnostic()?;
                JsonOutput::print_refresh(&result).into_diagnostic()?;
                Ok(())
            }
        },
        Commands::Analyze(args) => {
            let resolver = NcbiHttpClient::new().into_diagnostic()?;
            let mut app = App::new(store, settings, NopAnalytics, resolver, Pacer::ncbi_default());
            let result = app
                .analyze(&args.input, args.output_dir.as_deref())
                .into_diagnostic()?;
            JsonOutput::print_analyze(&result).into_diagnostic()?;
            Ok(())
        }
        Commands::Summary(args) => {
            let app = App::new(store, settings, NopAnalytics, NopResolver, Pacer::unpaced());
            let result = app.summary(args.output.as_deref()).into_diagnostic()?;
            if result.path.is_none() {
                println!("{}", result.report);
            } else {
                JsonOutput::print_summary(&result).into_diagnostic()?;
            }
            Ok(())
        }
    }
}

fn build_store(
    data_dir: Option<&Utf8Path>,
    cache_dir: Option<&Utf8Path>,
) -> Result<Store, TrafficError> {
    let default = Store::new()?;
    Ok(Store::new_with_paths(
        data_dir.map(Utf8Path::to_owned).unwrap_or_else(|| default.data_dir().to_owned()),
        default.output_dir().to_owned(),
        cache_dir.map(Utf8Path::to_owned).unwrap_or_else(|| default.cache_dir().to_owned()),
    ))
}

fn resolve_range(
    period: &Option<String>,
    start: &Option<String>,
    end: &Option<String>,
) -> miette::Result<DateRange> {
    match (period, start, end) {
        (Some(period), None, None) => {
            if !PERIOD_PRESETS.contains(&period.as_str()) {
                return Err(miette::Report::msg(format!(
                    "unknown period '{period}' (expected one of: {})",
                    PERIOD_PRESETS.join(", ")
                )));
            }
            Ok(DateRange::Period(period.clone()))
        }
        (None, Some(start), Some(end)) => DateRange::custom(start, end).into_diagnostic(),
        _ => Err(miette::Report::msg(
            "a date range is required: --period P, or --start D --end D",
        )),
    }
}

#[derive(Clone, Copy)]
struct NopAnalytics;

impl AnalyticsClient for NopAnalytics {
    fn breakdown(
        &self,
        _property: &str,
        _range: &DateRange,
        _limit: usize,
    ) -> Result<Vec<BreakdownRow>, TrafficError> {
        Err(TrafficError::PlausibleHttp(
            "analytics client not configured".to_string(),
        ))
    }
}

#[derive(Clone, Copy)]
struct NopResolver;

impl TaxonomyResolver for NopResolver {
    fn resolve_taxon(&self, _tax_id: &TaxId) -> TaxonomyEntry {
        TaxonomyEntry {
            name: "Unknown".to_string(),
            lineage: "Unknown".to_string(),
            fetched_at: chrono::Utc::now().to_rfc3339(),
            error: Some("taxonomy resolver not configured".to_string()),
        }
    }

    fn resolve_assembly(&self, _assembly_id: &AssemblyId) -> AssemblyEntry {
        AssemblyEntry {
            tax_id: None,
            name: "Unknown".to_string(),
            lineage: "Unknown".to_string(),
            fetched_at: chrono::Utc::now().to_rfc3339(),
            error: Some("taxonomy resolver not configured".to_string()),
        }
    }

    fn assemblies_for_taxon(&self, _tax_id: &TaxId) -> Vec<AssemblyId> {
        Vec::new()
    }
}
