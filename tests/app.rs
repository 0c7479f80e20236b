use std::collections::BTreeMap;
use std::fs;

use camino::Utf8PathBuf;

use brc_traffic_reports::app::App;
use brc_traffic_reports::cache::{AssemblyEntry, Snapshot, TaxonomyCache, TaxonomyEntry};
use brc_traffic_reports::config::{Settings, SettingsFile, SettingsLoader};
use brc_traffic_reports::domain::{AssemblyId, TaxId};
use brc_traffic_reports::error::TrafficError;
use brc_traffic_reports::ncbi::{Pacer, TaxonomyResolver};
use brc_traffic_reports::plausible::{AnalyticsClient, BreakdownRow, DateRange};
use brc_traffic_reports::store::Store;

fn test_store(temp: &tempfile::TempDir) -> Store {
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    Store::new_with_paths(
        root.join("data").join("fetched"),
        root.join("output"),
        root.join(".taxonomy_cache"),
    )
}

fn test_settings() -> Settings {
    SettingsLoader::resolve_file(SettingsFile::default())
}

#[derive(Default, Clone)]
struct MockAnalytics {
    pages: Vec<BreakdownRow>,
}

impl AnalyticsClient for MockAnalytics {
    fn breakdown(
        &self,
        property: &str,
        _range: &DateRange,
        _limit: usize,
    ) -> Result<Vec<BreakdownRow>, TrafficError> {
        if property == "event:page" {
            Ok(self.pages.clone())
        } else {
            Ok(Vec::new())
        }
    }
}

#[derive(Default, Clone)]
struct MockResolver {
    taxa: BTreeMap<String, (String, String)>,
    assemblies: BTreeMap<String, (String, String)>,
    taxon_assemblies: BTreeMap<String, Vec<String>>,
}

impl TaxonomyResolver for MockResolver {
    fn resolve_taxon(&self, tax_id: &TaxId) -> TaxonomyEntry {
        match self.taxa.get(tax_id.as_str()) {
            Some((name, lineage)) => TaxonomyEntry {
                name: name.clone(),
                lineage: lineage.clone(),
                fetched_at: "2025-06-01T00:00:00Z".to_string(),
                error: None,
            },
            None => TaxonomyEntry {
                name: "Unknown".to_string(),
                lineage: "Unknown".to_string(),
                fetched_at: "2025-06-01T00:00:00Z".to_string(),
                error: Some("connection timed out".to_string()),
            },
        }
    }

    fn resolve_assembly(&self, assembly_id: &AssemblyId) -> AssemblyEntry {
        match self.assemblies.get(assembly_id.as_str()) {
            Some((tax_id, name)) => AssemblyEntry {
                tax_id: Some(tax_id.clone()),
                name: name.clone(),
                lineage: "Unknown".to_string(),
                fetched_at: "2025-06-01T00:00:00Z".to_string(),
                error: None,
            },
            None => AssemblyEntry {
                tax_id: None,
                name: "Unknown".to_string(),
                lineage: "Unknown".to_string(),
                fetched_at: "2025-06-01T00:00:00Z".to_string(),
                error: Some("connection timed out".to_string()),
            },
        }
    }

    fn assemblies_for_taxon(&self, tax_id: &TaxId) -> Vec<AssemblyId> {
        self.taxon_assemblies
            .get(tax_id.as_str())
            .map(|ids| ids.iter().map(|id| id.parse().unwrap()).collect())
            .unwrap_or_default()
    }
}

fn write_export(store: &Store, name: &str, body: &str) {
    store.ensure_data_dir().unwrap();
    let header = "Page url\tVisitors\tPageviews\tBounce rate\tTime on Page\n";
    fs::write(
        store.export_path(name).as_std_path(),
        format!("{header}{body}"),
    )
    .unwrap();
}

#[test]
fn fetch_pages_writes_tsv_export() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);
    let analytics = MockAnalytics {
        pages: vec![
            BreakdownRow {
                dimension: "/data/organisms/9606".to_string(),
                visitors: 100,
                pageviews: 150,
                bounce_rate: Some(10.0),
                visit_duration: Some(150.0),
            },
            BreakdownRow {
                dimension: "/about".to_string(),
                visitors: 12,
                pageviews: 13,
                bounce_rate: None,
                visit_duration: None,
            },
        ],
    };
    let app = App::new(
        store.clone(),
        test_settings(),
        analytics,
        MockResolver::default(),
        Pacer::unpaced(),
    );

    let range = DateRange::custom("2024-10-01", "2024-10-31").unwrap();
    let result = app.fetch_pages(&range, 1000, None).unwrap();
    assert_eq!(result.rows, 2);

    let expected = store.export_path("top-pages-2024-10-01-to-2024-10-31.tab");
    assert_eq!(result.path, expected.to_string());
    let content = fs::read_to_string(expected.as_std_path()).unwrap();
    assert!(content.starts_with("Page url\tVisitors\tPageviews\tBounce rate\tTime on Page\n"));
    assert!(content.contains("/data/organisms/9606\t100\t150\t10%\t2m 30s"));
    assert!(content.contains("/about\t12\t13\t-\t-"));
}

#[test]
fn refresh_taxonomy_builds_and_fills_snapshot() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);
    write_export(
        &store,
        "top-pages-2024-10-01-to-2024-10-31.tab",
        "/data/organisms/36329\t50\t60\t-\t1m 0s\n\
         /data/assemblies/GCA_000002765_3\t20\t25\t-\t30s\n\
         /data/assemblies/GCA_000002765_3/workflow-rnaseq-main\t5\t6\t-\t45s\n",
    );

    let resolver = MockResolver {
        taxa: BTreeMap::from([(
            "36329".to_string(),
            (
                "Plasmodium falciparum 3D7".to_string(),
                "Eukaryota; Sar; Alveolata; Apicomplexa".to_string(),
            ),
        )]),
        assemblies: BTreeMap::from([(
            "GCA_000002765_3".to_string(),
            ("36329".to_string(), "Plasmodium falciparum 3D7".to_string()),
        )]),
        taxon_assemblies: BTreeMap::new(),
    };
    let mut app = App::new(
        store.clone(),
        test_settings(),
        MockAnalytics::default(),
        resolver,
        Pacer::unpaced(),
    );

    let result = app.refresh_taxonomy(false, None).unwrap();
    assert!(!result.up_to_date);
    assert_eq!(result.fetched_tax_ids, 1);
    assert_eq!(result.fetched_assembly_ids, 1);
    assert!(result.snapshot_path.is_some());

    let snapshot = TaxonomyCache::new(store.cache_dir().to_owned()).load(None);
    assert_eq!(snapshot.taxonomy["36329"].name, "Plasmodium falciparum 3D7");
    // Assembly lineage joined from the taxonomy map in the fill pass.
    assert_eq!(
        snapshot.assembly["GCA_000002765_3"].lineage,
        "Eukaryota; Sar; Alveolata; Apicomplexa"
    );
    assert!(snapshot.source_data_hash.is_some());

    // A second refresh over unchanged data is a no-op.
    let again = app.refresh_taxonomy(false, None).unwrap();
    assert!(again.up_to_date);
    assert!(again.snapshot_path.is_none());
}

#[test]
fn failed_lookups_degrade_to_unknown_entries() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);
    write_export(
        &store,
        "top-pages-2024-11-01-to-2024-11-30.tab",
        "/data/organisms/424242\t5\t7\t-\t-\n",
    );

    // Resolver knows nothing: every lookup simulates a timeout.
    let mut app = App::new(
        store.clone(),
        test_settings(),
        MockAnalytics::default(),
        MockResolver::default(),
        Pacer::unpaced(),
    );

    let result = app.refresh_taxonomy(false, None).unwrap();
    assert_eq!(result.fetched_tax_ids, 1);

    let snapshot = TaxonomyCache::new(store.cache_dir().to_owned()).load(None);
    let entry = &snapshot.taxonomy["424242"];
    assert_eq!(entry.name, "Unknown");
    assert_eq!(entry.lineage, "Unknown");
    assert!(entry.error.as_deref().unwrap().contains("timed out"));
}

#[test]
fn analyze_survives_resolver_failures_and_empty_cache() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);
    write_export(
        &store,
        "top-pages-2024-10-01-to-2024-10-31.tab",
        "/data/organisms/424242\t100\t150\t-\t2m 30s\n\
         /data/assemblies/GCA_000001_1\t40\t60\t10%\t45s\n",
    );

    let mut app = App::new(
        store.clone(),
        test_settings(),
        MockAnalytics::default(),
        MockResolver::default(),
        Pacer::unpaced(),
    );

    let input = store.export_path("top-pages-2024-10-01-to-2024-10-31.tab");
    let result = app.analyze(&input, None).unwrap();

    let organism_report = fs::read_to_string(&result.organism_report).unwrap();
    assert!(organism_report.contains("Organism pages (all): 1 unique, 100 visitors, 150 pageviews"));
    // Unresolved organism renders as Unknown rather than aborting.
    assert!(organism_report.contains("Unknown"));

    let workflow_report = fs::read_to_string(&result.workflow_report).unwrap();
    assert!(workflow_report.contains("Found 0 workflow configuration page entries"));
}

#[test]
fn analyze_excludes_organisms_whose_assemblies_were_visited() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);
    write_export(
        &store,
        "top-pages-2024-10-01-to-2024-10-31.tab",
        "/data/organisms/36329\t50\t60\t-\t1m 0s\n\
         /data/organisms/9606\t80\t90\t-\t2m 0s\n\
         /data/assemblies/GCA_000002765_3\t20\t25\t-\t30s\n",
    );

    let resolver = MockResolver {
        taxa: BTreeMap::new(),
        assemblies: BTreeMap::new(),
        // 36329's assembly shows up in the export; 9606's does not.
        taxon_assemblies: BTreeMap::from([
            ("36329".to_string(), vec!["GCA_000002765_3".to_string()]),
            ("9606".to_string(), vec!["GCA_000001405_29".to_string()]),
        ]),
    };
    let mut app = App::new(
        store.clone(),
        test_settings(),
        MockAnalytics::default(),
        resolver,
        Pacer::unpaced(),
    );

    let input = store.export_path("top-pages-2024-10-01-to-2024-10-31.tab");
    let result = app.analyze(&input, None).unwrap();
    let organism_report = fs::read_to_string(&result.organism_report).unwrap();
    assert!(organism_report
        .contains("Organism pages (with no assembly page visits): 1 unique, 80 visitors"));
}

#[test]
fn summary_rolls_up_every_month_through_the_cache() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);
    write_export(
        &store,
        "top-pages-2024-10-01-to-2024-10-31.tab",
        "/data/organisms/36329\t50\t60\t-\t1m 0s\n/\t500\t900\t-\t30s\n",
    );
    write_export(
        &store,
        "top-pages-2024-11-01-to-2024-11-30.tab",
        "/data/organisms/36329\t70\t90\t-\t1m 10s\n/learn/intro\t9\t11\t-\t-\n",
    );

    // Seed a snapshot so the organism classifies as Protists.
    let cache = TaxonomyCache::new(store.cache_dir().to_owned());
    let mut snapshot = Snapshot::default();
    snapshot.taxonomy.insert(
        "36329".to_string(),
        TaxonomyEntry {
            name: "Plasmodium falciparum 3D7".to_string(),
            lineage: "Eukaryota; Sar; Alveolata; Apicomplexa".to_string(),
            fetched_at: "2025-06-01T00:00:00Z".to_string(),
            error: None,
        },
    );
    cache.save(&mut snapshot, None).unwrap();

    let app = App::new(
        store.clone(),
        test_settings(),
        MockAnalytics::default(),
        MockResolver::default(),
        Pacer::unpaced(),
    );

    let result = app.summary(None).unwrap();
    assert_eq!(result.months, 2);
    assert!(result.path.is_none());
    assert!(result.report.contains("Oct 2024"));
    assert!(result.report.contains("Nov 2024"));
    assert!(result.report.contains("MONTHLY TRAFFIC SUMMARY"));

    // Writing to a file instead of stdout.
    let out = store.output_dir().join("summary.txt");
    store.ensure_output_dir().unwrap();
    let result = app.summary(Some(&out)).unwrap();
    assert_eq!(result.path.as_deref(), Some(out.as_str()));
    assert!(fs::read_to_string(out.as_std_path())
        .unwrap()
        .contains("Nov 2024"));
}

#[test]
fn summary_without_monthly_files_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);
    store.ensure_data_dir().unwrap();

    let app = App::new(
        store,
        test_settings(),
        MockAnalytics::default(),
        MockResolver::default(),
        Pacer::unpaced(),
    );
    assert!(matches!(
        app.summary(None),
        Err(TrafficError::DataFileNotFound(_))
    ));
}
