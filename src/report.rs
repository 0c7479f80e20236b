use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::aggregate::{
    Aggregation, CategoryTotals, NavigationStats, community_rollup, sort_for_display,
};
use crate::cache::Snapshot;
use crate::community::Community;
use crate::config::Settings;
use crate::domain::{AssemblyId, TaxId, format_time_on_page};
use crate::router::{NavigationPage, workflow_short_name};

const RULE_80: &str =
    "================================================================================";
const DASH_80: &str =
    "--------------------------------------------------------------------------------";

fn rule_120() -> String {
    "=".repeat(120)
}

fn dash_120() -> String {
    "-".repeat(120)
}

fn truncate_name(name: &str, max: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() > max {
        let head: String = chars[..max.saturating_sub(3)].iter().collect();
        format!("{head}...")
    } else {
        name.to_string()
    }
}

fn time_cell(seconds: Option<u64>) -> String {
    match seconds {
        Some(seconds) => format_time_on_page(seconds),
        None => "N/A".to_string(),
    }
}

fn title_case_slug(slug: &str) -> String {
    slug.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn mean(values: &[u64]) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<u64>() / values.len() as u64)
}

fn median(values: &[u64]) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2)
    } else {
        Some(sorted[mid])
    }
}

/// Organism and priority pathogen page analysis for one export.
///
/// The "without assembly/workflow" sections identify pages where the site
/// offers these features but they were not visited during the reporting
/// period.
pub fn render_organism_analysis(
    agg: &Aggregation,
    snapshot: &Snapshot,
    organisms_with_assembly_visits: &BTreeSet<TaxId>,
    settings: &Settings,
) -> String {
    let mut out = String::new();

    let organism_totals = agg.organism_totals();
    let pathogen_totals = agg.pathogen_totals();
    let assembly_totals = agg.assembly_totals();

    let organisms_no_assembly: Vec<_> = agg
        .organism_pages
        .iter()
        .filter(|page| !organisms_with_assembly_visits.contains(&page.tax_id))
        .cloned()
        .collect();
    let assemblies_no_workflow: Vec<_> = agg
        .assembly_pages_without_workflow()
        .into_iter()
        .cloned()
        .collect();

    let no_assembly_visitors: u64 = organisms_no_assembly.iter().map(|p| p.visitors).sum();
    let no_assembly_pageviews: u64 = organisms_no_assembly.iter().map(|p| p.pageviews).sum();
    let no_workflow_visitors: u64 = assemblies_no_workflow.iter().map(|p| p.visitors).sum();
    let no_workflow_pageviews: u64 = assemblies_no_workflow.iter().map(|p| p.pageviews).sum();

    let _ = writeln!(out, "{RULE_80}");
    let _ = writeln!(out, "ORGANISM AND PATHOGEN PAGE ANALYSIS");
    let _ = writeln!(out, "{RULE_80}");
    let _ = writeln!(out);

    let _ = writeln!(out, "OVERALL STATISTICS");
    let _ = writeln!(out, "{DASH_80}");
    let _ = writeln!(
        out,
        "Organism pages (all): {} unique, {} visitors, {} pageviews",
        organism_totals.count, organism_totals.visitors, organism_totals.pageviews
    );
    let _ = writeln!(
        out,
        "Organism pages (with no assembly page visits): {} unique, {} visitors, {} pageviews",
        organisms_no_assembly.len(),
        no_assembly_visitors,
        no_assembly_pageviews
    );
    let _ = writeln!(
        out,
        "Priority pathogen pages: {} unique, {} visitors, {} pageviews",
        pathogen_totals.count, pathogen_totals.visitors, pathogen_totals.pageviews
    );
    let _ = writeln!(
        out,
        "Assembly pages (all): {} unique, {} visitors, {} pageviews",
        assembly_totals.count, assembly_totals.visitors, assembly_totals.pageviews
    );
    let _ = writeln!(
        out,
        "Assembly pages (with no workflow page visits): {} unique, {} visitors, {} pageviews",
        assemblies_no_workflow.len(),
        no_workflow_visitors,
        no_workflow_pageviews
    );
    let _ = writeln!(out, "\n");

    let _ = writeln!(out, "HIGH-LEVEL NAVIGATION PAGES");
    let _ = writeln!(out, "{DASH_80}");
    let _ = writeln!(
        out,
        "{:<40} {:<10} {:<10} {:<12} {:<12}",
        "Page", "Visitors", "Pageviews", "Bounce Rate", "Avg Time"
    );
    let _ = writeln!(out, "{DASH_80}");

    let mut navigation: Vec<(NavigationPage, NavigationStats)> = agg
        .navigation
        .iter()
        .map(|(page, stats)| (*page, *stats))
        .collect();
    navigation.sort_by(|a, b| {
        b.1.visitors
            .cmp(&a.1.visitors)
            .then_with(|| a.0.path().cmp(b.0.path()))
    });
    for (page, stats) in &navigation {
        let bounce = if stats.pageviews > 0 {
            format!("{}%", stats.visitors * 100 / stats.pageviews)
        } else {
            "N/A".to_string()
        };
        let _ = writeln!(
            out,
            "{:<40} {:<10} {:<10} {:<12} {:<12}",
            page.path(),
            stats.visitors,
            stats.pageviews,
            bounce,
            time_cell(stats.time_on_page)
        );
    }
    let _ = writeln!(out, "\n");

    let _ = writeln!(out, "PRIORITY PATHOGEN PAGES");
    let _ = writeln!(out, "{DASH_80}");
    let _ = writeln!(
        out,
        "{:<40} {:<10} {:<10} {:<12} {:<12}",
        "Pathogen", "Visitors", "Pageviews", "Avg Time", "Median Time"
    );
    let _ = writeln!(out, "{DASH_80}");

    let mut pathogens = agg.pathogen_pages.clone();
    sort_for_display(&mut pathogens, |p| p.visitors, |p| p.slug.clone());
    for page in &pathogens {
        let time = time_cell(page.time_on_page);
        let _ = writeln!(
            out,
            "{:<40} {:<10} {:<10} {:<12} {:<12}",
            title_case_slug(&page.slug),
            page.visitors,
            page.pageviews,
            time,
            time
        );
    }
    let _ = writeln!(out, "\n");

    let _ = writeln!(out, "ORGANISM PAGES (All - Regardless of Assembly Status)");
    write_organism_table(&mut out, &agg.organism_pages, snapshot);
    let _ = writeln!(out, "\n");

    let _ = writeln!(
        out,
        "ORGANISM PAGES (Where Available Assembly Pages Were Not Visited)"
    );
    write_organism_table(&mut out, &organisms_no_assembly, snapshot);
    let _ = writeln!(out, "\n");

    let _ = writeln!(out, "ASSEMBLY PAGES (All - Regardless of Workflow Status)");
    write_assembly_table(&mut out, &agg.assembly_pages, snapshot, settings);
    let _ = writeln!(out, "\n");

    let _ = writeln!(
        out,
        "ASSEMBLY PAGES (Where Available Workflow Pages Were Not Visited)"
    );
    write_assembly_table(&mut out, &assemblies_no_workflow, snapshot, settings);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "* = May have first-in-list bias (appears early in assembly listings)"
    );
    let _ = writeln!(out);

    out
}

fn write_organism_table(
    out: &mut String,
    pages: &[crate::aggregate::OrganismPage],
    snapshot: &Snapshot,
) {
    let _ = writeln!(out, "{DASH_80}");
    let _ = writeln!(
        out,
        "{:<15} {:<35} {:<10} {:<10} {:<12}",
        "Tax ID", "Organism", "Visitors", "Pageviews", "Avg Time"
    );
    let _ = writeln!(out, "{DASH_80}");

    let mut sorted = pages.to_vec();
    sort_for_display(&mut sorted, |p| p.visitors, |p| p.tax_id.clone());
    for page in &sorted {
        let organism = truncate_name(snapshot.organism_name(&page.tax_id), 33);
        let _ = writeln!(
            out,
            "{:<15} {:<35} {:<10} {:<10} {:<12}",
            page.tax_id.as_str(),
            organism,
            page.visitors,
            page.pageviews,
            time_cell(page.time_on_page)
        );
    }
}

fn write_assembly_table(
    out: &mut String,
    pages: &[crate::aggregate::AssemblyPage],
    snapshot: &Snapshot,
    settings: &Settings,
) {
    let _ = writeln!(out, "{DASH_80}");
    let _ = writeln!(
        out,
        "{:<25} {:<35} {:<10} {:<10} {:<12}",
        "Assembly ID", "Organism", "Visitors", "Pageviews", "Avg Time"
    );
    let _ = writeln!(out, "{DASH_80}");

    let mut sorted = pages.to_vec();
    sort_for_display(&mut sorted, |p| p.visitors, |p| p.assembly_id.clone());
    sorted.truncate(20);
    for page in &sorted {
        let organism = truncate_name(snapshot.assembly_name(&page.assembly_id), 33);
        let marker = if settings.is_biased_assembly(page.assembly_id.as_str()) {
            " *"
        } else {
            "  "
        };
        let _ = writeln!(
            out,
            "{:<25} {:<35} {:<10} {:<10} {:<12}{marker}",
            page.assembly_id.as_str(),
            organism,
            page.visitors,
            page.pageviews,
            time_cell(page.time_on_page)
        );
    }
}

#[derive(Debug, Default, Clone)]
struct WorkflowGroup {
    visitors: u64,
    pageviews: u64,
    times: Vec<u64>,
    assemblies: BTreeSet<AssemblyId>,
}

/// Workflow configuration page analysis for one export.
pub fn render_workflow_analysis(
    agg: &Aggregation,
    snapshot: &Snapshot,
    settings: &Settings,
) -> String {
    let mut out = String::new();

    let mut by_assembly: BTreeMap<AssemblyId, WorkflowGroup> = BTreeMap::new();
    let mut by_workflow: BTreeMap<String, WorkflowGroup> = BTreeMap::new();
    let mut by_combo: BTreeMap<(String, AssemblyId), WorkflowGroup> = BTreeMap::new();

    for page in &agg.workflow_pages {
        let workflow = workflow_short_name(&page.workflow_name);

        let group = by_assembly.entry(page.assembly_id.clone()).or_default();
        group.visitors += page.visitors;
        group.pageviews += page.pageviews;
        group.times.extend(page.time_on_page);

        let group = by_workflow.entry(workflow.clone()).or_default();
        group.visitors += page.visitors;
        group.pageviews += page.pageviews;
        group.assemblies.insert(page.assembly_id.clone());
        group.times.extend(page.time_on_page);

        let group = by_combo
            .entry((workflow, page.assembly_id.clone()))
            .or_default();
        group.visitors += page.visitors;
        group.pageviews += page.pageviews;
        group.times.extend(page.time_on_page);
    }

    let totals = agg.workflow_totals();
    let all_times: Vec<u64> = agg
        .workflow_pages
        .iter()
        .filter_map(|page| page.time_on_page)
        .collect();

    let _ = writeln!(out, "{RULE_80}");
    let _ = writeln!(out, "WORKFLOW CONFIGURATION PAGE ANALYSIS");
    let _ = writeln!(out, "{RULE_80}");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Found {} workflow configuration page entries",
        agg.workflow_pages.len()
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "OVERALL STATISTICS");
    let _ = writeln!(out, "{DASH_80}");
    let _ = writeln!(
        out,
        "Total unique assemblies with workflow visits: {}",
        by_assembly.len()
    );
    let _ = writeln!(out, "Total unique workflows: {}", by_workflow.len());
    let _ = writeln!(out, "Total visitors to workflow pages: {}", totals.visitors);
    let _ = writeln!(out, "Total pageviews: {}", totals.pageviews);
    let _ = writeln!(
        out,
        "Average time on page: {}",
        time_cell(mean(&all_times))
    );
    let _ = writeln!(
        out,
        "Median time on page: {}",
        time_cell(median(&all_times))
    );
    let _ = writeln!(out, "\n");

    let _ = writeln!(out, "PER-WORKFLOW BREAKDOWN");
    let _ = writeln!(out, "{DASH_80}");
    let _ = writeln!(
        out,
        "{:<35} {:<10} {:<10} {:<12} {:<12} {:<12}",
        "Workflow", "Visitors", "Pageviews", "Assemblies", "Avg Time", "Median Time"
    );
    let _ = writeln!(out, "{DASH_80}");

    let mut workflows: Vec<(String, WorkflowGroup)> = by_workflow.into_iter().collect();
    workflows.sort_by(|a, b| b.1.visitors.cmp(&a.1.visitors).then_with(|| a.0.cmp(&b.0)));
    for (workflow, group) in &workflows {
        let _ = writeln!(
            out,
            "{:<35} {:<10} {:<10} {:<12} {:<12} {:<12}",
            truncate_name(workflow, 33),
            group.visitors,
            group.pageviews,
            group.assemblies.len(),
            time_cell(mean(&group.times)),
            time_cell(median(&group.times))
        );
    }
    let _ = writeln!(out, "\n");

    let _ = writeln!(out, "WORKFLOW-ORGANISM INTERSECTIONS (Top 20)");
    let _ = writeln!(out, "{DASH_80}");
    let _ = writeln!(
        out,
        "{:<30} {:<30} {:<10} {:<10}",
        "Workflow", "Organism", "Visitors", "Pageviews"
    );
    let _ = writeln!(out, "{DASH_80}");

    let mut combos: Vec<((String, AssemblyId), WorkflowGroup)> = by_combo.into_iter().collect();
    combos.sort_by(|a, b| b.1.visitors.cmp(&a.1.visitors).then_with(|| a.0.cmp(&b.0)));
    combos.truncate(20);
    for ((workflow, assembly), group) in &combos {
        let organism = truncate_name(snapshot.assembly_name(assembly), 28);
        let _ = writeln!(
            out,
            "{:<30} {:<30} {:<10} {:<10}",
            truncate_name(workflow, 28),
            organism,
            group.visitors,
            group.pageviews
        );
    }
    let _ = writeln!(out, "\n");

    let _ = writeln!(out, "PER-ASSEMBLY BREAKDOWN");
    let _ = writeln!(out, "{DASH_80}");
    let _ = writeln!(
        out,
        "{:<20} {:<30} {:<10} {:<10} {:<12} {:<12}",
        "Assembly ID", "Organism", "Visitors", "Pageviews", "Avg Time", "Median Time"
    );
    let _ = writeln!(out, "{DASH_80}");

    let mut assemblies: Vec<(AssemblyId, WorkflowGroup)> = by_assembly.into_iter().collect();
    assemblies.sort_by(|a, b| b.1.visitors.cmp(&a.1.visitors).then_with(|| a.0.cmp(&b.0)));
    for (assembly, group) in &assemblies {
        let organism = truncate_name(snapshot.assembly_name(assembly), 28);
        let marker = if settings.is_biased_assembly(assembly.as_str()) {
            " *"
        } else {
            "  "
        };
        let _ = writeln!(
            out,
            "{:<20} {:<30} {:<10} {:<10} {:<12} {:<12}{marker}",
            assembly.as_str(),
            organism,
            group.visitors,
            group.pageviews,
            time_cell(mean(&group.times)),
            time_cell(median(&group.times))
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "* = May have first-in-list bias (appears early in assembly listings)"
    );
    let _ = writeln!(out);

    out
}

/// One month's rollup for the cross-month summary.
#[derive(Debug, Clone)]
pub struct MonthSummary {
    pub label: String,
    pub navigation: BTreeMap<NavigationPage, NavigationStats>,
    pub organism_total: CategoryTotals,
    pub organism_by_community: BTreeMap<Community, CategoryTotals>,
    pub assembly_total: CategoryTotals,
    pub assembly_by_community: BTreeMap<Community, CategoryTotals>,
    pub workflow_total: CategoryTotals,
    pub workflow_by_community: BTreeMap<Community, CategoryTotals>,
    pub pathogen_total: CategoryTotals,
    pub learn: CategoryTotals,
}

impl MonthSummary {
    /// Roll one month's aggregation up by community through the taxonomy
    /// snapshot. Unknown ids classify as `Other`.
    pub fn build(label: String, agg: &Aggregation, snapshot: &Snapshot) -> Self {
        MonthSummary {
            label,
            navigation: agg.navigation.clone(),
            organism_total: agg.organism_totals(),
            organism_by_community: community_rollup(&agg.organism_pages, |page| {
                Community::classify(snapshot.lineage_for_tax(&page.tax_id))
            }),
            assembly_total: agg.assembly_totals(),
            assembly_by_community: community_rollup(&agg.assembly_pages, |page| {
                Community::classify(snapshot.lineage_for_assembly(&page.assembly_id))
            }),
            workflow_total: agg.workflow_totals(),
            workflow_by_community: community_rollup(&agg.workflow_pages, |page| {
                Community::classify(snapshot.lineage_for_assembly(&page.assembly_id))
            }),
            pathogen_total: agg.pathogen_totals(),
            learn: agg.learn,
        }
    }
}

/// Cross-month traffic summary across all fetched monthly exports.
pub fn render_monthly_summary(months: &[MonthSummary]) -> String {
    let mut out = String::new();
    let rule = rule_120();
    let dash = dash_120();

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "BRC ANALYTICS - MONTHLY TRAFFIC SUMMARY");
    let _ = writeln!(
        out,
        "Generated: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M")
    );
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out);

    let _ = writeln!(out, "HIGH-LEVEL PAGES (Visitors / Pageviews)");
    let _ = writeln!(out, "{dash}");
    let mut header = format!("{:<12}", "Month");
    for page in NavigationPage::ALL {
        let label: String = page.label().chars().take(15).collect();
        let _ = write!(header, "{label:>18}");
    }
    let _ = writeln!(out, "{header}");
    let _ = writeln!(out, "{dash}");

    for month in months {
        let mut row = format!("{:<12}", month.label);
        for page in NavigationPage::ALL {
            let stats = month.navigation.get(&page).copied().unwrap_or_default();
            let _ = write!(row, "{:>8}/{:<8}", stats.visitors, stats.pageviews);
        }
        let _ = writeln!(out, "{row}");
    }
    let _ = writeln!(out, "\n");

    let _ = writeln!(out, "CONTENT PAGES - TOTALS (Unique Pages / Visitors / Pageviews)");
    let _ = writeln!(out, "{dash}");
    let _ = writeln!(
        out,
        "{:<12}{:>25}{:>25}{:>25}{:>25}",
        "Month", "Organism Pages", "Assembly Pages", "Workflow Pages", "Priority Pathogens"
    );
    let _ = writeln!(out, "{dash}");

    for month in months {
        let mut row = format!("{:<12}", month.label);
        for totals in [
            month.organism_total,
            month.assembly_total,
            month.workflow_total,
            month.pathogen_total,
        ] {
            let _ = write!(
                row,
                "{:>6} / {:>5} / {:<6}",
                totals.count, totals.visitors, totals.pageviews
            );
        }
        let _ = writeln!(out, "{row}");
    }
    let _ = writeln!(out, "\n");

    write_community_section(
        &mut out,
        "ORGANISM PAGES BY COMMUNITY (Unique Pages / Visitors)",
        months,
        |month| &month.organism_by_community,
    );
    write_community_section(
        &mut out,
        "ASSEMBLY PAGES BY COMMUNITY (Unique Pages / Visitors)",
        months,
        |month| &month.assembly_by_community,
    );
    write_community_section(
        &mut out,
        "WORKFLOW PAGES BY COMMUNITY (Unique Pages / Visitors)",
        months,
        |month| &month.workflow_by_community,
    );

    let _ = writeln!(out, "LEARN / FEATURED ANALYSES PAGES");
    let _ = writeln!(out, "{}", "-".repeat(50));
    let _ = writeln!(out, "{:<12}{:>12}{:>12}", "Month", "Visitors", "Pageviews");
    let _ = writeln!(out, "{}", "-".repeat(50));
    for month in months {
        let _ = writeln!(
            out,
            "{:<12}{:>12}{:>12}",
            month.label, month.learn.visitors, month.learn.pageviews
        );
    }
    let _ = writeln!(out, "\n");

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "NOTES:");
    let _ = writeln!(
        out,
        "- 'Organism Pages' = /data/organisms/{{tax_id}} (individual organism detail pages)"
    );
    let _ = writeln!(
        out,
        "- 'Assembly Pages' = /data/assemblies/{{assembly_id}} (individual assembly detail pages)"
    );
    let _ = writeln!(
        out,
        "- 'Workflow Pages' = /data/assemblies/{{id}}/workflow-{{...}} (workflow configuration pages)"
    );
    let _ = writeln!(
        out,
        "- Index pages (Organisms Index, etc.) are navigation/listing pages, not detail pages"
    );
    let _ = writeln!(
        out,
        "- Community classification based on NCBI taxonomy lineage"
    );
    let _ = writeln!(out, "{rule}");

    out
}

fn write_community_section<'a>(
    out: &mut String,
    title: &str,
    months: &'a [MonthSummary],
    buckets: impl Fn(&'a MonthSummary) -> &'a BTreeMap<Community, CategoryTotals>,
) {
    let dash = dash_120();
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{dash}");
    let mut header = format!("{:<12}", "Month");
    for community in Community::ALL {
        let _ = write!(header, "{:>14}", community.label());
    }
    let _ = writeln!(out, "{header}");
    let _ = writeln!(out, "{dash}");

    for month in months {
        let mut row = format!("{:<12}", month.label);
        let buckets = buckets(month);
        for community in Community::ALL {
            let totals = buckets.get(&community).copied().unwrap_or_default();
            let _ = write!(row, "{:>5}/{:<7}", totals.count, totals.visitors);
        }
        let _ = writeln!(out, "{row}");
    }
    let _ = writeln!(out, "\n");
}
