use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::community::Community;
use crate::domain::{AssemblyId, PageVisitRow, TaxId};
use crate::router::{NavigationPage, PageCategory, PageRouter};

/// Count/visitor/pageview sums for one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTotals {
    pub count: u64,
    pub visitors: u64,
    pub pageviews: u64,
}

impl CategoryTotals {
    fn add(&mut self, visitors: u64, pageviews: u64) {
        self.count += 1;
        self.visitors += visitors;
        self.pageviews += pageviews;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigationStats {
    pub visitors: u64,
    pub pageviews: u64,
    pub time_on_page: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganismPage {
    pub tax_id: TaxId,
    pub visitors: u64,
    pub pageviews: u64,
    pub time_on_page: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyPage {
    pub assembly_id: AssemblyId,
    pub visitors: u64,
    pub pageviews: u64,
    pub time_on_page: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowPage {
    pub assembly_id: AssemblyId,
    pub workflow_name: String,
    pub visitors: u64,
    pub pageviews: u64,
    pub time_on_page: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathogenPage {
    pub slug: String,
    pub visitors: u64,
    pub pageviews: u64,
    pub time_on_page: Option<u64>,
}

/// Anything with visitor/pageview counts that can be rolled up.
pub trait TrafficCounts {
    fn visitors(&self) -> u64;
    fn pageviews(&self) -> u64;
}

macro_rules! impl_traffic_counts {
    ($($ty:ty),*) => {
        $(impl TrafficCounts for $ty {
            fn visitors(&self) -> u64 {
                self.visitors
            }
            fn pageviews(&self) -> u64 {
                self.pageviews
            }
        })*
    };
}

impl_traffic_counts!(OrganismPage, AssemblyPage, WorkflowPage, PathogenPage);

/// Result of one linear pass over an export's rows, grouped by page
/// category. Input order never affects the outcome; report-facing
/// orderings are applied explicitly by the accessors.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub navigation: BTreeMap<NavigationPage, NavigationStats>,
    pub organism_pages: Vec<OrganismPage>,
    pub assembly_pages: Vec<AssemblyPage>,
    pub workflow_pages: Vec<WorkflowPage>,
    pub pathogen_pages: Vec<PathogenPage>,
    /// Visitors/pageviews across `/learn*` URLs. Tracked as a plain
    /// prefix rollup outside the category system.
    pub learn: CategoryTotals,
    assemblies_with_workflows: BTreeSet<AssemblyId>,
}

impl Aggregation {
    pub fn from_rows(rows: &[PageVisitRow], router: &PageRouter) -> Self {
        let mut agg = Aggregation::default();
        for row in rows {
            if row.url.starts_with("/learn") {
                agg.learn.add(row.visitors, row.pageviews);
            }
            match router.classify(&row.url) {
                PageCategory::Navigation(page) => {
                    let stats = agg.navigation.entry(page).or_default();
                    stats.visitors += row.visitors;
                    stats.pageviews += row.pageviews;
                    if stats.time_on_page.is_none() {
                        stats.time_on_page = row.time_on_page;
                    }
                }
                PageCategory::Organism(tax_id) => {
                    agg.organism_pages.push(OrganismPage {
                        tax_id,
                        visitors: row.visitors,
                        pageviews: row.pageviews,
                        time_on_page: row.time_on_page,
                    });
                }
                PageCategory::PriorityPathogen(slug) => {
                    agg.pathogen_pages.push(PathogenPage {
                        slug,
                        visitors: row.visitors,
                        pageviews: row.pageviews,
                        time_on_page: row.time_on_page,
                    });
                }
                PageCategory::Workflow(assembly_id, workflow_name) => {
                    agg.assemblies_with_workflows.insert(assembly_id.clone());
                    agg.workflow_pages.push(WorkflowPage {
                        assembly_id,
                        workflow_name,
                        visitors: row.visitors,
                        pageviews: row.pageviews,
                        time_on_page: row.time_on_page,
                    });
                }
                PageCategory::Assembly(assembly_id) => {
                    agg.assembly_pages.push(AssemblyPage {
                        assembly_id,
                        visitors: row.visitors,
                        pageviews: row.pageviews,
                        time_on_page: row.time_on_page,
                    });
                }
                PageCategory::Unclassified => {}
            }
        }
        agg
    }

    /// Assembly ids that drew at least one workflow page visit.
    pub fn assemblies_with_workflows(&self) -> &BTreeSet<AssemblyId> {
        &self.assemblies_with_workflows
    }

    /// Assembly pages whose available workflow pages were not visited.
    pub fn assembly_pages_without_workflow(&self) -> Vec<&AssemblyPage> {
        self.assembly_pages
            .iter()
            .filter(|page| !self.assemblies_with_workflows.contains(&page.assembly_id))
            .collect()
    }

    pub fn organism_totals(&self) -> CategoryTotals {
        totals(&self.organism_pages)
    }

    pub fn assembly_totals(&self) -> CategoryTotals {
        totals(&self.assembly_pages)
    }

    pub fn workflow_totals(&self) -> CategoryTotals {
        totals(&self.workflow_pages)
    }

    pub fn pathogen_totals(&self) -> CategoryTotals {
        totals(&self.pathogen_pages)
    }

    pub fn unique_tax_ids(&self) -> Vec<TaxId> {
        let ids: BTreeSet<TaxId> = self
            .organism_pages
            .iter()
            .map(|page| page.tax_id.clone())
            .collect();
        ids.into_iter().collect()
    }

    /// Unique assembly ids across both assembly and workflow pages.
    pub fn unique_assembly_ids(&self) -> Vec<AssemblyId> {
        let mut ids: BTreeSet<AssemblyId> = self
            .assembly_pages
            .iter()
            .map(|page| page.assembly_id.clone())
            .collect();
        ids.extend(
            self.workflow_pages
                .iter()
                .map(|page| page.assembly_id.clone()),
        );
        ids.into_iter().collect()
    }
}

fn totals<T: TrafficCounts>(pages: &[T]) -> CategoryTotals {
    let mut total = CategoryTotals::default();
    for page in pages {
        total.add(page.visitors(), page.pageviews());
    }
    total
}

/// Fold a page list into per-community buckets through a caller-supplied
/// classification function.
pub fn community_rollup<T: TrafficCounts>(
    pages: &[T],
    community_of: impl Fn(&T) -> Community,
) -> BTreeMap<Community, CategoryTotals> {
    let mut buckets: BTreeMap<Community, CategoryTotals> = BTreeMap::new();
    for page in pages {
        buckets
            .entry(community_of(page))
            .or_default()
            .add(page.visitors(), page.pageviews());
    }
    buckets
}

/// Stable display ordering: visitors descending, then the given key
/// ascending. Replaces map-iteration-order tie-breaks so top-N
/// truncation is deterministic.
pub fn sort_for_display<T, K, KF>(pages: &mut [T], visitors: impl Fn(&T) -> u64, key: KF)
where
    K: Ord,
    KF: Fn(&T) -> K,
{
    pages.sort_by(|a, b| {
        visitors(b)
            .cmp(&visitors(a))
            .then_with(|| key(a).cmp(&key(b)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(url: &str, visitors: u64, pageviews: u64, time: Option<u64>) -> PageVisitRow {
        PageVisitRow {
            url: url.to_string(),
            visitors,
            pageviews,
            time_on_page: time,
        }
    }

    #[test]
    fn workflow_visits_exclude_assembly_from_no_workflow_bucket() {
        let rows = vec![
            row("/data/organisms/9606", 100, 150, Some(150)),
            row("/data/assemblies/GCA_000001_1", 40, 60, Some(45)),
            row(
                "/data/assemblies/GCA_000001_1/workflow-rnaseq-main",
                10,
                12,
                Some(60),
            ),
        ];
        let agg = Aggregation::from_rows(&rows, &PageRouter::new());

        let organisms = agg.organism_totals();
        assert_eq!(organisms.count, 1);
        assert_eq!(organisms.visitors, 100);

        assert!(agg.assembly_pages_without_workflow().is_empty());

        let workflows = agg.workflow_totals();
        assert_eq!(workflows.count, 1);
        assert_eq!(workflows.visitors, 10);
    }

    #[test]
    fn aggregation_is_order_independent() {
        let mut rows = vec![
            row("/", 500, 900, None),
            row("/data/organisms/9606", 100, 150, None),
            row("/data/organisms/5833", 70, 80, None),
            row("/data/assemblies/GCA_000002_2", 5, 6, None),
            row("/learn/intro", 9, 11, None),
        ];
        let forward = Aggregation::from_rows(&rows, &PageRouter::new());
        rows.reverse();
        let reversed = Aggregation::from_rows(&rows, &PageRouter::new());

        assert_eq!(forward.organism_totals(), reversed.organism_totals());
        assert_eq!(forward.assembly_totals(), reversed.assembly_totals());
        assert_eq!(forward.navigation, reversed.navigation);
        assert_eq!(forward.learn, reversed.learn);
    }

    #[test]
    fn rollup_groups_by_community() {
        let pages = vec![
            OrganismPage {
                tax_id: "9606".parse().unwrap(),
                visitors: 10,
                pageviews: 12,
                time_on_page: None,
            },
            OrganismPage {
                tax_id: "5833".parse().unwrap(),
                visitors: 7,
                pageviews: 9,
                time_on_page: None,
            },
        ];
        let buckets = community_rollup(&pages, |page| {
            if page.tax_id.as_str() == "9606" {
                Community::Hosts
            } else {
                Community::Protists
            }
        });
        assert_eq!(buckets[&Community::Hosts].visitors, 10);
        assert_eq!(buckets[&Community::Protists].count, 1);
    }

    #[test]
    fn display_sort_breaks_ties_by_key() {
        let mut pages = vec![
            AssemblyPage {
                assembly_id: "GCA_000002_2".parse().unwrap(),
                visitors: 10,
                pageviews: 1,
                time_on_page: None,
            },
            AssemblyPage {
                assembly_id: "GCA_000001_1".parse().unwrap(),
                visitors: 10,
                pageviews: 1,
                time_on_page: None,
            },
            AssemblyPage {
                assembly_id: "GCA_000003_3".parse().unwrap(),
                visitors: 99,
                pageviews: 1,
                time_on_page: None,
            },
        ];
        sort_for_display(&mut pages, |p| p.visitors, |p| p.assembly_id.clone());
        let order: Vec<&str> = pages.iter().map(|p| p.assembly_id.as_str()).collect();
        assert_eq!(order, vec!["GCA_000003_3", "GCA_000001_1", "GCA_000002_2"]);
    }
}
