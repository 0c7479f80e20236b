use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{AssemblyId, TaxId};

/// Fixed set of high-level navigation pages tracked by the reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NavigationPage {
    Home,
    OrganismsIndex,
    AssembliesIndex,
    PriorityPathogensIndex,
    Roadmap,
    About,
    Calendar,
}

impl NavigationPage {
    pub const ALL: [NavigationPage; 7] = [
        NavigationPage::Home,
        NavigationPage::OrganismsIndex,
        NavigationPage::AssembliesIndex,
        NavigationPage::PriorityPathogensIndex,
        NavigationPage::Roadmap,
        NavigationPage::About,
        NavigationPage::Calendar,
    ];

    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/" => Some(NavigationPage::Home),
            "/data/organisms" => Some(NavigationPage::OrganismsIndex),
            "/data/assemblies" => Some(NavigationPage::AssembliesIndex),
            "/data/priority-pathogens" => Some(NavigationPage::PriorityPathogensIndex),
            "/roadmap" => Some(NavigationPage::Roadmap),
            "/about" => Some(NavigationPage::About),
            "/calendar" => Some(NavigationPage::Calendar),
            _ => None,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            NavigationPage::Home => "/",
            NavigationPage::OrganismsIndex => "/data/organisms",
            NavigationPage::AssembliesIndex => "/data/assemblies",
            NavigationPage::PriorityPathogensIndex => "/data/priority-pathogens",
            NavigationPage::Roadmap => "/roadmap",
            NavigationPage::About => "/about",
            NavigationPage::Calendar => "/calendar",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NavigationPage::Home => "Home",
            NavigationPage::OrganismsIndex => "Organisms Index",
            NavigationPage::AssembliesIndex => "Assemblies Index",
            NavigationPage::PriorityPathogensIndex => "Priority Pathogens Index",
            NavigationPage::Roadmap => "Roadmap",
            NavigationPage::About => "About",
            NavigationPage::Calendar => "Calendar",
        }
    }
}

impl fmt::Display for NavigationPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Category a page URL resolves to. Classification is a pure function of
/// the URL path string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCategory {
    Navigation(NavigationPage),
    Organism(TaxId),
    PriorityPathogen(String),
    Workflow(AssemblyId, String),
    Assembly(AssemblyId),
    Unclassified,
}

/// Routes URL paths to page categories with a fixed ordered rule set.
/// Unmatched input falls through to `Unclassified`; there is no error path.
#[derive(Debug, Clone)]
pub struct PageRouter {
    organism: Regex,
    pathogen: Regex,
    workflow: Regex,
    assembly: Regex,
}

impl PageRouter {
    pub fn new() -> Self {
        Self {
            organism: Regex::new(r"^/data/organisms/(\d+)$").unwrap(),
            pathogen: Regex::new(r"^/data/priority-pathogens/([^/]+)$").unwrap(),
            // Must win over the plain assembly rule: workflow URLs are a
            // sub-path of assembly URLs.
            workflow: Regex::new(r"^/data/assemblies/([^/]+)/workflow-(.+)$").unwrap(),
            assembly: Regex::new(r"^/data/assemblies/([^/]+)$").unwrap(),
        }
    }

    pub fn classify(&self, path: &str) -> PageCategory {
        if let Some(page) = NavigationPage::from_path(path) {
            return PageCategory::Navigation(page);
        }
        if let Some(caps) = self.organism.captures(path) {
            if let Ok(tax_id) = TaxId::from_str(&caps[1]) {
                return PageCategory::Organism(tax_id);
            }
        }
        if let Some(caps) = self.pathogen.captures(path) {
            return PageCategory::PriorityPathogen(caps[1].to_string());
        }
        if let Some(caps) = self.workflow.captures(path) {
            if let Ok(assembly) = AssemblyId::from_str(&caps[1]) {
                return PageCategory::Workflow(assembly, caps[2].to_string());
            }
        }
        if let Some(caps) = self.assembly.captures(path) {
            if let Ok(assembly) = AssemblyId::from_str(&caps[1]) {
                return PageCategory::Assembly(assembly);
            }
        }
        PageCategory::Unclassified
    }
}

impl Default for PageRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Short workflow name for per-workflow grouping. Workflow page names
/// published through IWC look like
/// `github-com-iwc-workflows-<name>-main` or `...-versions-<n>`; the
/// prefix is stripped when present and the name is truncated at the
/// `-main`/`-versions` suffix. Names without such a suffix collapse to
/// `unknown` so they group together in the per-workflow tables.
pub fn workflow_short_name(workflow_name: &str) -> String {
    let trimmed = workflow_name
        .strip_prefix("github-com-iwc-workflows-")
        .unwrap_or(workflow_name);
    let re = Regex::new(r"^(.+?)-(?:main|versions)(?:-|$)").unwrap();
    match re.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => "unknown".to_string(),
    }
}
