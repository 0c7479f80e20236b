use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse organism grouping used by the traffic reports. Declaration
/// order is the matching order: when a lineage matches patterns from more
/// than one community, the first declared community wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Community {
    Viruses,
    Bacteria,
    Fungi,
    Vectors,
    Hosts,
    Protists,
    Helminths,
    Other,
}

/// Single source of truth for lineage classification. Patterns are
/// matched as case-insensitive substrings of the lineage string, in
/// table order.
const COMMUNITY_PATTERNS: &[(Community, &[&str])] = &[
    (
        Community::Viruses,
        &[
            "Viruses",
            "Viridae",
            "virus",
            "Monkeypox",
            "Influenza",
            "Variola",
            "Orthopoxvirus",
        ],
    ),
    (
        Community::Bacteria,
        &["Bacteria", "Proteobacteria", "Firmicutes", "Actinobacteria"],
    ),
    (
        Community::Fungi,
        &[
            "Fungi",
            "Ascomycota",
            "Basidiomycota",
            "Mucoromycota",
            "Microsporidia",
        ],
    ),
    (
        Community::Vectors,
        &[
            "Diptera",
            "Culicidae",
            "Anopheles",
            "Aedes",
            "Culex",
            "Glossina",
            "Glossinidae",
            "Ixodida",
            "Ixodidae",
            "Triatoma",
            "Rhodnius",
            "Phlebotomus",
            "Lutzomyia",
            "Psychodidae",
            "Simuliidae",
            "Reduviidae",
            "Pulicidae",
            "Muscidae",
        ],
    ),
    (
        Community::Hosts,
        &[
            "Mammalia",
            "Aves",
            "Amphibia",
            "Reptilia",
            "Actinopterygii",
            "Homo sapiens",
            "Mus musculus",
            "Gallus",
        ],
    ),
    (
        Community::Protists,
        &[
            "Apicomplexa",
            "Plasmodium",
            "Trypanosoma",
            "Leishmania",
            "Acanthamoeba",
            "Giardia",
            "Cryptosporidium",
            "Toxoplasma",
            "Babesia",
            "Theileria",
            "Entamoeba",
            "Trichomonas",
            "Naegleria",
            "Amoebozoa",
            "Euglenozoa",
            "Heterolobosea",
            "Diplomonadida",
            "Parabasalia",
            "Fornicata",
            "Metamonada",
        ],
    ),
    (
        Community::Helminths,
        &[
            "Nematoda",
            "Platyhelminthes",
            "Cestoda",
            "Trematoda",
            "Secernentea",
            "Chromadorea",
            "Schistosoma",
            "Ascaris",
            "Brugia",
            "Onchocerca",
            "Wuchereria",
            "Strongyloides",
            "Trichuris",
            "Ancylostoma",
            "Necator",
            "Fasciola",
            "Taenia",
        ],
    ),
];

impl Community {
    /// All communities in report display order.
    pub const ALL: [Community; 8] = [
        Community::Viruses,
        Community::Bacteria,
        Community::Fungi,
        Community::Protists,
        Community::Vectors,
        Community::Hosts,
        Community::Helminths,
        Community::Other,
    ];

    /// Classify a semicolon-delimited taxonomic lineage. Empty or
    /// `"Unknown"` lineages (the resolver's degraded output) map to
    /// `Other`, as does anything no pattern matches.
    pub fn classify(lineage: &str) -> Community {
        if lineage.is_empty() || lineage == "Unknown" {
            return Community::Other;
        }
        let lineage_lower = lineage.to_lowercase();
        for (community, patterns) in COMMUNITY_PATTERNS {
            for pattern in *patterns {
                if lineage_lower.contains(&pattern.to_lowercase()) {
                    return *community;
                }
            }
        }
        Community::Other
    }

    pub fn label(&self) -> &'static str {
        match self {
            Community::Viruses => "Viruses",
            Community::Bacteria => "Bacteria",
            Community::Fungi => "Fungi",
            Community::Vectors => "Vectors",
            Community::Hosts => "Hosts",
            Community::Protists => "Protists",
            Community::Helminths => "Helminths",
            Community::Other => "Other",
        }
    }
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
