use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::domain::{AssemblyId, TaxId};
use crate::error::TrafficError;
use crate::store::update_latest_pointer;

/// One resolved taxonomy record. Immutable once written except for
/// cache-refresh overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    pub name: String,
    pub lineage: String,
    pub fetched_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One resolved assembly record. The lineage is filled in a second pass
/// by joining on `tax_id` against the taxonomy map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyEntry {
    #[serde(default)]
    pub tax_id: Option<String>,
    pub name: String,
    pub lineage: String,
    pub fetched_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One immutable, timestamped version of the taxonomy cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub source_data_hash: Option<String>,
    #[serde(default)]
    pub taxonomy: BTreeMap<String, TaxonomyEntry>,
    #[serde(default)]
    pub assembly: BTreeMap<String, AssemblyEntry>,
}

impl Snapshot {
    /// Copy each known taxonomy entry's lineage onto the assembly entries
    /// that reference its tax_id. Idempotent; safe to re-run after any
    /// number of partial refreshes.
    pub fn fill_assembly_lineages(&mut self) {
        for entry in self.assembly.values_mut() {
            let Some(tax_id) = entry.tax_id.as_deref() else {
                continue;
            };
            if let Some(taxon) = self.taxonomy.get(tax_id) {
                entry.lineage = taxon.lineage.clone();
            }
        }
    }

    pub fn organism_name(&self, tax_id: &TaxId) -> &str {
        self.taxonomy
            .get(tax_id.as_str())
            .map(|entry| entry.name.as_str())
            .unwrap_or("Unknown")
    }

    pub fn assembly_name(&self, assembly_id: &AssemblyId) -> &str {
        self.assembly
            .get(assembly_id.as_str())
            .map(|entry| entry.name.as_str())
            .unwrap_or("Unknown")
    }

    pub fn lineage_for_tax(&self, tax_id: &TaxId) -> &str {
        self.taxonomy
            .get(tax_id.as_str())
            .map(|entry| entry.lineage.as_str())
            .unwrap_or("Unknown")
    }

    pub fn lineage_for_assembly(&self, assembly_id: &AssemblyId) -> &str {
        self.assembly
            .get(assembly_id.as_str())
            .map(|entry| entry.lineage.as_str())
            .unwrap_or("Unknown")
    }
}

/// Which required IDs a snapshot does not cover yet. A non-empty result
/// means "needs refresh", never corruption.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingIds {
    pub tax_ids: Vec<TaxId>,
    pub assembly_ids: Vec<AssemblyId>,
}

impl MissingIds {
    pub fn is_empty(&self) -> bool {
        self.tax_ids.is_empty() && self.assembly_ids.is_empty()
    }
}

/// Versioned key-value store for taxonomy lookups, persisted as JSON
/// snapshot files plus a `latest.json` pointer. Prior versions are never
/// overwritten in place and remain inspectable.
#[derive(Debug, Clone)]
pub struct TaxonomyCache {
    cache_dir: Utf8PathBuf,
}

impl TaxonomyCache {
    pub fn new(cache_dir: Utf8PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Utf8Path {
        &self.cache_dir
    }

    fn version_path(&self, version: &str) -> Utf8PathBuf {
        self.cache_dir.join(format!("cache_{version}.json"))
    }

    fn latest_path(&self) -> Utf8PathBuf {
        self.cache_dir.join("latest.json")
    }

    /// Load the named version, or whatever `latest.json` points at, or the
    /// most recent versioned file by name. Absence is a valid empty state
    /// and never raises; unreadable files degrade to the empty snapshot.
    pub fn load(&self, version: Option<&str>) -> Snapshot {
        let path = match version {
            Some(version) => Some(self.version_path(version)),
            None => self.resolve_latest(),
        };
        let Some(path) = path else {
            return Snapshot::default();
        };
        let content = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content,
            Err(_) => return Snapshot::default(),
        };
        match serde_json::from_str(&content) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("ignoring unreadable taxonomy cache {path}: {err}");
                Snapshot::default()
            }
        }
    }

    fn resolve_latest(&self) -> Option<Utf8PathBuf> {
        let latest = self.latest_path();
        if latest.as_std_path().exists() {
            return Some(latest);
        }
        // Fallback: most recent versioned file. Version strings sort
        // chronologically, so the name order is the time order.
        let entries = fs::read_dir(self.cache_dir.as_std_path()).ok()?;
        let mut versions: Vec<Utf8PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
            .filter(|path| {
                path.file_name()
                    .map(|name| name.starts_with("cache_") && name.ends_with(".json"))
                    .unwrap_or(false)
            })
            .collect();
        versions.sort();
        versions.pop()
    }

    /// Persist the snapshot as a new versioned file and repoint
    /// `latest.json` at it. When no version is given, one is derived from
    /// the current time as a sortable string.
    pub fn save(
        &self,
        snapshot: &mut Snapshot,
        version: Option<String>,
    ) -> Result<Utf8PathBuf, TrafficError> {
        fs::create_dir_all(self.cache_dir.as_std_path())
            .map_err(|err| TrafficError::Filesystem(err.to_string()))?;

        let version =
            version.unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string());
        snapshot.version = Some(version.clone());
        snapshot.created = Some(chrono::Utc::now().to_rfc3339());

        let path = self.version_path(&version);
        let content = serde_json::to_vec_pretty(snapshot)
            .map_err(|err| TrafficError::Filesystem(err.to_string()))?;
        crate::store::Store::write_bytes_atomic(&path, &content)?;
        update_latest_pointer(&self.latest_path(), &path)?;
        Ok(path)
    }

    /// Set difference between the required IDs and the snapshot's known
    /// keys, sorted for deterministic fetch order.
    pub fn scan_missing(
        snapshot: &Snapshot,
        tax_ids: &[TaxId],
        assembly_ids: &[AssemblyId],
    ) -> MissingIds {
        let mut missing = MissingIds {
            tax_ids: tax_ids
                .iter()
                .filter(|id| !snapshot.taxonomy.contains_key(id.as_str()))
                .cloned()
                .collect(),
            assembly_ids: assembly_ids
                .iter()
                .filter(|id| !snapshot.assembly.contains_key(id.as_str()))
                .cloned()
                .collect(),
        };
        missing.tax_ids.sort();
        missing.tax_ids.dedup();
        missing.assembly_ids.sort();
        missing.assembly_ids.dedup();
        missing
    }
}

/// Fingerprint of the ID set a snapshot was built to cover. Informational
/// only; nothing enforces it against the maps' actual contents.
pub fn source_data_hash(tax_ids: &[TaxId], assembly_ids: &[AssemblyId]) -> String {
    let mut tax: Vec<&str> = tax_ids.iter().map(TaxId::as_str).collect();
    let mut assemblies: Vec<&str> = assembly_ids.iter().map(AssemblyId::as_str).collect();
    tax.sort_unstable();
    assemblies.sort_unstable();
    let combined = format!("{}|{}", tax.join(","), assemblies.join(","));
    let digest = Sha256::digest(combined.as_bytes());
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    hex[..16].to_string()
}
