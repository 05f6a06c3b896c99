use anyhow::{Context, Result};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::graph::Origin;
use crate::evidence::{reduce_dbt_manifest, EvidenceBatch, ManifestNode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceFile {
    pub path: PathBuf,
    pub origin: Origin,
}

/// Finds evidence files by naming convention:
/// `*.sql.json` (parsed SQL), `*.history.json` (query history) and
/// `manifest.json` / `*.manifest.json` (build-tool manifests).
pub struct EvidenceScanner;

impl EvidenceScanner {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(path: &Path) -> Option<Origin> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".sql.json") {
            Some(Origin::SqlParse)
        } else if name.ends_with(".history.json") {
            Some(Origin::QueryHistory)
        } else if name == "manifest.json" || name.ends_with(".manifest.json") {
            Some(Origin::Manifest)
        } else {
            None
        }
    }

    /// Evidence files under `root`, sorted by path.
    pub fn scan_directory(&self, root_path: &Path) -> Result<Vec<EvidenceFile>> {
        let entries: Vec<_> = WalkDir::new(root_path)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| entry.path().is_file())
            .collect();

        let mut files: Vec<EvidenceFile> = entries
            .par_iter()
            .filter_map(|entry| {
                let path = entry.path();
                Self::classify(path).map(|origin| EvidenceFile {
                    path: path.to_path_buf(),
                    origin,
                })
            })
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Load every file in parallel, keeping each file's own outcome.
    pub fn load_all(&self, files: &[EvidenceFile]) -> Vec<(EvidenceFile, Result<EvidenceBatch>)> {
        files
            .par_iter()
            .map(|file| (file.clone(), load_evidence_file(&file.path, file.origin)))
            .collect()
    }
}

impl Default for EvidenceScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Read one evidence file. Manifests may be either a list of reduced
/// records or a raw dbt `manifest.json`.
pub fn load_evidence_file(path: &Path, origin: Origin) -> Result<EvidenceBatch> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let batch = match origin {
        Origin::SqlParse => EvidenceBatch::SqlParse(
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid SQL parse evidence in {}", path.display()))?,
        ),
        Origin::QueryHistory => EvidenceBatch::QueryHistory(
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid query history in {}", path.display()))?,
        ),
        Origin::Manifest => {
            let records = if content.trim_start().starts_with('[') {
                serde_json::from_str::<Vec<ManifestNode>>(&content)
                    .with_context(|| format!("Invalid manifest records in {}", path.display()))?
            } else {
                reduce_dbt_manifest(&content)
                    .with_context(|| format!("Invalid dbt manifest in {}", path.display()))?
            };
            EvidenceBatch::Manifest(records)
        }
    };

    Ok(batch)
}
