use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{validate_confidence, EvidenceNormalizer, NormalizedEvidence, ProtoNode};
use crate::core::{Metadata, ObjectType, Origin, TransformKind};
use crate::error::{LineageError, Result};

/// A build-tool manifest entry reduced to its dependency shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestNode {
    pub node_id: String,
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    /// Relation name in the warehouse when it differs from `name`.
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub materialized: Option<String>,
    /// Explicit warehouse reference. Takes precedence over the location.
    #[serde(default)]
    pub reference: Option<String>,
}

impl ManifestNode {
    pub fn new(node_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn located(mut self, database: impl Into<String>, schema: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self.schema = Some(schema.into());
        self
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Warehouse reference of the node, or `None` when the manifest does not
    /// say where the relation lives. The node id is never used in its place.
    pub fn qualified_name(&self) -> Option<String> {
        if let Some(reference) = &self.reference {
            return Some(reference.clone());
        }
        match (&self.database, &self.schema) {
            (Some(database), Some(schema)) => Some(format!(
                "{}.{}.{}",
                database,
                schema,
                self.alias.as_deref().unwrap_or(&self.name)
            )),
            _ => None,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self
            .materialized
            .as_deref()
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("view") => ObjectType::View,
            Some("materialized_view") | Some("materializedview") => ObjectType::MaterializedView,
            _ => ObjectType::Table,
        }
    }
}

/// Normalizer for manifest dependency records. Dependency ids are looked up
/// in the manifest the normalizer was built from.
pub struct ManifestNormalizer {
    index: HashMap<String, (Option<String>, ObjectType)>,
    confidence: f64,
    received_at: DateTime<Utc>,
}

impl ManifestNormalizer {
    pub fn new(nodes: &[ManifestNode], confidence: f64, received_at: DateTime<Utc>) -> Self {
        let index = nodes
            .iter()
            .map(|node| {
                (
                    node.node_id.clone(),
                    (node.qualified_name(), node.object_type()),
                )
            })
            .collect();
        Self {
            index,
            confidence,
            received_at,
        }
    }

    fn proto(&self, node_id: &str) -> ProtoNode {
        let mut metadata = Metadata::new();
        metadata.insert(
            "manifest_node_id".to_string(),
            serde_json::Value::from(node_id),
        );
        match self.index.get(node_id) {
            Some((Some(reference), object_type)) => ProtoNode::new(reference.as_str())
                .with_object_type(Some(*object_type))
                .with_metadata(metadata),
            Some((None, _)) => {
                ProtoNode::unresolved(node_id, "manifest node has no database and schema")
                    .with_metadata(metadata)
            }
            None => ProtoNode::unresolved(node_id, "dependency is not a node of this manifest")
                .with_metadata(metadata),
        }
    }
}

impl EvidenceNormalizer for ManifestNormalizer {
    type Record = ManifestNode;

    fn normalize(&self, record: &ManifestNode) -> Result<Vec<NormalizedEvidence>> {
        if record.node_id.trim().is_empty() {
            return Err(LineageError::EvidenceParse(
                "manifest node has an empty node_id".to_string(),
            ));
        }
        let confidence = validate_confidence(self.confidence)?;
        let unique: BTreeSet<&str> = record.depends_on.iter().map(String::as_str).collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let target = self.proto(&record.node_id);
        target.resolvable()?;
        Ok(unique
            .into_iter()
            .map(|dependency| NormalizedEvidence {
                source: self.proto(dependency),
                target: target.clone(),
                transform_kind: TransformKind::Dependency,
                confidence,
                observed_at: self.received_at,
                origin: Origin::Manifest,
                evidence: Some(format!("{} depends on {}", record.node_id, dependency)),
            })
            .collect())
    }

    fn origin(&self) -> Origin {
        Origin::Manifest
    }
}

#[derive(Debug, Deserialize)]
struct DbtManifest {
    #[serde(default)]
    nodes: BTreeMap<String, DbtNode>,
    #[serde(default)]
    sources: BTreeMap<String, DbtNode>,
}

#[derive(Debug, Deserialize)]
struct DbtNode {
    resource_type: String,
    name: String,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    depends_on: DbtDependsOn,
    #[serde(default)]
    config: DbtConfig,
}

#[derive(Debug, Default, Deserialize)]
struct DbtDependsOn {
    #[serde(default)]
    nodes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DbtConfig {
    #[serde(default)]
    materialized: Option<String>,
}

const DBT_RELATION_TYPES: [&str; 4] = ["model", "seed", "snapshot", "source"];

/// Reduce a raw dbt `manifest.json` to manifest records.
///
/// Only relations (models, seeds, snapshots, sources) are kept, and
/// dependencies on anything else (tests, macros, metrics) are dropped.
pub fn reduce_dbt_manifest(manifest_json: &str) -> Result<Vec<ManifestNode>> {
    let manifest: DbtManifest = serde_json::from_str(manifest_json)?;

    let relations: BTreeMap<String, DbtNode> = manifest
        .nodes
        .into_iter()
        .chain(manifest.sources)
        .filter(|(_, node)| DBT_RELATION_TYPES.contains(&node.resource_type.as_str()))
        .collect();

    let known: BTreeSet<String> = relations.keys().cloned().collect();

    Ok(relations
        .into_iter()
        .map(|(node_id, node)| {
            let depends_on = node
                .depends_on
                .nodes
                .into_iter()
                .filter(|dependency| known.contains(dependency))
                .collect();
            ManifestNode {
                node_id,
                alias: node.alias.or(node.identifier),
                name: node.name,
                depends_on,
                database: node.database,
                schema: node.schema,
                materialized: node.config.materialized,
                reference: None,
            }
        })
        .collect())
}
