use crate::error::ConfigError;
use revlog_kernel::SnapshotCodec;
use revlog_persist::RESERVED_FIELDS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a configured extra patch field is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldOrigin {
    /// The entity as stored after the transition.
    Entity,
    /// The caller-supplied mutation context.
    Context,
}

/// An extra field copied into every patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeField {
    /// Dotted source path (`owner`, `meta.reason`).
    pub source: String,
    pub origin: FieldOrigin,
}

/// Derives a log name from the owner type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameTransform {
    Prefix(String),
    Suffix(String),
    /// Ignore the owner type and use this name.
    Fixed(String),
}

impl NameTransform {
    pub fn apply(&self, owner_type: &str) -> String {
        match self {
            Self::Prefix(p) => format!("{p}{owner_type}"),
            Self::Suffix(s) => format!("{owner_type}{s}"),
            Self::Fixed(name) => name.clone(),
        }
    }
}

/// How the patch log for an owner type is named.
///
/// Each transform is written as a one-entry map (`{ suffix: "_patches" }`)
/// in both JSON and YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogNaming {
    /// Name of the collection / directory holding the patches.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub collection: NameTransform,
    /// Name of the patch record type, used in logs and tooling.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub record_type: NameTransform,
}

impl Default for LogNaming {
    fn default() -> Self {
        Self {
            collection: NameTransform::Suffix("_patches".into()),
            record_type: NameTransform::Suffix("Patch".into()),
        }
    }
}

/// Immutable engine configuration for one tracked entity type.
///
/// Build once, validate with [`VersioningConfig::validate`] (the orchestrator
/// does this on construction), then share by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VersioningConfig {
    pub owner_type: String,
    pub id_field: String,
    pub version_field: String,
    pub timestamp_fields: Vec<String>,
    /// Output field name -> source.
    pub include_fields: BTreeMap<String, IncludeField>,
    pub cascade_delete_on_remove: bool,
    pub record_original_value_per_op: bool,
    pub log_collection_naming: LogNaming,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            owner_type: String::new(),
            id_field: "id".into(),
            version_field: "version".into(),
            timestamp_fields: vec!["createdAt".into(), "updatedAt".into()],
            include_fields: BTreeMap::new(),
            cascade_delete_on_remove: true,
            record_original_value_per_op: false,
            log_collection_naming: LogNaming::default(),
        }
    }
}

impl VersioningConfig {
    pub fn new(owner_type: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            ..Self::default()
        }
    }

    pub fn include(
        mut self,
        name: impl Into<String>,
        source: impl Into<String>,
        origin: FieldOrigin,
    ) -> Self {
        self.include_fields.insert(
            name.into(),
            IncludeField {
                source: source.into(),
                origin,
            },
        );
        self
    }

    pub fn cascade_delete(mut self, enabled: bool) -> Self {
        self.cascade_delete_on_remove = enabled;
        self
    }

    pub fn record_original_values(mut self, enabled: bool) -> Self {
        self.record_original_value_per_op = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.owner_type.trim().is_empty() {
            return Err(ConfigError::MissingOwnerType);
        }
        if self.id_field.is_empty() {
            return Err(ConfigError::EmptyField("idField"));
        }
        if self.version_field.is_empty() {
            return Err(ConfigError::EmptyField("versionField"));
        }
        if self.id_field == self.version_field || self.timestamp_fields.contains(&self.id_field) {
            return Err(ConfigError::ConflictingField(self.id_field.clone()));
        }
        for (name, field) in &self.include_fields {
            if name.is_empty() {
                return Err(ConfigError::EmptyField("includeFields"));
            }
            if RESERVED_FIELDS.contains(&name.as_str()) {
                return Err(ConfigError::ConflictingField(name.clone()));
            }
            if field.source.is_empty() {
                return Err(ConfigError::EmptyIncludeSource(name.clone()));
            }
        }
        let collection = self.log_collection();
        if collection.is_empty() || self.log_record_type().is_empty() {
            return Err(ConfigError::EmptyLogName);
        }
        if collection == self.owner_type {
            return Err(ConfigError::ConflictingLogName(collection));
        }
        Ok(())
    }

    /// Name of the patch log collection for this owner type.
    pub fn log_collection(&self) -> String {
        self.log_collection_naming.collection.apply(&self.owner_type)
    }

    pub fn log_record_type(&self) -> String {
        self.log_collection_naming.record_type.apply(&self.owner_type)
    }

    /// The snapshot codec stripping this type's identity, version and
    /// timestamp fields.
    pub fn codec(&self) -> SnapshotCodec {
        SnapshotCodec::new(
            self.id_field.clone(),
            self.version_field.clone(),
            self.timestamp_fields.iter().cloned(),
        )
    }
}
