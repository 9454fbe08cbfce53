//! Versioned schema registry
//!
//! Each entity type may carry a chain of schema versions. At most one is
//! active; registering a higher version closes the active interval at the
//! new `valid_from`, and retiring closes it without a successor. A per-type
//! head record names the newest and the active version, so every
//! registration and retirement of a type touches the same key and concurrent
//! ones conflict instead of both becoming active.

pub mod contract;
pub mod validator;

use std::sync::Arc;

use serde_json::json;

use labcore_core::{
    EventDraft, JsonValue, LabError, LabResult, RecordKind, SchemaDefinition, Timestamp, TypeTag,
};
use labcore_storage::{Record, RecordKey, ShardedStore};

use crate::database::{Database, Txn};
use crate::keys;
use validator::ValidationReport;

/// Event type appended on registration
pub const REGISTERED_EVENT: &str = "schema.registered";
/// Event type appended on retirement
pub const RETIRED_EVENT: &str = "schema.retired";

/// A schema version to register
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDraft {
    /// Type tag, e.g. `device.sensor`
    pub type_tag: String,
    /// Version, starting at 1
    pub version: u32,
    /// Field-contract document
    pub contract: JsonValue,
    /// Human description
    pub description: Option<String>,
    /// Who registers it
    pub author: Option<String>,
    /// Start of validity; registration time when absent
    pub valid_from: Option<Timestamp>,
}

impl SchemaDraft {
    /// Draft with no description, author or explicit start
    pub fn new(type_tag: impl Into<String>, version: u32, contract: impl Into<JsonValue>) -> Self {
        SchemaDraft {
            type_tag: type_tag.into(),
            version,
            contract: contract.into(),
            description: None,
            author: None,
            valid_from: None,
        }
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the author
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Pin the start of validity
    pub fn valid_from(mut self, at: Timestamp) -> Self {
        self.valid_from = Some(at);
        self
    }
}

enum Registration {
    Existing(SchemaDefinition),
    Registered {
        definition: SchemaDefinition,
        superseded: Option<u32>,
    },
}

/// Schema registry over a database.
#[derive(Clone)]
pub struct SchemaRegistry {
    db: Arc<Database>,
}

impl SchemaRegistry {
    /// Create a registry backed by the given database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register `contract` as `version` of `type_tag`, valid from now.
    pub fn register(
        &self,
        type_tag: &str,
        version: u32,
        contract: impl Into<JsonValue>,
    ) -> LabResult<SchemaDefinition> {
        self.register_draft(SchemaDraft::new(type_tag, version, contract))
    }

    /// Register a schema version.
    ///
    /// Re-registering an existing version with the same contract returns
    /// the stored definition and writes nothing.
    pub fn register_draft(&self, draft: SchemaDraft) -> LabResult<SchemaDefinition> {
        let type_tag = TypeTag::new(draft.type_tag)?;
        let version = draft.version;
        keys::validate_schema_version(version)?;
        self.db
            .config()
            .limits
            .validate_document("Field contract", &draft.contract)?;
        let contract = contract::parse_contract(&draft.contract)?;
        let checksum = contract::checksum(&contract);
        let valid_from = draft.valid_from.unwrap_or_else(Timestamp::now);

        let outcome = self.db.transaction(|txn| {
            let version_key = keys::schema_key(&type_tag, version);
            if let Some(record) = txn.get(&version_key)? {
                let existing = record.into_schema()?;
                if existing.checksum == checksum {
                    return Ok(Registration::Existing(existing));
                }
                return Err(LabError::schema_conflict(
                    type_tag.as_str(),
                    version,
                    format!(
                        "already registered with a different contract (checksum {})",
                        existing.checksum
                    ),
                ));
            }

            let (latest, active) = read_head(txn, &type_tag)?.unwrap_or((0, None));
            if version <= latest {
                return Err(LabError::schema_conflict(
                    type_tag.as_str(),
                    version,
                    format!("version {} is already registered", latest),
                ));
            }

            if let Some(active_version) = active {
                let active_key = keys::schema_key(&type_tag, active_version);
                let mut current = required_version(txn.get(&active_key)?, &type_tag, active_version)?;
                if valid_from < current.valid_from {
                    return Err(LabError::schema_conflict(
                        type_tag.as_str(),
                        version,
                        format!(
                            "valid_from precedes the start of active version {}",
                            active_version
                        ),
                    ));
                }
                current.valid_to = Some(valid_from);
                txn.put(active_key, Record::Schema(current));
            }

            let definition = SchemaDefinition {
                type_tag: type_tag.clone(),
                version,
                contract,
                description: draft.description,
                valid_from,
                valid_to: None,
                author: draft.author,
                checksum: checksum.clone(),
            };
            txn.put(version_key, Record::Schema(definition.clone()));
            txn.put(
                keys::schema_head_key(&type_tag),
                Record::SchemaHead {
                    latest: version,
                    active: Some(version),
                },
            );
            txn.append_event(EventDraft::new(REGISTERED_EVENT).payload(json!({
                "type_tag": type_tag.as_str(),
                "version": version,
                "checksum": checksum,
                "valid_from": valid_from.as_micros(),
                "superseded": active,
            })));

            Ok(Registration::Registered {
                definition,
                superseded: active,
            })
        })?;

        match outcome {
            Registration::Existing(definition) => Ok(definition),
            Registration::Registered {
                definition,
                superseded,
            } => {
                tracing::info!(
                    type_tag = %definition.type_tag,
                    version = definition.version,
                    superseded = ?superseded,
                    "Registered schema"
                );
                Ok(definition)
            }
        }
    }

    /// Close the active version at `at`; the type becomes unvalidated.
    ///
    /// Takes effect immediately; `at` is recorded as the end of validity
    /// and must not precede its start.
    pub fn retire(&self, type_tag: &str, at: Timestamp) -> LabResult<SchemaDefinition> {
        let type_tag = TypeTag::new(type_tag)?;
        let retired = self.db.transaction(|txn| {
            let (latest, active) = read_head(txn, &type_tag)?
                .ok_or_else(|| LabError::not_found(RecordKind::Schema, &type_tag))?;
            let version = active.ok_or_else(|| {
                LabError::not_found(RecordKind::Schema, format!("{} (no active version)", type_tag))
            })?;

            let key = keys::schema_key(&type_tag, version);
            let mut definition = required_version(txn.get(&key)?, &type_tag, version)?;
            if at < definition.valid_from {
                return Err(LabError::invalid_input(format!(
                    "Retirement time precedes the start of version {}",
                    version
                )));
            }
            definition.valid_to = Some(at);
            txn.put(key, Record::Schema(definition.clone()));
            txn.put(
                keys::schema_head_key(&type_tag),
                Record::SchemaHead {
                    latest,
                    active: None,
                },
            );
            txn.append_event(EventDraft::new(RETIRED_EVENT).payload(json!({
                "type_tag": type_tag.as_str(),
                "version": version,
                "valid_to": at.as_micros(),
            })));
            Ok(definition)
        })?;

        tracing::info!(type_tag = %retired.type_tag, version = retired.version, "Retired schema");
        Ok(retired)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// The active version of `type_tag`.
    pub fn get_active(&self, type_tag: &str) -> LabResult<SchemaDefinition> {
        let type_tag = TypeTag::new(type_tag)?;
        self.db
            .read(|store| active_schema(|key| Ok(stored(store, key)), &type_tag))?
            .ok_or_else(|| LabError::not_found(RecordKind::Schema, &type_tag))
    }

    /// One version of `type_tag`, active or not.
    pub fn get_version(&self, type_tag: &str, version: u32) -> LabResult<SchemaDefinition> {
        let type_tag = TypeTag::new(type_tag)?;
        let key = keys::schema_key(&type_tag, version);
        self.db
            .read(|store| stored(store, &key).map(Record::into_schema).transpose())?
            .ok_or_else(|| {
                LabError::not_found(RecordKind::Schema, format!("{} v{}", type_tag, version))
            })
    }

    /// Every version of `type_tag`, oldest first.
    pub fn versions(&self, type_tag: &str) -> LabResult<Vec<SchemaDefinition>> {
        let type_tag = TypeTag::new(type_tag)?;
        let range = keys::schema_versions_range(&type_tag);
        self.db.read(|store| {
            store
                .range(&range, usize::MAX)?
                .into_iter()
                .map(|(_, versioned)| versioned.record.into_schema())
                .collect()
        })
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validate `payload` against the active schema of `type_tag`.
    ///
    /// Types without an active schema accept any payload. Reports the first
    /// failing field in field-name order.
    pub fn validate(&self, type_tag: &str, payload: &JsonValue) -> LabResult<()> {
        let type_tag = TypeTag::new(type_tag)?;
        let active = self
            .db
            .read(|store| active_schema(|key| Ok(stored(store, key)), &type_tag))?;
        validate_against(&type_tag, active.as_ref(), payload)
    }

    /// Every failure of `payload` against the active schema of `type_tag`.
    pub fn check(&self, type_tag: &str, payload: &JsonValue) -> LabResult<ValidationReport> {
        let type_tag = TypeTag::new(type_tag)?;
        let active = self
            .db
            .read(|store| active_schema(|key| Ok(stored(store, key)), &type_tag))?;
        Ok(ValidationReport {
            version: active.as_ref().map(|s| s.version),
            issues: active
                .map(|s| validator::check_contract(&s.contract, payload))
                .unwrap_or_default(),
            type_tag,
        })
    }
}

// =============================================================================
// Transaction helpers
// =============================================================================

/// Validate inside a write transaction.
///
/// The schema head read is tracked, so a registration committed while the
/// write is in flight makes the write conflict.
pub(crate) fn validate_in_txn(
    txn: &mut Txn<'_>,
    type_tag: &TypeTag,
    payload: &JsonValue,
) -> LabResult<()> {
    let active = active_schema(|key| txn.get(key), type_tag)?;
    validate_against(type_tag, active.as_ref(), payload)
}

fn validate_against(
    type_tag: &TypeTag,
    schema: Option<&SchemaDefinition>,
    payload: &JsonValue,
) -> LabResult<()> {
    match schema.and_then(|s| validator::first_failure(&s.contract, payload)) {
        None => Ok(()),
        Some(issue) => Err(LabError::ValidationFailure {
            type_tag: type_tag.to_string(),
            issue,
        }),
    }
}

fn active_schema(
    mut get: impl FnMut(&RecordKey) -> LabResult<Option<Record>>,
    type_tag: &TypeTag,
) -> LabResult<Option<SchemaDefinition>> {
    let Some(head) = get(&keys::schema_head_key(type_tag))? else {
        return Ok(None);
    };
    match head.into_schema_head()? {
        (_, None) => Ok(None),
        (_, Some(version)) => {
            let record = get(&keys::schema_key(type_tag, version))?;
            required_version(record, type_tag, version).map(Some)
        }
    }
}

fn read_head(txn: &mut Txn<'_>, type_tag: &TypeTag) -> LabResult<Option<(u32, Option<u32>)>> {
    txn.get(&keys::schema_head_key(type_tag))?
        .map(Record::into_schema_head)
        .transpose()
}

fn required_version(
    record: Option<Record>,
    type_tag: &TypeTag,
    version: u32,
) -> LabResult<SchemaDefinition> {
    record
        .ok_or_else(|| {
            LabError::serialization(format!(
                "schema head of '{}' names missing version {}",
                type_tag, version
            ))
        })?
        .into_schema()
}

fn stored(store: &ShardedStore, key: &RecordKey) -> Option<Record> {
    store.get(key).map(|versioned| versioned.record)
}
