use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, warn};

use super::field::{FieldKind, FieldValue, Schema};
use super::StoreError;
use crate::db::DocumentCollection;

/// Result of a bulk text import: per-field outcomes, partial failures do not
/// abort the rest.
#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
    pub errors: BTreeMap<String, String>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One field as seen by an admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct FieldView {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    pub hidden: bool,
    pub persistent: bool,
    pub value: FieldValue,
}

/// A schema-constrained record cached in memory and persisted field-by-field
/// in a document collection. Reads never touch the store; a successful
/// `update` persists first and only then mutates the cache, so the two can
/// not diverge (fail-closed).
pub struct TypedRecord {
    schema: Schema,
    collection: Arc<dyn DocumentCollection>,
    cache: RwLock<HashMap<&'static str, FieldValue>>,
}

impl TypedRecord {
    /// Load the record: declared fields missing from the store get their
    /// defaults inserted; stored keys not in the schema are left alone
    /// (schema drift is tolerated, not an error). Non-persistent fields
    /// always start from their defaults.
    pub async fn init_storage(
        collection: Arc<dyn DocumentCollection>,
        schema: Schema,
    ) -> Result<Self, StoreError> {
        let mut cache = HashMap::new();
        for spec in schema.fields() {
            if !spec.persistent {
                cache.insert(spec.name, spec.default.clone());
                continue;
            }
            let value = match collection.find_value(spec.name).await? {
                Some(stored) => match FieldValue::from_json(spec.kind, &stored) {
                    Some(value) => value,
                    None => {
                        warn!(
                            record = schema.name(),
                            field = spec.name,
                            "stored value does not match declared kind, restoring default"
                        );
                        collection.upsert_value(spec.name, spec.default.to_json()).await?;
                        spec.default.clone()
                    }
                },
                None => {
                    collection.upsert_value(spec.name, spec.default.to_json()).await?;
                    spec.default.clone()
                }
            };
            cache.insert(spec.name, value);
        }
        debug!(record = schema.name(), fields = schema.fields().len(), "typed record loaded");
        Ok(Self {
            schema,
            collection,
            cache: RwLock::new(cache),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Validate operator-supplied text against the field's kind, persist,
    /// then update the cache. Returns whether the value changed.
    pub async fn update(&self, name: &str, raw: &str) -> Result<bool, StoreError> {
        let spec = self
            .schema
            .get(name)
            .ok_or_else(|| StoreError::UnknownField(name.to_string()))?;
        let value = FieldValue::parse(spec.kind, name, raw)?;
        self.store(spec.name, spec.persistent, value).await
    }

    /// Programmatic counterpart of `update` for callers that already hold a
    /// typed value (background services writing state).
    pub async fn set(&self, name: &str, value: FieldValue) -> Result<bool, StoreError> {
        let spec = self
            .schema
            .get(name)
            .ok_or_else(|| StoreError::UnknownField(name.to_string()))?;
        if value.kind() != spec.kind {
            return Err(StoreError::Validation {
                field: name.to_string(),
                expected: spec.kind,
                message: format!("got a {} value", value.kind()),
            });
        }
        self.store(spec.name, spec.persistent, value).await
    }

    async fn store(&self, name: &'static str, persistent: bool, value: FieldValue) -> Result<bool, StoreError> {
        if persistent {
            self.collection.upsert_value(name, value.to_json()).await?;
        }
        let mut cache = write(&self.cache);
        let changed = cache.get(name) != Some(&value);
        cache.insert(name, value);
        Ok(changed)
    }

    pub fn get(&self, name: &str) -> Option<FieldValue> {
        read(&self.cache).get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schema.get(name).is_some()
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(FieldValue::Integer(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            Some(FieldValue::Float(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(FieldValue::Boolean(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<String> {
        match self.get(name) {
            Some(FieldValue::Text(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_structured(&self, name: &str) -> Option<serde_json::Value> {
        match self.get(name) {
            Some(FieldValue::Structured(v)) => Some(v),
            _ => None,
        }
    }

    /// All non-hidden fields as human-editable TOML, in schema order.
    pub fn export_as_toml(&self) -> Result<String, StoreError> {
        let cache = read(&self.cache);
        let mut table = toml::value::Table::new();
        for spec in self.schema.fields() {
            if spec.hidden {
                continue;
            }
            if let Some(value) = cache.get(spec.name) {
                table.insert(spec.name.to_string(), value.to_toml());
            }
        }
        drop(cache);
        Ok(toml::to_string(&table)?)
    }

    /// Parse TOML text and apply `update` per key. One field's validation
    /// failure never blocks the others.
    pub async fn import_from_toml(&self, text: &str) -> Result<ImportReport, StoreError> {
        let table: toml::value::Table = toml::from_str(text)?;
        let mut report = ImportReport::default();
        for (key, value) in table {
            let raw = match value {
                toml::Value::String(s) => s,
                other => other.to_string(),
            };
            match self.update(&key, &raw).await {
                Ok(true) => report.changed.push(key),
                Ok(false) => report.unchanged.push(key),
                Err(err) => {
                    report.errors.insert(key, err.to_string());
                }
            }
        }
        Ok(report)
    }

    /// Schema plus current values, for admin surfaces.
    pub fn view(&self) -> Vec<FieldView> {
        let cache = read(&self.cache);
        self.schema
            .fields()
            .iter()
            .filter_map(|spec| {
                cache.get(spec.name).map(|value| FieldView {
                    name: spec.name,
                    kind: spec.kind,
                    description: spec.description,
                    hidden: spec.hidden,
                    persistent: spec.persistent,
                    value: value.clone(),
                })
            })
            .collect()
    }
}

fn read<'a, T>(lock: &'a RwLock<T>) -> std::sync::RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<'a, T>(lock: &'a RwLock<T>) -> std::sync::RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
