//! Field Catalog: the organisation's custom field schema
//!
//! The schema is fetched once, on first use, and served from memory for the
//! rest of the process. Only field creation and update (which change the
//! schema) invalidate it. Lookups by field name and by allowed value are
//! case-insensitive.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{NudgeError, Result};
use crate::http::ApiGateway;
use crate::model::{CreatedField, FieldDefinition, FieldListResponse, FieldScope, FieldType};

pub const FIELDS_PATH: &str = "/api/fields/";

/// Identifiers for a field and, optionally, one of its allowed values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIds {
    pub field_id: String,
    pub value_id: Option<String>,
}

/// A field to create
#[derive(Debug, Clone)]
pub struct NewField {
    pub name: String,
    pub field_type: FieldType,
    pub scopes: Vec<FieldScope>,
    pub allowed_values: Vec<String>,
}

/// Changes to an existing field; `None` keeps the current setting
#[derive(Debug, Clone, Default)]
pub struct FieldUpdate {
    pub field_id: String,
    pub name: Option<String>,
    pub scopes: Option<Vec<FieldScope>>,
    /// Values to add; values already present (case-insensitively) are skipped
    pub allowed_values: Vec<String>,
}

pub struct FieldCatalog {
    gateway: Arc<dyn ApiGateway>,
    fields: OnceCell<Vec<FieldDefinition>>,
}

impl FieldCatalog {
    pub fn new(gateway: Arc<dyn ApiGateway>) -> Self {
        Self {
            gateway,
            fields: OnceCell::new(),
        }
    }

    /// A catalog whose cache is already populated; no fetch will happen.
    pub fn with_fields(gateway: Arc<dyn ApiGateway>, fields: Vec<FieldDefinition>) -> Self {
        Self {
            gateway,
            fields: OnceCell::new_with(Some(fields)),
        }
    }

    /// All field definitions, fetched on first call and cached afterwards.
    pub async fn list_fields(&self) -> Result<&[FieldDefinition]> {
        let fields = self
            .fields
            .get_or_try_init(|| async {
                let raw = self.gateway.get(FIELDS_PATH).await?;
                let parsed: FieldListResponse = serde_json::from_value(raw)?;
                info!("Loaded {} field definitions", parsed.fields.len());
                Ok::<_, NudgeError>(parsed.fields)
            })
            .await?;
        Ok(fields.as_slice())
    }

    /// Drops the cached schema so the next lookup refetches it.
    pub fn invalidate(&mut self) {
        if self.fields.take().is_some() {
            debug!("Field catalog invalidated");
        }
    }

    async fn field_by_name(&self, field_name: &str) -> Result<&FieldDefinition> {
        self.list_fields()
            .await?
            .iter()
            .find(|f| f.name_matches(field_name))
            .ok_or_else(|| NudgeError::not_found(format!("field {field_name:?}")))
    }

    /// Resolves a field name, and optionally one of its values, to identifiers.
    ///
    /// Fails with [`NudgeError::NotFound`] when the field does not exist, or a
    /// value was given and the field has no allowed value matching it.
    pub async fn get_ids_for_field_and_value(&self, field_name: &str, value: Option<&str>) -> Result<FieldIds> {
        let field = self.field_by_name(field_name).await?;
        let value_id = match value {
            None => None,
            Some(_) if field.allowed_values.is_empty() => {
                return Err(NudgeError::not_found(format!(
                    "field {:?} has no allowed values to choose from",
                    field.name
                )))
            }
            Some(value) => {
                let allowed = field.allowed_value(value).ok_or_else(|| {
                    NudgeError::not_found(format!("value {value:?} for field {:?}", field.name))
                })?;
                Some(allowed.id.clone())
            }
        };

        Ok(FieldIds {
            field_id: field.id.clone(),
            value_id,
        })
    }

    pub async fn get_field_id(&self, field_name: &str) -> Result<String> {
        Ok(self.field_by_name(field_name).await?.id.clone())
    }

    /// Whether field `field_id` already has `value` as an allowed value.
    pub async fn value_exists(&self, field_id: &str, value: &str) -> Result<bool> {
        Ok(self
            .list_fields()
            .await?
            .iter()
            .find(|f| f.id == field_id)
            .is_some_and(|f| f.allowed_value(value).is_some()))
    }

    /// Finds a field by identifier or by name; an identifier match wins.
    pub async fn find_field(&self, name: Option<&str>, identifier: Option<&str>) -> Result<Option<FieldDefinition>> {
        let fields = self.list_fields().await?;
        if let Some(id) = identifier {
            if let Some(found) = fields.iter().find(|f| f.id == id) {
                return Ok(Some(found.clone()));
            }
        }
        Ok(name.and_then(|n| fields.iter().find(|f| f.name_matches(n)).cloned()))
    }

    /// Field names sorted alphabetically, optionally restricted to one scope.
    pub async fn field_names(&self, scope: Option<FieldScope>) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .list_fields()
            .await?
            .iter()
            .filter(|f| scope.as_ref().map_or(true, |s| f.has_scope(s)))
            .map(|f| f.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Creates a field and returns its identifier.
    pub async fn create_field(&mut self, field: NewField) -> Result<String> {
        if field.field_type.is_select() && field.allowed_values.is_empty() {
            return Err(NudgeError::validation(format!(
                "a {} field needs at least one allowed value",
                field.field_type
            )));
        }
        if field.scopes.is_empty() {
            return Err(NudgeError::validation("a field needs at least one scope"));
        }
        if self.find_field(Some(&field.name), None).await?.is_some() {
            return Err(NudgeError::validation(format!("field {:?} already exists", field.name)));
        }

        let body = json!({
            "name": field.name,
            "field_type": field.field_type,
            "scopes": field.scopes,
            "allowed_values": field
                .allowed_values
                .iter()
                .map(|v| json!({"value": v}))
                .collect::<Vec<_>>(),
        });
        let created: CreatedField = serde_json::from_value(self.gateway.post(FIELDS_PATH, &body).await?)?;
        info!("Created field {} ({})", field.name, created.id);
        self.invalidate();
        Ok(created.id)
    }

    /// Renames, re-scopes or extends the allowed values of an existing field.
    ///
    /// The full definition is sent back: existing allowed values keep their
    /// identifiers and new values are appended.
    pub async fn update_field(&mut self, update: FieldUpdate) -> Result<()> {
        let existing = self
            .find_field(None, Some(&update.field_id))
            .await?
            .ok_or_else(|| NudgeError::not_found(format!("field id {}", update.field_id)))?;

        let mut allowed_values: Vec<Value> = existing
            .allowed_values
            .iter()
            .map(|v| json!({"identifier": v.id, "value": v.value}))
            .collect();
        let mut added: Vec<&str> = Vec::new();
        for value in &update.allowed_values {
            let duplicate_in_request = added.iter().any(|a| a.eq_ignore_ascii_case(value));
            if duplicate_in_request || self.value_exists(&existing.id, value).await? {
                debug!("Allowed value {:?} already exists on field {}", value, existing.name);
                continue;
            }
            allowed_values.push(json!({"value": value}));
            added.push(value);
        }

        let scopes = match update.scopes {
            Some(scopes) if !scopes.is_empty() => scopes,
            _ => existing.scopes.clone(),
        };
        let body = json!({
            "id": existing.id,
            "name": update.name.unwrap_or_else(|| existing.name.clone()),
            "field_type": existing.field_type,
            "scopes": scopes,
            "allowed_values": allowed_values,
        });
        self.gateway.put(FIELDS_PATH, &body).await?;
        info!("Updated field {} ({} new values)", existing.id, added.len());
        self.invalidate();
        Ok(())
    }
}
