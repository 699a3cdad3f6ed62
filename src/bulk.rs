//! Bulk Mutation Runner and the transform step that feeds it
//!
//! `transform_app_list` resolves a free-text app list into a
//! [`ResolutionCollection`]; its resolved lines (`id, name[, value]`) are the
//! input to [`BulkMutationRunner`], which sets one field on every listed app.
//!
//! A batch runs in two phases. Pre-flight parses every record, checks the
//! batch mode and resolves every field value through the catalog; any
//! problem there aborts the batch before the first write. Writes then go out
//! one per record. A failed write is recorded and the batch continues,
//! except for an authentication failure, which would fail every remaining
//! write the same way and so stops the batch. Writes already applied are
//! never rolled back.

use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::catalog::{FieldCatalog, FieldIds};
use crate::collection::ResolutionCollection;
use crate::error::{NudgeError, Result};
use crate::http::ApiGateway;
use crate::resolver::{AppResolver, Disambiguator};
use crate::validation::{looks_like_free_text, AppListEntry, ResolvedRecord};

/// Path of the field-value endpoint for one app
pub fn app_field_path(field_id: &str, app_id: &str) -> String {
    format!("/api/fields/{field_id}/saas/{app_id}")
}

/// Sets `field_id` to the allowed value `value_id` on app `app_id`.
pub async fn set_app_field(gateway: &dyn ApiGateway, app_id: &str, field_id: &str, value_id: &str) -> Result<()> {
    let body = json!({ "value": value_id.to_string() });
    gateway.post(&app_field_path(field_id, app_id), &body).await?;
    debug!("Set field {} = {} on app {}", field_id, value_id, app_id);
    Ok(())
}

/// Where each record's value comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchMode {
    /// One value for every record, given up front
    Shared(String),
    /// Each record carries its own value in the third column
    PerRecord,
}

impl BatchMode {
    /// Exactly one of a shared value or per-record values must be chosen.
    pub fn from_options(shared_value: Option<String>, per_record: bool) -> Result<Self> {
        match (shared_value, per_record) {
            (Some(_), true) => Err(NudgeError::validation(
                "choose either a shared --value or --per-record values, not both",
            )),
            (None, false) => Err(NudgeError::validation(
                "a value is required: pass --value, or --per-record with `id, name, value` lines",
            )),
            (Some(value), false) if value.trim().is_empty() => {
                Err(NudgeError::validation("--value must not be empty"))
            }
            (Some(value), false) => Ok(Self::Shared(value.trim().to_string())),
            (None, true) => Ok(Self::PerRecord),
        }
    }
}

/// One write that pre-flight has fully resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub line: usize,
    pub app_id: String,
    pub app_name: Option<String>,
    pub value: String,
    pub ids: FieldIds,
}

impl PlannedWrite {
    fn label(&self) -> String {
        match &self.app_name {
            Some(name) => format!("{} ({})", name, self.app_id),
            None => self.app_id.clone(),
        }
    }
}

/// Outcome of a batch
#[derive(Debug, Default)]
pub struct BulkReport {
    pub dry_run: bool,
    pub applied: Vec<PlannedWrite>,
    pub failed: Vec<(PlannedWrite, String)>,
    /// Records not attempted because the batch stopped early
    pub skipped: Vec<PlannedWrite>,
}

impl BulkReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    pub fn summary(&self) -> String {
        let verb = if self.dry_run { "Would update" } else { "Updated" };
        let mut out = format!("{verb} {} apps", self.applied.len());
        if !self.failed.is_empty() {
            out.push_str(&format!(", {} failed", self.failed.len()));
        }
        if !self.skipped.is_empty() {
            out.push_str(&format!(", {} not attempted", self.skipped.len()));
        }
        out
    }
}

pub struct BulkMutationRunner<'a> {
    gateway: Arc<dyn ApiGateway>,
    catalog: &'a FieldCatalog,
}

impl<'a> BulkMutationRunner<'a> {
    pub fn new(gateway: Arc<dyn ApiGateway>, catalog: &'a FieldCatalog) -> Self {
        Self { gateway, catalog }
    }

    /// Pre-flight: validates every record against `mode` and resolves every
    /// value to identifiers. Issues no writes.
    pub async fn plan(&self, field: &str, mode: &BatchMode, records: &[ResolvedRecord]) -> Result<Vec<PlannedWrite>> {
        let shared = match mode {
            BatchMode::Shared(value) => {
                let ids = self.catalog.get_ids_for_field_and_value(field, Some(value)).await?;
                Some((value.clone(), ids))
            }
            BatchMode::PerRecord => {
                self.catalog.get_field_id(field).await?;
                None
            }
        };

        let mut per_value: HashMap<String, FieldIds> = HashMap::new();
        let mut plan = Vec::with_capacity(records.len());

        for record in records {
            if looks_like_free_text(&record.app_id) {
                return Err(NudgeError::validation(format!(
                    "line {}: {:?} is not an app id; run transform-app-list first",
                    record.line, record.app_id
                )));
            }

            let (value, ids) = match (&shared, &record.value) {
                (Some(_), Some(_)) => {
                    return Err(NudgeError::validation(format!(
                        "line {}: record carries its own value but a shared --value was given; \
                         a batch must use one mode",
                        record.line
                    )))
                }
                (Some((value, ids)), None) => (value.clone(), ids.clone()),
                (None, Some(value)) if !value.is_empty() => {
                    let key = value.to_lowercase();
                    let ids = match per_value.get(&key) {
                        Some(ids) => ids.clone(),
                        None => {
                            let ids = self.catalog.get_ids_for_field_and_value(field, Some(value)).await?;
                            per_value.insert(key, ids.clone());
                            ids
                        }
                    };
                    (value.clone(), ids)
                }
                (None, _) => {
                    return Err(NudgeError::validation(format!(
                        "line {}: per-record mode needs `id, name, value` but the value is missing",
                        record.line
                    )))
                }
            };

            plan.push(PlannedWrite {
                line: record.line,
                app_id: record.app_id.clone(),
                app_name: record.name.clone(),
                value,
                ids,
            });
        }

        info!("Pre-flight accepted {} records for field {}", plan.len(), field);
        Ok(plan)
    }

    /// Issues one write per planned record (none when `dry_run`).
    pub async fn apply(&self, plan: Vec<PlannedWrite>, dry_run: bool) -> BulkReport {
        let mut report = BulkReport {
            dry_run,
            ..BulkReport::default()
        };
        let mut pending = plan.into_iter();

        while let Some(write) = pending.next() {
            if dry_run {
                info!("Dry run: would set {} to {}", write.label(), write.value);
                report.applied.push(write);
                continue;
            }

            let value_id = write.ids.value_id.as_deref().unwrap_or(write.value.as_str());
            match set_app_field(self.gateway.as_ref(), &write.app_id, &write.ids.field_id, value_id).await {
                Ok(()) => {
                    info!("Updated {} to {}", write.label(), write.value);
                    report.applied.push(write);
                }
                Err(err @ NudgeError::Auth(_)) => {
                    error!("Stopping batch at line {}: {}", write.line, err);
                    report.failed.push((write, err.to_string()));
                    report.skipped.extend(pending.by_ref());
                }
                Err(err) => {
                    warn!("Line {}: failed to update {}: {}", write.line, write.label(), err);
                    report.failed.push((write, err.to_string()));
                }
            }
        }

        report
    }

    /// Pre-flight then apply.
    pub async fn run(&self, field: &str, mode: &BatchMode, records: &[ResolvedRecord], dry_run: bool) -> Result<BulkReport> {
        let plan = self.plan(field, mode, records).await?;
        Ok(self.apply(plan, dry_run).await)
    }
}

/// Resolves every app-list entry, attaching its value (if any) to the result.
pub async fn transform_app_list<D: Disambiguator>(
    resolver: &mut AppResolver<'_, D>,
    entries: &[AppListEntry],
) -> Result<ResolutionCollection> {
    let mut collection = ResolutionCollection::new();
    for entry in entries {
        let mut resolution = resolver.resolve(&entry.term).await?;
        if let Some(value) = &entry.value {
            resolution.attach_metadata(value.clone());
        }
        debug!("{} -> {}", entry.term, resolution.status());
        collection.add(resolution);
    }
    Ok(collection)
}

/// Writes the resolved lines of `collection`, one per line.
pub async fn write_transformed_list(collection: &ResolutionCollection, path: &Path) -> Result<usize> {
    let lines = collection.resolved_lines();
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    tokio::fs::write(path, text).await?;
    info!("Wrote {} resolved apps to {}", lines.len(), path.display());
    Ok(lines.len())
}
