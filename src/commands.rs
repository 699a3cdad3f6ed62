//! Subcommand orchestration: wires the gateway, catalog, search engine and
//! resolver together and prints results.

use anyhow::{anyhow, bail, Context as _, Result};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::bulk::{self, BatchMode, BulkMutationRunner};
use crate::catalog::{FieldCatalog, FieldUpdate, NewField};
use crate::cli::{Commands, GlobalArgs};
use crate::config::ClientConfig;
use crate::domain::is_domain;
use crate::http::{ApiGateway, HttpClient};
use crate::model::{AppRecord, FieldScope, FieldType, VendorsResponse};
use crate::resolver::{AppResolution, AppResolver, ConsolePrompt, Disambiguator, NonInteractive};
use crate::search::{AppSearchEngine, ConstraintDialect};
use crate::validation::{parse_app_list, parse_resolved_list};

const NOT_SET: &str = "Not Set";

/// Everything one invocation needs: one gateway, one field catalog cached
/// for the whole run, and one fixed run mode.
pub struct Session {
    gateway: Arc<dyn ApiGateway>,
    catalog: FieldCatalog,
    dialect: ConstraintDialect,
    disambiguator: Box<dyn Disambiguator>,
}

impl Session {
    pub fn new(gateway: Arc<dyn ApiGateway>, disambiguator: Box<dyn Disambiguator>) -> Self {
        Self {
            catalog: FieldCatalog::new(gateway.clone()),
            gateway,
            dialect: ConstraintDialect::default(),
            disambiguator,
        }
    }

    pub fn with_dialect(mut self, dialect: ConstraintDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Builds the HTTP gateway and run mode from global flags.
    pub fn from_args(args: &GlobalArgs) -> Result<Self> {
        let config = ClientConfig::from_args(args)?;
        let gateway: Arc<dyn ApiGateway> = Arc::new(HttpClient::new(config)?);
        let disambiguator: Box<dyn Disambiguator> = if args.interactive {
            Box::new(ConsolePrompt::default())
        } else {
            Box::new(NonInteractive)
        };
        Ok(Self::new(gateway, disambiguator).with_dialect(args.search_dialect.into()))
    }

    fn engine(&self) -> AppSearchEngine<'_> {
        AppSearchEngine::new(self.gateway.clone(), &self.catalog).with_dialect(self.dialect)
    }

    fn resolver(&mut self) -> AppResolver<'_, &mut Box<dyn Disambiguator>> {
        let engine = AppSearchEngine::new(self.gateway.clone(), &self.catalog).with_dialect(self.dialect);
        AppResolver::new(engine, &mut self.disambiguator)
    }

    async fn resolve_one(&mut self, term: &str) -> Result<AppRecord> {
        let resolution = self.resolver().resolve(term).await?;
        match resolution.app() {
            Some(app) => Ok(app.clone()),
            None => Err(unresolved(&resolution)),
        }
    }

    pub async fn execute(&mut self, command: Commands, out: &mut dyn Write) -> Result<()> {
        match command {
            Commands::List { scope } => self.list(scope.as_deref(), out).await,
            Commands::SearchApp {
                app_name,
                domain,
                category,
                field,
                value,
                show_field,
            } => {
                let engine = self.engine();
                let apps = if let Some(name) = app_name {
                    engine.find_app(&name).await?
                } else if let Some(domain) = domain {
                    engine.find_app(&as_url(&domain)).await?
                } else if let Some(category) = category {
                    engine.find_app_by_category(&category).await?
                } else {
                    engine.find_app_by_fields(field_pairs(field, value)?).await?
                };
                print_apps(&apps, &show_field, out)
            }
            Commands::SetAppField { field, value, app } => self.set_app_field(&field, &value, app.term(), out).await,
            Commands::TransformAppList {
                app_list,
                transformed_list,
            } => self.transform_app_list(&app_list, &transformed_list, out).await,
            Commands::BulkSetAppField {
                field,
                value,
                per_record,
                app_list,
                dry_run,
            } => {
                let mode = BatchMode::from_options(value, per_record)?;
                self.bulk_set_app_field(&field, &mode, &app_list, dry_run, out).await
            }
            Commands::CreateField {
                field_name,
                field_scope,
                field_type,
                allowed_value,
            } => {
                let field_type = FieldType::parse(&field_type);
                if let FieldType::Other(raw) = &field_type {
                    bail!("unknown field type {raw:?}");
                }
                let new_field = NewField {
                    name: field_name.clone(),
                    field_type,
                    scopes: parse_scopes(&field_scope)?,
                    allowed_values: allowed_value,
                };
                let id = self.catalog.create_field(new_field).await?;
                writeln!(out, "Created field {field_name} with id {id}")?;
                Ok(())
            }
            Commands::UpdateField {
                field_id,
                field_name,
                field_scope,
                allowed_value,
            } => {
                let scopes = parse_scopes(&field_scope)?;
                let update = FieldUpdate {
                    field_id: field_id.clone(),
                    name: field_name,
                    scopes: (!scopes.is_empty()).then_some(scopes),
                    allowed_values: allowed_value,
                };
                self.catalog.update_field(update).await?;
                writeln!(out, "Updated field {field_id}")?;
                Ok(())
            }
            Commands::SupplyChain { app_name } => self.supply_chain(&app_name, out).await,
            Commands::AppInfo { domain } => {
                let details = self
                    .gateway
                    .get(&format!("/api/service/details/{}", host_or_raw(&domain)))
                    .await?;
                writeln!(out, "{}", serde_json::to_string_pretty(&details)?)?;
                Ok(())
            }
        }
    }

    async fn list(&self, scope: Option<&str>, out: &mut dyn Write) -> Result<()> {
        let scope = scope
            .map(|s| FieldScope::parse(s).ok_or_else(|| anyhow!("unknown field scope {s:?}")))
            .transpose()?;
        let mut fields: Vec<_> = self
            .catalog
            .list_fields()
            .await?
            .iter()
            .filter(|f| scope.as_ref().map_or(true, |s| f.has_scope(s)))
            .collect();
        fields.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

        for field in fields {
            let scopes: Vec<&str> = field.scopes.iter().map(FieldScope::as_wire).collect();
            writeln!(
                out,
                "{} [{}] ({}) scopes: {}",
                field.name,
                field.field_type,
                field.id,
                scopes.join(", ")
            )?;
            for value in &field.allowed_values {
                writeln!(out, "\t{} ({})", value.value, value.id)?;
            }
        }
        Ok(())
    }

    async fn set_app_field(&mut self, field: &str, value: &str, term: &str, out: &mut dyn Write) -> Result<()> {
        let ids = self.catalog.get_ids_for_field_and_value(field, Some(value)).await?;
        let app = self.resolve_one(term).await?;
        let prompt = format!("Set {field} to {value} on {}?", app.display_name());
        if !self.disambiguator.confirm(&prompt)? {
            writeln!(out, "Skipped {}", app.display_name())?;
            return Ok(());
        }

        let value_id = ids.value_id.as_deref().unwrap_or(value);
        bulk::set_app_field(self.gateway.as_ref(), &app.id, &ids.field_id, value_id).await?;
        writeln!(out, "Set {field} to {value} on {} ({})", app.display_name(), app.id)?;
        Ok(())
    }

    async fn transform_app_list(&mut self, input: &Path, output: &Path, out: &mut dyn Write) -> Result<()> {
        let text = tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("reading app list {}", input.display()))?;
        let entries = parse_app_list(&text)?;
        info!("Resolving {} apps from {}", entries.len(), input.display());

        let collection = bulk::transform_app_list(&mut self.resolver(), &entries).await?;
        let written = bulk::write_transformed_list(&collection, output)
            .await
            .with_context(|| format!("writing {}", output.display()))?;

        write!(out, "{}", collection.report())?;
        writeln!(out, "Wrote {written} apps to {}", output.display())?;
        Ok(())
    }

    async fn bulk_set_app_field(
        &mut self,
        field: &str,
        mode: &BatchMode,
        input: &Path,
        dry_run: bool,
        out: &mut dyn Write,
    ) -> Result<()> {
        let text = tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("reading transformed list {}", input.display()))?;
        let records = parse_resolved_list(&text)?;

        let runner = BulkMutationRunner::new(self.gateway.clone(), &self.catalog);
        let report = runner.run(field, mode, &records, dry_run).await?;

        writeln!(out, "{}", report.summary())?;
        for (write, reason) in &report.failed {
            writeln!(out, "\tline {}: {} ({})", write.line, write.app_id, reason)?;
        }
        if !report.is_success() {
            bail!(
                "{} of {} records were not updated",
                report.failed.len() + report.skipped.len(),
                records.len()
            );
        }
        Ok(())
    }

    async fn supply_chain(&mut self, term: &str, out: &mut dyn Write) -> Result<()> {
        let app = self.resolve_one(term).await?;
        let domain = app
            .canonical_domain()
            .ok_or_else(|| anyhow!("{} has no canonical domain", app.display_name()))?
            .to_string();

        let raw = self.gateway.get(&format!("/api/service/vendors/{domain}")).await?;
        let response: VendorsResponse = serde_json::from_value(raw)?;
        writeln!(out, "Supply chain for {} ({domain}):", app.display_name())?;
        for vendor in response.vendors {
            writeln!(
                out,
                "{} - {}",
                vendor.app_name.as_deref().unwrap_or("Unknown"),
                vendor.domain_canonical.as_deref().unwrap_or("Unknown")
            )?;
        }
        Ok(())
    }
}

fn unresolved(resolution: &AppResolution) -> anyhow::Error {
    match resolution.ambiguous_count() {
        Some(n) => anyhow!(
            "{:?} matched {n} apps; use a more specific name or --interactive",
            resolution.input()
        ),
        None => anyhow!("no app matches {:?}", resolution.input()),
    }
}

/// Pairs repeated `--field`/`--value` flags in order.
pub fn field_pairs(fields: Vec<String>, values: Vec<String>) -> Result<Vec<(String, String)>> {
    if fields.len() != values.len() {
        bail!(
            "every --field needs a --value ({} fields, {} values)",
            fields.len(),
            values.len()
        );
    }
    Ok(fields.into_iter().zip(values).collect())
}

pub fn parse_scopes(raw: &[String]) -> Result<Vec<FieldScope>> {
    raw.iter()
        .map(|s| FieldScope::parse(s).ok_or_else(|| anyhow!("unknown field scope {s:?}")))
        .collect()
}

fn as_url(domain: &str) -> String {
    if is_domain(domain) {
        domain.to_string()
    } else {
        format!("https://{}", domain.trim())
    }
}

fn host_or_raw(domain: &str) -> String {
    Url::parse(domain)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| domain.trim().to_string())
}

/// `name: account_count` per app, then one indented line per requested field.
pub fn print_apps(apps: &[AppRecord], show_fields: &[String], out: &mut dyn Write) -> Result<()> {
    for app in apps {
        writeln!(out, "{}", app.summary())?;
        for field in show_fields {
            let value = app.field_value(field).unwrap_or_else(|| NOT_SET.to_string());
            writeln!(out, "\t{field}: {value}")?;
        }
    }
    if apps.is_empty() {
        writeln!(out, "No apps found")?;
    }
    Ok(())
}
