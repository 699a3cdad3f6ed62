//! App Search Engine
//!
//! Builds structured app searches (by name/domain, by category, or by a set
//! of field values), sends them to the search endpoint and follows
//! `next_page` until the server reports no further page.
//!
//! The wire shape of a search constraint differs between API generations, so
//! the translation lives in one place: [`ConstraintDialect`].

use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::FieldCatalog;
use crate::domain::{is_domain, search_term};
use crate::error::{NudgeError, Result};
use crate::http::ApiGateway;
use crate::model::{AppRecord, SearchPage};

pub const SEARCH_PATH: &str = "/api/analysis/app/search";
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Field value meaning "this field is not set on the app"
pub const UNSET_SENTINEL: &str = "None";

/// What a query searches by. Exactly one mode per query.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchMode {
    /// Free text matched against app names, or a URL matched against the
    /// canonical domain
    Name { term: String, exact: bool },
    Category(String),
    /// (field name, value) pairs, all of which must hold
    Fields(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub property: String,
    pub descending: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            property: "account_count".to_string(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub mode: SearchMode,
    pub sort: SortSpec,
    pub page_size: u32,
}

impl SearchQuery {
    fn with_mode(mode: SearchMode) -> Self {
        Self {
            mode,
            sort: SortSpec::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn by_name(term: &str) -> Self {
        Self::with_mode(SearchMode::Name {
            term: term.to_string(),
            exact: false,
        })
    }

    pub fn by_exact_name(term: &str) -> Self {
        Self::with_mode(SearchMode::Name {
            term: term.to_string(),
            exact: true,
        })
    }

    pub fn by_category(category: &str) -> Self {
        Self::with_mode(SearchMode::Category(category.to_string()))
    }

    pub fn by_fields(pairs: Vec<(String, String)>) -> Self {
        Self::with_mode(SearchMode::Fields(pairs))
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// App attributes a constraint can target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    ServiceName,
    Name,
    DomainCanonical,
    Category,
}

/// A search constraint with field names already resolved to identifiers
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Contains { property: Property, value: String },
    Equals { property: Property, value: String },
    FieldEquals {
        field_id: String,
        field_name: String,
        value_id: String,
        value: String,
    },
    FieldUnset { field_id: String, field_name: String },
}

/// Wire format of search requests for one API generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstraintDialect {
    /// `{field, op, value}` objects; field values referenced by id
    #[default]
    Current,
    /// `{property, op, field_name, value}` objects; field values referenced by name
    Legacy,
}

impl ConstraintDialect {
    fn property_name(&self, property: Property) -> &'static str {
        match (self, property) {
            (_, Property::ServiceName) => "service_info.name",
            (_, Property::Name) => "name",
            (_, Property::DomainCanonical) => "domain_canonical",
            (Self::Current, Property::Category) => "service_info.category.name",
            (Self::Legacy, Property::Category) => "category",
        }
    }

    fn key(&self) -> &'static str {
        match self {
            Self::Current => "field",
            Self::Legacy => "property",
        }
    }

    pub fn constraint(&self, constraint: &Constraint) -> Value {
        let key = self.key();
        match (self, constraint) {
            (_, Constraint::Contains { property, value }) => json!({
                key: self.property_name(*property),
                "op": "ilike",
                "value": format!("%{value}%"),
            }),
            (_, Constraint::Equals { property, value }) => json!({
                key: self.property_name(*property),
                "op": "=",
                "value": value,
            }),
            (Self::Current, Constraint::FieldEquals { field_id, value_id, .. }) => json!({
                "field": "fields",
                "op": "withField",
                "value": format!("{field_id}:{value_id}"),
            }),
            (Self::Current, Constraint::FieldUnset { field_id, .. }) => json!({
                "field": "fields",
                "op": "withNoField",
                "value": field_id,
            }),
            (Self::Legacy, Constraint::FieldEquals { field_name, value, .. }) => json!({
                "property": "fields",
                "op": "=",
                "field_name": field_name,
                "value": value,
            }),
            (Self::Legacy, Constraint::FieldUnset { field_name, .. }) => json!({
                "property": "fields",
                "op": "isnull",
                "field_name": field_name,
                "value": UNSET_SENTINEL,
            }),
        }
    }

    pub fn request_body(&self, constraints: &[Constraint], sort: &SortSpec, page: u32, per_page: u32) -> Value {
        let search: Vec<Value> = constraints.iter().map(|c| self.constraint(c)).collect();
        let direction = if sort.descending { "desc" } else { "asc" };
        match self {
            Self::Current => json!({
                "search": search,
                "filters": [],
                "page": page,
                "per_page": per_page,
                "sort": sort.property,
                "sort_dir": direction,
            }),
            Self::Legacy => json!({
                "search": search,
                "filters": [],
                "page": page,
                "per_page": per_page,
                "sorting": {"property": sort.property, "direction": direction},
            }),
        }
    }
}

pub struct AppSearchEngine<'a> {
    gateway: Arc<dyn ApiGateway>,
    catalog: &'a FieldCatalog,
    dialect: ConstraintDialect,
}

impl<'a> AppSearchEngine<'a> {
    pub fn new(gateway: Arc<dyn ApiGateway>, catalog: &'a FieldCatalog) -> Self {
        Self {
            gateway,
            catalog,
            dialect: ConstraintDialect::default(),
        }
    }

    pub fn with_dialect(mut self, dialect: ConstraintDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn dialect(&self) -> ConstraintDialect {
        self.dialect
    }

    /// Translates a query's mode into constraints, resolving field names and
    /// values through the catalog.
    pub async fn build_constraints(&self, mode: &SearchMode) -> Result<Vec<Constraint>> {
        match mode {
            SearchMode::Name { term, .. } if term.trim().is_empty() => {
                Err(NudgeError::validation("empty app search term"))
            }
            SearchMode::Name { term, exact } => {
                let value = search_term(term);
                let make = |property| {
                    if *exact {
                        Constraint::Equals { property, value: value.clone() }
                    } else {
                        Constraint::Contains { property, value: value.clone() }
                    }
                };
                if is_domain(term) {
                    Ok(vec![make(Property::DomainCanonical)])
                } else {
                    Ok(vec![make(Property::ServiceName), make(Property::Name)])
                }
            }
            SearchMode::Category(category) => Ok(vec![Constraint::Equals {
                property: Property::Category,
                value: category.clone(),
            }]),
            SearchMode::Fields(pairs) if pairs.is_empty() => {
                Err(NudgeError::validation("field search needs at least one field/value pair"))
            }
            SearchMode::Fields(pairs) => {
                let mut constraints = Vec::with_capacity(pairs.len());
                for (field, value) in pairs {
                    if value == UNSET_SENTINEL {
                        let ids = self.catalog.get_ids_for_field_and_value(field, None).await?;
                        constraints.push(Constraint::FieldUnset {
                            field_id: ids.field_id,
                            field_name: field.clone(),
                        });
                    } else {
                        let ids = self.catalog.get_ids_for_field_and_value(field, Some(value)).await?;
                        constraints.push(Constraint::FieldEquals {
                            field_id: ids.field_id,
                            field_name: field.clone(),
                            value_id: ids.value_id.unwrap_or_default(),
                            value: value.clone(),
                        });
                    }
                }
                Ok(constraints)
            }
        }
    }

    /// Runs `query` and returns every matching app in server order, following
    /// `next_page` to the end. An app seen on an earlier page is not repeated.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<AppRecord>> {
        let constraints = self.build_constraints(&query.mode).await?;
        let mut apps: Vec<AppRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut page = 1;

        loop {
            let body = self
                .dialect
                .request_body(&constraints, &query.sort, page, query.page_size);
            let raw = self.gateway.post(SEARCH_PATH, &body).await?;
            let SearchPage { values, next_page } = serde_json::from_value(raw)?;
            debug!("Search page {} returned {} apps, next page {:?}", page, values.len(), next_page);

            for app in values {
                if seen.insert(app.id.clone()) {
                    apps.push(app);
                } else {
                    debug!("Dropping app {} repeated on page {}", app.id, page);
                }
            }

            match next_page {
                Some(next) if next > page => page = next,
                Some(next) if next != 0 => {
                    warn!("Server returned next_page {} after page {}; stopping pagination", next, page);
                    break;
                }
                _ => break,
            }
        }

        info!("Search {:?} matched {} apps", query.mode, apps.len());
        Ok(apps)
    }

    /// Free-text name, or URL, search
    pub async fn find_app(&self, term: &str) -> Result<Vec<AppRecord>> {
        self.search(&SearchQuery::by_name(term)).await
    }

    pub async fn find_app_exact(&self, term: &str) -> Result<Vec<AppRecord>> {
        self.search(&SearchQuery::by_exact_name(term)).await
    }

    pub async fn find_app_by_category(&self, category: &str) -> Result<Vec<AppRecord>> {
        self.search(&SearchQuery::by_category(category)).await
    }

    pub async fn find_app_by_fields(&self, pairs: Vec<(String, String)>) -> Result<Vec<AppRecord>> {
        self.search(&SearchQuery::by_fields(pairs)).await
    }
}
