//! Wire and domain types for apps, fields and search pages
//!
//! App records are read-only snapshots of what the API returned for one
//! query. Identifiers arrive as numbers from some endpoints and strings from
//! others; both are normalised to `String` on the way in.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::sanitize::strip_commas;

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(i64),
    Str(String),
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Int(n) => n.to_string(),
        IdRepr::Str(s) => s,
    })
}

/// A discovered SaaS application as returned by the app search endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub service_info: Option<ServiceInfo>,
    #[serde(default)]
    pub domain_canonical: Option<String>,
    #[serde(default)]
    pub counters: Option<Counters>,
    #[serde(default)]
    pub account_count: Option<u64>,
    #[serde(default)]
    pub fields: Vec<AppFieldValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub domain_canonical: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counters {
    #[serde(default)]
    pub total_accounts: Option<u64>,
}

/// One (field, allowed value) association on an app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppFieldValue {
    pub field: FieldRef,
    #[serde(default)]
    pub allowed_value: Option<AllowedValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRef {
    #[serde(default, deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl AppRecord {
    /// Service-info name when present, otherwise the app's own name, with
    /// commas removed so the value is safe in comma-separated output.
    pub fn display_name(&self) -> String {
        let name = self
            .service_info
            .as_ref()
            .and_then(|info| non_empty(&info.name))
            .or_else(|| non_empty(&self.name))
            .unwrap_or("");
        strip_commas(name)
    }

    pub fn canonical_domain(&self) -> Option<&str> {
        non_empty(&self.domain_canonical).or_else(|| {
            self.service_info
                .as_ref()
                .and_then(|info| non_empty(&info.domain_canonical))
        })
    }

    pub fn category(&self) -> Option<&str> {
        self.service_info
            .as_ref()
            .and_then(|info| info.category.as_ref())
            .and_then(|c| non_empty(&c.name))
    }

    pub fn account_count(&self) -> u64 {
        self.counters
            .as_ref()
            .and_then(|c| c.total_accounts)
            .or(self.account_count)
            .unwrap_or(0)
    }

    /// Values set on this app for `field_name`, joined with `:`; `None` when unset.
    pub fn field_value(&self, field_name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.field.name == field_name)
            .filter_map(|f| f.allowed_value.as_ref().map(|v| v.value.as_str()))
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(":"))
        }
    }

    /// `name: account_count`, the one-line form used in listings and prompts
    pub fn summary(&self) -> String {
        format!("{}: {}", self.display_name(), self.account_count())
    }
}

/// Data type of a custom field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldType {
    #[default]
    SingleSelect,
    MultiSelect,
    Text,
    Numeric,
    DateTime,
    /// A type this client does not know about yet
    Other(String),
}

fn normalise(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase()
}

impl FieldType {
    pub fn parse(raw: &str) -> Self {
        match normalise(raw).as_str() {
            "SELECT" | "SINGLESELECT" => Self::SingleSelect,
            "MULTISELECT" => Self::MultiSelect,
            "TEXT" | "FREETEXT" | "STRING" => Self::Text,
            "NUMBER" | "NUMERIC" => Self::Numeric,
            "DATETIME" | "DATE" => Self::DateTime,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::SingleSelect => "SELECT",
            Self::MultiSelect => "MULTI_SELECT",
            Self::Text => "TEXT",
            Self::Numeric => "NUMBER",
            Self::DateTime => "DATETIME",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_select(&self) -> bool {
        matches!(self, Self::SingleSelect | Self::MultiSelect)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Entity level a field can be attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldScope {
    Application,
    Account,
    User,
    /// A scope this client does not know; kept verbatim
    Other(String),
}

impl FieldScope {
    pub fn parse(raw: &str) -> Option<Self> {
        match normalise(raw).as_str() {
            "SAAS" | "APP" | "APPLICATION" => Some(Self::Application),
            "SAASACCOUNT" | "ACCOUNT" => Some(Self::Account),
            "USER" => Some(Self::User),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Application => "saas",
            Self::Account => "saas_account",
            Self::User => "user",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for FieldScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl Serialize for FieldScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for FieldScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ScopeRepr {
            Bare(String),
            Wrapped { scope: String },
        }
        let raw = match ScopeRepr::deserialize(deserializer)? {
            ScopeRepr::Bare(s) | ScopeRepr::Wrapped { scope: s } => s,
        };
        Ok(Self::parse(&raw).unwrap_or(Self::Other(raw)))
    }
}

/// One permitted value of a select-type field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowedValue {
    #[serde(default, deserialize_with = "de_id")]
    pub id: String,
    pub value: String,
}

/// A custom field defined for the organisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(default, alias = "type")]
    pub field_type: FieldType,
    #[serde(default, alias = "field_scopes")]
    pub scopes: Vec<FieldScope>,
    #[serde(default)]
    pub allowed_values: Vec<AllowedValue>,
}

impl FieldDefinition {
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }

    /// Case-insensitive lookup of an allowed value
    pub fn allowed_value(&self, value: &str) -> Option<&AllowedValue> {
        let wanted = value.to_lowercase();
        self.allowed_values
            .iter()
            .find(|v| v.value.to_lowercase() == wanted)
    }

    pub fn has_scope(&self, scope: &FieldScope) -> bool {
        self.scopes.contains(scope)
    }
}

/// `GET /api/fields/`
#[derive(Debug, Deserialize)]
pub struct FieldListResponse {
    #[serde(default, alias = "values")]
    pub fields: Vec<FieldDefinition>,
}

/// One page of `POST /api/analysis/app/search`
#[derive(Debug, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub values: Vec<AppRecord>,
    #[serde(default)]
    pub next_page: Option<u32>,
}

/// Response to field creation; only the new id is used
#[derive(Debug, Deserialize)]
pub struct CreatedField {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
}

/// A supplier in an app's supply chain
#[derive(Debug, Clone, Deserialize)]
pub struct Vendor {
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub domain_canonical: Option<String>,
}

/// `GET /api/service/vendors/{canonical_domain}`
#[derive(Debug, Deserialize)]
pub struct VendorsResponse {
    #[serde(default)]
    pub vendors: Vec<Vendor>,
}
