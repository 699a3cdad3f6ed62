mod common;

use anyhow::Result;
use nudge_bot::catalog::{FieldCatalog, FieldUpdate, NewField, FIELDS_PATH};
use nudge_bot::error::NudgeError;
use nudge_bot::model::{FieldScope, FieldType};
use serde_json::json;

use common::{fields_json, gateway_with_fields, MockGateway};

#[tokio::test]
async fn test_schema_is_fetched_once() -> Result<()> {
    let gateway = gateway_with_fields();
    let catalog = FieldCatalog::new(gateway.clone());

    catalog.get_ids_for_field_and_value("Owner", Some("IT")).await?;
    catalog.get_field_id("Tier").await?;
    catalog.field_names(None).await?;

    assert_eq!(gateway.calls_to("GET", FIELDS_PATH).len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_lookups_are_case_insensitive() -> Result<()> {
    let catalog = FieldCatalog::new(gateway_with_fields());

    let ids = catalog.get_ids_for_field_and_value("owner", Some("security")).await?;
    assert_eq!(ids.field_id, "11");
    assert_eq!(ids.value_id.as_deref(), Some("111"));

    let ids = catalog.get_ids_for_field_and_value("TIER", None).await?;
    assert_eq!(ids.field_id, "12");
    assert_eq!(ids.value_id, None);
    Ok(())
}

#[tokio::test]
async fn test_missing_field_or_value_is_not_found() -> Result<()> {
    let catalog = FieldCatalog::new(gateway_with_fields());

    let err = catalog.get_ids_for_field_and_value("Budget", None).await.unwrap_err();
    assert!(matches!(err, NudgeError::NotFound(_)));

    let err = catalog
        .get_ids_for_field_and_value("Owner", Some("Finance"))
        .await
        .unwrap_err();
    assert!(matches!(err, NudgeError::NotFound(_)));

    // Free-text field: a value cannot be resolved to an allowed value id
    let err = catalog
        .get_ids_for_field_and_value("Notes", Some("anything"))
        .await
        .unwrap_err();
    assert!(matches!(err, NudgeError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn test_field_names_by_scope() -> Result<()> {
    let catalog = FieldCatalog::new(gateway_with_fields());

    assert_eq!(catalog.field_names(None).await?, vec!["Notes", "Owner", "Tier"]);
    assert_eq!(catalog.field_names(Some(FieldScope::Account)).await?, vec!["Tier"]);
    assert_eq!(catalog.field_names(Some(FieldScope::User)).await?, vec!["Notes"]);
    Ok(())
}

#[tokio::test]
async fn test_find_field_prefers_identifier() -> Result<()> {
    let catalog = FieldCatalog::new(gateway_with_fields());

    let found = catalog.find_field(Some("Owner"), Some("12")).await?;
    assert_eq!(found.map(|f| f.name), Some("Tier".to_string()));
    assert!(catalog.find_field(Some("Budget"), None).await?.is_none());
    assert!(catalog.value_exists("11", "it").await?);
    assert!(!catalog.value_exists("11", "Finance").await?);
    Ok(())
}

#[tokio::test]
async fn test_create_field_posts_and_invalidates() -> Result<()> {
    let gateway = gateway_with_fields();
    gateway.respond("POST", FIELDS_PATH, json!({"id": 14}));
    gateway.respond("GET", FIELDS_PATH, fields_json());
    let mut catalog = FieldCatalog::new(gateway.clone());

    let id = catalog
        .create_field(NewField {
            name: "Risk".to_string(),
            field_type: FieldType::SingleSelect,
            scopes: vec![FieldScope::Application],
            allowed_values: vec!["High".to_string(), "Low".to_string()],
        })
        .await?;
    assert_eq!(id, "14");

    let posted = gateway.calls_to("POST", FIELDS_PATH);
    assert_eq!(
        posted[0].body,
        Some(json!({
            "name": "Risk",
            "field_type": "SELECT",
            "scopes": ["saas"],
            "allowed_values": [{"value": "High"}, {"value": "Low"}]
        }))
    );

    // Next lookup refetches the schema
    catalog.get_field_id("Owner").await?;
    assert_eq!(gateway.calls_to("GET", FIELDS_PATH).len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_create_field_rejections() -> Result<()> {
    let gateway = gateway_with_fields();
    let mut catalog = FieldCatalog::new(gateway.clone());

    let select_without_values = NewField {
        name: "Risk".to_string(),
        field_type: FieldType::MultiSelect,
        scopes: vec![FieldScope::Application],
        allowed_values: vec![],
    };
    assert!(matches!(
        catalog.create_field(select_without_values).await,
        Err(NudgeError::Validation(_))
    ));

    let duplicate = NewField {
        name: "owner".to_string(),
        field_type: FieldType::Text,
        scopes: vec![FieldScope::User],
        allowed_values: vec![],
    };
    assert!(matches!(catalog.create_field(duplicate).await, Err(NudgeError::Validation(_))));

    assert!(gateway.calls_to("POST", FIELDS_PATH).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_update_field_adds_only_new_values() -> Result<()> {
    let gateway = gateway_with_fields();
    gateway.respond("PUT", FIELDS_PATH, json!({}));
    let mut catalog = FieldCatalog::new(gateway.clone());

    catalog
        .update_field(FieldUpdate {
            field_id: "11".to_string(),
            allowed_values: vec!["it".to_string(), "Finance".to_string(), "finance".to_string()],
            ..FieldUpdate::default()
        })
        .await?;

    let put = gateway.calls_to("PUT", FIELDS_PATH);
    assert_eq!(
        put[0].body,
        Some(json!({
            "id": "11",
            "name": "Owner",
            "field_type": "SELECT",
            "scopes": ["saas"],
            "allowed_values": [
                {"identifier": "111", "value": "Security"},
                {"identifier": "112", "value": "IT"},
                {"value": "Finance"}
            ]
        }))
    );
    Ok(())
}

#[tokio::test]
async fn test_update_unknown_field_is_rejected() {
    let gateway = gateway_with_fields();
    let mut catalog = FieldCatalog::new(gateway.clone());

    let err = catalog
        .update_field(FieldUpdate {
            field_id: "999".to_string(),
            name: Some("Renamed".to_string()),
            ..FieldUpdate::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, NudgeError::NotFound(_)));
    assert!(gateway.calls_to("PUT", FIELDS_PATH).is_empty());
}

#[tokio::test]
async fn test_prepopulated_catalog_never_fetches() -> Result<()> {
    let gateway = MockGateway::new();
    let fields = serde_json::from_value(fields_json()["fields"].clone())?;
    let catalog = FieldCatalog::with_fields(gateway.clone(), fields);

    assert_eq!(catalog.get_field_id("Notes").await?, "13");
    assert!(gateway.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unknown_scope_does_not_break_lookups() -> Result<()> {
    let gateway = MockGateway::new();
    gateway.respond(
        "GET",
        FIELDS_PATH,
        json!({
            "fields": [
                {
                    "id": 11,
                    "name": "Owner",
                    "field_type": "SELECT",
                    "scopes": ["SAAS"],
                    "allowed_values": [{"id": 112, "value": "IT"}]
                },
                {
                    "id": 14,
                    "name": "Region",
                    "field_type": "TEXT",
                    "scopes": ["ORGANIZATION"]
                }
            ]
        }),
    );
    let catalog = FieldCatalog::new(gateway);

    let ids = catalog.get_ids_for_field_and_value("Owner", Some("IT")).await?;
    assert_eq!(ids.value_id.as_deref(), Some("112"));
    assert_eq!(catalog.field_names(Some(FieldScope::Application)).await?, vec!["Owner"]);
    assert_eq!(
        catalog.field_names(Some(FieldScope::Other("ORGANIZATION".into()))).await?,
        vec!["Region"]
    );
    Ok(())
}
