use std::path::PathBuf;
use std::sync::Arc;

use profile_fields::{
    config::Config,
    schema::{
        BaseSchemaProvider, FieldDefinition, FieldType, FieldValidator, FileBaseSchemaProvider,
        FileSchemaSource, SchemaSource, StaticBaseSchemaProvider, StaticSchemaSource,
        ValidatorOverride,
    },
    AttributeStore, EntityKind, EntityRef, ProfileError, ProfileService, ProfileValues,
    SchemaCache, SchemaDocument, VisibilityFilter,
};
use serde_json::{json, Value};
use tempfile::tempdir;

fn schema_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("schema")
}

async fn service_over(
    source: Arc<dyn SchemaSource>,
    base_schemas: Arc<dyn BaseSchemaProvider>,
) -> ProfileService {
    let cache = Arc::new(SchemaCache::new(source));
    let store = AttributeStore::new_in_memory(cache).await.unwrap();
    ProfileService::new(store, base_schemas)
}

async fn shipped_service() -> ProfileService {
    service_over(
        Arc::new(FileSchemaSource::new(schema_dir())),
        Arc::new(FileBaseSchemaProvider::new(schema_dir())),
    )
    .await
    .with_overrides(Config::default().validator_overrides())
}

fn data(value: Value) -> ProfileValues {
    value.as_object().unwrap().clone()
}

#[tokio::test]
async fn test_shipped_schemas_merge_with_request_schemas() {
    let service = shipped_service().await;

    let merged = service
        .fields_schema(EntityKind::User, Some("create_user"))
        .await
        .unwrap();
    assert_eq!(
        merged.field_names(),
        vec![
            "user_name", "first_name", "email", "password", "passwordc",
            "nickname", "location", "shoe_size", "newsletter", "tier",
        ]
    );
    for field in ["password", "passwordc"] {
        assert_eq!(
            merged.get(field).unwrap().validator("length"),
            Some(&FieldValidator::length(Some(8), Some(100)))
        );
    }
    assert!(merged.is_custom("tier"));
    assert!(!merged.is_custom("email"));

    let group = service
        .fields_schema(EntityKind::Group, Some("create_group"))
        .await
        .unwrap();
    assert_eq!(
        group.field_names(),
        vec!["name", "slug", "description", "motto", "budget_code"]
    );
}

#[tokio::test]
async fn test_fields_schema_is_idempotent_without_invalidation() {
    let service = shipped_service().await;
    let first = service.fields_schema(EntityKind::User, None).await.unwrap();
    let second = service.fields_schema(EntityKind::User, None).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(service.cache().stats().loads, 1);
}

#[tokio::test]
async fn test_invalidation_reloads_edited_source() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("user_fields.yaml");
    std::fs::write(&path, "nickname:\n  type: string\n").unwrap();

    let service = service_over(
        Arc::new(FileSchemaSource::new(dir.path())),
        Arc::new(StaticBaseSchemaProvider::new()),
    )
    .await;

    let before = service.fields_schema(EntityKind::User, None).await.unwrap();
    std::fs::write(&path, "nickname:\n  type: string\npronouns:\n  type: string\n").unwrap();
    let cached = service.fields_schema(EntityKind::User, None).await.unwrap();
    assert_eq!(before, cached);

    service.invalidate_schema(EntityKind::User).await;
    let after = service.fields_schema(EntityKind::User, None).await.unwrap();
    assert_eq!(after.field_names(), vec!["nickname", "pronouns"]);
}

#[tokio::test]
async fn test_defaults_and_visibility() {
    let service = shipped_service().await;
    let user = EntityRef::user(100);

    let all = service.profile(&user, VisibilityFilter::All).await.unwrap();
    assert_eq!(
        Value::Object(all),
        json!({ "nickname": "", "newsletter": false, "tier": "bronze" })
    );

    let public = service.profile(&user, VisibilityFilter::PublicOnly).await.unwrap();
    assert_eq!(Value::Object(public), json!({ "nickname": "", "tier": "bronze" }));
}

#[tokio::test]
async fn test_update_then_read_round_trips() {
    let service = shipped_service().await;
    let user = EntityRef::user(101);
    let submitted = data(json!({
        "nickname": "tank",
        "shoe_size": 45,
        "newsletter": true,
        "tier": "gold",
        "user_name": "not-a-profile-field",
    }));

    let mut tx = service.store().unwrap().begin().await.unwrap();
    service.update_profile(&mut tx, &user, &submitted).await.unwrap();
    tx.commit().await.unwrap();

    let profile = service.profile(&user, VisibilityFilter::All).await.unwrap();
    for key in ["nickname", "shoe_size", "newsletter", "tier"] {
        assert_eq!(profile.get(key), submitted.get(key), "mismatch for {}", key);
    }
    assert!(!profile.contains_key("user_name"));

    let public = service.profile(&user, VisibilityFilter::PublicOnly).await.unwrap();
    assert!(!public.contains_key("shoe_size"));
    assert!(!public.contains_key("newsletter"));
}

#[tokio::test]
async fn test_strict_store_rejects_unknown_keys_atomically() {
    let service = shipped_service().await;
    let store = service.store().unwrap();

    let mut tx = store.begin().await.unwrap();
    let err = store
        .set_values(
            &mut tx,
            EntityRef::user(102).id,
            EntityKind::User,
            &data(json!({ "nickname": "dozer", "is_admin": true })),
        )
        .await
        .unwrap_err();
    tx.commit().await.unwrap();

    assert!(matches!(err, ProfileError::UnknownField(_)));
    assert!(err.is_recoverable());

    let profile = service
        .profile(&EntityRef::user(102), VisibilityFilter::All)
        .await
        .unwrap();
    assert_eq!(profile.get("nickname"), Some(&json!("")));
}

#[tokio::test]
async fn test_rollback_discards_profile_update() {
    let service = shipped_service().await;
    let group = EntityRef::group(7);

    let mut tx = service.store().unwrap().begin().await.unwrap();
    service
        .update_profile(&mut tx, &group, &data(json!({ "motto": "Free your mind" })))
        .await
        .unwrap();
    // the owning entity write failed, so the caller rolls everything back
    tx.rollback().await.unwrap();

    let profile = service.profile(&group, VisibilityFilter::All).await.unwrap();
    assert_eq!(profile.get("motto"), Some(&json!("")));
}

#[tokio::test]
async fn test_validation_failure_reports_fields() {
    let service = shipped_service().await;
    let group = EntityRef::group(8);

    let mut tx = service.store().unwrap().begin().await.unwrap();
    let err = service
        .update_profile(&mut tx, &group, &data(json!({ "budget_code": "fin 12" })))
        .await
        .unwrap_err();
    tx.rollback().await.unwrap();

    let errors = err.field_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "budget_code");
    assert_eq!(errors[0].rule, "pattern");
}

#[tokio::test]
async fn test_type_conflict_between_base_and_custom() {
    let source = StaticSchemaSource::new().with(EntityKind::User, "age:\n  type: string\n");
    let base = StaticBaseSchemaProvider::new().with(
        "create_user",
        SchemaDocument::from_fields(vec![FieldDefinition::new("age", FieldType::Number)]).unwrap(),
    );
    let service = service_over(Arc::new(source), Arc::new(base)).await;

    let err = service
        .fields_schema(EntityKind::User, Some("create_user"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProfileError::SchemaConflict { .. }));
    assert!(err.is_configuration_fault());
}

#[tokio::test]
async fn test_caller_overrides_layer_after_configured_ones() {
    let service = shipped_service().await;
    let base = SchemaDocument::from_fields(vec![FieldDefinition::new(
        "password",
        FieldType::String,
    )
    .validate(FieldValidator::length(Some(1), None))])
    .unwrap();

    let merged = service
        .fields_schema_with(
            EntityKind::User,
            &base,
            &[ValidatorOverride::new("password", FieldValidator::length(None, Some(64)))],
        )
        .await
        .unwrap();
    assert_eq!(
        merged.get("password").unwrap().validator("length"),
        Some(&FieldValidator::length(Some(8), Some(64)))
    );
}

#[tokio::test]
async fn test_group_write_of_user_field_is_unknown() {
    let service = shipped_service().await;
    let store = service.store().unwrap();

    let mut tx = store.begin().await.unwrap();
    let err = store
        .set_values(
            &mut tx,
            EntityRef::group(9).id,
            EntityKind::Group,
            &data(json!({ "shoe_size": 44 })),
        )
        .await
        .unwrap_err();
    tx.rollback().await.unwrap();

    match err {
        ProfileError::UnknownField(keys) => assert_eq!(keys, vec!["shoe_size".to_string()]),
        other => panic!("expected unknown field, got {:?}", other),
    }
}
