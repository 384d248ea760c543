// crates/partial-state-core/tests/mirror.rs
// ============================================================================
// Module: Shadow Schema Mirror Tests
// Description: Verifies target schema validation and shadow derivation.
// ============================================================================
//! ## Overview
//! Ensures mirroring relaxes nullability and uniqueness only, is
//! deterministic, rejects many-to-many relations, and that drift between a
//! shadow and its target is reported as a mismatch.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use partial_state_core::EntityName;
use partial_state_core::FieldDef;
use partial_state_core::FieldName;
use partial_state_core::FieldType;
use partial_state_core::MirrorOptions;
use partial_state_core::SchemaError;
use partial_state_core::ShadowSchema;
use partial_state_core::TargetSchema;
use partial_state_core::mirror;

fn customer_schema() -> TargetSchema {
    TargetSchema::builder("Customer")
        .unwrap()
        .table("customer")
        .field(FieldDef::text("email").unwrap().max_length(120).natural_key())
        .field(FieldDef::text("name").unwrap().max_length(40))
        .field(FieldDef::integer("age").unwrap().nullable())
        .field(FieldDef::text("tax_code").unwrap().unique())
        .field(FieldDef::boolean("active").unwrap().with_default(true))
        .field(FieldDef::reference("account", "Account").unwrap().nullable())
        .build()
        .unwrap()
}

#[test]
fn mirror_relaxes_every_field_to_nullable() {
    let target = customer_schema();
    let shadow = mirror(&target, &MirrorOptions::default()).unwrap();

    assert_eq!(shadow.entity().as_str(), "CustomerPartialState");
    assert_eq!(shadow.target_entity().as_str(), "Customer");
    assert_eq!(shadow.table(), "customer_partialstate");
    assert_eq!(shadow.mirrored_fields().len(), target.fields().len());
    for (shadow_field, target_field) in shadow.mirrored_fields().iter().zip(target.fields()) {
        assert_eq!(shadow_field.name, target_field.name);
        assert_eq!(shadow_field.field_type, target_field.field_type);
        assert_eq!(shadow_field.max_length, target_field.max_length);
        assert_eq!(shadow_field.default, target_field.default);
        assert!(shadow_field.nullable);
    }
}

#[test]
fn mirror_replaces_uniqueness_with_an_index() {
    let shadow = mirror(&customer_schema(), &MirrorOptions::default()).unwrap();

    let email = shadow.column("email").unwrap();
    assert!(!email.unique);
    assert!(!email.natural_key);
    assert!(email.indexed);
    let tax_code = shadow.column("tax_code").unwrap();
    assert!(!tax_code.unique);
    assert!(tax_code.indexed);
    assert_eq!(shadow.natural_key().map(|name| name.as_str()), Some("email"));
}

#[test]
fn mirror_is_idempotent() {
    let target = customer_schema();
    let options = MirrorOptions::default().state_lifetime_ms(60_000);
    let first = mirror(&target, &options).unwrap();
    let second = mirror(&target, &options).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
}

#[test]
fn fingerprint_changes_when_the_target_changes() {
    let target = customer_schema();
    let widened = TargetSchema::builder("Customer")
        .unwrap()
        .table("customer")
        .field(FieldDef::text("email").unwrap().max_length(200).natural_key())
        .build()
        .unwrap();

    let original = mirror(&target, &MirrorOptions::default()).unwrap().fingerprint().unwrap();
    let changed = mirror(&widened, &MirrorOptions::default()).unwrap().fingerprint().unwrap();
    assert_ne!(original, changed);
}

#[test]
fn shadow_survives_a_json_round_trip() {
    let shadow = mirror(&customer_schema(), &MirrorOptions::default()).unwrap();
    let json = serde_json::to_string(&shadow).unwrap();
    let restored: ShadowSchema = serde_json::from_str(&json).unwrap();

    assert_eq!(restored, shadow);
    assert_eq!(restored.fingerprint().unwrap(), shadow.fingerprint().unwrap());
}

#[test]
fn mirror_rejects_many_to_many_fields() {
    let target = TargetSchema::builder("Order")
        .unwrap()
        .field(FieldDef::integer("number").unwrap())
        .field(FieldDef::new(
            FieldName::new("tags").unwrap(),
            FieldType::ManyToMany {
                entity: EntityName::new("Tag").unwrap(),
            },
        ))
        .build()
        .unwrap();

    let err = mirror(&target, &MirrorOptions::default()).unwrap_err();
    assert!(matches!(err, SchemaError::Unsupported(_)));
}

#[test]
fn mirror_adds_shadow_only_fields_as_nullable() {
    let options = MirrorOptions::default()
        .extra_field(FieldDef::integer("wizard_step").unwrap())
        .extra_field(FieldDef::text("alias").unwrap().unique());
    let shadow = mirror(&customer_schema(), &options).unwrap();

    assert_eq!(shadow.extra_fields().len(), 2);
    assert_eq!(shadow.column_count(), customer_schema().fields().len() + 2);
    let step = shadow.column("wizard_step").unwrap();
    assert!(step.nullable);
    let alias = shadow.column("alias").unwrap();
    assert!(!alias.unique);
    assert_eq!(shadow.index_of("wizard_step"), Some(customer_schema().fields().len()));
}

#[test]
fn mirror_rejects_colliding_shadow_only_fields() {
    let options = MirrorOptions::default().extra_field(FieldDef::integer("age").unwrap());
    let err = mirror(&customer_schema(), &options).unwrap_err();
    assert!(matches!(err, SchemaError::Invalid(_)));
}

#[test]
fn mirror_rejects_formats_without_placeholders() {
    let options = MirrorOptions {
        table_format: "drafts".to_string(),
        ..MirrorOptions::default()
    };
    let err = mirror(&customer_schema(), &options).unwrap_err();
    assert!(matches!(err, SchemaError::Invalid(message) if message.contains("{table}")));

    let options = MirrorOptions {
        entity_format: "Draft".to_string(),
        ..MirrorOptions::default()
    };
    assert!(mirror(&customer_schema(), &options).is_err());
}

#[test]
fn mirror_honours_custom_formats() {
    let options = MirrorOptions {
        table_format: "draft_{table}".to_string(),
        entity_format: "{entity}Draft".to_string(),
        ..MirrorOptions::default()
    };
    let shadow = mirror(&customer_schema(), &options).unwrap();
    assert_eq!(shadow.table(), "draft_customer");
    assert_eq!(shadow.entity().as_str(), "CustomerDraft");
}

#[test]
fn mirror_rejects_zero_lifetime() {
    let options = MirrorOptions::default().state_lifetime_ms(0);
    assert!(matches!(
        mirror(&customer_schema(), &options),
        Err(SchemaError::Invalid(_))
    ));
}

#[test]
fn builder_rejects_malformed_declarations() {
    let duplicate = TargetSchema::builder("Thing")
        .unwrap()
        .field(FieldDef::integer("a").unwrap())
        .field(FieldDef::text("a").unwrap())
        .build();
    assert!(matches!(duplicate, Err(SchemaError::Invalid(_))));

    let reserved = TargetSchema::builder("Thing")
        .unwrap()
        .field(FieldDef::integer("partial_state_id").unwrap())
        .build();
    assert!(matches!(reserved, Err(SchemaError::Invalid(_))));

    let nullable_key = TargetSchema::builder("Thing")
        .unwrap()
        .field(FieldDef::integer("code").unwrap().natural_key().nullable())
        .build();
    assert!(matches!(nullable_key, Err(SchemaError::Invalid(_))));

    let two_keys = TargetSchema::builder("Thing")
        .unwrap()
        .field(FieldDef::integer("a").unwrap().natural_key())
        .field(FieldDef::integer("b").unwrap().natural_key())
        .build();
    assert!(matches!(two_keys, Err(SchemaError::Invalid(_))));

    let bad_length = TargetSchema::builder("Thing")
        .unwrap()
        .field(FieldDef::integer("a").unwrap().max_length(3))
        .build();
    assert!(matches!(bad_length, Err(SchemaError::Invalid(_))));

    let bad_default = TargetSchema::builder("Thing")
        .unwrap()
        .field(FieldDef::integer("a").unwrap().with_default("seven"))
        .build();
    assert!(matches!(bad_default, Err(SchemaError::Invalid(_))));

    assert!(TargetSchema::builder("not valid").is_err());
    assert!(FieldDef::text("1st").is_err());
}

#[test]
fn verify_against_detects_drift() {
    let target = customer_schema();
    let shadow = mirror(&target, &MirrorOptions::default()).unwrap();
    assert!(shadow.verify_against(&target).is_ok());

    let mut json: serde_json::Value = serde_json::to_value(&shadow).unwrap();
    json["fields"][1]["field_type"] = serde_json::json!({ "kind": "integer" });
    let retyped: ShadowSchema = serde_json::from_value(json).unwrap();
    assert!(matches!(retyped.verify_against(&target), Err(SchemaError::Mismatch(_))));

    let mut json: serde_json::Value = serde_json::to_value(&shadow).unwrap();
    json["fields"][0]["nullable"] = serde_json::json!(false);
    let strict: ShadowSchema = serde_json::from_value(json).unwrap();
    assert!(matches!(strict.verify_against(&target), Err(SchemaError::Mismatch(_))));

    let mut json: serde_json::Value = serde_json::to_value(&shadow).unwrap();
    json["fields"].as_array_mut().unwrap().pop();
    let truncated: ShadowSchema = serde_json::from_value(json).unwrap();
    assert!(matches!(truncated.verify_against(&target), Err(SchemaError::Mismatch(_))));

    let other = TargetSchema::builder("Supplier")
        .unwrap()
        .field(FieldDef::text("email").unwrap())
        .build()
        .unwrap();
    assert!(matches!(shadow.verify_against(&other), Err(SchemaError::Mismatch(_))));
}
