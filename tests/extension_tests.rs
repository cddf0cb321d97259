//! Extension type registry lifecycle, conversions and unknown-type loading.


use std::sync::Arc;
use std::thread;

use polyrt::prelude::*;
use polyrt::{Backend, ExtensionOptions};
use polyrt_engine::BuiltinBackend;
use polyrt_ext::{ExtensionRegistry, RegistryError};
use test_support::{float64, int64};

#[test]
fn test_register_lookup_duplicate_unregister() {
    let registry = ExtensionRegistry::new();

    let descriptor = registry.register("X", DataType::Int64, ExtensionOptions::default()).unwrap();
    assert_eq!(descriptor.name, "X");
    assert_eq!(registry.get("X").unwrap().storage_type, DataType::Int64);

    let err = registry.register("X", DataType::String, ExtensionOptions::default()).unwrap_err();
    assert_eq!(err, RegistryError::Duplicate("X".into()));
    assert_eq!(Error::from(err).kind(), ErrorKind::Registration);
    // the failed registration left the original untouched
    assert_eq!(registry.get("X").unwrap().storage_type, DataType::Int64);

    registry.unregister("X").unwrap();
    assert_eq!(registry.get("X").unwrap_err(), RegistryError::NotFound("X".into()));
    assert!(registry.unregister("X").is_err());
    assert!(registry.is_empty());
}

#[test]
fn test_descriptor_outlives_unregistration() {
    let registry = ExtensionRegistry::new();
    let held = registry.register("temp", DataType::Float64, ExtensionOptions::default()).unwrap();
    registry.unregister("temp").unwrap();
    assert_eq!(held.storage_type, DataType::Float64);
}

#[test]
fn test_unsupported_storage_types() {
    let registry = ExtensionRegistry::new();
    assert!(matches!(
        registry.register("n", DataType::Null, ExtensionOptions::default()),
        Err(RegistryError::UnsupportedStorage { .. })
    ));
    let nested = DataType::Extension {
        name: "inner".into(),
        storage: Box::new(DataType::Int64),
    };
    assert!(matches!(
        registry.register("outer", nested, ExtensionOptions::default()),
        Err(RegistryError::UnsupportedStorage { .. })
    ));
    assert_eq!(
        registry.register("", DataType::Int64, ExtensionOptions::default()).unwrap_err(),
        RegistryError::EmptyName
    );
    assert!(registry.is_empty());
}

#[test]
fn test_to_extension_shares_buffer() {
    let registry = ExtensionRegistry::new();
    registry.register("X", DataType::Int64, ExtensionOptions::default()).unwrap();

    let values = int64("v", &[Some(1), None, Some(3)]);
    let ext = registry.to_extension(&values, "X").unwrap();
    assert!(ext.shares_buffer(&values), "conversion must not copy");
    assert_eq!(
        ext.dtype,
        DataType::Extension {
            name: "X".into(),
            storage: Box::new(DataType::Int64)
        }
    );

    let back = polyrt_ext::storage(&ext);
    assert!(back.shares_buffer(&values));
    assert_eq!(back, values);
}

#[test]
fn test_to_extension_rejects_other_storage() {
    let registry = ExtensionRegistry::new();
    registry.register("X", DataType::Int64, ExtensionOptions::default()).unwrap();

    let err = registry.to_extension(&float64("f", &[Some(1.0)]), "X").unwrap_err();
    assert!(!err.is_recoverable());
    let err = Error::from(err);
    assert_eq!(err.kind(), ErrorKind::Conversion);
    assert!(err.to_string().contains("Float64"));
}

#[test]
fn test_storage_of_plain_value_is_identity() {
    let values = int64("v", &[Some(7)]);
    let same = polyrt_ext::storage(&values);
    assert_eq!(same, values);
    assert!(same.shares_buffer(&values));
}

#[test]
fn test_options_are_kept() {
    let registry = ExtensionRegistry::new();
    let options = ExtensionOptions {
        metadata: Some(serde_json::json!({ "unit": "m" })),
        display_name: Some("Meters".into()),
    };
    registry.register("meters", DataType::Float64, options.clone()).unwrap();
    assert_eq!(registry.get("meters").unwrap().options, options);
}

#[test]
fn test_concurrent_registration_of_one_name() {
    let registry = Arc::new(ExtensionRegistry::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || registry.register("race", DataType::Int64, ExtensionOptions::default()).is_ok())
        })
        .collect();
    let wins = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
    assert_eq!(wins, 1);
    assert_eq!(registry.names(), vec!["race".to_string()]);
}

fn leaked_registry(behavior: UnknownExtensionTypeBehavior) -> &'static ExtensionRegistry {
    let registry: &'static ExtensionRegistry = Box::leak(Box::new(ExtensionRegistry::new()));
    registry.set_unknown_type_behavior(behavior);
    registry
}

fn frame_json_with_extension(name: &str) -> String {
    let series = Series::new(
        "v",
        DataType::Extension {
            name: name.into(),
            storage: Box::new(DataType::Int64),
        },
        ColumnData::Int64(vec![Some(1), Some(2)]),
    )
    .unwrap();
    serde_json::to_string(&Frame::new(vec![series]).unwrap()).unwrap()
}

#[test]
fn test_unknown_extension_loaded_as_storage() {
    for behavior in [
        UnknownExtensionTypeBehavior::LoadAsStorage,
        UnknownExtensionTypeBehavior::WarnAndLoadAsStorage,
    ] {
        let engine = BuiltinBackend::new().with_extensions(leaked_registry(behavior));
        let json = frame_json_with_extension("mystery");
        let frame = engine.read_frame(&mut json.as_bytes()).unwrap();
        assert_eq!(frame.columns[0].dtype, DataType::Int64);
    }
}

#[test]
fn test_unknown_extension_kept_when_requested() {
    let engine = BuiltinBackend::new().with_extensions(leaked_registry(UnknownExtensionTypeBehavior::LoadAsGeneric));
    let json = frame_json_with_extension("mystery");
    let frame = engine.read_frame(&mut json.as_bytes()).unwrap();
    assert_eq!(frame.columns[0].dtype.name(), "mystery");
}

#[test]
fn test_registered_extension_with_other_storage_fails_to_load() {
    let registry = leaked_registry(UnknownExtensionTypeBehavior::default());
    registry.register("ids", DataType::String, ExtensionOptions::default()).unwrap();
    let engine = BuiltinBackend::new().with_extensions(registry);

    let json = frame_json_with_extension("ids");
    let err = engine.read_frame(&mut json.as_bytes()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conversion);
}

#[test]
fn test_snapshot_restores_into_another_registry() {
    let host = ExtensionRegistry::new();
    host.register("a", DataType::Int64, ExtensionOptions::default()).unwrap();
    host.register("b", DataType::String, ExtensionOptions::default()).unwrap();
    host.set_unknown_type_behavior(UnknownExtensionTypeBehavior::LoadAsGeneric);

    let variant = ExtensionRegistry::new();
    variant.register("stale", DataType::Int32, ExtensionOptions::default()).unwrap();
    let snapshot = host.snapshot();
    assert!(variant.restore(&snapshot));
    assert_eq!(variant.names(), vec!["a", "b"]);
    assert_eq!(variant.unknown_type_behavior(), UnknownExtensionTypeBehavior::LoadAsGeneric);

    // unchanged descriptors keep their identity on a later restore
    let a = variant.get("a").unwrap();
    host.unregister("b").unwrap();
    assert!(variant.restore(&host.snapshot()));
    assert_eq!(variant.names(), vec!["a"]);
    assert!(Arc::ptr_eq(&a, &variant.get("a").unwrap()));
}

#[test]
fn test_restore_never_goes_back_a_generation() {
    let host = ExtensionRegistry::new();
    host.register("a", DataType::Int64, ExtensionOptions::default()).unwrap();
    let older = host.snapshot();
    host.register("b", DataType::Int64, ExtensionOptions::default()).unwrap();
    let newer = host.snapshot();

    let variant = ExtensionRegistry::new();
    assert!(variant.restore(&newer));
    assert!(!variant.restore(&older));
    assert!(!variant.restore(&newer));
    assert_eq!(variant.names(), vec!["a", "b"]);
}
