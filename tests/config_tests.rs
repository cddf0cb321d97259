//! Runtime configuration parsing, allocator string and dtype name lookup.

use std::collections::HashMap;
use std::path::PathBuf;

use polyrt::prelude::*;
use polyrt_core::config::ENV_MALLOC_CONF;

fn config(pairs: &[(&str, &str)]) -> Result<RuntimeConfig> {
    let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    RuntimeConfig::from_lookup(|key| env.get(key).cloned())
}

#[test]
fn test_defaults_from_empty_environment() {
    let cfg = config(&[]).unwrap();
    assert_eq!(cfg, RuntimeConfig::default());
    assert_eq!(cfg.unknown_extension, UnknownExtensionTypeBehavior::WarnAndLoadAsStorage);
    assert_eq!(cfg.allocator.conf_string(), "dirty_decay_ms:500,muzzy_decay_ms:-1");
}

#[test]
fn test_backend_selection_variables() {
    let cfg = config(&[
        ("POLYRT_FORCE_BACKEND", "compat"),
        ("POLYRT_PREFER_BACKEND", "64"),
        ("POLYRT_BACKEND_DIR", "/opt/polyrt/lib"),
        ("POLYRT_SKIP_CPU_CHECK", "1"),
    ])
    .unwrap();
    assert_eq!(cfg.force_backend.as_deref(), Some("compat"));
    assert_eq!(cfg.prefer_backend.as_deref(), Some("64"));
    assert_eq!(cfg.backend_dir, Some(PathBuf::from("/opt/polyrt/lib")));
    assert!(cfg.skip_cpu_check);
}

#[test]
fn test_empty_values_are_unset() {
    let cfg = config(&[("POLYRT_FORCE_BACKEND", ""), ("POLYRT_PREFER_BACKEND", "  ")]).unwrap();
    assert!(cfg.force_backend.is_none());
    assert!(cfg.prefer_backend.is_none());
}

#[test]
fn test_malformed_skip_cpu_check() {
    let err = config(&[("POLYRT_SKIP_CPU_CHECK", "yes")]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_allocator_string_composition() {
    let cfg = config(&[("POLYRT_THP", "1")]).unwrap();
    assert_eq!(
        cfg.allocator.conf_string(),
        "dirty_decay_ms:500,muzzy_decay_ms:-1,thp:always,metadata_thp:always"
    );

    let cfg = config(&[("_RJEM_MALLOC_CONF", "background_thread:true")]).unwrap();
    assert_eq!(
        cfg.allocator.conf_string(),
        "dirty_decay_ms:500,muzzy_decay_ms:-1,background_thread:true"
    );

    let cfg = config(&[("POLYRT_THP", "1"), ("_RJEM_MALLOC_CONF", "narenas:2")]).unwrap();
    assert!(cfg.allocator.conf_string().ends_with("metadata_thp:always,narenas:2"));

    // only "1" enables huge pages
    let cfg = config(&[("POLYRT_THP", "true")]).unwrap();
    assert!(!cfg.allocator.huge_pages);
}

#[test]
fn test_unknown_extension_behavior_values() {
    let parse = |v: &str| config(&[("POLYRT_UNKNOWN_EXTENSION_TYPE_BEHAVIOR", v)]).unwrap().unknown_extension;
    assert_eq!(parse("load_as_storage"), UnknownExtensionTypeBehavior::LoadAsStorage);
    assert_eq!(parse("load_as_extension"), UnknownExtensionTypeBehavior::LoadAsGeneric);
    assert_eq!(parse("bogus"), UnknownExtensionTypeBehavior::WarnAndLoadAsStorage);
}

#[test]
fn test_dtype_primary_names() {
    assert_eq!(DataType::from_name("Int64").unwrap(), DataType::Int64);
    assert_eq!(DataType::from_name("String").unwrap(), DataType::String);
    assert_eq!(DataType::Float32.name(), "Float32");
}

#[test]
fn test_dtype_deprecated_aliases() {
    assert_eq!(DataType::from_name("Utf8").unwrap(), DataType::String);
    assert_eq!(DataType::from_name("Float").unwrap(), DataType::Float64);
    assert_eq!(DataType::from_name("Int").unwrap(), DataType::Int64);
    assert_eq!(DataType::from_name("Bool").unwrap(), DataType::Boolean);
}

#[test]
fn test_dtype_unknown_name() {
    let err = DataType::from_name("Decimal256").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    // lookup is case-sensitive
    assert!(DataType::from_name("int64").is_err());
}

#[test]
fn test_allocator_environment_written_only_when_changed() {
    let allocator = AllocatorConfig {
        huge_pages: false,
        override_conf: Some("narenas:2".into()),
    };
    allocator.apply_to_env();
    assert_eq!(std::env::var(ENV_MALLOC_CONF).unwrap(), allocator.conf_string());
    assert!(!allocator.apply_to_env());
}
