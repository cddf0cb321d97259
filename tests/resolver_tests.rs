//! Backend resolution: ordering, force/prefer, CPU and version gating, once-only install.


use std::sync::Arc;
use std::thread;

use polyrt::prelude::*;
use polyrt::{Facade, ResolveError, Resolver, SimulatedCpu, SkipReason};
use polyrt_backend::native::NativeLoader;
use polyrt_backend::variants::{library_file_name, native_candidates, VARIANT_IDS};
use polyrt_backend::{BackendLoader, LoadError};
use test_support::{count, counter, counting_candidate, missing_candidate};

const V: &str = polyrt::VERSION;

#[test]
fn test_first_compatible_candidate_wins() {
    let (a, b, c) = (counter(), counter(), counter());
    let resolver = Resolver::new(
        vec![
            missing_candidate("compat", a.clone()),
            counting_candidate("64", V, b.clone()),
            counting_candidate("32", V, c.clone()),
        ],
        V,
    );

    let handle = resolver.resolve().expect("resolve");
    assert_eq!(handle.variant(), "64");
    assert_eq!(handle.version(), V);
    assert_eq!((count(&a), count(&b), count(&c)), (1, 1, 0));
}

#[test]
fn test_prefer_moves_candidate_to_front() {
    let (a, b) = (counter(), counter());
    let resolver = Resolver::new(
        vec![counting_candidate("compat", V, a.clone()), counting_candidate("32", V, b.clone())],
        V,
    )
    .prefer(Some("32".into()));

    let order: Vec<&str> = resolver.effective_order().unwrap().iter().map(|c| c.id()).collect();
    assert_eq!(order, vec!["32", "compat"]);

    let handle = resolver.resolve().unwrap();
    assert_eq!(handle.variant(), "32");
    assert_eq!(count(&a), 0);
}

#[test]
fn test_prefer_falls_back_when_preferred_fails() {
    let (a, b) = (counter(), counter());
    let resolver = Resolver::new(
        vec![counting_candidate("compat", V, a.clone()), missing_candidate("64", b.clone())],
        V,
    )
    .prefer(Some("64".into()));

    let handle = resolver.resolve().unwrap();
    assert_eq!(handle.variant(), "compat");
    assert_eq!((count(&a), count(&b)), (1, 1));
}

#[test]
fn test_invalid_prefer_is_a_configuration_error() {
    let a = counter();
    let resolver = Resolver::new(vec![counting_candidate("compat", V, a.clone())], V).prefer(Some("128".into()));

    let err = resolver.resolve().unwrap_err();
    assert!(matches!(err, ResolveError::InvalidCandidate { ref id, .. } if id == "128"));
    assert_eq!(Error::from(err).kind(), ErrorKind::Configuration);
    assert_eq!(count(&a), 0);
}

#[test]
fn test_invalid_force_fails_without_loading() {
    let (a, b) = (counter(), counter());
    let resolver = Resolver::new(
        vec![counting_candidate("compat", V, a.clone()), counting_candidate("64", V, b.clone())],
        V,
    )
    .force(Some("16".into()));

    let err = resolver.resolve().unwrap_err();
    assert!(err.to_string().contains("POLYRT_FORCE_BACKEND"));
    assert!(err.to_string().contains("compat, 64"));
    assert_eq!(Error::from(err).kind(), ErrorKind::Configuration);
    assert_eq!((count(&a), count(&b)), (0, 0));
}

#[test]
fn test_forced_incompatible_never_falls_back() {
    let (a, b) = (counter(), counter());
    let resolver = Resolver::new(
        vec![counting_candidate("compat", V, a.clone()), counting_candidate("64", "0.0.1", b.clone())],
        V,
    )
    .force(Some("64".into()));

    let err = resolver.resolve().unwrap_err();
    match &err {
        ResolveError::ForcedUnavailable { id, reason } => {
            assert_eq!(id, "64");
            assert!(matches!(reason, SkipReason::VersionMismatch { found, .. } if found == "0.0.1"));
        }
        other => panic!("expected ForcedUnavailable, got {:?}", other),
    }
    assert_eq!(Error::from(err).kind(), ErrorKind::IncompatibleBackend);
    assert_eq!(count(&a), 0, "no fallback to other candidates");
}

#[test]
fn test_forced_cpu_incompatible_is_not_loaded() {
    let a = counter();
    let resolver = Resolver::new(
        vec![counting_candidate("64", V, a.clone()).requires(["avx2"])],
        V,
    )
    .with_cpu(SimulatedCpu::new(["sse2"]))
    .force(Some("64".into()));

    let err = resolver.resolve().unwrap_err();
    assert!(matches!(
        err,
        ResolveError::ForcedUnavailable { reason: SkipReason::MissingCpuFeatures(ref f), .. } if f == &vec!["avx2".to_string()]
    ));
    assert_eq!(count(&a), 0);
}

#[test]
fn test_cpu_incompatible_candidate_skipped_without_load() {
    let (a, b) = (counter(), counter());
    let resolver = Resolver::new(
        vec![
            counting_candidate("64", V, a.clone()).with_feature_flags("+sse2,+avx512f"),
            counting_candidate("compat", V, b.clone()).with_feature_flags("+sse2"),
        ],
        V,
    )
    .with_cpu(SimulatedCpu::new(["sse", "sse2", "avx2"]));

    let handle = resolver.resolve().unwrap();
    assert_eq!(handle.variant(), "compat");
    assert_eq!(count(&a), 0, "a CPU-incompatible variant must never be loaded");
    assert_eq!(count(&b), 1);
}

#[test]
fn test_skip_cpu_check_loads_anyway() {
    let a = counter();
    let resolver = Resolver::new(vec![counting_candidate("64", V, a.clone()).requires(["avx512f"])], V)
        .with_cpu(SimulatedCpu::new(Vec::<String>::new()))
        .skip_cpu_check(true);

    assert_eq!(resolver.resolve().unwrap().variant(), "64");
    assert_eq!(count(&a), 1);
}

#[test]
fn test_exhaustion_aggregates_skip_reasons_and_versions() {
    let resolver = Resolver::new(
        vec![
            counting_candidate("compat", "0.0.1", counter()),
            missing_candidate("64", counter()),
            counting_candidate("32", "9.9.9", counter()).requires(["sse2"]),
        ],
        V,
    )
    .with_cpu(SimulatedCpu::new(["sse2"]));

    let err = resolver.resolve().unwrap_err();
    let skipped = err.skipped();
    assert_eq!(skipped.len(), 3);
    assert!(matches!(skipped[1].1, SkipReason::LoadFailed(LoadError::NotFound(_))));

    let msg = err.to_string();
    assert!(msg.contains("Skipped versions [0.0.1, 9.9.9]"), "{}", msg);
    assert_eq!(Error::from(err).kind(), ErrorKind::IncompatibleBackend);
}

#[test]
fn test_empty_candidate_list() {
    let err = Resolver::new(vec![], V).resolve().unwrap_err();
    assert_eq!(err, ResolveError::NoCandidates);
}

#[test]
fn test_concurrent_first_use_installs_once() {
    let (a, b, c) = (counter(), counter(), counter());
    let facade = Arc::new(Facade::new(Resolver::new(
        vec![
            missing_candidate("compat", a.clone()),
            counting_candidate("64", V, b.clone()),
            counting_candidate("32", V, c.clone()),
        ],
        V,
    )));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let facade = facade.clone();
            thread::spawn(move || facade.handle().map(|h| h.clone()))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();

    assert_eq!((count(&a), count(&b), count(&c)), (1, 1, 0));
    for handle in &results {
        assert!(handle.ptr_eq(&results[0]));
        assert_eq!(handle.variant(), "64");
    }
}

#[test]
fn test_failed_resolution_is_cached() {
    let a = counter();
    let facade = Facade::new(Resolver::new(vec![missing_candidate("compat", a.clone())], V));

    let first = facade.handle().unwrap_err();
    let second = facade.handle().unwrap_err();
    assert_eq!(first, second);
    assert_eq!(count(&a), 1);
    assert!(facade.is_resolved());
    assert!(facade.try_handle().is_none());
    assert_eq!(facade.version().unwrap_err().kind(), ErrorKind::IncompatibleBackend);
}

#[test]
fn test_facade_forwards_to_installed_backend() {
    let facade = Facade::new(Resolver::new(vec![counting_candidate("32", V, counter())], V));
    assert!(!facade.is_resolved());

    let info = facade.build_info().unwrap();
    assert_eq!(info.variant.as_deref(), Some("32"));
    assert_eq!(info.version, V);
    assert_eq!(facade.version().unwrap(), V);

    let series = facade
        .construct("x", &DataType::Int64, vec![Scalar::I64(1), Scalar::Null])
        .unwrap();
    assert_eq!(series.len(), 2);
}

#[test]
fn test_allocator_configuration_applied_before_load() {
    let allocator = AllocatorConfig {
        huge_pages: true,
        override_conf: Some("narenas:4".into()),
    };
    let resolver = Resolver::new(vec![counting_candidate("compat", V, counter())], V).with_allocator(allocator);
    resolver.resolve().unwrap();

    assert_eq!(
        std::env::var("_RJEM_MALLOC_CONF").unwrap(),
        "dirty_decay_ms:500,muzzy_decay_ms:-1,thp:always,metadata_thp:always,narenas:4"
    );
}

#[test]
fn test_feature_flag_parsing() {
    let candidate = counting_candidate("64", V, counter()).with_feature_flags("+sse3, +AVX2,-avx512f,fma");
    assert_eq!(candidate.required_cpu_features(), &["sse3", "avx2", "fma"]);
}

#[test]
fn test_native_loader_reports_missing_library() {
    let loader = NativeLoader::new("/nonexistent/dir/libpolyrt_runtime_64.so");
    match loader.load() {
        Err(LoadError::NotFound(path)) => assert!(path.contains("libpolyrt_runtime_64")),
        Err(other) => panic!("expected NotFound, got {}", other),
        Ok(_) => panic!("loaded a library that does not exist"),
    }
}

#[test]
fn test_default_native_candidates() {
    let dir = std::path::Path::new("/opt/polyrt");
    let candidates = native_candidates(dir);
    let ids: Vec<&str> = candidates.iter().map(|c| c.id()).collect();
    assert_eq!(ids, VARIANT_IDS.to_vec());
    for candidate in &candidates {
        assert!(candidate.loader().describe().ends_with(&library_file_name(candidate.id())));
    }
}
