//! Shared-library boundaries: the `polyrt-runtime` library loaded as a backend
//! variant and as a plugin library, plus in-process declarations for the
//! version and ABI checks.


use std::sync::OnceLock;

use polyrt::prelude::*;
use polyrt::{register_plugin_function, Backend, BackendCandidate, ExtensionOptions, Resolver, SkipReason};
use polyrt_backend::native::{self, BackendDeclaration, NativeLoader, RawBuffer, VersionTag, BACKEND_ABI_VERSION};
use polyrt_backend::{BackendLoader, LoadError};
use polyrt_engine::BuiltinBackend;
use polyrt_plugin::native::{verify_abi, PluginAbi, PLUGIN_ABI_VERSION};
use polyrt_plugin::{NativePluginLoader, PluginError, PluginLoader};
use test_support::{float64, int64, runtime_library, scratch_dir};

const V: &str = polyrt::VERSION;

unsafe extern "C" fn serve_builtin(request: *const u8, len: usize) -> RawBuffer {
    static ENGINE: OnceLock<BuiltinBackend> = OnceLock::new();
    let engine = ENGINE.get_or_init(BuiltinBackend::new);
    RawBuffer::from_vec(polyrt_backend::protocol::serve(engine, native::request_bytes(request, len)))
}

unsafe extern "C" fn free_buffer(buffer: RawBuffer) {
    buffer.release()
}

static CURRENT: BackendDeclaration = BackendDeclaration {
    abi_version: BACKEND_ABI_VERSION,
    core_version: VersionTag::new(V),
    call: serve_builtin,
    free: free_buffer,
};

static OLD_RELEASE: BackendDeclaration = BackendDeclaration {
    abi_version: BACKEND_ABI_VERSION,
    core_version: VersionTag::new("0.0.1"),
    call: serve_builtin,
    free: free_buffer,
};

static OLD_ABI: BackendDeclaration = BackendDeclaration {
    abi_version: 1,
    core_version: VersionTag::new(V),
    call: serve_builtin,
    free: free_buffer,
};

fn load_runtime() -> std::sync::Arc<dyn Backend> {
    match NativeLoader::new(runtime_library()).load() {
        Ok(backend) => backend,
        Err(e) => panic!("runtime library failed to load: {}", e),
    }
}

#[test]
fn test_declaration_serves_primitives() {
    let backend = match native::from_declaration(&CURRENT) {
        Ok(backend) => backend,
        Err(e) => panic!("declaration rejected: {}", e),
    };
    assert_eq!(backend.version(), V);
    assert_eq!(backend.build_info().version, V);

    let s = backend
        .construct("n", &DataType::Int64, vec![Scalar::I64(1), Scalar::Null])
        .unwrap();
    assert_eq!(*s.data, ColumnData::Int64(vec![Some(1), None]));

    let frame = Frame::new(vec![int64("v", &[Some(1), Some(2)])]).unwrap();
    let out = backend.dispatch(&frame, &[col("v").cast(DataType::Float64)]).unwrap();
    assert_eq!(*out.columns[0].data, ColumnData::Float64(vec![Some(1.0), Some(2.0)]));

    let mut bytes = Vec::new();
    backend.write_frame(&frame, &mut bytes).unwrap();
    assert_eq!(backend.read_frame(&mut bytes.as_slice()).unwrap(), frame);
}

#[test]
fn test_declaration_errors_keep_their_kind() {
    let backend = native::from_declaration(&CURRENT).ok().unwrap();
    let frame = Frame::new(vec![int64("v", &[Some(1)])]).unwrap();

    let err = backend.dispatch(&frame, &[col("missing")]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compute);

    let err = backend
        .dispatch(&frame, &[col("v").ext_to("never_registered_here")])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Registration);
}

#[test]
fn test_declared_release_goes_through_version_gate() {
    let resolver = Resolver::new(
        vec![BackendCandidate::in_process("64", || native::from_declaration(&OLD_RELEASE))],
        V,
    )
    .skip_cpu_check(true);

    let err = resolver.resolve().unwrap_err();
    let skipped = err.skipped();
    assert_eq!(
        skipped[0].1,
        SkipReason::VersionMismatch {
            found: "0.0.1".into(),
            required: V.into()
        }
    );
    assert!(err.to_string().contains("Skipped versions [0.0.1]"));
}

#[test]
fn test_declaration_with_other_abi_is_rejected() {
    match native::from_declaration(&OLD_ABI) {
        Err(LoadError::Abi { expected, found }) => {
            assert_eq!(expected, BACKEND_ABI_VERSION);
            assert_eq!(found, 1);
        }
        Err(other) => panic!("expected an ABI error, got {}", other),
        Ok(_) => panic!("declaration with an old ABI was accepted"),
    }
}

#[test]
fn test_runtime_library_loads_as_variant() {
    let backend = load_runtime();
    assert_eq!(backend.version(), V);
    assert_eq!(backend.build_info().version, V);
    assert!(matches!(backend.index_type(), DataType::UInt32 | DataType::UInt64));

    let frame = Frame::new(vec![int64("v", &[Some(1), None, Some(3)])]).unwrap();
    let out = backend
        .dispatch(&frame, &[col("v").cast(DataType::Float64).alias("f"), lit(Scalar::I64(7))])
        .unwrap();
    assert_eq!(out.columns[0].name, "f");
    assert_eq!(*out.columns[0].data, ColumnData::Float64(vec![Some(1.0), None, Some(3.0)]));
    assert_eq!(*out.columns[1].data, ColumnData::Int64(vec![Some(7); 3]));
}

#[test]
fn test_runtime_variant_uses_host_extension_types() {
    let descriptor = polyrt_ext::global()
        .register("native_meters", DataType::Float64, ExtensionOptions::default())
        .unwrap();
    let backend = load_runtime();
    let frame = Frame::new(vec![float64("d", &[Some(1.5), None])]).unwrap();

    let out = backend.dispatch(&frame, &[col("d").ext_to("native_meters")]).unwrap();
    assert_eq!(out.columns[0].dtype, descriptor.dtype());
    assert_eq!(out.columns[0].data, frame.columns[0].data);

    let s = backend
        .construct("m", &descriptor.dtype(), vec![Scalar::F64(2.0)])
        .unwrap();
    assert_eq!(s.dtype, descriptor.dtype());

    let mut bytes = Vec::new();
    backend.write_frame(&out, &mut bytes).unwrap();
    let back = backend.read_frame(&mut bytes.as_slice()).unwrap();
    assert_eq!(back.columns[0].dtype, descriptor.dtype());

    polyrt_ext::global().unregister("native_meters").unwrap();
    let err = backend
        .dispatch(&frame, &[col("d").ext_to("native_meters")])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Registration);
}

#[test]
fn test_native_loader_rejects_non_library() {
    let dir = scratch_dir("not-a-variant");
    let path = dir.join(polyrt_backend::variants::library_file_name("64"));
    std::fs::write(&path, b"not a shared library").unwrap();
    match NativeLoader::new(&path).load() {
        Err(LoadError::Open(_)) => {}
        Err(other) => panic!("expected an open failure, got {}", other),
        Ok(_) => panic!("loaded a file that is not a library"),
    }
}

#[test]
fn test_runtime_library_as_plugin_library() {
    let loader = NativePluginLoader::new();
    let library = loader.open(&runtime_library()).unwrap();

    let add_one = library.function("add_one").unwrap();
    assert_eq!(add_one.signature(), Some(&[DataType::Int64][..]));
    let out = add_one.invoke(&[int64("v", &[Some(1), Some(2)])], None).unwrap();
    assert_eq!(*out.data, ColumnData::Int64(vec![Some(2), Some(3)]));

    let err = add_one
        .invoke(&[float64("v", &[Some(1.0)])], Some(r#"{"unused": true}"#))
        .unwrap_err();
    assert!(err.contains("expects one Int64"));

    let str_len = library.function("str_len").unwrap();
    let field = str_len
        .output_field(&[Field::new("s", DataType::String, true)], None)
        .unwrap()
        .unwrap();
    assert_eq!(field.data_type, DataType::UInt32);

    assert!(matches!(
        library.function("no_such_function"),
        Err(PluginError::SymbolNotFound { .. })
    ));
}

#[test]
fn test_runtime_plugin_through_engine() {
    let path = runtime_library();
    let frame = Frame::new(vec![
        int64("v", &[Some(1), Some(2)]),
        Series::from_data("s", ColumnData::String(vec![Some("abc".into()), None])),
    ])
    .unwrap();

    let out = BuiltinBackend::new()
        .dispatch(
            &frame,
            &[
                register_plugin_function(&path, "add_one", vec![col("v")], true, None, false),
                register_plugin_function(&path, "str_len", vec![col("s")], true, None, false),
            ],
        )
        .unwrap();
    assert_eq!(*out.columns[0].data, ColumnData::Int64(vec![Some(2), Some(3)]));
    assert_eq!(out.columns[1].dtype, DataType::UInt32);
    assert_eq!(*out.columns[1].data, ColumnData::UInt32(vec![Some(3), None]));
}

#[test]
fn test_plugin_library_rejections() {
    let loader = NativePluginLoader::new();
    let dir = scratch_dir("not-a-plugin");
    let path = dir.join("libnot_a_plugin.so");
    std::fs::write(&path, b"not a shared library").unwrap();
    assert!(matches!(loader.open(&path), Err(PluginError::LibraryNotFound { .. })));
    assert!(matches!(
        loader.open(&dir.join("missing.so")),
        Err(PluginError::LibraryNotFound { .. })
    ));

    let current = PluginAbi {
        abi_version: PLUGIN_ABI_VERSION,
        core_version: VersionTag::new(V),
    };
    assert!(verify_abi(&current).is_ok());

    let newer = PluginAbi {
        abi_version: PLUGIN_ABI_VERSION + 1,
        core_version: VersionTag::new(V),
    };
    assert!(verify_abi(&newer).unwrap_err().contains("ABI"));

    let old_release = PluginAbi {
        abi_version: PLUGIN_ABI_VERSION,
        core_version: VersionTag::new("0.0.1"),
    };
    assert!(verify_abi(&old_release).unwrap_err().contains("0.0.1"));
}
