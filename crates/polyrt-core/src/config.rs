//! Process-wide runtime configuration, read once from the environment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const ENV_FORCE_BACKEND: &str = "POLYRT_FORCE_BACKEND";
pub const ENV_PREFER_BACKEND: &str = "POLYRT_PREFER_BACKEND";
pub const ENV_BACKEND_DIR: &str = "POLYRT_BACKEND_DIR";
pub const ENV_SKIP_CPU_CHECK: &str = "POLYRT_SKIP_CPU_CHECK";
pub const ENV_THP: &str = "POLYRT_THP";
pub const ENV_UNKNOWN_EXTENSION: &str = "POLYRT_UNKNOWN_EXTENSION_TYPE_BEHAVIOR";
/// Read by the jemalloc allocator linked into native backend variants.
pub const ENV_MALLOC_CONF: &str = "_RJEM_MALLOC_CONF";

const BASE_MALLOC_CONF: &str = "dirty_decay_ms:500,muzzy_decay_ms:-1";
const THP_MALLOC_CONF: &str = "thp:always,metadata_thp:always";

/// Allocator tuning: base profile, optional huge pages, optional user override.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AllocatorConfig {
    pub huge_pages: bool,
    /// Appended last so it wins over the base profile.
    pub override_conf: Option<String>,
}

impl AllocatorConfig {
    /// The single configuration string consumed before backend load.
    pub fn conf_string(&self) -> String {
        let mut conf = BASE_MALLOC_CONF.to_string();
        if self.huge_pages {
            conf.push(',');
            conf.push_str(THP_MALLOC_CONF);
        }
        if let Some(extra) = self.override_conf.as_deref().filter(|s| !s.is_empty()) {
            conf.push(',');
            conf.push_str(extra);
        }
        conf
    }

    /// Export the configuration string so a backend's allocator picks it up at
    /// load. Returns whether the environment was written.
    ///
    /// Writing the environment is not synchronized with `getenv` calls made by
    /// C code on other threads. The variable is only written when its value
    /// differs, and the global facade does this once, on first use; programs
    /// that read the environment from other threads should resolve the facade
    /// (`polyrt::handle()`) before spawning them.
    pub fn apply_to_env(&self) -> bool {
        let conf = self.conf_string();
        if std::env::var(ENV_MALLOC_CONF).ok().as_deref() == Some(conf.as_str()) {
            return false;
        }
        std::env::set_var(ENV_MALLOC_CONF, conf);
        true
    }
}

/// What to do with an extension dtype whose name is not registered when data is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnknownExtensionTypeBehavior {
    LoadAsStorage,
    LoadAsGeneric,
    #[default]
    WarnAndLoadAsStorage,
}

impl UnknownExtensionTypeBehavior {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("load_as_storage") => UnknownExtensionTypeBehavior::LoadAsStorage,
            Some("load_as_extension") => UnknownExtensionTypeBehavior::LoadAsGeneric,
            Some("") | None => UnknownExtensionTypeBehavior::WarnAndLoadAsStorage,
            Some(other) => {
                tracing::warn!(
                    value = other,
                    "invalid value for '{}'; expected 'load_as_storage' or 'load_as_extension'",
                    ENV_UNKNOWN_EXTENSION
                );
                UnknownExtensionTypeBehavior::WarnAndLoadAsStorage
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Hard selection: only this candidate is attempted.
    pub force_backend: Option<String>,
    /// Soft hint: this candidate is tried first.
    pub prefer_backend: Option<String>,
    /// Where native backend variants are looked up.
    pub backend_dir: Option<PathBuf>,
    pub skip_cpu_check: bool,
    pub allocator: AllocatorConfig,
    pub unknown_extension: UnknownExtensionTypeBehavior,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key/value source (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let skip_cpu_check = match non_empty(ENV_SKIP_CPU_CHECK).as_deref() {
            None | Some("0") => false,
            Some("1") => true,
            Some(other) => {
                return Err(Error::Config(format!(
                    "{} must be '0' or '1', got '{}'",
                    ENV_SKIP_CPU_CHECK, other
                )))
            }
        };

        Ok(Self {
            force_backend: non_empty(ENV_FORCE_BACKEND),
            prefer_backend: non_empty(ENV_PREFER_BACKEND),
            backend_dir: non_empty(ENV_BACKEND_DIR).map(PathBuf::from),
            skip_cpu_check,
            allocator: AllocatorConfig {
                huge_pages: lookup(ENV_THP).as_deref() == Some("1"),
                override_conf: non_empty(ENV_MALLOC_CONF),
            },
            unknown_extension: UnknownExtensionTypeBehavior::parse(lookup(ENV_UNKNOWN_EXTENSION).as_deref()),
        })
    }
}
