//! # CPU Feature Detection
//!
//! Backend variants are compiled with different target features. Loading a
//! variant on a CPU that lacks one of them can fault with an illegal
//! instruction, so the resolver asks a `CpuFeatures` first and never loads a
//! candidate whose required features are missing.

use std::collections::BTreeSet;

/// Source of truth for "does this CPU support feature X".
pub trait CpuFeatures: Send + Sync {
    /// `feature` is a normalized name such as `"avx2"` or `"sse4.2"`.
    fn has_feature(&self, feature: &str) -> bool;
}

/// Features a CPU is missing out of `required`, in declaration order.
pub fn missing_features(cpu: &dyn CpuFeatures, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|f| !cpu.has_feature(f))
        .cloned()
        .collect()
}

/// Parse a build feature-flag string such as `"+sse3,+avx2,-avx512f"`.
///
/// Only enabled (`+`) entries are requirements; bare names count as enabled.
pub fn parse_feature_flags(flags: &str) -> Vec<String> {
    flags
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty() && !f.starts_with('-'))
        .map(|f| normalize(f.trim_start_matches('+')))
        .collect()
}

fn normalize(feature: &str) -> String {
    feature.trim().to_ascii_lowercase().replace('_', ".")
}

/// The CPU this process runs on, inspected with the std feature-detection macros.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCpu;

impl CpuFeatures for HostCpu {
    fn has_feature(&self, feature: &str) -> bool {
        detect(&normalize(feature))
    }
}

impl HostCpu {
    /// Names of every detected feature the host supports.
    pub fn detected() -> Vec<&'static str> {
        KNOWN_FEATURES.iter().copied().filter(|f| detect(f)).collect()
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
const KNOWN_FEATURES: &[&str] = &[
    "sse", "sse2", "sse3", "ssse3", "sse4.1", "sse4.2", "popcnt", "avx", "avx2", "fma", "bmi1",
    "bmi2", "lzcnt", "pclmulqdq", "movbe", "f16c", "aes", "avx512f",
];

#[cfg(target_arch = "aarch64")]
const KNOWN_FEATURES: &[&str] = &["neon", "crc", "aes", "sha2", "lse", "dotprod"];

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
const KNOWN_FEATURES: &[&str] = &[];

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn detect(feature: &str) -> bool {
    match feature {
        "sse" => std::arch::is_x86_feature_detected!("sse"),
        "sse2" => std::arch::is_x86_feature_detected!("sse2"),
        "sse3" => std::arch::is_x86_feature_detected!("sse3"),
        "ssse3" => std::arch::is_x86_feature_detected!("ssse3"),
        "sse4.1" => std::arch::is_x86_feature_detected!("sse4.1"),
        "sse4.2" => std::arch::is_x86_feature_detected!("sse4.2"),
        "popcnt" => std::arch::is_x86_feature_detected!("popcnt"),
        "avx" => std::arch::is_x86_feature_detected!("avx"),
        "avx2" => std::arch::is_x86_feature_detected!("avx2"),
        "fma" => std::arch::is_x86_feature_detected!("fma"),
        "bmi1" => std::arch::is_x86_feature_detected!("bmi1"),
        "bmi2" => std::arch::is_x86_feature_detected!("bmi2"),
        "lzcnt" => std::arch::is_x86_feature_detected!("lzcnt"),
        "pclmulqdq" => std::arch::is_x86_feature_detected!("pclmulqdq"),
        "movbe" => std::arch::is_x86_feature_detected!("movbe"),
        "f16c" => std::arch::is_x86_feature_detected!("f16c"),
        "aes" => std::arch::is_x86_feature_detected!("aes"),
        "avx512f" => std::arch::is_x86_feature_detected!("avx512f"),
        // Unknown to us means unverifiable; treat as absent.
        _ => false,
    }
}

#[cfg(target_arch = "aarch64")]
fn detect(feature: &str) -> bool {
    match feature {
        // NEON is mandatory on AArch64
        "neon" => true,
        "crc" => std::arch::is_aarch64_feature_detected!("crc"),
        "aes" => std::arch::is_aarch64_feature_detected!("aes"),
        "sha2" => std::arch::is_aarch64_feature_detected!("sha2"),
        "lse" => std::arch::is_aarch64_feature_detected!("lse"),
        "dotprod" => std::arch::is_aarch64_feature_detected!("dotprod"),
        _ => false,
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
fn detect(_feature: &str) -> bool {
    false
}

/// A fixed feature set, for tests and for forcing a CPU profile.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCpu {
    features: BTreeSet<String>,
}

impl SimulatedCpu {
    pub fn new<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            features: features.into_iter().map(|f| normalize(f.as_ref())).collect(),
        }
    }
}

impl CpuFeatures for SimulatedCpu {
    fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(&normalize(feature))
    }
}
