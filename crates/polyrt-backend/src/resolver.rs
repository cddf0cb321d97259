//! Backend resolution: force / prefer / CPU gate / load / version gate.
//!
//! A forced candidate is attempted alone and any failure is fatal. Without a
//! force, candidates are tried in preference order and every failure is a
//! non-fatal skip; only exhaustion fails, listing every skip.

use std::sync::Arc;

use polyrt_core::config::{AllocatorConfig, RuntimeConfig, ENV_FORCE_BACKEND, ENV_PREFER_BACKEND};

use crate::candidate::BackendCandidate;
use crate::cpu::{missing_features, CpuFeatures, HostCpu};
use crate::error::{ResolveError, SkipReason};
use crate::facade::BackendHandle;

pub struct Resolver {
    candidates: Vec<BackendCandidate>,
    force: Option<String>,
    prefer: Option<String>,
    required_version: String,
    cpu: Arc<dyn CpuFeatures>,
    skip_cpu_check: bool,
    allocator: Option<AllocatorConfig>,
}

impl Resolver {
    /// Resolver over `candidates` (default order) requiring `required_version`.
    pub fn new(candidates: Vec<BackendCandidate>, required_version: impl Into<String>) -> Self {
        Self {
            candidates,
            force: None,
            prefer: None,
            required_version: required_version.into(),
            cpu: Arc::new(HostCpu),
            skip_cpu_check: false,
            allocator: None,
        }
    }

    /// Apply force/prefer, CPU-check and allocator settings from a runtime config.
    pub fn from_config(
        candidates: Vec<BackendCandidate>,
        required_version: impl Into<String>,
        cfg: &RuntimeConfig,
    ) -> Self {
        let mut r = Self::new(candidates, required_version)
            .force(cfg.force_backend.clone())
            .prefer(cfg.prefer_backend.clone())
            .with_allocator(cfg.allocator.clone());
        r.skip_cpu_check = cfg.skip_cpu_check;
        r
    }

    pub fn force(mut self, id: Option<String>) -> Self {
        self.force = id;
        self
    }

    pub fn prefer(mut self, id: Option<String>) -> Self {
        self.prefer = id;
        self
    }

    pub fn with_cpu(mut self, cpu: impl CpuFeatures + 'static) -> Self {
        self.cpu = Arc::new(cpu);
        self
    }

    pub fn skip_cpu_check(mut self, skip: bool) -> Self {
        self.skip_cpu_check = skip;
        self
    }

    /// Export this allocator configuration before the first load attempt.
    pub fn with_allocator(mut self, allocator: AllocatorConfig) -> Self {
        self.allocator = Some(allocator);
        self
    }

    pub fn candidates(&self) -> &[BackendCandidate] {
        &self.candidates
    }

    pub fn required_version(&self) -> &str {
        &self.required_version
    }

    /// Candidates in the order they would be attempted.
    pub fn effective_order(&self) -> Result<Vec<&BackendCandidate>, ResolveError> {
        if let Some(id) = &self.force {
            return Ok(vec![self.lookup(ENV_FORCE_BACKEND, id)?]);
        }
        let mut order: Vec<&BackendCandidate> = self.candidates.iter().collect();
        if let Some(id) = &self.prefer {
            let preferred = self.lookup(ENV_PREFER_BACKEND, id)?;
            order.retain(|c| c.id() != preferred.id());
            order.insert(0, preferred);
        }
        Ok(order)
    }

    /// Run resolution once. Callers wanting once-only semantics go through `Facade`.
    pub fn resolve(&self) -> Result<BackendHandle, ResolveError> {
        if self.candidates.is_empty() {
            return Err(ResolveError::NoCandidates);
        }
        let order = self.effective_order()?;

        if let Some(allocator) = &self.allocator {
            if allocator.apply_to_env() {
                tracing::debug!(conf = %allocator.conf_string(), "exported allocator configuration");
            }
        }

        if let Some(id) = &self.force {
            let candidate = order[0];
            return self.attempt(candidate).map_err(|reason| {
                tracing::error!(candidate = %id, %reason, "forced backend is unusable");
                ResolveError::ForcedUnavailable {
                    id: id.clone(),
                    reason,
                }
            });
        }

        let mut skipped = Vec::new();
        for candidate in order {
            match self.attempt(candidate) {
                Ok(handle) => return Ok(handle),
                Err(reason) => {
                    if let SkipReason::VersionMismatch { .. } = reason {
                        tracing::warn!(candidate = candidate.id(), %reason, "skipping backend variant");
                    } else {
                        tracing::debug!(candidate = candidate.id(), %reason, "skipping backend variant");
                    }
                    skipped.push((candidate.id().to_string(), reason));
                }
            }
        }
        Err(ResolveError::NoCompatibleBackend { skipped })
    }

    fn lookup(&self, variable: &'static str, id: &str) -> Result<&BackendCandidate, ResolveError> {
        self.candidates
            .iter()
            .find(|c| c.id() == id)
            .ok_or_else(|| ResolveError::InvalidCandidate {
                variable,
                id: id.to_string(),
                known: self
                    .candidates
                    .iter()
                    .map(|c| c.id())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// CPU gate, then load, then version gate.
    fn attempt(&self, candidate: &BackendCandidate) -> Result<BackendHandle, SkipReason> {
        if !self.skip_cpu_check {
            let missing = missing_features(self.cpu.as_ref(), candidate.required_cpu_features());
            if !missing.is_empty() {
                return Err(SkipReason::MissingCpuFeatures(missing));
            }
        }

        let backend = candidate.loader().load().map_err(SkipReason::LoadFailed)?;

        // Native variants report the core version they declare, so a library
        // built against another release is rejected here rather than on load.
        let found = backend.version();
        if found != self.required_version {
            return Err(SkipReason::VersionMismatch {
                found: found.to_string(),
                required: self.required_version.clone(),
            });
        }

        tracing::info!(
            candidate = candidate.id(),
            version = found,
            source = %candidate.loader().describe(),
            "installed backend variant"
        );
        Ok(BackendHandle::new(candidate.id(), backend))
    }
}
