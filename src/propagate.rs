use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use tracing::{debug, warn};

use crate::{
    config::{SCALING_MAX, SCALING_MIN},
    fmt,
    sysfs::{self, WriteMode},
};

/// Downstream scaling subsystem. Fire-and-forget: failures are logged, never returned.
pub trait LimitApplier: Send + Sync {
    fn apply(&self, min: u32, max: u32);
}

#[derive(Debug, Clone)]
pub struct PolicyPaths {
    pub min_path: PathBuf,
    pub max_path: PathBuf,
}

impl PolicyPaths {
    pub fn from_dir(dir: &Path) -> Self {
        Self {
            min_path: dir.join(SCALING_MIN),
            max_path: dir.join(SCALING_MAX),
        }
    }
}

/// Writes the active bounds into every cpufreq policy's scaling_min/max_freq.
pub struct SysfsLimitApplier {
    policies: Vec<PolicyPaths>,
    cache: Mutex<HashMap<PathBuf, u32>>,
}

impl SysfsLimitApplier {
    pub fn new(dirs: &[PathBuf]) -> Self {
        Self {
            policies: dirs.iter().map(|d| PolicyPaths::from_dir(d)).collect(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn write_policy(
        p: &PolicyPaths,
        min: u32,
        max: u32,
        cache: &mut HashMap<PathBuf, u32>,
        mode: WriteMode,
    ) -> std::io::Result<bool> {
        // IMPORTANT: never let the kernel see min > max between the two writes.
        let cur_max = sysfs::read_u32(&p.max_path).unwrap_or(u32::MAX);
        if min > cur_max {
            // The node disagrees with our cache here, so the max write must not be skipped.
            let a = sysfs::write_khz(&p.max_path, max, cache, WriteMode::Verify)?;
            let b = sysfs::write_khz(&p.min_path, min, cache, mode)?;
            Ok(a || b)
        } else {
            let a = sysfs::write_khz(&p.min_path, min, cache, mode)?;
            let b = sysfs::write_khz(&p.max_path, max, cache, mode)?;
            Ok(a || b)
        }
    }

    /// Re-reads what the kernel currently holds and pulls anything outside the
    /// active bounds back through `clamp`. Requests already inside are kept.
    pub fn enforce(&self, clamp: impl Fn(u32) -> u32) -> bool {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let mut any = false;
        for p in &self.policies {
            let (Some(req_min), Some(req_max)) = (sysfs::read_u32(&p.min_path), sysfs::read_u32(&p.max_path))
            else {
                continue;
            };
            let min = clamp(req_min);
            let max = clamp(req_max).max(min);
            if min == req_min && max == req_max {
                continue;
            }
            debug!(
                "ENFORCE: {} {} -> {}",
                p.max_path.display(),
                fmt::fmt_bounds(req_min, req_max),
                fmt::fmt_bounds(min, max)
            );
            match Self::write_policy(p, min, max, &mut cache, WriteMode::Verify) {
                Ok(w) => any |= w,
                Err(e) => warn!("ENFORCE: {}: {}", p.max_path.display(), e),
            }
        }
        any
    }
}

impl LimitApplier for SysfsLimitApplier {
    fn apply(&self, min: u32, max: u32) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        for p in &self.policies {
            if let Err(e) = Self::write_policy(p, min, max, &mut cache, WriteMode::Cached) {
                warn!("APPLY: {} {}: {}", p.max_path.display(), fmt::fmt_bounds(min, max), e);
            }
        }
    }
}
