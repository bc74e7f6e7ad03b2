use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs,
    io,
    io::Read,
    path::{Path, PathBuf},
};
use tracing::warn;

use crate::{
    config::{self, CPUFREQ_POLICY_BASE},
    limits::LimitDefaults,
};

pub const CONFIG_PATH: &str = "/data/adb/modules/cpufreq_hardlimit/config/config.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HardlimitConfig {
    /// Required in `X-Api-Token` by the local HTTP surface. Generated when empty.
    #[serde(default)]
    pub api_token: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// tracing filter directive, `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// cpufreq policy directories that receive the limits. The first one also
    /// supplies `scaling_available_frequencies`.
    #[serde(default = "default_policies")]
    pub policies: Vec<PathBuf>,

    /// Replaces the sysfs frequency table when set.
    #[serde(default)]
    pub freq_table: Option<Vec<u32>>,

    #[serde(default = "default_screen_poll_ms")]
    pub screen_poll_ms: u64,

    #[serde(default = "default_enforce_secs")]
    pub enforce_secs: u64,

    #[serde(default = "default_kick_delay_max")]
    pub kick_delay_max_ms: u32,

    #[serde(default)]
    pub limits: LimitDefaults,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_bind_addr() -> String {
    config::DEFAULT_BIND_ADDR.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_policies() -> Vec<PathBuf> {
    vec![Path::new(CPUFREQ_POLICY_BASE).join("policy0")]
}

fn default_screen_poll_ms() -> u64 {
    config::SCREEN_POLL_MS
}

fn default_enforce_secs() -> u64 {
    config::ENFORCE_SECS
}

fn default_kick_delay_max() -> u32 {
    config::KICK_DELAY_MAX
}

impl Default for HardlimitConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            bind_addr: default_bind_addr(),
            log_level: default_log_level(),
            policies: default_policies(),
            freq_table: None,
            screen_poll_ms: default_screen_poll_ms(),
            enforce_secs: default_enforce_secs(),
            kick_delay_max_ms: default_kick_delay_max(),
            limits: LimitDefaults::default(),
            extra: BTreeMap::new(),
        }
    }
}

impl HardlimitConfig {
    /// Hard errors for unusable files, silent repair of cross-field limits.
    pub fn validate_and_normalize(&mut self) -> Result<(), String> {
        if self.policies.is_empty() {
            return Err("no cpufreq policies configured".to_string());
        }
        if self.screen_poll_ms == 0 || self.enforce_secs == 0 {
            return Err("poll intervals must be non-zero".to_string());
        }

        let l = &mut self.limits;
        if l.touchboost_hi < l.touchboost_lo {
            l.touchboost_hi = l.touchboost_lo;
        }
        if l.kick_freq > l.max_screen_on {
            l.kick_freq = l.max_screen_on;
        }
        if l.kick_delay_ms > self.kick_delay_max_ms {
            l.kick_delay_ms = self.kick_delay_max_ms;
        }

        if let Some(t) = &mut self.freq_table {
            t.sort_unstable();
            t.dedup();
        }
        Ok(())
    }

    pub fn table_path(&self) -> PathBuf {
        // validate_and_normalize guarantees at least one policy.
        self.policies
            .first()
            .map(|p| p.join(config::AVAILABLE_FREQS))
            .unwrap_or_else(|| Path::new(CPUFREQ_POLICY_BASE).join("policy0").join(config::AVAILABLE_FREQS))
    }
}

/// Loads the config, falling back to (and writing) defaults on any problem.
pub fn load_or_init(path: &Path) -> HardlimitConfig {
    match fs::read_to_string(path) {
        Ok(s) => match serde_json::from_str::<HardlimitConfig>(&s) {
            Ok(mut cfg) => {
                if let Err(e) = cfg.validate_and_normalize() {
                    warn!("CFG: invalid config: {} (reset to default)", e);
                    reset_to_default(path)
                } else {
                    if ensure_api_token(&mut cfg).unwrap_or(false) {
                        let _ = write_config_atomic(path, &cfg);
                    }
                    cfg
                }
            }
            Err(e) => {
                warn!("CFG: failed to parse config: {} (reset to default)", e);
                reset_to_default(path)
            }
        },
        Err(_) => reset_to_default(path),
    }
}

fn reset_to_default(path: &Path) -> HardlimitConfig {
    let mut def = HardlimitConfig::default();
    let _ = ensure_api_token(&mut def);
    if let Err(e) = write_config_atomic(path, &def) {
        warn!("CFG: cannot write {}: {}", path.display(), e);
    }
    def
}

/// Fills an empty token with 32 random bytes in hex. True if the config changed.
fn ensure_api_token(cfg: &mut HardlimitConfig) -> io::Result<bool> {
    if !cfg.api_token.trim().is_empty() {
        return Ok(false);
    }
    let mut buf = [0u8; 32];
    fs::File::open("/dev/urandom")?.read_exact(&mut buf)?;
    cfg.api_token = buf.iter().map(|b| format!("{:02x}", b)).collect();
    Ok(true)
}

/// Writes next to the target and renames over it, so a crash never leaves half a file.
pub fn write_config_atomic(path: &Path, cfg: &HardlimitConfig) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let data = serde_json::to_vec_pretty(cfg)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)
}
