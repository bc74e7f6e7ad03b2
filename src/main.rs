mod config;
mod controller;
mod error;
mod fmt;
mod freq_table;
mod gateway;
mod kick;
mod limits;
mod propagate;
mod screen;
mod sysfs;
mod user_config;
mod web;

#[cfg(test)]
mod testutil;

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use tracing::{debug, info, warn};
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

use crate::{
    config::VERSION,
    controller::HardLimit,
    fmt::fmt_bounds,
    freq_table::{FreqOracle, StaticFreqTable, SysfsFreqTable},
    propagate::SysfsLimitApplier,
    screen::{detect_screen_probe, ScreenWatch},
    user_config::{load_or_init, CONFIG_PATH},
    web::Api,
};

const MAIN_TICK: Duration = Duration::from_millis(500);

type LogHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Starts at `info` so config problems are visible; the configured level is applied later.
fn init_logging() -> LogHandle {
    let (filter, handle) = reload::Layer::new(EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
    handle
}

fn apply_log_level(handle: &LogHandle, configured: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured));
    if let Err(e) = handle.modify(|f| *f = filter) {
        warn!("LOG: cannot apply level {}: {}", configured, e);
    }
}

fn main() -> anyhow::Result<()> {
    let log = init_logging();
    info!("cpufreq_hardlimit starting ({})", VERSION);

    let cfg_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_PATH));
    let cfg = load_or_init(&cfg_path);
    apply_log_level(&log, &cfg.log_level);
    info!("CFG: {} | policies {}", cfg_path.display(), cfg.policies.len());

    let oracle: Arc<dyn FreqOracle> = match &cfg.freq_table {
        Some(t) => Arc::new(StaticFreqTable::new(t.clone())),
        None => Arc::new(SysfsFreqTable::new(cfg.table_path())),
    };
    match oracle.enumerate() {
        Ok(t) => info!(
            "FREQ: {} steps {}",
            t.len(),
            fmt_bounds(t.first().copied().unwrap_or(0), t.last().copied().unwrap_or(0))
        ),
        Err(e) => warn!("FREQ: {} (limit writes rejected until it is readable)", e),
    }

    let applier = Arc::new(SysfsLimitApplier::new(&cfg.policies));
    let hl = HardLimit::new(&cfg.limits, cfg.kick_delay_max_ms, oracle, applier.clone());
    hl.reapply();
    let (min, max) = hl.current_bounds();
    info!("HARDLIMIT: {}", fmt_bounds(min, max));

    let watch = match detect_screen_probe() {
        Some(probe) => Some(
            ScreenWatch::spawn(probe, Duration::from_millis(cfg.screen_poll_ms), Arc::new(hl.clone()))
                .context("starting screen watcher")?,
        ),
        None => {
            info!("SCREEN: probe not found (assume ON)");
            None
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    web::spawn(Api::new(hl.clone(), cfg.api_token.clone(), stop.clone()), cfg.bind_addr.clone());

    let enforce_every = Duration::from_secs(cfg.enforce_secs);
    let mut last_enforce = Instant::now();

    while !stop.load(Ordering::Acquire) {
        if last_enforce.elapsed() >= enforce_every {
            if applier.enforce(|f| hl.clamp(f)) {
                let (min, max) = hl.current_bounds();
                debug!("ENFORCE: pulled policies back into {}", fmt_bounds(min, max));
            }
            last_enforce = Instant::now();
        }
        thread::sleep(MAIN_TICK);
    }

    if let Some(w) = watch {
        w.stop();
    }
    hl.shutdown();
    Ok(())
}
