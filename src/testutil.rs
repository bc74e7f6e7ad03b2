use std::{
    fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use crate::{
    controller::HardLimit,
    error::LimitError,
    freq_table::{FreqOracle, StaticFreqTable},
    limits::LimitDefaults,
    propagate::LimitApplier,
};

pub const SCENARIO_TABLE: &[u32] = &[300, 800, 1000, 1200, 1300, 1500, 1700];

/// Upper bound for a short kick window to close.
pub const KICK_SETTLE: Duration = Duration::from_millis(400);

pub fn scenario_defaults() -> LimitDefaults {
    LimitDefaults {
        stock_min: 300,
        max_screen_on: 1700,
        max_screen_off: 800,
        kick_freq: 1200,
        kick_delay_ms: 0,
        touchboost_lo: 800,
        touchboost_hi: 1200,
    }
}

#[derive(Default)]
pub struct RecordingApplier {
    calls: Mutex<Vec<(u32, u32)>>,
}

impl RecordingApplier {
    pub fn calls(&self) -> Vec<(u32, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<(u32, u32)> {
        self.calls.lock().unwrap().last().copied()
    }
}

impl LimitApplier for RecordingApplier {
    fn apply(&self, min: u32, max: u32) {
        self.calls.lock().unwrap().push((min, max));
    }
}

/// Oracle whose table can never be read.
pub struct OfflineTable;

impl FreqOracle for OfflineTable {
    fn enumerate(&self) -> Result<Vec<u32>, LimitError> {
        Err(LimitError::unavailable("table offline"))
    }
}

pub fn hardlimit(defaults: LimitDefaults) -> (HardLimit, Arc<RecordingApplier>) {
    hardlimit_with(defaults, StaticFreqTable::new(SCENARIO_TABLE.to_vec()))
}

pub fn hardlimit_with(defaults: LimitDefaults, oracle: impl FreqOracle + 'static) -> (HardLimit, Arc<RecordingApplier>) {
    let rec = Arc::new(RecordingApplier::default());
    let hl = HardLimit::new(&defaults, 10000, Arc::new(oracle), rec.clone());
    (hl, rec)
}

/// Fresh directory under the system temp dir, unique per call.
pub fn scratch_dir(tag: &str) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("hardlimit-{}-{}-{}", tag, std::process::id(), n));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}
