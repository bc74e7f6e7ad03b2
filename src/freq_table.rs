//! Source of the legal hardware frequencies.

use std::path::PathBuf;

use crate::{error::LimitError, sysfs};

pub trait FreqOracle: Send + Sync {
    /// Ascending, deduplicated list of supported frequencies (kHz).
    fn enumerate(&self) -> Result<Vec<u32>, LimitError>;

    fn contains(&self, freq: u32) -> Result<bool, LimitError> {
        Ok(self.enumerate()?.binary_search(&freq).is_ok())
    }
}

/// Reads `scaling_available_frequencies` on every call, the table can change after hotplug.
#[derive(Debug)]
pub struct SysfsFreqTable {
    path: PathBuf,
}

impl SysfsFreqTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FreqOracle for SysfsFreqTable {
    fn enumerate(&self) -> Result<Vec<u32>, LimitError> {
        let freqs = sysfs::read_u32_list(&self.path)
            .map_err(|e| LimitError::unavailable(format!("{}: {}", self.path.display(), e)))?;
        let freqs = normalize(freqs);
        if freqs.is_empty() {
            return Err(LimitError::unavailable(format!("{}: empty table", self.path.display())));
        }
        Ok(freqs)
    }
}

#[derive(Debug, Clone)]
pub struct StaticFreqTable {
    freqs: Vec<u32>,
}

impl StaticFreqTable {
    pub fn new(freqs: Vec<u32>) -> Self {
        Self { freqs: normalize(freqs) }
    }
}

impl FreqOracle for StaticFreqTable {
    fn enumerate(&self) -> Result<Vec<u32>, LimitError> {
        if self.freqs.is_empty() {
            return Err(LimitError::unavailable("static table is empty"));
        }
        Ok(self.freqs.clone())
    }
}

fn normalize(mut freqs: Vec<u32>) -> Vec<u32> {
    freqs.sort_unstable();
    freqs.dedup();
    freqs
}

/// `available_frequencies` rendering: space separated, ascending, newline terminated.
pub fn format_table(freqs: &[u32]) -> String {
    let mut out = String::new();
    for f in freqs {
        out.push_str(&f.to_string());
        out.push(' ');
    }
    out.push('\n');
    out
}
