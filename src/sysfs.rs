use std::{
    collections::HashMap,
    fs,
    io,
    path::{Path, PathBuf},
};

pub fn read_to_string(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok()
}

pub fn read_u32(path: &Path) -> Option<u32> {
    let s = read_to_string(path)?;
    s.trim().parse::<u32>().ok()
}

pub fn read_i32(path: &Path) -> Option<i32> {
    let s = read_to_string(path)?;
    s.trim().parse::<i32>().ok()
}

/// Whitespace separated list of frequencies, e.g. `scaling_available_frequencies`.
/// Tokens that do not parse are skipped.
pub fn read_u32_list(path: &Path) -> io::Result<Vec<u32>> {
    let s = fs::read_to_string(path)?;
    Ok(s.split_whitespace().filter_map(|t| t.parse::<u32>().ok()).collect())
}

pub fn write_num(path: &Path, val: u32) -> io::Result<()> {
    fs::write(path, format!("{}\n", val).as_bytes())
}

/// How `write_khz` decides a node already holds the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Trust our own last write.
    Cached,
    /// Re-read the node; another writer may have changed it.
    Verify,
}

/// Writes `target` unless the node already holds it. Missing nodes are skipped.
/// Returns whether a write happened.
pub fn write_khz(path: &Path, target: u32, cache: &mut HashMap<PathBuf, u32>, mode: WriteMode) -> io::Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let holds = match mode {
        WriteMode::Cached => cache.get(path) == Some(&target),
        WriteMode::Verify => read_u32(path) == Some(target),
    };
    if !holds {
        write_num(path, target)?;
    }
    cache.insert(path.to_path_buf(), target);
    Ok(!holds)
}
