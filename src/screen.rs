use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    config::{BACKLIGHT_DIR, FB_BLANK, SCREEN_OFF_STREAK},
    sysfs,
};

/// Receiver of display power transitions.
pub trait PowerListener: Send + Sync {
    fn screen_off(&self);
    fn screen_on(&self);
}

#[derive(Debug, Clone)]
pub enum ScreenProbe {
    FbBlank(PathBuf),
    BacklightBright(PathBuf),
    BacklightPower(PathBuf),
}

pub fn detect_screen_probe() -> Option<ScreenProbe> {
    detect_screen_probe_in(Path::new(FB_BLANK), Path::new(BACKLIGHT_DIR))
}

fn detect_screen_probe_in(fb_blank: &Path, bl_dir: &Path) -> Option<ScreenProbe> {
    if fb_blank.exists() {
        return Some(ScreenProbe::FbBlank(fb_blank.to_path_buf()));
    }

    if let Ok(entries) = std::fs::read_dir(bl_dir) {
        for e in entries.flatten() {
            let p = e.path();
            let bright = p.join("brightness");
            if bright.exists() {
                return Some(ScreenProbe::BacklightBright(bright));
            }
            let blp = p.join("bl_power");
            if blp.exists() {
                return Some(ScreenProbe::BacklightPower(blp));
            }
        }
    }
    None
}

/// Unreadable probes report ON so limits never get stuck in the screen-off state.
pub fn raw_screen_on(probe: &ScreenProbe) -> bool {
    match probe {
        ScreenProbe::FbBlank(p) => sysfs::read_i32(p).map(|v| v == 0).unwrap_or(true),
        ScreenProbe::BacklightBright(p) => sysfs::read_i32(p).map(|v| v > 0).unwrap_or(true),
        ScreenProbe::BacklightPower(p) => sysfs::read_i32(p).map(|v| v == 0).unwrap_or(true),
    }
}

/// Turns raw samples into edges. Screen-off needs `SCREEN_OFF_STREAK` samples in a row.
#[derive(Debug)]
pub struct Debounce {
    on: bool,
    off_streak: u8,
}

impl Default for Debounce {
    fn default() -> Self {
        Self { on: true, off_streak: 0 }
    }
}

impl Debounce {
    /// Returns the new state when it flipped.
    pub fn sample(&mut self, raw_on: bool) -> Option<bool> {
        let on = if raw_on {
            self.off_streak = 0;
            true
        } else {
            self.off_streak = self.off_streak.saturating_add(1);
            self.off_streak < SCREEN_OFF_STREAK
        };
        if on == self.on {
            return None;
        }
        self.on = on;
        Some(on)
    }
}

/// Active subscription to screen transitions. `stop` unsubscribes and joins.
pub struct ScreenWatch {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ScreenWatch {
    pub fn spawn(probe: ScreenProbe, poll: Duration, listener: Arc<dyn PowerListener>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        info!("SCREEN: {:?} every {}ms", probe, poll.as_millis());

        let handle = thread::Builder::new().name("screen-watch".to_string()).spawn(move || {
            let mut debounce = Debounce::default();
            while !thread_stop.load(Ordering::Acquire) {
                match debounce.sample(raw_screen_on(&probe)) {
                    Some(true) => {
                        debug!("SCREEN: ON");
                        listener.screen_on();
                    }
                    Some(false) => {
                        debug!("SCREEN: OFF");
                        listener.screen_off();
                    }
                    None => {}
                }
                thread::park_timeout(poll);
            }
        })?;

        Ok(Self { stop, handle: Some(handle) })
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(h) = self.handle.take() {
            h.thread().unpark();
            if h.join().is_err() {
                warn!("SCREEN: watcher panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::scratch_dir;
    use std::{fs, sync::Mutex};

    #[test]
    fn prefers_fb_blank_then_backlight() {
        let root = scratch_dir("screen_detect");
        let fb = root.join("blank");
        let bl = root.join("backlight");
        fs::create_dir_all(bl.join("panel0")).unwrap();
        fs::write(bl.join("panel0").join("brightness"), "120\n").unwrap();

        assert!(matches!(detect_screen_probe_in(&fb, &bl), Some(ScreenProbe::BacklightBright(_))));
        fs::write(&fb, "0\n").unwrap();
        assert!(matches!(detect_screen_probe_in(&fb, &bl), Some(ScreenProbe::FbBlank(_))));
        assert!(detect_screen_probe_in(&root.join("x"), &root.join("y")).is_none());
    }

    #[test]
    fn raw_readings() {
        let root = scratch_dir("screen_raw");
        let p = root.join("brightness");
        fs::write(&p, "0\n").unwrap();
        assert!(!raw_screen_on(&ScreenProbe::BacklightBright(p.clone())));
        fs::write(&p, "42\n").unwrap();
        assert!(raw_screen_on(&ScreenProbe::BacklightBright(p.clone())));
        assert!(raw_screen_on(&ScreenProbe::FbBlank(root.join("missing"))));
        fs::write(&p, "4\n").unwrap();
        assert!(!raw_screen_on(&ScreenProbe::FbBlank(p)));
    }

    #[test]
    fn debounce_needs_two_off_samples() {
        let mut d = Debounce::default();
        assert_eq!(d.sample(true), None);
        assert_eq!(d.sample(false), None);
        assert_eq!(d.sample(true), None);
        assert_eq!(d.sample(false), None);
        assert_eq!(d.sample(false), Some(false));
        assert_eq!(d.sample(false), None);
        assert_eq!(d.sample(true), Some(true));
    }

    #[derive(Default)]
    struct Events(Mutex<Vec<bool>>);

    impl PowerListener for Events {
        fn screen_off(&self) {
            self.0.lock().unwrap().push(false);
        }
        fn screen_on(&self) {
            self.0.lock().unwrap().push(true);
        }
    }

    #[test]
    fn watch_delivers_edges_until_stopped() {
        let root = scratch_dir("screen_watch");
        let p = root.join("blank");
        fs::write(&p, "0\n").unwrap();

        let events = Arc::new(Events::default());
        let w = ScreenWatch::spawn(ScreenProbe::FbBlank(p.clone()), Duration::from_millis(10), events.clone())
            .unwrap();

        fs::write(&p, "4\n").unwrap();
        thread::sleep(Duration::from_millis(200));
        fs::write(&p, "0\n").unwrap();
        thread::sleep(Duration::from_millis(200));
        w.stop();

        let seen = events.0.lock().unwrap().clone();
        assert_eq!(seen, vec![false, true]);

        fs::write(&p, "4\n").unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(events.0.lock().unwrap().len(), 2);
    }
}
