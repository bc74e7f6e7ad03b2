//! Power state controller and owner of the limit store.
//!
//! Config writes, screen notifications and the kick timer all serialize on
//! `Shared::inner`. The clamp path only reads `Shared::bounds`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info, warn};

use crate::{
    error::LimitError,
    fmt,
    freq_table::FreqOracle,
    kick::KickTimer,
    limits::{ActiveBounds, LimitDefaults, Limits, Resume},
    propagate::LimitApplier,
    screen::PowerListener,
};

struct Inner {
    limits: Limits,
    kick: KickTimer,
}

struct Shared {
    inner: Mutex<Inner>,
    bounds: ActiveBounds,
    oracle: Arc<dyn FreqOracle>,
    applier: Arc<dyn LimitApplier>,
    kick_delay_max: u32,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish the active bounds and hand them downstream. Called with the lock held
    /// so the applier sees updates in store order.
    fn propagate(&self, limits: &Limits) {
        if let Err(e) = limits.check_invariants() {
            warn!("HARDLIMIT: invariant broken: {}", e);
        }
        let (min, max) = limits.bounds();
        self.bounds.publish(min, max);
        debug!("HARDLIMIT: reapply {}", fmt::fmt_bounds(min, max));
        self.applier.apply(min, max);
    }

    fn expire_kick(&self, id: u64) {
        let mut inner = self.lock();
        if !inner.kick.complete(id) {
            debug!("KICK: stale expiry #{} ignored", id);
            return;
        }
        let (old_min, old_max) = inner.limits.bounds();
        if inner.limits.end_kick() {
            let (min, max) = inner.limits.bounds();
            debug!(
                "KICK: stop wakeup kick {} -> {}",
                fmt::fmt_bounds(old_min, old_max),
                fmt::fmt_bounds(min, max)
            );
            self.propagate(&inner.limits);
        }
    }
}

/// Cheap to clone; every clone drives the same store.
#[derive(Clone)]
pub struct HardLimit {
    shared: Arc<Shared>,
}

impl HardLimit {
    pub fn new(
        defaults: &LimitDefaults,
        kick_delay_max: u32,
        oracle: Arc<dyn FreqOracle>,
        applier: Arc<dyn LimitApplier>,
    ) -> Self {
        let limits = Limits::new(defaults);
        let (min, max) = limits.bounds();
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner { limits, kick: KickTimer::new() }),
                bounds: ActiveBounds::new(min, max),
                oracle,
                applier,
                kick_delay_max,
            }),
        }
    }

    /// Lock-free; safe on the per-decision path.
    pub fn clamp(&self, requested: u32) -> u32 {
        self.shared.bounds.clamp(requested)
    }

    pub fn current_bounds(&self) -> (u32, u32) {
        self.shared.bounds.load()
    }

    pub fn snapshot(&self) -> Limits {
        self.shared.lock().limits.clone()
    }

    pub fn kick_pending(&self) -> bool {
        self.shared.lock().kick.is_pending()
    }

    pub fn oracle(&self) -> &dyn FreqOracle {
        self.shared.oracle.as_ref()
    }

    pub fn kick_delay_max(&self) -> u32 {
        self.shared.kick_delay_max
    }

    /// Push the current bounds downstream, e.g. at startup.
    pub fn reapply(&self) {
        let inner = self.shared.lock();
        self.shared.propagate(&inner.limits);
    }

    /// Runs `f` on the store under the lock. `f` validates fully before mutating and
    /// returns whether the active bounds changed.
    pub(crate) fn update<F>(&self, f: F) -> Result<(), LimitError>
    where
        F: FnOnce(&mut Limits, &dyn FreqOracle, u32) -> Result<bool, LimitError>,
    {
        let mut inner = self.shared.lock();
        let changed = f(&mut inner.limits, self.shared.oracle.as_ref(), self.shared.kick_delay_max)?;
        if changed {
            self.shared.propagate(&inner.limits);
        }
        Ok(())
    }

    /// Cancels the kick timer and waits for its thread. The power subscription must
    /// already be stopped.
    pub fn shutdown(&self) {
        let handle = {
            let mut inner = self.shared.lock();
            inner.kick.cancel()
        };
        if let Some(h) = handle {
            if h.join().is_err() {
                warn!("KICK: timer thread panicked");
            }
        }
        info!("HARDLIMIT: shut down");
    }
}

impl PowerListener for HardLimit {
    fn screen_off(&self) {
        let mut inner = self.shared.lock();
        let (old_min, old_max) = inner.limits.bounds();
        if !inner.limits.suspend() {
            debug!("SCREEN: off while already off");
            return;
        }
        // The handle is dropped, not joined: an expiry that already woke up blocks on
        // this lock and then fails `complete`, so no revert can land after this point.
        if inner.kick.cancel().is_some() {
            debug!("KICK: cancelled by screen off");
        }
        let (min, max) = inner.limits.bounds();
        debug!(
            "SCREEN: suspend {} -> {}",
            fmt::fmt_bounds(old_min, old_max),
            fmt::fmt_bounds(min, max)
        );
        self.shared.propagate(&inner.limits);
    }

    fn screen_on(&self) {
        let mut inner = self.shared.lock();
        let (old_min, old_max) = inner.limits.bounds();
        match inner.limits.resume() {
            Resume::Ignored => {
                debug!("SCREEN: on while already on");
                return;
            }
            Resume::Normal => {
                // Same as screen_off: the id check in `complete` stands in for a join.
                inner.kick.cancel();
                let (min, max) = inner.limits.bounds();
                debug!(
                    "SCREEN: resume (no wakeup kick) {} -> {}",
                    fmt::fmt_bounds(old_min, old_max),
                    fmt::fmt_bounds(min, max)
                );
            }
            Resume::Kick(delay) => {
                let weak: Weak<Shared> = Arc::downgrade(&self.shared);
                let armed = inner.kick.schedule(delay, move |id| {
                    if let Some(shared) = weak.upgrade() {
                        shared.expire_kick(id);
                    }
                });
                let (min, max) = inner.limits.bounds();
                debug!(
                    "SCREEN: resume (wakeup kick {}ms) {} -> {}",
                    delay.as_millis(),
                    fmt::fmt_bounds(old_min, old_max),
                    fmt::fmt_bounds(min, max)
                );
                if armed.is_none() {
                    inner.limits.end_kick();
                }
            }
        }
        self.shared.propagate(&inner.limits);
    }
}
