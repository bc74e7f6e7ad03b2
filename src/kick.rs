//! One-shot timer that reverts the wakeup kick.
//!
//! At most one pending callback exists. Each scheduled callback carries an id; the
//! owner checks it with [`KickTimer::complete`] under the same lock that guards
//! `cancel`, so a cancelled callback that already woke up can never apply.

use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::warn;

#[derive(Debug, Default)]
struct CancelFlag {
    cancelled: Mutex<bool>,
    cv: Condvar,
}

impl CancelFlag {
    fn cancel(&self) {
        *self.cancelled.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cv.notify_all();
    }

    /// Sleeps for `delay` unless cancelled first. Returns true if the delay elapsed.
    fn wait(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let mut cancelled = self.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            cancelled = self
                .cv
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        false
    }
}

#[derive(Debug)]
struct PendingKick {
    id: u64,
    flag: Arc<CancelFlag>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug, Default)]
pub struct KickTimer {
    pending: Option<PendingKick>,
    next_id: u64,
}

impl KickTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Cancels whatever is pending and arms a new callback. `fire` receives the id
    /// and runs on the timer thread. `None` if no thread could be started.
    pub fn schedule<F>(&mut self, delay: Duration, fire: F) -> Option<u64>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();

        self.next_id = self.next_id.wrapping_add(1);
        let id = self.next_id;
        let flag = Arc::new(CancelFlag::default());
        let thread_flag = flag.clone();

        let handle = thread::Builder::new()
            .name("wakeup-kick".to_string())
            .spawn(move || {
                if thread_flag.wait(delay) {
                    fire(id);
                }
            });

        let handle = match handle {
            Ok(h) => Some(h),
            Err(e) => {
                warn!("KICK: failed to spawn timer thread: {}", e);
                return None;
            }
        };

        self.pending = Some(PendingKick { id, flag, handle });
        Some(id)
    }

    /// Drops the pending callback. The returned handle may be joined once the
    /// caller has released any lock the callback takes.
    pub fn cancel(&mut self) -> Option<JoinHandle<()>> {
        let mut p = self.pending.take()?;
        p.flag.cancel();
        p.handle.take()
    }

    /// Called from the callback with the owner's lock held. True if `id` is still
    /// the armed kick; the slot is cleared so it fires at most once.
    pub fn complete(&mut self, id: u64) -> bool {
        match &self.pending {
            Some(p) if p.id == id => {
                // The thread is the caller itself, dropping the handle detaches it.
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}
