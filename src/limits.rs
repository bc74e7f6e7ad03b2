//! Limit policy store: configured ceilings/floors, the active bounds derived from them,
//! and the screen-on / screen-off / wakeup-kick transitions.
//!
//! Nothing in here locks. `controller::HardLimit` owns the single `Limits` record behind
//! its mutex and publishes `(current_min, current_max)` through `ActiveBounds` for the
//! clamp fast path.

use serde::{Deserialize, Serialize};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use crate::config::{self, KICK_DELAY_DISABLED};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    ScreenOnNormal,
    ScreenOnKick,
    ScreenOff,
}

/// Stock values the store starts from. Fields missing from the config fall back one by one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitDefaults {
    pub stock_min: u32,
    pub max_screen_on: u32,
    pub max_screen_off: u32,
    pub kick_freq: u32,
    pub kick_delay_ms: u32,
    pub touchboost_lo: u32,
    pub touchboost_hi: u32,
}

impl Default for LimitDefaults {
    fn default() -> Self {
        Self {
            stock_min: config::STOCK_MIN,
            max_screen_on: config::STOCK_MAX_SCREEN_ON,
            max_screen_off: config::STOCK_MAX_SCREEN_OFF,
            kick_freq: config::STOCK_MIN,
            kick_delay_ms: KICK_DELAY_DISABLED,
            touchboost_lo: config::STOCK_TOUCHBOOST_LO,
            touchboost_hi: config::STOCK_TOUCHBOOST_HI,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Limits {
    pub stock_min: u32,
    pub max_screen_on: u32,
    pub max_screen_off: u32,
    pub kick_freq: u32,
    pub kick_delay_ms: u32,
    pub kick_active: bool,
    pub touchboost_lo: u32,
    pub touchboost_hi: u32,
    pub current_min: u32,
    pub current_max: u32,
    pub screen_on: bool,
}

/// What a resume did to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resume {
    /// Already on, nothing changed.
    Ignored,
    /// Bounds switched to the screen-on ceiling with the stock floor.
    Normal,
    /// Floor raised to the kick frequency; revert after the given delay.
    Kick(Duration),
}

impl Limits {
    pub fn new(d: &LimitDefaults) -> Self {
        let mut l = Self {
            stock_min: d.stock_min,
            max_screen_on: d.max_screen_on,
            max_screen_off: d.max_screen_off,
            kick_freq: d.kick_freq,
            kick_delay_ms: d.kick_delay_ms,
            kick_active: false,
            touchboost_lo: d.touchboost_lo,
            touchboost_hi: d.touchboost_hi,
            current_min: d.stock_min,
            current_max: d.max_screen_on,
            screen_on: true,
        };
        l.settle_floor();
        l
    }

    pub fn state(&self) -> PowerState {
        match (self.screen_on, self.kick_active) {
            (false, _) => PowerState::ScreenOff,
            (true, true) => PowerState::ScreenOnKick,
            (true, false) => PowerState::ScreenOnNormal,
        }
    }

    pub fn bounds(&self) -> (u32, u32) {
        (self.current_min, self.current_max)
    }

    pub fn kick_enabled(&self) -> bool {
        self.kick_delay_ms != KICK_DELAY_DISABLED
    }

    /// Screen turned off. Returns false when it already was.
    pub fn suspend(&mut self) -> bool {
        if !self.screen_on {
            return false;
        }
        self.screen_on = false;
        self.kick_active = false;
        self.current_min = self.stock_min;
        self.current_max = self.max_screen_off;
        self.settle_floor();
        true
    }

    pub fn resume(&mut self) -> Resume {
        if self.screen_on {
            return Resume::Ignored;
        }
        self.screen_on = true;

        if !self.kick_enabled() {
            self.kick_active = false;
            self.current_min = self.stock_min;
            self.current_max = self.max_screen_on;
            self.settle_floor();
            return Resume::Normal;
        }

        self.kick_active = true;
        self.current_min = self.kick_freq;
        // Reduces to max_screen_on as long as kick_freq <= max_screen_on holds.
        self.current_max = self.max_screen_on.max(self.max_screen_on.min(self.kick_freq));
        self.settle_floor();
        Resume::Kick(Duration::from_millis(self.kick_delay_ms as u64))
    }

    /// Kick window elapsed. Returns false if the kick is no longer active.
    pub fn end_kick(&mut self) -> bool {
        if !self.screen_on || !self.kick_active {
            return false;
        }
        self.kick_active = false;
        self.current_min = self.stock_min;
        self.current_max = self.max_screen_on;
        self.settle_floor();
        true
    }

    /// The active floor never exceeds the active ceiling.
    pub(crate) fn settle_floor(&mut self) {
        if self.current_min > self.current_max {
            self.current_min = self.current_max;
        }
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        if self.current_min > self.current_max {
            return Err(format!("current_min {} > current_max {}", self.current_min, self.current_max));
        }
        if self.touchboost_lo > self.touchboost_hi {
            return Err(format!("touchboost_lo {} > touchboost_hi {}", self.touchboost_lo, self.touchboost_hi));
        }
        if self.kick_active && !self.screen_on {
            return Err("kick active while screen is off".to_string());
        }
        Ok(())
    }
}

pub fn clamp(min: u32, max: u32, requested: u32) -> u32 {
    min.max(max.min(requested))
}

/// `(current_min, current_max)` packed into one word so readers always see a matching pair.
#[derive(Debug)]
pub struct ActiveBounds(AtomicU64);

impl ActiveBounds {
    pub fn new(min: u32, max: u32) -> Self {
        Self(AtomicU64::new(pack(min, max)))
    }

    pub fn load(&self) -> (u32, u32) {
        unpack(self.0.load(Ordering::Acquire))
    }

    /// Only called with the store lock held.
    pub(crate) fn publish(&self, min: u32, max: u32) {
        self.0.store(pack(min, max), Ordering::Release);
    }

    pub fn clamp(&self, requested: u32) -> u32 {
        let (min, max) = self.load();
        clamp(min, max, requested)
    }
}

fn pack(min: u32, max: u32) -> u64 {
    ((max as u64) << 32) | min as u64
}

fn unpack(v: u64) -> (u32, u32) {
    (v as u32, (v >> 32) as u32)
}
