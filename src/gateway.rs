//! Validate-and-apply writes for each configurable field, plus the
//! sysfs-style attribute surface (`hardlimit`, `wakeup_kick_freq`, ...).
//!
//! Per write: parse, short-circuit on the current value, range checks, table
//! membership, apply. Nothing is mutated before every check has passed.

use tracing::{debug, info};

use crate::{
    config::{KICK_DELAY_DISABLED, VERSION},
    controller::HardLimit,
    error::LimitError,
    fmt,
    freq_table::{format_table, FreqOracle},
    limits::Limits,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    MaxScreenOn,
    MaxScreenOff,
    KickFreq,
    KickDelay,
    TouchboostLo,
    TouchboostHi,
}

impl Field {
    pub fn current(self, l: &Limits) -> u32 {
        match self {
            Field::MaxScreenOn => l.max_screen_on,
            Field::MaxScreenOff => l.max_screen_off,
            Field::KickFreq => l.kick_freq,
            Field::KickDelay => l.kick_delay_ms,
            Field::TouchboostLo => l.touchboost_lo,
            Field::TouchboostHi => l.touchboost_hi,
        }
    }

    fn validate(self, l: &Limits, v: u32, oracle: &dyn FreqOracle, kick_delay_max: u32) -> Result<(), LimitError> {
        match self {
            Field::KickDelay => {
                if !(KICK_DELAY_DISABLED..=kick_delay_max).contains(&v) {
                    return Err(LimitError::invalid(format!(
                        "wakeup kick delay {} outside {}..={}",
                        v, KICK_DELAY_DISABLED, kick_delay_max
                    )));
                }
                return Ok(());
            }
            Field::KickFreq => {
                // Only values between the current hard limits.
                if v > l.max_screen_on || v < l.max_screen_off {
                    return Err(LimitError::invalid(format!(
                        "wakeup kick {} outside {}..={}",
                        v, l.max_screen_off, l.max_screen_on
                    )));
                }
            }
            _ => {}
        }

        if !oracle.contains(v)? {
            return Err(LimitError::invalid(format!("{} is not an available frequency", v)));
        }
        Ok(())
    }

    /// Applies a validated value. Returns true when the active bounds changed.
    fn apply(self, l: &mut Limits, v: u32) -> bool {
        match self {
            Field::MaxScreenOn => {
                if !l.screen_on {
                    // Kept for compatibility: takes effect right away even with the screen off.
                    info!("HARDLIMIT: screen-on limit {} applied while screen is off", fmt::fmt_khz(v));
                }
                l.max_screen_on = v;
                l.current_max = v;
                // Wakeup kick can never be higher than the screen-on limit.
                if l.kick_freq > v {
                    l.kick_freq = v;
                    if l.kick_active {
                        l.current_min = v;
                    }
                }
                l.settle_floor();
                true
            }
            Field::MaxScreenOff => {
                l.max_screen_off = v;
                false
            }
            Field::KickFreq => {
                l.kick_freq = v;
                if l.kick_active {
                    l.current_min = v;
                    l.settle_floor();
                    return true;
                }
                false
            }
            Field::KickDelay => {
                l.kick_delay_ms = v;
                false
            }
            Field::TouchboostLo => {
                l.touchboost_lo = v;
                if l.touchboost_hi < v {
                    l.touchboost_hi = v;
                }
                false
            }
            Field::TouchboostHi => {
                l.touchboost_hi = v;
                if l.touchboost_lo > v {
                    l.touchboost_lo = v;
                }
                false
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attr {
    Hardlimit,
    HardlimitScreenOff,
    WakeupKickFreq,
    WakeupKickDelay,
    TouchboostLoFreq,
    TouchboostHiFreq,
    AvailableFrequencies,
    CurrentLimitMin,
    CurrentLimitMax,
    Version,
}

impl Attr {
    pub const ALL: [Attr; 10] = [
        Attr::Hardlimit,
        Attr::HardlimitScreenOff,
        Attr::WakeupKickFreq,
        Attr::WakeupKickDelay,
        Attr::TouchboostLoFreq,
        Attr::TouchboostHiFreq,
        Attr::AvailableFrequencies,
        Attr::CurrentLimitMin,
        Attr::CurrentLimitMax,
        Attr::Version,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Attr::Hardlimit => "hardlimit",
            Attr::HardlimitScreenOff => "hardlimit_screen_off",
            Attr::WakeupKickFreq => "wakeup_kick_freq",
            Attr::WakeupKickDelay => "wakeup_kick_delay",
            Attr::TouchboostLoFreq => "touchboost_lo_freq",
            Attr::TouchboostHiFreq => "touchboost_hi_freq",
            Attr::AvailableFrequencies => "available_frequencies",
            Attr::CurrentLimitMin => "current_limit_min",
            Attr::CurrentLimitMax => "current_limit_max",
            Attr::Version => "version",
        }
    }

    pub fn from_name(name: &str) -> Option<Attr> {
        Attr::ALL.iter().copied().find(|a| a.name() == name)
    }

    /// Backing field for writable attributes.
    pub fn field(self) -> Option<Field> {
        match self {
            Attr::Hardlimit => Some(Field::MaxScreenOn),
            Attr::HardlimitScreenOff => Some(Field::MaxScreenOff),
            Attr::WakeupKickFreq => Some(Field::KickFreq),
            Attr::WakeupKickDelay => Some(Field::KickDelay),
            Attr::TouchboostLoFreq => Some(Field::TouchboostLo),
            Attr::TouchboostHiFreq => Some(Field::TouchboostHi),
            _ => None,
        }
    }
}

/// Plain non-negative integer, surrounding whitespace allowed.
pub fn parse_value(text: &str) -> Result<u32, LimitError> {
    let t = text.trim();
    t.parse::<u32>()
        .map_err(|_| LimitError::invalid(format!("not a number: {:?}", t)))
}

impl HardLimit {
    pub fn write(&self, field: Field, value: u32) -> Result<(), LimitError> {
        self.update(|l, oracle, kick_delay_max| {
            if field.current(l) == value {
                return Ok(false);
            }
            field.validate(l, value, oracle, kick_delay_max)?;
            let changed = field.apply(l, value);
            debug!("GATEWAY: {:?} = {}", field, value);
            Ok(changed)
        })
    }

    pub fn read(&self, field: Field) -> u32 {
        field.current(&self.snapshot())
    }

    pub fn set_max_screen_on(&self, v: u32) -> Result<(), LimitError> {
        self.write(Field::MaxScreenOn, v)
    }

    pub fn set_max_screen_off(&self, v: u32) -> Result<(), LimitError> {
        self.write(Field::MaxScreenOff, v)
    }

    pub fn set_kick_freq(&self, v: u32) -> Result<(), LimitError> {
        self.write(Field::KickFreq, v)
    }

    pub fn set_kick_delay(&self, ms: u32) -> Result<(), LimitError> {
        self.write(Field::KickDelay, ms)
    }

    pub fn set_touchboost_lo(&self, v: u32) -> Result<(), LimitError> {
        self.write(Field::TouchboostLo, v)
    }

    pub fn set_touchboost_hi(&self, v: u32) -> Result<(), LimitError> {
        self.write(Field::TouchboostHi, v)
    }

    pub fn available_frequencies(&self) -> Result<Vec<u32>, LimitError> {
        self.oracle().enumerate()
    }

    /// Text of an attribute, newline terminated.
    pub fn show(&self, attr: Attr) -> Result<String, LimitError> {
        if let Some(field) = attr.field() {
            return Ok(format!("{}\n", self.read(field)));
        }
        Ok(match attr {
            Attr::AvailableFrequencies => format_table(&self.available_frequencies()?),
            Attr::CurrentLimitMin => format!("{}\n", self.current_bounds().0),
            Attr::CurrentLimitMax => format!("{}\n", self.current_bounds().1),
            _ => format!("{}\n", VERSION),
        })
    }

    pub fn store(&self, attr: Attr, text: &str) -> Result<(), LimitError> {
        if attr.field().is_none() {
            return Err(LimitError::invalid(format!("{} is read-only", attr.name())));
        }
        let v = parse_value(text)?;
        match attr {
            Attr::Hardlimit => self.set_max_screen_on(v),
            Attr::HardlimitScreenOff => self.set_max_screen_off(v),
            Attr::WakeupKickFreq => self.set_kick_freq(v),
            Attr::WakeupKickDelay => self.set_kick_delay(v),
            Attr::TouchboostLoFreq => self.set_touchboost_lo(v),
            _ => self.set_touchboost_hi(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        limits::LimitDefaults,
        screen::PowerListener,
        testutil::{hardlimit, hardlimit_with, scenario_defaults, OfflineTable, SCENARIO_TABLE},
    };

    #[test]
    fn scenario_d_lowering_screen_on_pulls_kick_down() {
        let (hl, rec) = hardlimit(LimitDefaults { kick_freq: 1300, ..scenario_defaults() });
        hl.set_max_screen_on(1200).unwrap();

        let s = hl.snapshot();
        assert_eq!(s.max_screen_on, 1200);
        assert_eq!(s.kick_freq, 1200);
        assert_eq!(s.current_max, 1200);
        assert_eq!(rec.last(), Some((300, 1200)));
    }

    #[test]
    fn lowering_screen_on_during_kick_keeps_floor_below_ceiling() {
        let (hl, rec) = hardlimit(LimitDefaults { kick_freq: 1300, kick_delay_ms: 5000, ..scenario_defaults() });
        hl.screen_off();
        hl.screen_on();
        assert_eq!(hl.current_bounds(), (1300, 1700));

        hl.set_max_screen_on(1200).unwrap();
        assert_eq!(hl.current_bounds(), (1200, 1200));
        assert_eq!(rec.last(), Some((1200, 1200)));
        hl.snapshot().check_invariants().unwrap();
        hl.shutdown();
    }

    #[test]
    fn screen_on_limit_applies_immediately_while_off() {
        let (hl, _) = hardlimit(scenario_defaults());
        hl.screen_off();
        hl.set_max_screen_on(1500).unwrap();
        assert_eq!(hl.current_bounds(), (300, 1500));
    }

    #[test]
    fn scenario_e_touchboost_hi_below_lo() {
        let (hl, rec) = hardlimit(scenario_defaults());
        hl.set_touchboost_lo(1200).unwrap();
        hl.set_touchboost_hi(800).unwrap();

        let s = hl.snapshot();
        assert_eq!((s.touchboost_lo, s.touchboost_hi), (800, 800));
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn touchboost_lo_above_hi_raises_hi() {
        let (hl, _) = hardlimit(scenario_defaults());
        hl.set_touchboost_lo(1500).unwrap();
        let s = hl.snapshot();
        assert_eq!((s.touchboost_lo, s.touchboost_hi), (1500, 1500));
    }

    #[test]
    fn scenario_f_value_outside_table() {
        let (hl, rec) = hardlimit(scenario_defaults());
        let before = hl.snapshot();
        for field in [Field::MaxScreenOn, Field::MaxScreenOff, Field::KickFreq, Field::TouchboostLo, Field::TouchboostHi] {
            assert!(matches!(hl.write(field, 1234), Err(LimitError::InvalidArgument(_))), "{:?}", field);
        }
        assert_eq!(hl.snapshot(), before);
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn kick_freq_must_sit_between_limits() {
        let (hl, _) = hardlimit(scenario_defaults());
        assert!(matches!(hl.set_kick_freq(300), Err(LimitError::InvalidArgument(_))));
        hl.set_max_screen_on(1500).unwrap();
        assert!(matches!(hl.set_kick_freq(1700), Err(LimitError::InvalidArgument(_))));
        hl.set_kick_freq(1500).unwrap();
        hl.set_kick_freq(800).unwrap();
        assert_eq!(hl.read(Field::KickFreq), 800);
    }

    #[test]
    fn kick_freq_write_moves_active_floor() {
        let (hl, rec) = hardlimit(LimitDefaults { kick_delay_ms: 5000, ..scenario_defaults() });
        hl.set_kick_freq(1500).unwrap();
        assert!(rec.calls().is_empty());

        hl.screen_off();
        hl.screen_on();
        assert_eq!(hl.current_bounds(), (1500, 1700));
        hl.set_kick_freq(1200).unwrap();
        assert_eq!(hl.current_bounds(), (1200, 1700));
        assert_eq!(rec.last(), Some((1200, 1700)));
        hl.shutdown();
    }

    #[test]
    fn screen_off_limit_waits_for_next_suspend() {
        let (hl, rec) = hardlimit(scenario_defaults());
        hl.set_max_screen_off(1200).unwrap();
        assert_eq!(hl.current_bounds(), (300, 1700));
        assert!(rec.calls().is_empty());
        hl.screen_off();
        assert_eq!(hl.current_bounds(), (300, 1200));
    }

    #[test]
    fn kick_delay_range() {
        let (hl, _) = hardlimit(scenario_defaults());
        hl.set_kick_delay(10000).unwrap();
        assert!(matches!(hl.set_kick_delay(10001), Err(LimitError::InvalidArgument(_))));
        hl.set_kick_delay(KICK_DELAY_DISABLED).unwrap();
        // Not a frequency; the table is never consulted.
        hl.set_kick_delay(1234).unwrap();
        assert_eq!(hl.read(Field::KickDelay), 1234);
    }

    #[test]
    fn writing_current_value_is_a_noop() {
        let (hl, rec) = hardlimit_with(scenario_defaults(), OfflineTable);
        let before = hl.snapshot();
        for field in [
            Field::MaxScreenOn,
            Field::MaxScreenOff,
            Field::KickFreq,
            Field::KickDelay,
            Field::TouchboostLo,
            Field::TouchboostHi,
        ] {
            hl.write(field, field.current(&before)).unwrap();
        }
        assert_eq!(hl.snapshot(), before);
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn table_unavailable_is_reported_and_nothing_changes() {
        let (hl, _) = hardlimit_with(scenario_defaults(), OfflineTable);
        let before = hl.snapshot();
        assert!(matches!(hl.set_max_screen_on(1200), Err(LimitError::ResourceUnavailable(_))));
        assert!(matches!(hl.show(Attr::AvailableFrequencies), Err(LimitError::ResourceUnavailable(_))));
        assert_eq!(hl.snapshot(), before);

        // Transitions never need the table.
        hl.screen_off();
        assert_eq!(hl.current_bounds(), (300, 800));
    }

    #[test]
    fn accepted_writes_read_back() {
        let (hl, _) = hardlimit(scenario_defaults());
        hl.store(Attr::Hardlimit, "1500\n").unwrap();
        hl.store(Attr::HardlimitScreenOff, " 1200 ").unwrap();
        hl.store(Attr::WakeupKickFreq, "1200").unwrap();
        hl.store(Attr::WakeupKickDelay, "2500").unwrap();
        assert_eq!(hl.show(Attr::Hardlimit).unwrap(), "1500\n");
        assert_eq!(hl.show(Attr::HardlimitScreenOff).unwrap(), "1200\n");
        assert_eq!(hl.show(Attr::WakeupKickFreq).unwrap(), "1200\n");
        assert_eq!(hl.show(Attr::WakeupKickDelay).unwrap(), "2500\n");
        assert_eq!(hl.show(Attr::CurrentLimitMax).unwrap(), "1500\n");
        assert_eq!(hl.show(Attr::CurrentLimitMin).unwrap(), "300\n");
    }

    #[test]
    fn malformed_and_read_only_stores_fail() {
        let (hl, _) = hardlimit(scenario_defaults());
        for bad in ["", "abc", "-800", "12.5", "800 900"] {
            assert!(matches!(hl.store(Attr::Hardlimit, bad), Err(LimitError::InvalidArgument(_))), "{:?}", bad);
        }
        assert!(matches!(hl.store(Attr::CurrentLimitMax, "800"), Err(LimitError::InvalidArgument(_))));
        assert!(matches!(hl.store(Attr::Version, "1"), Err(LimitError::InvalidArgument(_))));
    }

    #[test]
    fn read_only_attributes() {
        let (hl, _) = hardlimit(scenario_defaults());
        let expected = format_table(SCENARIO_TABLE);
        assert_eq!(hl.show(Attr::AvailableFrequencies).unwrap(), expected);
        assert!(hl.show(Attr::Version).unwrap().starts_with("CPU freq hard limit"));
    }

    #[test]
    fn attribute_names_roundtrip() {
        for a in Attr::ALL {
            assert_eq!(Attr::from_name(a.name()), Some(a));
        }
        assert_eq!(Attr::from_name("scaling_max_freq"), None);
        assert_eq!(Attr::ALL.iter().filter(|a| a.field().is_some()).count(), 6);
    }
}
