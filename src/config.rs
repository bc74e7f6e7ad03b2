pub const VERSION: &str = concat!("CPU freq hard limit ", env!("CARGO_PKG_VERSION"), " - rust");

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:1005";

// Sysfs paths
pub const CPUFREQ_POLICY_BASE: &str = "/sys/devices/system/cpu/cpufreq";
pub const SCALING_MIN: &str = "scaling_min_freq";
pub const SCALING_MAX: &str = "scaling_max_freq";
pub const AVAILABLE_FREQS: &str = "scaling_available_frequencies";

pub const FB_BLANK: &str = "/sys/class/graphics/fb0/blank";
pub const BACKLIGHT_DIR: &str = "/sys/class/backlight";

// Stock limits (kHz). Stock behaviour: no screen-off cap, no wakeup kick.
pub const STOCK_MIN: u32 = 300000;
pub const STOCK_MAX_SCREEN_ON: u32 = 1190400;
pub const STOCK_MAX_SCREEN_OFF: u32 = 1190400;
pub const STOCK_TOUCHBOOST_LO: u32 = 787200;
pub const STOCK_TOUCHBOOST_HI: u32 = 998400;

// Wakeup kick (ms)
pub const KICK_DELAY_DISABLED: u32 = 0;
pub const KICK_DELAY_MAX: u32 = 10000;

// Loops / timings
pub const SCREEN_POLL_MS: u64 = 500;
pub const ENFORCE_SECS: u64 = 6;
pub const SCREEN_OFF_STREAK: u8 = 2;
