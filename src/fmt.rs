pub fn fmt_khz(khz: u32) -> String {
    if khz >= 1_000_000 {
        format!("{:.2}GHz", khz as f64 / 1_000_000.0)
    } else {
        format!("{:.0}MHz", khz as f64 / 1_000.0)
    }
}

/// `min..max` pair for log lines.
pub fn fmt_bounds(min: u32, max: u32) -> String {
    format!("{}..{}", fmt_khz(min), fmt_khz(max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn khz_units() {
        assert_eq!(fmt_khz(787200), "787MHz");
        assert_eq!(fmt_khz(1190400), "1.19GHz");
        assert_eq!(fmt_bounds(300000, 1190400), "300MHz..1.19GHz");
    }
}
