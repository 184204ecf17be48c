use std::time::Duration;

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

/// `0.0123` -> `1.23%`.
pub(crate) fn format_percent(share: f64) -> String {
    if share.is_finite() {
        format!("{:.2}%", share * 100.0)
    } else {
        "-".to_string()
    }
}

/// Latency in milliseconds; `-` when the series is empty.
pub(crate) fn format_ms(v: Option<f64>) -> String {
    match v {
        Some(ms) if ms >= 1000.0 => format!("{:.2}s", ms / 1000.0),
        Some(ms) => format!("{ms:.2}ms"),
        None => "-".to_string(),
    }
}

pub(crate) fn format_observed(v: Option<f64>) -> String {
    match v {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{v:.0}"),
        Some(v) => format!("{v:.4}"),
        None => "-".to_string(),
    }
}

/// Single rounded component in one of: ms, s, m.
pub(crate) fn format_duration(d: Duration) -> String {
    const MS_PER_S: u128 = 1_000;
    const MS_PER_M: u128 = 60_000;

    fn round_div(value: u128, unit: u128) -> u128 {
        // Ties round up.
        (value + (unit / 2)) / unit
    }

    let ms = d.as_millis();
    if ms >= 10 * MS_PER_M {
        return format!("{}m", round_div(ms, MS_PER_M));
    }
    if ms >= MS_PER_S {
        return format!("{}s", round_div(ms, MS_PER_S));
    }
    format!("{ms}ms")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_render_as_one_unit() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1_499)), "1s");
        assert_eq!(format_duration(Duration::from_millis(1_500)), "2s");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_secs(900)), "15m");
    }

    #[test]
    fn latency_and_shares() {
        assert_eq!(format_ms(Some(12.345)), "12.35ms");
        assert_eq!(format_ms(Some(2500.0)), "2.50s");
        assert_eq!(format_ms(None), "-");
        assert_eq!(format_percent(0.5), "50.00%");
        assert_eq!(format_observed(Some(3.0)), "3");
        assert_eq!(format_observed(Some(0.0125)), "0.0125");
        assert_eq!(format_observed(None), "-");
    }
}
