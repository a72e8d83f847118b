//! Display helpers for presentation code. All of them accept positions past
//! the track duration since the player's clock is not clamped.

/// `mm:ss`, with minutes growing past two digits for long tracks.
pub fn format_time(ms: u64) -> String {
    let total_seconds = ms / 1000;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Fraction of the track played, in `[0.0, 1.0]`.
pub fn progress_ratio(position_ms: u64, duration_ms: u64) -> f64 {
    if duration_ms == 0 {
        return 0.0;
    }
    (position_ms as f64 / duration_ms as f64).min(1.0)
}

pub fn remaining_ms(position_ms: u64, duration_ms: u64) -> u64 {
    duration_ms.saturating_sub(position_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(999), "00:00");
        assert_eq!(format_time(5_000), "00:05");
        assert_eq!(format_time(200_000), "03:20");
        assert_eq!(format_time(6_000_000), "100:00");
    }

    #[test]
    fn progress_tolerates_bad_input() {
        assert_eq!(progress_ratio(10, 0), 0.0);
        assert_eq!(progress_ratio(500, 100), 1.0);
        assert_eq!(progress_ratio(50, 200), 0.25);
        assert_eq!(remaining_ms(500, 100), 0);
        assert_eq!(remaining_ms(40, 100), 60);
    }
}
