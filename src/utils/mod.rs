//! Common utilities shared across the crate

pub mod retry;

use chrono::{Local, NaiveDate, NaiveDateTime};

/// Current local wall-clock time, the engine's notion of "now"
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Current local date
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Format fractional hours the way log and CLI output shows them
pub fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 {
        format!("{}h", hours as i64)
    } else {
        format!("{hours:.1}h")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hours() {
        assert_eq!(format_hours(8.0), "8h");
        assert_eq!(format_hours(0.5), "0.5h");
        assert_eq!(format_hours(70.33), "70.3h");
    }
}
