//! Time and timestamp helpers.

use chrono::{DateTime, SecondsFormat, Utc};

/// UTC timestamp stamped on plugin-originated messages.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Render a timestamp the way it travels inside message params.
#[must_use]
pub fn to_wire(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_render_wire_format_with_millis_and_zulu() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T12:30:00.250Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(to_wire(ts), "2024-05-01T12:30:00.250Z");
    }
}
