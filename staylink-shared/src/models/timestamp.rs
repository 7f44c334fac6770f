use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wrapper around a UTC timestamp so wire types share one serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Current time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_timestamp_serialization() {
        let dt = Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap();
        let timestamp = Timestamp(dt);
        let serialized = serde_json::to_string(&timestamp).unwrap();

        assert_eq!(serialized, "\"2025-03-08T14:30:00Z\"");
    }

    #[test]
    fn test_timestamp_deserialization() {
        let json_str = "\"2025-03-08T14:30:00Z\"";
        let deserialized: Timestamp = serde_json::from_str(json_str).unwrap();

        let expected_dt = Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap();
        assert_eq!(deserialized.0, expected_dt);
    }

    #[test]
    fn test_timestamp_ordering() {
        let earlier = Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap());
        let later = Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 1).unwrap());

        assert!(earlier < later);
        assert_eq!(earlier, earlier);
    }
}
