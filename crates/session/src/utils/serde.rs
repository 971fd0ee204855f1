//! Serialization helpers shared by configuration types

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize a `Duration` as whole milliseconds
///
/// ```rust
/// use std::time::Duration;
///
/// use serde::{Deserialize, Serialize};
/// use storefront_session::utils::serde::duration_millis;
///
/// #[derive(Serialize, Deserialize)]
/// struct Example {
///     #[serde(with = "duration_millis")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::{Deserialize, Deserializer, Duration, Serializer};

    /// Serde serialization result type
    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    /// Serialize a Duration as milliseconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserialize milliseconds (u64) into a Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Timings {
        #[serde(with = "duration_millis")]
        lead: Duration,
    }

    #[test]
    fn test_duration_millis_round_trip() {
        let json = serde_json::to_string(&Timings { lead: Duration::from_millis(10_000) }).unwrap();
        assert_eq!(json, r#"{"lead":10000}"#);

        let back: Timings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.lead, Duration::from_secs(10));
    }
}
