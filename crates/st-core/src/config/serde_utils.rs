//! Shared serialization/deserialization utilities for configuration
//!
//! Durations in profile files are written either as a bare integer number of
//! seconds (`connect_timeout = 15`) or as a string with a unit suffix
//! (`"500ms"`, `"15s"`, `"2m"`).

use std::time::Duration;

/// Parse a duration string such as `"15s"`, `"500ms"`, `"2m"` or `"15"`
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {:?}", input))?;

    let duration = match unit.trim() {
        "" | "s" | "sec" | "secs" => Duration::from_secs(value),
        "ms" => Duration::from_millis(value),
        "m" | "min" | "mins" => Duration::from_secs(value.saturating_mul(60)),
        other => return Err(format!("unknown duration unit {:?} in {:?}", other, input)),
    };
    Ok(duration)
}

/// Render a duration the way it is accepted back by [`parse_duration`]
pub fn format_duration(duration: &Duration) -> String {
    if duration.subsec_millis() != 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}s", duration.as_secs())
    }
}

/// Helper module for Duration fields written as seconds or unit strings
///
/// # Example
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Defaults {
///     #[serde(with = "st_core::config::serde_utils::duration_secs")]
///     connect_timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Secs(u64),
        Text(String),
    }

    impl RawDuration {
        fn into_duration<E: serde::de::Error>(self) -> Result<Duration, E> {
            match self {
                RawDuration::Secs(secs) => Ok(Duration::from_secs(secs)),
                RawDuration::Text(text) => super::parse_duration(&text).map_err(E::custom),
            }
        }
    }

    /// Whole seconds are written as integers, anything finer as `"<n>ms"`
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_str(&super::format_duration(duration))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawDuration::deserialize(deserializer)?.into_duration()
    }

    /// Same encoding for `Option<Duration>` fields
    pub mod option {
        use super::RawDuration;
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<RawDuration>::deserialize(deserializer)?
                .map(RawDuration::into_duration)
                .transpose()
        }
    }
}
