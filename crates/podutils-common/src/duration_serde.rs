//! Serde adapters for durations written as `"90s"`, `"1m30s"`, `"250ms"` or
//! a bare number of seconds.

use podutils_sdk::StringUtil;
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;
use std::time::Duration;

pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&StringUtil::format_duration(*value))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    deserializer.deserialize_any(DurationVisitor)
}

struct DurationVisitor;

impl<'de> Visitor<'de> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a duration such as \"90s\" or a number of seconds")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
        StringUtil::parse_duration(v).map_err(|e| E::custom(format!("{e:#}")))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
        Ok(Duration::from_secs(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
        u64::try_from(v)
            .map(Duration::from_secs)
            .map_err(|_| E::custom(format!("negative duration {v}")))
    }
}

/// Same encoding for `Option<Duration>`; `null` or a missing field is `None`.
pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&StringUtil::format_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        deserializer.deserialize_option(OptionVisitor)
    }

    struct OptionVisitor;

    impl<'de> Visitor<'de> for OptionVisitor {
        type Value = Option<Duration>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an optional duration")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            super::deserialize(d).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(with = "super")]
        required: Duration,
        #[serde(default, with = "super::option")]
        optional: Option<Duration>,
    }

    #[test]
    fn accepts_strings_and_numbers() {
        let h: Holder = serde_json::from_str(r#"{"required": "1m30s", "optional": 5}"#).unwrap();
        assert_eq!(h.required, Duration::from_secs(90));
        assert_eq!(h.optional, Some(Duration::from_secs(5)));
    }

    #[test]
    fn missing_and_null_optional_are_none() {
        let h: Holder = serde_json::from_str(r#"{"required": 1}"#).unwrap();
        assert_eq!(h.optional, None);
        let h: Holder = serde_json::from_str(r#"{"required": 1, "optional": null}"#).unwrap();
        assert_eq!(h.optional, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(serde_json::from_str::<Holder>(r#"{"required": "soon"}"#).is_err());
        assert!(serde_json::from_str::<Holder>(r#"{"required": -3}"#).is_err());
    }

    #[test]
    fn serializes_as_text() {
        let h = Holder {
            required: Duration::from_millis(250),
            optional: Some(Duration::from_secs(3600)),
        };
        let json = serde_json::to_value(&h).unwrap();
        assert_eq!(json["required"], "250ms");
        assert_eq!(json["optional"], "1h");
    }
}
