use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// Serializes Duration as whole milliseconds
pub fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    (duration.as_millis() as u64).serialize(serializer)
}

/// Deserializes Duration from whole milliseconds
pub fn deserialize_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;

    #[derive(Serialize, Deserialize)]
    struct Test {
        #[serde(serialize_with = "serialize_millis")]
        #[serde(deserialize_with = "deserialize_millis")]
        timeout: Duration,
    }

    #[test]
    fn test_millis_serialization() {
        let value = Test {
            timeout: Duration::from_millis(255),
        };

        let serialized = serde_json::to_string(&value).unwrap();
        assert_eq!(serialized, r#"{"timeout":255}"#);

        let deserialized: Test = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.timeout, value.timeout);
    }

    #[test]
    fn test_sub_millisecond_truncates() {
        let value = Test {
            timeout: Duration::from_micros(10_900),
        };
        let serialized = serde_json::to_string(&value).unwrap();
        assert_eq!(serialized, r#"{"timeout":10}"#);
    }
}
