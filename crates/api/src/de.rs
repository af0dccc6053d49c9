//! Lenient numeric deserializers.
//!
//! Lending APIs return numbers as JSON numbers or as decimal strings,
//! sometimes both within one payload.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(f64),
}

pub(crate) fn f64_from_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        StringOrNumber::Number(n) => Ok(n),
    }
}

pub(crate) fn optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<StringOrNumber>::deserialize(deserializer)? {
        Some(StringOrNumber::String(s)) if s.trim().is_empty() => Ok(None),
        Some(StringOrNumber::String(s)) => {
            s.trim().parse().map(Some).map_err(serde::de::Error::custom)
        }
        Some(StringOrNumber::Number(n)) => Ok(Some(n)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Row {
        #[serde(deserialize_with = "f64_from_string")]
        value: f64,
        #[serde(default, deserialize_with = "optional_f64")]
        extra: Option<f64>,
    }

    #[test]
    fn test_string_or_number() {
        let row: Row = serde_json::from_str(r#"{"value": "0.0523"}"#).unwrap();
        assert!((row.value - 0.0523).abs() < 1e-12);
        assert_eq!(row.extra, None);

        let row: Row = serde_json::from_str(r#"{"value": 12.5, "extra": "3"}"#).unwrap();
        assert_eq!(row.value, 12.5);
        assert_eq!(row.extra, Some(3.0));

        let row: Row = serde_json::from_str(r#"{"value": 1, "extra": null}"#).unwrap();
        assert_eq!(row.extra, None);

        let row: Row = serde_json::from_str(r#"{"value": 1, "extra": ""}"#).unwrap();
        assert_eq!(row.extra, None);

        assert!(serde_json::from_str::<Row>(r#"{"value": "abc"}"#).is_err());
    }
}
