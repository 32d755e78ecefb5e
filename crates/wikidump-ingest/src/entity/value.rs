//! Polymorphic data values
//!
//! On the wire a data value is either `{"type": <token>, "value": {...}}` or
//! `{"error": <message>}`. Decoding is strict: each payload accepts only its
//! own fields, apart from a few deprecated ones that producers still emit and
//! that are dropped silently (`altitude`, `numeric-id`, `timezone`, `before`,
//! `after`).
//!
//! A timestamp that fails to parse does not fail the record. The value
//! degrades to [`Value::Error`] carrying the parse failure instead.

use super::amount::Amount;
use super::time::{TimeValue, Timestamp};
use super::tokens::{CalendarModel, TimePrecision, WikibaseEntityType};
use super::{CodecError, Result};
use serde::de::{self, DeserializeOwned, IgnoredAny};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Reference to another entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntityIdValue {
    #[serde(rename = "entity-type")]
    pub entity_type: WikibaseEntityType,
    pub id: String,
}

/// Point on a globe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobeCoordinateValue {
    pub latitude: f64,
    pub longitude: f64,
    /// Some coordinates in the dumps carry `null` precision
    pub precision: Option<f64>,
    pub globe: String,
}

/// Text in a single language
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonolingualTextValue {
    pub language: String,
    pub text: String,
}

/// Amount with optional bounds and a unit entity URI ("1" when unitless)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QuantityValue {
    pub amount: Amount,
    #[serde(rename = "upperBound", skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<Amount>,
    #[serde(rename = "lowerBound", skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<Amount>,
    pub unit: String,
}

/// A decoded data value; exactly one variant is populated
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Upstream error marker, or a timestamp that could not be parsed
    Error(String),
    String(String),
    EntityId(EntityIdValue),
    GlobeCoordinate(GlobeCoordinateValue),
    MonolingualText(MonolingualTextValue),
    Quantity(QuantityValue),
    Time(TimeValue),
}

// Envelope for every non-error data value. `type` was already dispatched on.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope<T> {
    #[serde(rename = "type")]
    _value_type: IgnoredAny,
    value: T,
    // Empty or null here; a non-empty marker never reaches the envelope
    #[serde(rename = "error", default)]
    _error: Option<IgnoredAny>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireEntityId {
    #[serde(rename = "entity-type")]
    entity_type: String,
    id: String,
    #[serde(rename = "numeric-id", default)]
    _numeric_id: Option<IgnoredAny>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireGlobeCoordinate {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    precision: Option<f64>,
    globe: String,
    #[serde(rename = "altitude", default)]
    _altitude: Option<IgnoredAny>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireQuantity {
    amount: String,
    #[serde(rename = "upperBound", default)]
    upper_bound: Option<String>,
    #[serde(rename = "lowerBound", default)]
    lower_bound: Option<String>,
    unit: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireTime {
    time: String,
    precision: u64,
    calendarmodel: String,
    #[serde(rename = "timezone", default)]
    _timezone: Option<IgnoredAny>,
    #[serde(rename = "before", default)]
    _before: Option<IgnoredAny>,
    #[serde(rename = "after", default)]
    _after: Option<IgnoredAny>,
}

fn payload<T: DeserializeOwned>(raw: serde_json::Value, value_type: &str) -> Result<T> {
    serde_json::from_value::<Envelope<T>>(raw)
        .map(|envelope| envelope.value)
        .map_err(|e| CodecError::InvalidValue {
            value_type: value_type.to_string(),
            message: e.to_string(),
        })
}

impl Value {
    /// Decode a wire data value
    pub fn from_json(raw: serde_json::Value) -> Result<Self> {
        let object = raw.as_object().ok_or_else(|| CodecError::InvalidValue {
            value_type: String::new(),
            message: format!("data value is not an object: {}", raw),
        })?;

        if let Some(error) = object.get("error").filter(|error| !error.is_null()) {
            let message = error.as_str().ok_or_else(|| CodecError::InvalidValue {
                value_type: "error".to_string(),
                message: format!("error field is not a string: {}", error),
            })?;
            if !message.is_empty() {
                return Ok(Value::Error(message.to_string()));
            }
        }

        let value_type = match object.get("type") {
            Some(serde_json::Value::String(token)) => token.clone(),
            Some(other) => {
                return Err(CodecError::InvalidValue {
                    value_type: other.to_string(),
                    message: "type field is not a string".to_string(),
                })
            },
            None => String::new(),
        };

        match value_type.as_str() {
            "string" => Ok(Value::String(payload(raw, &value_type)?)),
            "wikibase-entityid" => {
                let wire: WireEntityId = payload(raw, &value_type)?;
                Ok(Value::EntityId(EntityIdValue {
                    entity_type: wire.entity_type.parse()?,
                    id: wire.id,
                }))
            },
            "globecoordinate" => {
                let wire: WireGlobeCoordinate = payload(raw, &value_type)?;
                Ok(Value::GlobeCoordinate(GlobeCoordinateValue {
                    latitude: wire.latitude,
                    longitude: wire.longitude,
                    precision: wire.precision,
                    globe: wire.globe,
                }))
            },
            "monolingualtext" => Ok(Value::MonolingualText(payload(raw, &value_type)?)),
            "quantity" => {
                let wire: WireQuantity = payload(raw, &value_type)?;
                Ok(Value::Quantity(QuantityValue {
                    amount: wire.amount.parse()?,
                    upper_bound: wire.upper_bound.as_deref().map(Amount::parse).transpose()?,
                    lower_bound: wire.lower_bound.as_deref().map(Amount::parse).transpose()?,
                    unit: wire.unit,
                }))
            },
            "time" => {
                let wire: WireTime = payload(raw, &value_type)?;
                let precision = TimePrecision::try_from(wire.precision)?;
                let calendar = CalendarModel::from_uri(&wire.calendarmodel)?;
                match Timestamp::parse(&wire.time) {
                    Ok(timestamp) => Ok(Value::Time(TimeValue::new(timestamp, precision, calendar))),
                    Err(e) => Ok(Value::Error(e.to_string())),
                }
            },
            _ => Err(CodecError::UnknownValueType {
                value_type,
                raw: raw.to_string(),
            }),
        }
    }

    /// Encode into the wire form
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Wire discriminator, `None` for error values
    pub fn type_token(&self) -> Option<&'static str> {
        match self {
            Value::Error(_) => None,
            Value::String(_) => Some("string"),
            Value::EntityId(_) => Some("wikibase-entityid"),
            Value::GlobeCoordinate(_) => Some("globecoordinate"),
            Value::MonolingualText(_) => Some("monolingualtext"),
            Value::Quantity(_) => Some("quantity"),
            Value::Time(_) => Some("time"),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }
}

#[derive(Serialize)]
#[serde(tag = "type", content = "value")]
enum Tagged<'a> {
    #[serde(rename = "string")]
    String(&'a str),
    #[serde(rename = "wikibase-entityid")]
    EntityId(&'a EntityIdValue),
    #[serde(rename = "globecoordinate")]
    GlobeCoordinate(&'a GlobeCoordinateValue),
    #[serde(rename = "monolingualtext")]
    MonolingualText(&'a MonolingualTextValue),
    #[serde(rename = "quantity")]
    Quantity(&'a QuantityValue),
    #[serde(rename = "time")]
    Time(&'a TimeValue),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Error(message) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", message)?;
                map.end()
            },
            Value::String(text) => Tagged::String(text).serialize(serializer),
            Value::EntityId(value) => Tagged::EntityId(value).serialize(serializer),
            Value::GlobeCoordinate(value) => Tagged::GlobeCoordinate(value).serialize(serializer),
            Value::MonolingualText(value) => Tagged::MonolingualText(value).serialize(serializer),
            Value::Quantity(value) => Tagged::Quantity(value).serialize(serializer),
            Value::Time(value) => Tagged::Time(value).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(raw: serde_json::Value) -> Result<Value> {
        Value::from_json(raw)
    }

    #[test]
    fn test_string_value() {
        let value = decode(json!({"type": "string", "value": "hello"})).unwrap();
        assert_eq!(value, Value::String("hello".to_string()));
        assert_eq!(value.to_json().unwrap(), json!({"type": "string", "value": "hello"}));
    }

    #[test]
    fn test_entity_id_drops_numeric_id() {
        let value = decode(json!({
            "type": "wikibase-entityid",
            "value": {"entity-type": "item", "numeric-id": 5, "id": "Q5"}
        }))
        .unwrap();
        assert_eq!(
            value,
            Value::EntityId(EntityIdValue {
                entity_type: WikibaseEntityType::Item,
                id: "Q5".to_string()
            })
        );
        assert_eq!(
            value.to_json().unwrap(),
            json!({"type": "wikibase-entityid", "value": {"entity-type": "item", "id": "Q5"}})
        );
    }

    #[test]
    fn test_globe_coordinate_drops_altitude() {
        let value = decode(json!({
            "type": "globecoordinate",
            "value": {
                "latitude": 52.516666666667,
                "longitude": 13.383333333333,
                "altitude": null,
                "precision": 0.016666666666667,
                "globe": "http://www.wikidata.org/entity/Q2"
            }
        }))
        .unwrap();
        let Value::GlobeCoordinate(coordinate) = value else {
            panic!("expected a coordinate");
        };
        assert_eq!(coordinate.latitude, 52.516666666667);
        assert_eq!(coordinate.precision, Some(0.016666666666667));
    }

    #[test]
    fn test_monolingual_text_rejects_extra_field() {
        let err = decode(json!({
            "type": "monolingualtext",
            "value": {"language": "en", "text": "x", "script": "Latn"}
        }))
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidValue { .. }));
        assert!(err.to_string().contains("script"));
    }

    #[test]
    fn test_unknown_top_level_field_is_rejected() {
        let err = decode(json!({"type": "string", "value": "x", "extra": 1})).unwrap_err();
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn test_quantity_value() {
        let value = decode(json!({
            "type": "quantity",
            "value": {
                "amount": "+10.50",
                "upperBound": "+11",
                "unit": "http://www.wikidata.org/entity/Q11573"
            }
        }))
        .unwrap();
        assert_eq!(
            value.to_json().unwrap(),
            json!({
                "type": "quantity",
                "value": {
                    "amount": "+10.5",
                    "upperBound": "+11",
                    "unit": "http://www.wikidata.org/entity/Q11573"
                }
            })
        );
    }

    #[test]
    fn test_quantity_with_bad_amount_fails() {
        let err = decode(json!({
            "type": "quantity",
            "value": {"amount": "ten", "unit": "1"}
        }))
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidNumber(ref s) if s == "ten"));
    }

    #[test]
    fn test_time_value_drops_legacy_fields() {
        let value = decode(json!({
            "type": "time",
            "value": {
                "time": "+1950-00-00T00:00:00Z",
                "timezone": 0,
                "before": 0,
                "after": 0,
                "precision": 9,
                "calendarmodel": "http://www.wikidata.org/entity/Q1985727"
            }
        }))
        .unwrap();
        let Value::Time(ref time) = value else {
            panic!("expected a time value");
        };
        assert_eq!((time.timestamp.month, time.timestamp.day), (1, 1));
        assert_eq!(time.precision, TimePrecision::Year);
        assert_eq!(time.calendar, CalendarModel::Gregorian);
        assert_eq!(
            value.to_json().unwrap(),
            json!({
                "type": "time",
                "value": {
                    "time": "+1950-00-00T00:00:00Z",
                    "precision": 9,
                    "calendarmodel": "https://www.wikidata.org/wiki/Q1985727"
                }
            })
        );
    }

    #[test]
    fn test_bad_timestamp_degrades_to_error_value() {
        let value = decode(json!({
            "type": "time",
            "value": {
                "time": "+0000-00-00T00:00:00Z",
                "precision": 9,
                "calendarmodel": "https://www.wikidata.org/wiki/Q1985727"
            }
        }))
        .unwrap();
        assert!(value.is_error());
        assert!(matches!(value, Value::Error(ref message) if message.contains("year cannot be 0")));
    }

    #[test]
    fn test_unknown_calendar_fails() {
        let err = decode(json!({
            "type": "time",
            "value": {
                "time": "+2000-01-01T00:00:00Z",
                "precision": 11,
                "calendarmodel": "http://www.wikidata.org/entity/Q42"
            }
        }))
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidTime(_)));
    }

    #[test]
    fn test_error_takes_priority_over_type() {
        let value = decode(json!({"type": "foobar", "error": "Malformed value."})).unwrap();
        assert_eq!(value, Value::Error("Malformed value.".to_string()));
        assert_eq!(value.to_json().unwrap(), json!({"error": "Malformed value."}));
        assert_eq!(value.type_token(), None);
    }

    #[test]
    fn test_null_or_empty_error_falls_through_to_type() {
        let value = decode(json!({"type": "string", "value": "hello", "error": null})).unwrap();
        assert_eq!(value, Value::String("hello".to_string()));

        let value = decode(json!({"type": "string", "value": "hello", "error": ""})).unwrap();
        assert_eq!(value, Value::String("hello".to_string()));
        assert_eq!(value.to_json().unwrap(), json!({"type": "string", "value": "hello"}));
    }

    #[test]
    fn test_non_string_error_is_rejected() {
        let err = decode(json!({"type": "string", "value": "x", "error": 3})).unwrap_err();
        assert!(matches!(err, CodecError::InvalidValue { .. }));
    }

    #[test]
    fn test_unknown_discriminator_is_named() {
        let err = decode(json!({"type": "foobar", "value": 1})).unwrap_err();
        assert!(matches!(err, CodecError::UnknownValueType { .. }));
        assert!(err.to_string().contains("foobar"));
    }
}
