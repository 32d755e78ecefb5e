//! Closed token tables for the enumerations of the dump format
//!
//! Each enumeration maps to exactly one wire token and back. Tokens outside a
//! table are rejected with [`CodecError::UnknownEnumValue`]; nothing falls
//! back to a default variant.

use super::CodecError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Declare an enumeration together with its bidirectional token table.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident as $label:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $token:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Wire token for this value
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $token,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = CodecError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($token => Ok($name::$variant),)+
                    other => Err(CodecError::UnknownEnumValue {
                        kind: $label,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let token = String::deserialize(deserializer)?;
                token.parse().map_err(de::Error::custom)
            }
        }
    };
}

wire_enum! {
    /// Kind of a top-level dump entity
    pub enum EntityType as "entity type" {
        Item => "item",
        Property => "property",
    }
}

wire_enum! {
    /// Kind of entity a `wikibase-entityid` value points at
    pub enum WikibaseEntityType as "wikibase entity type" {
        Item => "item",
        Property => "property",
        Lexeme => "lexeme",
        Form => "form",
        Sense => "sense",
    }
}

wire_enum! {
    /// Statement marker; the format currently knows a single kind
    pub enum StatementType as "statement type" {
        Statement => "statement",
    }
}

wire_enum! {
    /// Statement rank. Ranks are labels, not an ordering.
    pub enum StatementRank as "statement rank" {
        Preferred => "preferred",
        Normal => "normal",
        Deprecated => "deprecated",
    }
}

wire_enum! {
    /// Whether a snak carries a concrete value, an unknown value, or no value
    pub enum SnakType as "snak type" {
        Value => "value",
        SomeValue => "somevalue",
        NoValue => "novalue",
    }
}

wire_enum! {
    /// Declared value type of a property or snak
    pub enum DataType as "data type" {
        WikibaseItem => "wikibase-item",
        ExternalId => "external-id",
        String => "string",
        Quantity => "quantity",
        Time => "time",
        GlobeCoordinate => "globe-coordinate",
        CommonsMedia => "commonsMedia",
        MonolingualText => "monolingualtext",
        Url => "url",
        GeoShape => "geo-shape",
        WikibaseLexeme => "wikibase-lexeme",
        WikibaseSense => "wikibase-sense",
        WikibaseProperty => "wikibase-property",
        Math => "math",
        MusicalNotation => "musical-notation",
        WikibaseForm => "wikibase-form",
        TabularData => "tabular-data",
    }
}

/// Granularity of a time value, from billion years down to seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TimePrecision {
    BillionYears = 0,
    HundredMillionYears = 1,
    TenMillionYears = 2,
    MillionYears = 3,
    HundredMillennia = 4,
    TenMillennia = 5,
    Millennium = 6,
    Century = 7,
    Decade = 8,
    Year = 9,
    Month = 10,
    Day = 11,
    Hour = 12,
    Minute = 13,
    Second = 14,
}

impl TimePrecision {
    pub const ALL: &'static [TimePrecision] = &[
        TimePrecision::BillionYears,
        TimePrecision::HundredMillionYears,
        TimePrecision::TenMillionYears,
        TimePrecision::MillionYears,
        TimePrecision::HundredMillennia,
        TimePrecision::TenMillennia,
        TimePrecision::Millennium,
        TimePrecision::Century,
        TimePrecision::Decade,
        TimePrecision::Year,
        TimePrecision::Month,
        TimePrecision::Day,
        TimePrecision::Hour,
        TimePrecision::Minute,
        TimePrecision::Second,
    ];

    /// Numeric wire level (0-14)
    pub fn level(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u64> for TimePrecision {
    type Error = CodecError;

    fn try_from(level: u64) -> Result<Self, Self::Error> {
        usize::try_from(level)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .ok_or_else(|| CodecError::UnknownEnumValue {
                kind: "time precision",
                value: level.to_string(),
            })
    }
}

impl Serialize for TimePrecision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.level())
    }
}

impl<'de> Deserialize<'de> for TimePrecision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let level = u64::deserialize(deserializer)?;
        TimePrecision::try_from(level).map_err(de::Error::custom)
    }
}

const GREGORIAN_URI: &str = "https://www.wikidata.org/wiki/Q1985727";
const GREGORIAN_ENTITY_URI: &str = "http://www.wikidata.org/entity/Q1985727";
const JULIAN_URI: &str = "https://www.wikidata.org/wiki/Q1985786";
const JULIAN_ENTITY_URI: &str = "http://www.wikidata.org/entity/Q1985786";

/// Calendar model of a time value, identified on the wire by a Wikidata URI
///
/// Both the `https://…/wiki/` and the `http://…/entity/` spellings decode to
/// the same variant. Encoding always produces the `https://…/wiki/` form, so a
/// re-encoded dump may differ textually from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarModel {
    Gregorian,
    Julian,
}

impl CalendarModel {
    /// Canonical URI emitted on encode
    pub fn as_uri(self) -> &'static str {
        match self {
            CalendarModel::Gregorian => GREGORIAN_URI,
            CalendarModel::Julian => JULIAN_URI,
        }
    }

    /// Normalize any accepted calendar URI
    pub fn from_uri(uri: &str) -> Result<Self, CodecError> {
        match uri {
            GREGORIAN_URI | GREGORIAN_ENTITY_URI => Ok(CalendarModel::Gregorian),
            JULIAN_URI | JULIAN_ENTITY_URI => Ok(CalendarModel::Julian),
            other => Err(CodecError::InvalidTime(format!("unknown calendar model: {}", other))),
        }
    }
}

impl Serialize for CalendarModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_uri())
    }
}

impl<'de> Deserialize<'de> for CalendarModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let uri = String::deserialize(deserializer)?;
        CalendarModel::from_uri(&uri).map_err(de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_every_data_type_token_maps_back() {
        for data_type in DataType::ALL {
            assert_eq!(data_type.as_str().parse::<DataType>().unwrap(), *data_type);
        }
        assert_eq!(DataType::ALL.len(), 17);
    }

    #[test]
    fn test_unknown_rank_is_named() {
        let err = "important".parse::<StatementRank>().unwrap_err();
        assert_eq!(err.to_string(), "unknown statement rank value: important");
    }

    #[test]
    fn test_tokens_are_case_sensitive() {
        assert!("Item".parse::<EntityType>().is_err());
        assert!("commonsmedia".parse::<DataType>().is_err());
    }

    #[test]
    fn test_snak_type_serde() {
        let json = serde_json::to_string(&SnakType::SomeValue).unwrap();
        assert_eq!(json, r#""somevalue""#);
        let parsed: SnakType = serde_json::from_str(r#""novalue""#).unwrap();
        assert_eq!(parsed, SnakType::NoValue);
        let err = serde_json::from_str::<SnakType>(r#""maybe""#).unwrap_err();
        assert!(err.to_string().contains("unknown snak type value: maybe"));
    }

    #[test]
    fn test_precision_levels() {
        assert_eq!(TimePrecision::try_from(9).unwrap(), TimePrecision::Year);
        assert_eq!(TimePrecision::Second.level(), 14);
        assert!(TimePrecision::Day < TimePrecision::Hour);
        let err = TimePrecision::try_from(15).unwrap_err();
        assert!(err.to_string().contains("time precision"));
    }

    #[test]
    fn test_calendar_accepts_both_spellings() {
        assert_eq!(
            CalendarModel::from_uri("http://www.wikidata.org/entity/Q1985727").unwrap(),
            CalendarModel::Gregorian
        );
        assert_eq!(
            CalendarModel::from_uri("https://www.wikidata.org/wiki/Q1985786").unwrap(),
            CalendarModel::Julian
        );
        assert_eq!(CalendarModel::Gregorian.as_uri(), "https://www.wikidata.org/wiki/Q1985727");
    }

    #[test]
    fn test_unknown_calendar_is_invalid_time() {
        let err = CalendarModel::from_uri("http://www.wikidata.org/entity/Q12138").unwrap_err();
        assert!(matches!(err, CodecError::InvalidTime(_)));
    }
}
