// Wikidata Entity Codec
//
// Decodes and encodes entities from the Wikidata JSON dumps into a strongly
// typed model that survives a round trip:
//
// - amount:  signed arbitrary-precision quantity amounts
// - time:    extended-range timestamps with historical year numbering
// - value:   the tagged data value union
// - tokens:  closed token tables for every enumeration in the format
// - model:   entity -> statement -> snak -> reference graph
//
// All functions here are pure; decoding different records concurrently needs
// no synchronization.

pub mod amount;
pub mod model;
pub mod time;
pub mod tokens;
pub mod value;

pub use amount::Amount;
pub use model::{Entity, LanguageValue, Reference, SiteLink, Snak, SnakMap, Statement};
pub use time::{TimeValue, Timestamp};
pub use tokens::{
    CalendarModel, DataType, EntityType, SnakType, StatementRank, StatementType, TimePrecision,
    WikibaseEntityType,
};
pub use value::{EntityIdValue, GlobeCoordinateValue, MonolingualTextValue, QuantityValue, Value};

use serde::Deserialize;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Error types for decoding and encoding dump records
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot parse amount into number: {0}")]
    InvalidNumber(String),

    #[error("invalid time: {0}")]
    InvalidTime(String),

    #[error("unknown {kind} value: {value}")]
    UnknownEnumValue { kind: &'static str, value: String },

    #[error("unknown data value type \"{value_type}\": {raw}")]
    UnknownValueType { value_type: String, raw: String },

    #[error("invalid {value_type} data value: {message}")]
    InvalidValue { value_type: String, message: String },

    #[error("inconsistent record: {0}")]
    Inconsistent(String),

    #[error("entity {id}: {source}")]
    Record {
        id: String,
        #[source]
        source: Box<CodecError>,
    },
}

impl CodecError {
    /// Whether the payload was not well-formed JSON at all
    pub fn is_syntax(&self) -> bool {
        match self {
            CodecError::Json(e) => e.is_syntax() || e.is_eof(),
            CodecError::Record { source, .. } => source.is_syntax(),
            _ => false,
        }
    }

    /// Id of the entity the failure belongs to, when it could be recovered
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            CodecError::Record { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Decode one dump entity
///
/// Failures are attributed to the entity id whenever the payload still
/// yields one.
pub fn decode_entity(bytes: &[u8]) -> Result<Entity> {
    serde_json::from_slice(bytes).map_err(|e| {
        let source = CodecError::from(e);
        match recover_entity_id(bytes) {
            Some(id) => CodecError::Record {
                id,
                source: Box::new(source),
            },
            None => source,
        }
    })
}

/// Encode one entity into its canonical wire form
pub fn encode_entity(entity: &Entity) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(entity)?)
}

fn recover_entity_id(bytes: &[u8]) -> Option<String> {
    #[derive(Deserialize)]
    struct IdOnly {
        id: String,
    }

    serde_json::from_slice::<IdOnly>(bytes).ok().map(|entity| entity.id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_is_attributed_to_entity() {
        let err = decode_entity(br#"{"id": "Q7", "type": "lexicon", "lastrevid": 1}"#).unwrap_err();
        assert_eq!(err.entity_id(), Some("Q7"));
        assert!(!err.is_syntax());
        assert!(err.to_string().contains("unknown entity type value: lexicon"));
    }

    #[test]
    fn test_malformed_json_is_syntax_error() {
        let err = decode_entity(br#"{"id": "Q7", "type": "#).unwrap_err();
        assert!(err.is_syntax());
        assert_eq!(err.entity_id(), None);
    }
}
