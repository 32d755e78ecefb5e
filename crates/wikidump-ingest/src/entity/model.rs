//! Entity record graph: entity → statements → snaks → references

use super::tokens::{DataType, EntityType, SnakType, StatementRank, StatementType};
use super::value::Value;
use super::CodecError;
use indexmap::IndexMap;
use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Snaks keyed by property id, in authoritative order
pub type SnakMap = IndexMap<String, Vec<Snak>>;

/// A string in one language
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguageValue {
    pub language: String,
    pub value: String,
}

/// Link to a page on a sister site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteLink {
    pub site: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub badges: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A single property-value assertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireSnak")]
pub struct Snak {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(rename = "snaktype")]
    pub snak_type: SnakType,
    pub property: String,
    #[serde(rename = "datatype")]
    pub data_type: DataType,
    #[serde(rename = "datavalue", skip_serializing_if = "Option::is_none")]
    pub data_value: Option<Value>,
}

#[derive(Deserialize)]
struct WireSnak {
    #[serde(default)]
    hash: Option<String>,
    snaktype: SnakType,
    property: String,
    datatype: DataType,
    #[serde(default)]
    datavalue: Option<Value>,
}

impl TryFrom<WireSnak> for Snak {
    type Error = CodecError;

    fn try_from(wire: WireSnak) -> Result<Self, Self::Error> {
        if wire.snaktype != SnakType::Value && wire.datavalue.is_some() {
            return Err(CodecError::Inconsistent(format!(
                "{} snak for {} carries a datavalue",
                wire.snaktype, wire.property
            )));
        }
        Ok(Snak {
            hash: wire.hash,
            snak_type: wire.snaktype,
            property: wire.property,
            data_type: wire.datatype,
            data_value: wire.datavalue,
        })
    }
}

/// Source backing a statement
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub hash: Option<String>,
    /// Snaks in `snaks-order` order
    pub snaks: SnakMap,
}

impl Reference {
    /// Property ids in encode order
    pub fn snaks_order(&self) -> impl Iterator<Item = &str> {
        self.snaks.keys().map(String::as_str)
    }
}

#[derive(Deserialize)]
struct WireReference {
    #[serde(default)]
    hash: Option<String>,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    snaks: SnakMap,
    #[serde(rename = "snaks-order", default)]
    snaks_order: Option<Vec<String>>,
}

#[derive(Serialize)]
struct WireReferenceRef<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<&'a str>,
    #[serde(skip_serializing_if = "is_empty_map")]
    snaks: &'a SnakMap,
    #[serde(rename = "snaks-order", skip_serializing_if = "Vec::is_empty")]
    snaks_order: Vec<&'a str>,
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireReferenceRef {
            hash: self.hash.as_deref(),
            snaks: &self.snaks,
            snaks_order: self.snaks_order().collect(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Reference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireReference::deserialize(deserializer)?;
        Ok(Reference {
            hash: wire.hash,
            snaks: apply_order(wire.snaks, wire.snaks_order, "snaks-order")
                .map_err(de::Error::custom)?,
        })
    }
}

/// An assertion about an entity
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub id: String,
    pub statement_type: StatementType,
    pub main_snak: Snak,
    pub rank: StatementRank,
    /// Qualifiers in `qualifiers-order` order
    pub qualifiers: SnakMap,
    pub references: Vec<Reference>,
}

impl Statement {
    /// Property ids in encode order
    pub fn qualifiers_order(&self) -> impl Iterator<Item = &str> {
        self.qualifiers.keys().map(String::as_str)
    }

    /// Main snak, then qualifiers, then reference snaks
    pub fn snaks(&self) -> impl Iterator<Item = &Snak> {
        std::iter::once(&self.main_snak)
            .chain(self.qualifiers.values().flatten())
            .chain(self.references.iter().flat_map(|r| r.snaks.values().flatten()))
    }
}

#[derive(Deserialize)]
struct WireStatement {
    id: String,
    #[serde(rename = "type")]
    statement_type: StatementType,
    mainsnak: Snak,
    rank: StatementRank,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    qualifiers: SnakMap,
    #[serde(rename = "qualifiers-order", default)]
    qualifiers_order: Option<Vec<String>>,
    #[serde(default)]
    references: Vec<Reference>,
}

#[derive(Serialize)]
struct WireStatementRef<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    statement_type: StatementType,
    mainsnak: &'a Snak,
    rank: StatementRank,
    #[serde(skip_serializing_if = "is_empty_map")]
    qualifiers: &'a SnakMap,
    #[serde(rename = "qualifiers-order", skip_serializing_if = "Vec::is_empty")]
    qualifiers_order: Vec<&'a str>,
    #[serde(skip_serializing_if = "<[Reference]>::is_empty")]
    references: &'a [Reference],
}

impl Serialize for Statement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireStatementRef {
            id: &self.id,
            statement_type: self.statement_type,
            mainsnak: &self.main_snak,
            rank: self.rank,
            qualifiers: &self.qualifiers,
            qualifiers_order: self.qualifiers_order().collect(),
            references: &self.references,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Statement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireStatement::deserialize(deserializer)?;
        let qualifiers = apply_order(wire.qualifiers, wire.qualifiers_order, "qualifiers-order")
            .map_err(|e| de::Error::custom(format!("statement {}: {}", wire.id, e)))?;
        Ok(Statement {
            id: wire.id,
            statement_type: wire.statement_type,
            main_snak: wire.mainsnak,
            rank: wire.rank,
            qualifiers,
            references: wire.references,
        })
    }
}

/// A dump entity (item or property)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Declared value type; present on properties
    #[serde(rename = "datatype", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    #[serde(
        default,
        deserialize_with = "map_or_empty_list",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub labels: IndexMap<String, LanguageValue>,
    #[serde(
        default,
        deserialize_with = "map_or_empty_list",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub descriptions: IndexMap<String, LanguageValue>,
    #[serde(
        default,
        deserialize_with = "map_or_empty_list",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub aliases: IndexMap<String, Vec<LanguageValue>>,
    #[serde(
        default,
        deserialize_with = "map_or_empty_list",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub claims: IndexMap<String, Vec<Statement>>,
    #[serde(
        rename = "sitelinks",
        default,
        deserialize_with = "map_or_empty_list",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub site_links: IndexMap<String, SiteLink>,
    #[serde(rename = "lastrevid")]
    pub last_revision_id: i64,
}

impl Entity {
    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.claims.values().flatten()
    }

    /// Every snak of every statement
    pub fn snaks(&self) -> impl Iterator<Item = &Snak> {
        self.statements().flat_map(Statement::snaks)
    }

    /// Every decoded data value, including error values
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.snaks().filter_map(|snak| snak.data_value.as_ref())
    }
}

/// Reorder `map` by an explicit order list, which must name every key exactly once
fn apply_order(
    mut map: SnakMap,
    order: Option<Vec<String>>,
    field: &str,
) -> Result<SnakMap, CodecError> {
    let Some(order) = order else {
        return Ok(map);
    };

    if order.len() != map.len() {
        return Err(CodecError::Inconsistent(format!(
            "{} lists {} properties but there are {}",
            field,
            order.len(),
            map.len()
        )));
    }

    let mut ordered = IndexMap::with_capacity(map.len());
    for property in order {
        let Some(snaks) = map.swap_remove(&property) else {
            return Err(CodecError::Inconsistent(format!(
                "{} names {} which is missing or repeated",
                field, property
            )));
        };
        ordered.insert(property, snaks);
    }
    Ok(ordered)
}

fn is_empty_map<K, V>(map: &&IndexMap<K, V>) -> bool {
    map.is_empty()
}

/// Empty maps sometimes appear as `[]` in the dumps
fn map_or_empty_list<'de, D, V>(deserializer: D) -> Result<IndexMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct MapOrEmptyList<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for MapOrEmptyList<V> {
        type Value = IndexMap<String, V>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object or an empty array")
        }

        fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
            IndexMap::<String, V>::deserialize(de::value::MapAccessDeserializer::new(map))
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            if seq.next_element::<IgnoredAny>()?.is_some() {
                return Err(de::Error::invalid_length(1, &self));
            }
            Ok(IndexMap::new())
        }
    }

    deserializer.deserialize_any(MapOrEmptyList(PhantomData))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snak(property: &str) -> serde_json::Value {
        json!({
            "snaktype": "value",
            "property": property,
            "datatype": "string",
            "datavalue": {"type": "string", "value": property}
        })
    }

    #[test]
    fn test_order_list_reorders_qualifiers() {
        let statement: Statement = serde_json::from_value(json!({
            "id": "Q1$1",
            "type": "statement",
            "mainsnak": snak("P1"),
            "rank": "normal",
            "qualifiers": {"P3": [snak("P3")], "P2": [snak("P2")]},
            "qualifiers-order": ["P2", "P3"]
        }))
        .unwrap();
        assert_eq!(statement.qualifiers_order().collect::<Vec<_>>(), vec!["P2", "P3"]);

        let encoded = serde_json::to_value(&statement).unwrap();
        assert_eq!(encoded["qualifiers-order"], json!(["P2", "P3"]));
        let keys: Vec<_> = encoded["qualifiers"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["P2", "P3"]);
    }

    #[test]
    fn test_order_list_must_match_keys() {
        let err = serde_json::from_value::<Reference>(json!({
            "hash": "abc",
            "snaks": {"P1": [snak("P1")]},
            "snaks-order": ["P2"]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("snaks-order names P2"));

        let err = serde_json::from_value::<Reference>(json!({
            "snaks": {"P1": [snak("P1")], "P2": [snak("P2")]},
            "snaks-order": ["P1", "P1"]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("missing or repeated"));
    }

    #[test]
    fn test_missing_order_list_keeps_document_order() {
        let reference: Reference = serde_json::from_value(json!({
            "snaks": {"P9": [snak("P9")], "P4": [snak("P4")]}
        }))
        .unwrap();
        assert_eq!(reference.snaks_order().collect::<Vec<_>>(), vec!["P9", "P4"]);
    }

    #[test]
    fn test_novalue_snak_without_datavalue() {
        let snak: Snak = serde_json::from_value(json!({
            "snaktype": "novalue",
            "property": "P40",
            "hash": "f0f0",
            "datatype": "wikibase-item"
        }))
        .unwrap();
        assert_eq!(snak.snak_type, SnakType::NoValue);
        assert!(snak.data_value.is_none());
        assert_eq!(
            serde_json::to_value(&snak).unwrap(),
            json!({"hash": "f0f0", "snaktype": "novalue", "property": "P40", "datatype": "wikibase-item"})
        );
    }

    #[test]
    fn test_somevalue_snak_with_datavalue_is_rejected() {
        let err = serde_json::from_value::<Snak>(json!({
            "snaktype": "somevalue",
            "property": "P1",
            "datatype": "string",
            "datavalue": {"type": "string", "value": "x"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("carries a datavalue"));
    }

    #[test]
    fn test_empty_list_is_an_empty_map() {
        let entity: Entity = serde_json::from_value(json!({
            "id": "Q1",
            "type": "item",
            "labels": [],
            "claims": [],
            "lastrevid": 1
        }))
        .unwrap();
        assert!(entity.labels.is_empty());
        assert!(entity.claims.is_empty());
        assert!(serde_json::from_value::<Entity>(json!({
            "id": "Q1",
            "type": "item",
            "labels": [1],
            "lastrevid": 1
        }))
        .is_err());
    }

    #[test]
    fn test_empty_collections_are_omitted() {
        let entity = Entity {
            id: "P31".to_string(),
            entity_type: EntityType::Property,
            data_type: Some(DataType::WikibaseItem),
            labels: IndexMap::new(),
            descriptions: IndexMap::new(),
            aliases: IndexMap::new(),
            claims: IndexMap::new(),
            site_links: IndexMap::new(),
            last_revision_id: 42,
        };
        assert_eq!(
            serde_json::to_value(&entity).unwrap(),
            json!({"id": "P31", "type": "property", "datatype": "wikibase-item", "lastrevid": 42})
        );
    }
}
