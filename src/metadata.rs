use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Represents an attribute value in a tile or store metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Array(Vec<AttributeValue>),
    Object(BTreeMap<String, AttributeValue>),
    Null,
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

/// Represents a single named attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

/// Insertion-ordered attribute record.
///
/// Serializes as a JSON object whose keys appear in insertion order, so two
/// records built from the same schema produce byte-identical output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: Vec<Attribute>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing an existing entry in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.entries.push(Attribute { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.entries
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|a| a.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for attr in &self.entries {
            map.serialize_entry(&attr.name, &attr.value)?;
        }
        map.end()
    }
}

struct AttributesVisitor;

impl<'de> Visitor<'de> for AttributesVisitor {
    type Value = Attributes;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of attribute names to values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Attributes, A::Error> {
        let mut attrs = Attributes::new();
        while let Some((name, value)) = access.next_entry::<String, AttributeValue>()? {
            attrs.insert(name, value);
        }
        Ok(attrs)
    }
}

/// Keeps the source document's key order.
impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(AttributesVisitor)
    }
}

/// Array discovered in a Zarr store
#[derive(Debug, Clone)]
pub struct ArrayInfo {
    pub name: String,
    pub path: String,
    pub dtype: String,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub compressor: Option<String>,
    pub order: String,
    pub dimension_separator: String,
    pub attributes: Attributes,
}

impl ArrayInfo {
    /// Dimension names from the `_ARRAY_DIMENSIONS` attribute, or `dim_N` defaults
    pub fn dimension_names(&self) -> Vec<String> {
        if let Some(AttributeValue::Array(dims)) = self.attributes.get("_ARRAY_DIMENSIONS") {
            dims.iter()
                .filter_map(|val| val.as_str().map(str::to_string))
                .collect()
        } else {
            (0..self.shape.len()).map(|i| format!("dim_{}", i)).collect()
        }
    }
}

/// Metadata for the arrays and root attributes of a Zarr store
#[derive(Debug, Default)]
pub struct StoreMetadata {
    pub global_attributes: Attributes,
    pub arrays: HashMap<String, ArrayInfo>,
}

impl StoreMetadata {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Raw Zarr array metadata from .zarray file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZArrayMetadata {
    pub zarr_format: u8,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub dtype: String,
    pub compressor: Option<serde_json::Value>,
    pub fill_value: Option<serde_json::Value>,
    pub order: String,
    pub filters: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_separator: Option<String>,
}

impl ZArrayMetadata {
    /// Uncompressed little-endian array stored as a single chunk
    pub fn single_chunk(shape: Vec<u64>, dtype: &str, fill_value: serde_json::Value) -> Self {
        Self {
            zarr_format: 2,
            chunks: shape.clone(),
            shape,
            dtype: dtype.to_string(),
            compressor: None,
            fill_value: Some(fill_value),
            order: "C".to_string(),
            filters: None,
            dimension_separator: None,
        }
    }
}

/// Raw Zarr group metadata from .zgroup file
#[derive(Debug, Serialize, Deserialize)]
pub struct ZGroupMetadata {
    pub zarr_format: u8,
}

/// Consolidated metadata from .zmetadata file
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct ConsolidatedMetadata {
    pub zarr_consolidated_format: u8,
    pub metadata: HashMap<String, serde_json::Value>,
}
