//! Shared, lightweight document model for the hybrid index.
//!
//! A searchable document type declares its fields once, as a static list of
//! `(name, role)` pairs plus a typed field-key enum. Everything else — the
//! lexical schema, the metadata fingerprint, query field references — is
//! derived from that declaration.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Role of a field inside a document. The role drives how the field is
/// indexed and how values round-trip through the lexical engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldRole {
    /// External identifier: indexed verbatim, stored, fast.
    Id,
    /// Tokenized full-text field, BM25 scored.
    Text,
    Bool,
    U64,
    I64,
    F64,
    /// UTC timestamp, RFC 3339 in transit.
    Date,
    Bytes,
    /// Hierarchical facet path such as `/lang/rust`.
    Facet,
}

impl FieldRole {
    /// Stable tag used in schema fingerprints. Renaming a tag is a breaking
    /// change for every index on disk.
    pub fn tag(self) -> &'static str {
        match self {
            FieldRole::Id => "id",
            FieldRole::Text => "text",
            FieldRole::Bool => "bool",
            FieldRole::U64 => "u64",
            FieldRole::I64 => "i64",
            FieldRole::F64 => "f64",
            FieldRole::Date => "date",
            FieldRole::Bytes => "bytes",
            FieldRole::Facet => "facet",
        }
    }
}

/// One declared field of a document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub role: FieldRole,
}

impl FieldDef {
    pub const fn new(name: &'static str, role: FieldRole) -> Self {
        Self { name, role }
    }
}

/// Typed field reference for a document type. Implemented by a small
/// per-document enum with one variant per field; the string form must match
/// the declared field name.
pub trait FieldKey: Copy {
    fn name(self) -> &'static str;
}

/// A document shape the hybrid index can store.
///
/// The serde bounds are the bridge to the lexical engine's stored fields:
/// documents are encoded through `serde_json` on the way in and rebuilt from
/// stored values on the way out.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Typed field keys, one variant per entry of [`Document::FIELDS`].
    type Field: FieldKey;

    /// Declared fields, in declaration order.
    const FIELDS: &'static [FieldDef];
}

/// A concrete field value, used for filter terms and point lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValue {
    Str(String),
    Bool(bool),
    U64(u64),
    I64(i64),
    F64(f64),
    Date(DateTime<Utc>),
    Bytes(Vec<u8>),
    Facet(String),
}

impl FieldValue {
    /// Facet values share their text form with [`FieldValue::Str`]; this
    /// names the intent explicitly.
    pub fn facet(path: impl Into<String>) -> Self {
        FieldValue::Facet(path.into())
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::U64(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::I64(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::F64(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Date(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Bytes(v)
    }
}

/// Names of all `Id`-role fields, in declaration order.
pub fn id_field_names<D: Document>() -> Vec<&'static str> {
    D::FIELDS
        .iter()
        .filter(|f| f.role == FieldRole::Id)
        .map(|f| f.name)
        .collect()
}

/// Names of all `Text`-role fields, in declaration order.
pub fn text_field_names<D: Document>() -> Vec<&'static str> {
    D::FIELDS
        .iter()
        .filter(|f| f.role == FieldRole::Text)
        .map(|f| f.name)
        .collect()
}

/// Stable fingerprint of a document shape.
///
/// Order-independent across field declaration order, sensitive to field
/// names, role changes, additions and removals. Persisted in the index
/// metadata and verified on load to detect schema drift.
pub fn schema_fingerprint<D: Document>() -> String {
    let mut pairs: Vec<String> = D::FIELDS
        .iter()
        .map(|f| format!("{}:{}", f.name, f.role.tag()))
        .collect();
    pairs.sort_unstable();
    pairs.join("|")
}
