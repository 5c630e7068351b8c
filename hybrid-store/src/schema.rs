//! Lexical schema derivation and the document <-> stored-fields bridge.
//!
//! The lexical schema is derived from `D::FIELDS`, with one reserved field
//! appended: `__doc_id`, the dense internal id that joins the lexical index
//! to the vector index. Documents travel through `serde_json` in both
//! directions, so the caller's type only needs its serde derives.

use chrono::{DateTime, SecondsFormat, Utc};
use doc_model::{Document, FieldRole};
use serde_json::{Map, Value as JsonValue};
use tantivy::schema::{
    BytesOptions, Facet, FacetOptions, Field, Schema, Value as _, FAST, INDEXED, STORED, STRING,
    TEXT,
};
use tantivy::{DateTime as TantivyDateTime, TantivyDocument};

use crate::error::Result;

/// Reserved lexical field holding the internal doc id. Indexed, stored and
/// fast; it is the sole join key between the two indices.
pub const DOC_ID_FIELD: &str = "__doc_id";

/// Build the lexical schema for a document type, reserved field included.
pub fn build_schema<D: Document>() -> Schema {
    let mut builder = Schema::builder();
    for def in D::FIELDS {
        match def.role {
            FieldRole::Id => {
                builder.add_text_field(def.name, STRING | STORED | FAST);
            }
            FieldRole::Text => {
                builder.add_text_field(def.name, TEXT | STORED);
            }
            FieldRole::Bool => {
                builder.add_bool_field(def.name, INDEXED | STORED);
            }
            FieldRole::U64 => {
                builder.add_u64_field(def.name, INDEXED | STORED | FAST);
            }
            FieldRole::I64 => {
                builder.add_i64_field(def.name, INDEXED | STORED | FAST);
            }
            FieldRole::F64 => {
                builder.add_f64_field(def.name, INDEXED | STORED | FAST);
            }
            FieldRole::Date => {
                builder.add_date_field(def.name, INDEXED | STORED);
            }
            FieldRole::Bytes => {
                builder.add_bytes_field(def.name, BytesOptions::default().set_indexed().set_stored());
            }
            FieldRole::Facet => {
                builder.add_facet_field(def.name, FacetOptions::default().set_stored());
            }
        }
    }
    builder.add_u64_field(DOC_ID_FIELD, INDEXED | STORED | FAST);
    builder.build()
}

pub fn doc_id_field(schema: &Schema) -> Result<Field> {
    Ok(schema.get_field(DOC_ID_FIELD)?)
}

/// Encode a document into lexical fields, appending the internal doc id.
///
/// Fields whose serialized value is absent or null are skipped; `D` is
/// expected to serialize to a JSON object with one key per declared field.
pub fn encode_document<D: Document>(
    doc: &D,
    schema: &Schema,
    doc_id: u64,
) -> Result<TantivyDocument> {
    let json = serde_json::to_value(doc)?;
    let obj = match json {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    };

    let mut out = TantivyDocument::new();
    for def in D::FIELDS {
        let field = schema.get_field(def.name)?;
        let value = match obj.get(def.name) {
            Some(v) if !v.is_null() => v,
            _ => continue,
        };
        match def.role {
            FieldRole::Id | FieldRole::Text => {
                if let Some(s) = value.as_str() {
                    out.add_text(field, s);
                }
            }
            FieldRole::Bool => {
                if let Some(b) = value.as_bool() {
                    out.add_bool(field, b);
                }
            }
            FieldRole::U64 => {
                if let Some(v) = value.as_u64() {
                    out.add_u64(field, v);
                }
            }
            FieldRole::I64 => {
                if let Some(v) = value.as_i64() {
                    out.add_i64(field, v);
                }
            }
            FieldRole::F64 => {
                if let Some(v) = value.as_f64() {
                    out.add_f64(field, v);
                }
            }
            FieldRole::Date => {
                if let Some(dt) = value.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                {
                    out.add_date(
                        field,
                        TantivyDateTime::from_timestamp_micros(dt.timestamp_micros()),
                    );
                }
            }
            FieldRole::Bytes => {
                if let Ok(bytes) = serde_json::from_value::<Vec<u8>>(value.clone()) {
                    out.add_bytes(field, bytes);
                }
            }
            FieldRole::Facet => {
                if let Some(s) = value.as_str() {
                    out.add_facet(field, Facet::from(s));
                }
            }
        }
    }
    out.add_u64(doc_id_field(schema)?, doc_id);
    Ok(out)
}

/// Rebuild a document from its stored lexical fields. Returns `None` when
/// the stored values no longer deserialize into `D`; callers drop such hits.
pub fn decode_document<D: Document>(doc: &TantivyDocument, schema: &Schema) -> Option<D> {
    let mut map = Map::new();
    for def in D::FIELDS {
        let field = schema.get_field(def.name).ok()?;
        let json = doc.get_first(field).and_then(|value| match def.role {
            FieldRole::Id | FieldRole::Text => {
                value.as_str().map(|s| JsonValue::String(s.to_string()))
            }
            FieldRole::Bool => value.as_bool().map(JsonValue::Bool),
            FieldRole::U64 => value.as_u64().map(JsonValue::from),
            FieldRole::I64 => value.as_i64().map(JsonValue::from),
            FieldRole::F64 => value
                .as_f64()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number),
            FieldRole::Date => value
                .as_datetime()
                .and_then(|dt| DateTime::<Utc>::from_timestamp_micros(dt.into_timestamp_micros()))
                .map(|dt| JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::Micros, true))),
            FieldRole::Bytes => value.as_bytes().and_then(|b| serde_json::to_value(b).ok()),
            FieldRole::Facet => value
                .as_facet()
                .map(|f| JsonValue::String(f.to_path_string())),
        });
        map.insert(def.name.to_string(), json.unwrap_or(JsonValue::Null));
    }
    serde_json::from_value(JsonValue::Object(map)).ok()
}

/// Read the internal doc id back out of a stored lexical document.
pub fn extract_doc_id(doc: &TantivyDocument, schema: &Schema) -> Option<u64> {
    let field = schema.get_field(DOC_ID_FIELD).ok()?;
    doc.get_first(field).and_then(|v| v.as_u64())
}
