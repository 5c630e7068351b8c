//! Hybrid document search over one corpus: a BM25 lexical index (tantivy)
//! and an HNSW vector index (hnsw_rs) joined by a dense internal doc id and
//! fused with reciprocal rank fusion.
//!
//! The entry point is [`HybridIndex`], parameterized by a caller-defined
//! document type. See the `doc-model` crate for the field declaration
//! contract.

pub mod error;
pub mod fusion;
pub mod hnsw_index;
pub mod hybrid;
pub mod meta;
pub mod query;
pub mod schema;
pub mod tantivy_index;

pub use doc_model::{
    id_field_names, schema_fingerprint, text_field_names, Document, FieldDef, FieldKey, FieldRole,
    FieldValue,
};
pub use error::{HybridError, Result};
pub use fusion::{reciprocal_rank_fusion, DEFAULT_RRF_K};
pub use hnsw_index::{DistanceKind, HnswConfig, VectorIndex};
pub use hybrid::{
    HybridIndex, HybridIndexConfig, HybridSearchParams, SearchHit, VectorSearchParams,
};
pub use meta::IndexMeta;
pub use query::{compose_with_filter, DslQuery, FuzzyField, HybridTextQuery};
pub use schema::DOC_ID_FIELD;
pub use tantivy_index::LexicalIndex;
