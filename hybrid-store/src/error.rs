use std::path::PathBuf;

/// Closed error set for hybrid index operations. Engine errors pass through
/// unchanged; validation errors are raised before any mutation.
#[derive(Debug, thiserror::Error)]
pub enum HybridError {
    #[error("no index metadata at {0}")]
    MetadataMissing(PathBuf),
    #[error("index metadata corrupt: {0}")]
    MetadataCorrupt(String),
    #[error("index already exists at {0}")]
    IndexAlreadyExists(PathBuf),
    #[error("document type declares no id field")]
    MissingIdField,
    #[error("multiple id fields {0:?} declared and no primary id field designated")]
    AmbiguousIdField(Vec<String>),
    #[error("primary id field {0:?} is not an id field of the document type")]
    InvalidPrimaryIdField(String),
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("lexical document is missing its internal doc id")]
    MissingDocId,
    #[error("lexical index error: {0}")]
    Lexical(#[from] tantivy::TantivyError),
    #[error("query parse error: {0}")]
    Query(#[from] tantivy::query::QueryParserError),
    #[error("document encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HybridError>;
