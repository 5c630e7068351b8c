//! Filter/query DSL and the user-facing text query translator.
//!
//! The DSL is the small structured surface both search sides share: text
//! search compiles it directly, vector search pushes it down as a candidate
//! intersection. Compilation targets tantivy's query types; `Serialize` is
//! derived so composed queries stay legible in logs.

use doc_model::{id_field_names, text_field_names, Document, FieldKey, FieldValue};
use serde::Serialize;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, TermQuery, TermSetQuery};
use tantivy::schema::{Facet, IndexRecordOption, Schema};
use tantivy::{DateTime as TantivyDateTime, Index, Term};

use crate::error::Result;
use crate::schema::DOC_ID_FIELD;

/// Per-field fuzzy matching parameters for query-string searches.
#[derive(Debug, Clone, Serialize)]
pub struct FuzzySpec {
    pub field: String,
    pub prefix: bool,
    pub distance: u8,
    pub transpose_cost_one: bool,
}

#[derive(Debug, Clone, Serialize)]
pub enum Clause {
    Must(DslQuery),
    Should(DslQuery),
    MustNot(DslQuery),
}

/// Structured query over the lexical index.
#[derive(Debug, Clone, Serialize)]
pub enum DslQuery {
    /// Matches every document.
    All,
    Term {
        field: String,
        value: FieldValue,
    },
    TermSet {
        field: String,
        values: Vec<FieldValue>,
    },
    Boolean {
        clauses: Vec<Clause>,
    },
    QueryString {
        query: String,
        default_fields: Vec<String>,
        fuzzy_fields: Vec<FuzzySpec>,
    },
}

impl DslQuery {
    /// Exact-match term on one field.
    pub fn term<F: FieldKey>(field: F, value: impl Into<FieldValue>) -> Self {
        DslQuery::Term {
            field: field.name().to_string(),
            value: value.into(),
        }
    }

    /// Match any of the given values on one field.
    pub fn term_set<F: FieldKey>(field: F, values: Vec<FieldValue>) -> Self {
        DslQuery::TermSet {
            field: field.name().to_string(),
            values,
        }
    }

    /// Candidate restriction on the reserved internal doc id field.
    pub fn doc_id_set(ids: &[u64]) -> Self {
        DslQuery::TermSet {
            field: DOC_ID_FIELD.to_string(),
            values: ids.iter().map(|id| FieldValue::U64(*id)).collect(),
        }
    }

    /// Conjunction of the given queries.
    pub fn must(queries: Vec<DslQuery>) -> Self {
        DslQuery::Boolean {
            clauses: queries.into_iter().map(Clause::Must).collect(),
        }
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, DslQuery::All)
    }

    /// Compile into an executable tantivy query.
    pub fn to_query(&self, index: &Index) -> Result<Box<dyn Query>> {
        let schema = index.schema();
        match self {
            DslQuery::All => Ok(Box::new(AllQuery)),
            DslQuery::Term { field, value } => {
                let term = make_term(&schema, field, value)?;
                Ok(Box::new(TermQuery::new(term, IndexRecordOption::Basic)))
            }
            DslQuery::TermSet { field, values } => {
                let terms = values
                    .iter()
                    .map(|v| make_term(&schema, field, v))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Box::new(TermSetQuery::new(terms)))
            }
            DslQuery::Boolean { clauses } => {
                let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    let (occur, inner) = match clause {
                        Clause::Must(q) => (Occur::Must, q),
                        Clause::Should(q) => (Occur::Should, q),
                        Clause::MustNot(q) => (Occur::MustNot, q),
                    };
                    subqueries.push((occur, inner.to_query(index)?));
                }
                Ok(Box::new(BooleanQuery::from(subqueries)))
            }
            DslQuery::QueryString {
                query,
                default_fields,
                fuzzy_fields,
            } => {
                let fields = default_fields
                    .iter()
                    .map(|name| Ok(schema.get_field(name)?))
                    .collect::<Result<Vec<_>>>()?;
                let mut parser = QueryParser::for_index(index, fields);
                for fuzzy in fuzzy_fields {
                    let field = schema.get_field(&fuzzy.field)?;
                    parser.set_field_fuzzy(
                        field,
                        fuzzy.prefix,
                        fuzzy.distance,
                        fuzzy.transpose_cost_one,
                    );
                }
                Ok(parser.parse_query(query)?)
            }
        }
    }
}

fn make_term(schema: &Schema, field_name: &str, value: &FieldValue) -> Result<Term> {
    let field = schema.get_field(field_name)?;
    Ok(match value {
        FieldValue::Str(s) => Term::from_field_text(field, s),
        FieldValue::Bool(b) => Term::from_field_bool(field, *b),
        FieldValue::U64(v) => Term::from_field_u64(field, *v),
        FieldValue::I64(v) => Term::from_field_i64(field, *v),
        FieldValue::F64(v) => Term::from_field_f64(field, *v),
        FieldValue::Date(dt) => Term::from_field_date(
            field,
            TantivyDateTime::from_timestamp_micros(dt.timestamp_micros()),
        ),
        FieldValue::Bytes(b) => Term::from_field_bytes(field, b),
        FieldValue::Facet(path) => Term::from_facet(field, &Facet::from(path.as_str())),
    })
}

/// Per-field fuzzy spec referencing a typed field key.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyField<F> {
    pub field: F,
    pub prefix: bool,
    pub distance: u8,
    pub transpose_cost_one: bool,
}

/// User-facing text query: a raw query string plus typed field selections.
/// Translated into the DSL before execution.
pub struct HybridTextQuery<D: Document> {
    pub query: String,
    pub default_fields: Vec<D::Field>,
    pub fuzzy_fields: Vec<FuzzyField<D::Field>>,
}

impl<D: Document> HybridTextQuery<D> {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            default_fields: Vec::new(),
            fuzzy_fields: Vec::new(),
        }
    }

    pub fn default_fields(mut self, fields: Vec<D::Field>) -> Self {
        self.default_fields = fields;
        self
    }

    pub fn fuzzy_field(
        mut self,
        field: D::Field,
        prefix: bool,
        distance: u8,
        transpose_cost_one: bool,
    ) -> Self {
        self.fuzzy_fields.push(FuzzyField {
            field,
            prefix,
            distance,
            transpose_cost_one,
        });
        self
    }

    /// Translate into the DSL. A blank query becomes match-all; when no
    /// default fields are named, search falls back to every text field that
    /// is not also an id field.
    pub fn to_dsl(&self) -> DslQuery {
        let trimmed = self.query.trim();
        if trimmed.is_empty() {
            return DslQuery::All;
        }
        let default_fields: Vec<String> = if self.default_fields.is_empty() {
            let ids = id_field_names::<D>();
            text_field_names::<D>()
                .into_iter()
                .filter(|name| !ids.contains(name))
                .map(String::from)
                .collect()
        } else {
            self.default_fields
                .iter()
                .map(|f| f.name().to_string())
                .collect()
        };
        let fuzzy_fields = self
            .fuzzy_fields
            .iter()
            .map(|f| FuzzySpec {
                field: f.field.name().to_string(),
                prefix: f.prefix,
                distance: f.distance,
                transpose_cost_one: f.transpose_cost_one,
            })
            .collect();
        DslQuery::QueryString {
            query: trimmed.to_string(),
            default_fields,
            fuzzy_fields,
        }
    }
}

/// Shared filter composition rule: a match-all base collapses to the filter
/// alone, anything else becomes `MUST(base) AND MUST(filter)`.
pub fn compose_with_filter(base: DslQuery, filter: Option<&DslQuery>) -> DslQuery {
    match filter {
        None => base,
        Some(f) if base.is_match_all() => f.clone(),
        Some(f) => DslQuery::Boolean {
            clauses: vec![Clause::Must(base), Clause::Must(f.clone())],
        },
    }
}
