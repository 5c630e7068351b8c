//! The hybrid index facade: one directory, two engines, one lock.
//!
//! All state lives behind a single mutex, so at most one operation runs
//! against the underlying engines at a time. Mutations touch the vector
//! index first and roll it back if the lexical write fails; `commit` makes
//! both sides durable and persists the metadata sidecar last.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use doc_model::{id_field_names, schema_fingerprint, Document, FieldKey};
use tantivy::Term;
use tracing::{debug, info};

use crate::error::{HybridError, Result};
use crate::fusion::{reciprocal_rank_fusion, DEFAULT_RRF_K};
use crate::hnsw_index::{DistanceKind, HnswConfig, VectorIndex};
use crate::meta::{IndexMeta, META_VERSION};
use crate::query::{compose_with_filter, DslQuery, HybridTextQuery};
use crate::schema::{build_schema, decode_document, doc_id_field, encode_document, extract_doc_id};
use crate::tantivy_index::LexicalIndex;

/// Subdirectory holding the lexical engine's segment files.
const LEXICAL_DIR: &str = "tantivy";
/// Basename of the vector snapshot files (`hnsw.data`, `hnsw.graph`).
const ANN_BASENAME: &str = "hnsw";

#[derive(Debug, Clone, Copy)]
pub struct HybridIndexConfig {
    pub embedding_dimension: u32,
    pub distance: DistanceKind,
    pub hnsw: HnswConfig,
}

impl HybridIndexConfig {
    /// Cosine distance and default graph parameters.
    pub fn new(embedding_dimension: u32) -> Self {
        Self {
            embedding_dimension,
            distance: DistanceKind::Cosine,
            hnsw: HnswConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VectorSearchParams {
    pub limit: usize,
    pub offset: usize,
    pub ef_search: usize,
    /// How many extra candidates to pull from the graph before filtering
    /// and paging.
    pub overfetch_multiplier: usize,
}

impl Default for VectorSearchParams {
    fn default() -> Self {
        Self {
            limit: 10,
            offset: 0,
            ef_search: 64,
            overfetch_multiplier: 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HybridSearchParams {
    pub limit: usize,
    pub offset: usize,
    pub ef_search: usize,
    pub overfetch_multiplier: usize,
    pub rrf_k: f32,
    pub text_weight: f32,
    pub vector_weight: f32,
}

impl Default for HybridSearchParams {
    fn default() -> Self {
        Self {
            limit: 10,
            offset: 0,
            ef_search: 64,
            overfetch_multiplier: 3,
            rrf_k: DEFAULT_RRF_K,
            text_weight: 1.0,
            vector_weight: 1.0,
        }
    }
}

/// One search result: the rebuilt document plus its mode-specific score
/// (BM25 for text, `1/(1+distance)` for vector, fused for hybrid).
#[derive(Debug, Clone)]
pub struct SearchHit<D> {
    pub doc_id: u64,
    pub score: f32,
    pub doc: D,
}

struct Inner {
    meta: IndexMeta,
    lexical: LexicalIndex,
    vector: VectorIndex,
}

/// A dual-index document store: BM25 text search, HNSW vector search and
/// their RRF fusion over one corpus, linked by a dense internal doc id.
impl<D: Document> std::fmt::Debug for HybridIndex<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridIndex")
            .field("dir", &self.dir)
            .field("primary_id_field", &self.primary_id_field)
            .finish()
    }
}

pub struct HybridIndex<D: Document> {
    dir: PathBuf,
    primary_id_field: String,
    inner: Mutex<Inner>,
    _marker: PhantomData<fn() -> D>,
}

impl<D: Document> HybridIndex<D> {
    /// Create an empty index at `dir`. Fails if a sidecar already exists
    /// there, or if the document type's id-field declaration is unusable.
    pub fn create(
        dir: impl AsRef<Path>,
        config: HybridIndexConfig,
        primary_id_field: Option<&str>,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if IndexMeta::exists(&dir) {
            return Err(HybridError::IndexAlreadyExists(dir));
        }
        let primary = resolve_primary_id_field::<D>(primary_id_field)?;
        std::fs::create_dir_all(&dir)?;
        let lexical = LexicalIndex::create(&dir.join(LEXICAL_DIR), build_schema::<D>())?;
        let vector = VectorIndex::new(
            config.embedding_dimension as usize,
            config.distance,
            config.hnsw,
        );
        let meta = IndexMeta {
            version: META_VERSION,
            embedding_dimension: config.embedding_dimension,
            distance_type: config.distance,
            hnsw_config: config.hnsw,
            next_doc_id: 0,
            primary_id_field: primary.clone(),
            schema_fingerprint: schema_fingerprint::<D>(),
        };
        meta.save(&dir)?;
        info!(dir = %dir.display(), dimension = config.embedding_dimension, "created hybrid index");
        Ok(Self {
            dir,
            primary_id_field: primary,
            inner: Mutex::new(Inner {
                meta,
                lexical,
                vector,
            }),
            _marker: PhantomData,
        })
    }

    /// Reopen an existing index. The persisted schema fingerprint must match
    /// `D`; a `primary_id_field` override must name one of `D`'s id fields.
    pub fn load(dir: impl AsRef<Path>, primary_id_field: Option<&str>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let meta = IndexMeta::load(&dir)?;
        let expected = schema_fingerprint::<D>();
        if meta.schema_fingerprint != expected {
            return Err(HybridError::MetadataCorrupt(format!(
                "schema fingerprint mismatch: index has {:?}, document type has {:?}",
                meta.schema_fingerprint, expected
            )));
        }
        let ids = id_field_names::<D>();
        let primary = match primary_id_field {
            Some(name) if ids.iter().any(|id| *id == name) => name.to_string(),
            Some(name) => return Err(HybridError::InvalidPrimaryIdField(name.to_string())),
            None => meta.primary_id_field.clone(),
        };
        let lexical = LexicalIndex::open(&dir.join(LEXICAL_DIR))?;
        let vector = if VectorIndex::snapshot_exists(&dir, ANN_BASENAME) {
            VectorIndex::load(
                &dir,
                ANN_BASENAME,
                meta.embedding_dimension as usize,
                meta.distance_type,
                meta.hnsw_config,
            )?
        } else {
            // A crash before the first commit leaves no snapshot.
            VectorIndex::new(
                meta.embedding_dimension as usize,
                meta.distance_type,
                meta.hnsw_config,
            )
        };
        info!(dir = %dir.display(), next_doc_id = meta.next_doc_id, "loaded hybrid index");
        Ok(Self {
            dir,
            primary_id_field: primary,
            inner: Mutex::new(Inner {
                meta,
                lexical,
                vector,
            }),
            _marker: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn primary_id_field(&self) -> &str {
        &self.primary_id_field
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert one document with its embedding. Returns the allocated doc id.
    /// Not durable until [`HybridIndex::commit`].
    pub fn add(&self, doc: &D, embedding: &[f32]) -> Result<u64> {
        let mut inner = self.lock();
        self.add_locked(&mut inner, doc, embedding)
    }

    /// Insert a batch, allocating a contiguous doc id range. An empty batch
    /// is a no-op. On lexical failure the vector inserts are rolled back,
    /// but the allocated ids stay consumed.
    pub fn add_batch(&self, items: &[(D, Vec<f32>)]) -> Result<Vec<u64>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let mut inner = self.lock();
        self.add_batch_locked(&mut inner, items)
    }

    /// [`HybridIndex::add`] followed by an immediate commit.
    pub fn index(&self, doc: &D, embedding: &[f32]) -> Result<u64> {
        let mut inner = self.lock();
        let doc_id = self.add_locked(&mut inner, doc, embedding)?;
        self.commit_locked(&mut inner)?;
        Ok(doc_id)
    }

    /// [`HybridIndex::add_batch`] followed by an immediate commit.
    pub fn index_batch(&self, items: &[(D, Vec<f32>)]) -> Result<Vec<u64>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let mut inner = self.lock();
        let doc_ids = self.add_batch_locked(&mut inner, items)?;
        self.commit_locked(&mut inner)?;
        Ok(doc_ids)
    }

    fn add_locked(&self, inner: &mut Inner, doc: &D, embedding: &[f32]) -> Result<u64> {
        validate_dimension(&inner.meta, embedding)?;
        let doc_id = inner.meta.next_doc_id;
        inner.meta.next_doc_id += 1;
        let encoded = encode_document(doc, inner.lexical.schema(), doc_id)?;
        inner.vector.insert(embedding, doc_id);
        if let Err(e) = inner.lexical.add_document(encoded) {
            // Compensate so the two indices stay paired.
            inner.vector.delete(doc_id);
            return Err(e);
        }
        Ok(doc_id)
    }

    fn add_batch_locked(&self, inner: &mut Inner, items: &[(D, Vec<f32>)]) -> Result<Vec<u64>> {
        for (_, embedding) in items {
            validate_dimension(&inner.meta, embedding)?;
        }
        let start = inner.meta.next_doc_id;
        inner.meta.next_doc_id += items.len() as u64;
        let doc_ids: Vec<u64> = (0..items.len() as u64).map(|i| start + i).collect();

        let mut encoded = Vec::with_capacity(items.len());
        for ((doc, _), doc_id) in items.iter().zip(&doc_ids) {
            encoded.push(encode_document(doc, inner.lexical.schema(), *doc_id)?);
        }
        let vectors: Vec<(u64, Vec<f32>)> = doc_ids
            .iter()
            .zip(items)
            .map(|(doc_id, (_, v))| (*doc_id, v.clone()))
            .collect();
        inner.vector.insert_batch(&vectors);
        if let Err(e) = inner.lexical.add_documents(encoded) {
            inner.vector.delete_batch(&doc_ids);
            return Err(e);
        }
        Ok(doc_ids)
    }

    /// Make all pending writes durable: lexical commit, vector snapshot,
    /// searching mode on, metadata save — in that order. Not atomic across
    /// the engines.
    pub fn commit(&self) -> Result<()> {
        let mut inner = self.lock();
        self.commit_locked(&mut inner)
    }

    fn commit_locked(&self, inner: &mut Inner) -> Result<()> {
        inner.lexical.commit()?;
        inner.vector.save(&self.dir, ANN_BASENAME)?;
        inner.vector.set_searching_mode(true);
        inner.meta.save(&self.dir)?;
        debug!(next_doc_id = inner.meta.next_doc_id, "committed hybrid index");
        Ok(())
    }

    /// Delete by internal doc id. With `persist`, the vector snapshot and
    /// metadata are saved immediately; the lexical delete always commits.
    pub fn delete(&self, doc_id: u64, persist: bool) -> Result<()> {
        let mut inner = self.lock();
        self.delete_locked(&mut inner, doc_id, persist)
    }

    /// Delete by external id. Deleting an id that is not present is a
    /// silent no-op.
    pub fn delete_by_id(&self, field: D::Field, value: &str, persist: bool) -> Result<()> {
        let mut inner = self.lock();
        let term = Term::from_field_text(inner.lexical.schema().get_field(field.name())?, value);
        let doc = match inner.lexical.get_doc(term)? {
            Some(doc) => doc,
            None => return Ok(()),
        };
        let doc_id =
            extract_doc_id(&doc, inner.lexical.schema()).ok_or(HybridError::MissingDocId)?;
        self.delete_locked(&mut inner, doc_id, persist)
    }

    fn delete_locked(&self, inner: &mut Inner, doc_id: u64, persist: bool) -> Result<()> {
        let term = Term::from_field_u64(doc_id_field(inner.lexical.schema())?, doc_id);
        inner.lexical.delete_doc(term)?;
        inner.vector.delete(doc_id);
        if persist {
            inner.vector.save(&self.dir, ANN_BASENAME)?;
            inner.meta.save(&self.dir)?;
        }
        debug!(doc_id, persist, "deleted document");
        Ok(())
    }

    /// Point lookup by internal doc id.
    pub fn get(&self, doc_id: u64) -> Result<Option<D>> {
        let inner = self.lock();
        let term = Term::from_field_u64(doc_id_field(inner.lexical.schema())?, doc_id);
        Ok(inner
            .lexical
            .get_doc(term)?
            .and_then(|doc| decode_document(&doc, inner.lexical.schema())))
    }

    /// Point lookup by external id field and value.
    pub fn get_by_id(&self, field: D::Field, value: &str) -> Result<Option<D>> {
        let inner = self.lock();
        let term = Term::from_field_text(inner.lexical.schema().get_field(field.name())?, value);
        Ok(inner
            .lexical
            .get_doc(term)?
            .and_then(|doc| decode_document(&doc, inner.lexical.schema())))
    }

    /// Committed document count.
    pub fn count(&self) -> u64 {
        self.lock().lexical.docs_count()
    }

    /// BM25 search. The filter is conjoined with the translated query;
    /// `(limit, offset)` are pushed down to the lexical engine.
    pub fn search_text(
        &self,
        query: &HybridTextQuery<D>,
        filter: Option<&DslQuery>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchHit<D>>> {
        let inner = self.lock();
        let combined = compose_with_filter(query.to_dsl(), filter);
        let rows = inner.lexical.search_dsl(&combined, limit, offset)?;
        let schema = inner.lexical.schema();
        let mut out = Vec::with_capacity(rows.len());
        for (score, doc) in rows {
            let doc_id = match extract_doc_id(&doc, schema) {
                Some(doc_id) => doc_id,
                None => continue,
            };
            match decode_document::<D>(&doc, schema) {
                Some(decoded) => out.push(SearchHit {
                    doc_id,
                    score,
                    doc: decoded,
                }),
                None => continue,
            }
        }
        Ok(out)
    }

    /// Nearest-neighbour search; scores are `1/(1+distance)`. A filter is
    /// applied by intersecting the overfetched candidates with the lexical
    /// side, and the offset is applied after that intersection — deep
    /// pagination is therefore bounded by the overfetch window, unlike
    /// [`HybridIndex::search_text`].
    pub fn search_vector(
        &self,
        embedding: &[f32],
        filter: Option<&DslQuery>,
        params: &VectorSearchParams,
    ) -> Result<Vec<SearchHit<D>>> {
        let mut inner = self.lock();
        let candidates = vector_candidates(
            &mut inner,
            embedding,
            filter,
            params.limit,
            params.offset,
            params.ef_search,
            params.overfetch_multiplier,
        )?;
        let page: Vec<(u64, f32)> = candidates
            .into_iter()
            .skip(params.offset)
            .take(params.limit)
            .map(|(doc_id, distance)| (doc_id, 1.0 / (1.0 + distance)))
            .collect();
        hydrate(&inner, &page)
    }

    /// Hybrid search: both sides are overfetched with the filter applied,
    /// then fused with weighted RRF. Ties break on ascending doc id.
    pub fn search_hybrid(
        &self,
        query: &HybridTextQuery<D>,
        embedding: &[f32],
        filter: Option<&DslQuery>,
        params: &HybridSearchParams,
    ) -> Result<Vec<SearchHit<D>>> {
        let mut inner = self.lock();
        validate_dimension(&inner.meta, embedding)?;
        let desired = (params.limit + params.offset).max(1);
        let fetch_limit = (desired * params.overfetch_multiplier).max(1);

        let combined = compose_with_filter(query.to_dsl(), filter);
        let text_rows = inner.lexical.search_dsl(&combined, fetch_limit, 0)?;
        let text_ids: Vec<u64> = {
            let schema = inner.lexical.schema();
            text_rows
                .iter()
                .filter_map(|(_, doc)| extract_doc_id(doc, schema))
                .collect()
        };

        // fetch_limit is already inflated, so the vector side runs without
        // further overfetch.
        let vector_ids: Vec<u64> =
            vector_candidates(&mut inner, embedding, filter, fetch_limit, 0, params.ef_search, 1)?
                .into_iter()
                .map(|(doc_id, _)| doc_id)
                .collect();

        let fused = reciprocal_rank_fusion(
            &text_ids,
            &vector_ids,
            params.rrf_k,
            params.text_weight,
            params.vector_weight,
        );
        let page: Vec<(u64, f32)> = fused
            .into_iter()
            .skip(params.offset)
            .take(params.limit)
            .collect();
        hydrate(&inner, &page)
    }

    /// Rebuild the vector graph from live rows with the stored config and
    /// snapshot it. The lexical side is left to its own segment merger.
    pub fn compact(&self) -> Result<()> {
        let mut inner = self.lock();
        let config = inner.meta.hnsw_config;
        inner.vector.compact(config);
        inner.vector.save(&self.dir, ANN_BASENAME)?;
        info!(live = inner.vector.len(), "compacted vector index");
        Ok(())
    }

    /// Truncate both indices and reset the doc id watermark. The on-disk
    /// vector snapshot is not rewritten until the next commit or persisting
    /// delete; reopening before then can observe the old vectors.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.lexical.clear()?;
        inner.vector = VectorIndex::new(
            inner.meta.embedding_dimension as usize,
            inner.meta.distance_type,
            inner.meta.hnsw_config,
        );
        inner.meta.next_doc_id = 0;
        inner.meta.save(&self.dir)?;
        info!("cleared hybrid index");
        Ok(())
    }
}

fn resolve_primary_id_field<D: Document>(given: Option<&str>) -> Result<String> {
    let ids = id_field_names::<D>();
    if ids.is_empty() {
        return Err(HybridError::MissingIdField);
    }
    match given {
        Some(name) if ids.iter().any(|id| *id == name) => Ok(name.to_string()),
        Some(name) => Err(HybridError::InvalidPrimaryIdField(name.to_string())),
        None if ids.len() == 1 => Ok(ids[0].to_string()),
        None => Err(HybridError::AmbiguousIdField(
            ids.into_iter().map(String::from).collect(),
        )),
    }
}

fn validate_dimension(meta: &IndexMeta, embedding: &[f32]) -> Result<()> {
    let expected = meta.embedding_dimension as usize;
    if embedding.len() != expected {
        return Err(HybridError::DimensionMismatch {
            expected,
            got: embedding.len(),
        });
    }
    Ok(())
}

/// Overfetched, filter-intersected nearest neighbours as `(doc_id,
/// distance)` pairs. The offset is NOT applied here; callers page the
/// returned list.
fn vector_candidates(
    inner: &mut Inner,
    embedding: &[f32],
    filter: Option<&DslQuery>,
    limit: usize,
    offset: usize,
    ef_search: usize,
    overfetch_multiplier: usize,
) -> Result<Vec<(u64, f32)>> {
    validate_dimension(&inner.meta, embedding)?;
    let desired = (limit + offset).max(1);
    let fetch_limit = (desired * overfetch_multiplier).max(1);
    let effective_ef = ef_search.max(fetch_limit);

    inner.vector.set_searching_mode(true);
    let mut candidates = inner.vector.search(embedding, fetch_limit, effective_ef);

    if let Some(filter) = filter {
        if !candidates.is_empty() {
            let ids: Vec<u64> = candidates.iter().map(|(doc_id, _)| *doc_id).collect();
            let restricted = DslQuery::must(vec![DslQuery::doc_id_set(&ids), filter.clone()]);
            let rows = inner.lexical.search_dsl(&restricted, ids.len(), 0)?;
            let schema = inner.lexical.schema();
            let allowed: HashSet<u64> = rows
                .iter()
                .filter_map(|(_, doc)| extract_doc_id(doc, schema))
                .collect();
            candidates.retain(|(doc_id, _)| allowed.contains(doc_id));
        }
    }
    Ok(candidates)
}

/// Rebuild documents for a scored id page; rows that no longer decode are
/// dropped rather than failing the search.
fn hydrate<D: Document>(inner: &Inner, scored: &[(u64, f32)]) -> Result<Vec<SearchHit<D>>> {
    let schema = inner.lexical.schema();
    let field = doc_id_field(schema)?;
    let scores: HashMap<u64, f32> = scored.iter().copied().collect();
    let terms: Vec<Term> = scored
        .iter()
        .map(|(doc_id, _)| Term::from_field_u64(field, *doc_id))
        .collect();
    let mut out = Vec::with_capacity(scored.len());
    for doc in inner.lexical.get_docs_by_terms(terms)? {
        let doc_id = match extract_doc_id(&doc, schema) {
            Some(doc_id) => doc_id,
            None => continue,
        };
        let score = match scores.get(&doc_id) {
            Some(score) => *score,
            None => continue,
        };
        match decode_document::<D>(&doc, schema) {
            Some(decoded) => out.push(SearchHit {
                doc_id,
                score,
                doc: decoded,
            }),
            None => continue,
        }
    }
    Ok(out)
}
