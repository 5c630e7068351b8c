//! Lexical index adapter over tantivy: schema-bound open/create, writes,
//! term deletes, point gets and DSL search.

use std::fs;
use std::path::Path;

use tantivy::collector::TopDocs;
use tantivy::query::TermQuery;
use tantivy::schema::{IndexRecordOption, Schema};
use tantivy::{Index, IndexReader, IndexWriter, TantivyDocument, Term};

use crate::error::Result;
use crate::query::DslQuery;

const WRITER_MEMORY_BUDGET: usize = 50_000_000;

pub struct LexicalIndex {
    index: Index,
    schema: Schema,
    writer: IndexWriter,
    reader: IndexReader,
}

impl LexicalIndex {
    /// Create a fresh index in `dir` with the given schema.
    pub fn create(dir: &Path, schema: Schema) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let index = Index::create_in_dir(dir, schema)?;
        Self::finish(index)
    }

    /// Reopen an existing index; the schema comes from the segment metadata.
    pub fn open(dir: &Path) -> Result<Self> {
        let index = Index::open_in_dir(dir)?;
        Self::finish(index)
    }

    fn finish(index: Index) -> Result<Self> {
        let schema = index.schema();
        let writer = index.writer(WRITER_MEMORY_BUDGET)?;
        let reader = index.reader()?;
        Ok(Self {
            index,
            schema,
            writer,
            reader,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Queue one document. Not visible until `commit`.
    pub fn add_document(&self, doc: TantivyDocument) -> Result<()> {
        self.writer.add_document(doc)?;
        Ok(())
    }

    pub fn add_documents(&self, docs: Vec<TantivyDocument>) -> Result<()> {
        for doc in docs {
            self.writer.add_document(doc)?;
        }
        Ok(())
    }

    /// Flush pending writes and refresh the reader.
    pub fn commit(&mut self) -> Result<()> {
        self.writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Delete every document matching `term` and commit immediately.
    pub fn delete_doc(&mut self, term: Term) -> Result<()> {
        self.writer.delete_term(term);
        self.commit()
    }

    /// Point lookup by exact term.
    pub fn get_doc(&self, term: Term) -> Result<Option<TantivyDocument>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        match top.first() {
            Some((_, addr)) => Ok(Some(searcher.doc::<TantivyDocument>(*addr)?)),
            None => Ok(None),
        }
    }

    /// Point lookups for a batch of terms; misses are skipped.
    pub fn get_docs_by_terms(&self, terms: Vec<Term>) -> Result<Vec<TantivyDocument>> {
        let mut out = Vec::with_capacity(terms.len());
        for term in terms {
            if let Some(doc) = self.get_doc(term)? {
                out.push(doc);
            }
        }
        Ok(out)
    }

    /// Execute a DSL query, returning `(bm25_score, stored_doc)` pairs.
    pub fn search_dsl(
        &self,
        query: &DslQuery,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<(f32, TantivyDocument)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let compiled = query.to_query(&self.index)?;
        let searcher = self.reader.searcher();
        let top = searcher.search(&compiled, &TopDocs::with_limit(limit).and_offset(offset))?;
        let mut out = Vec::with_capacity(top.len());
        for (score, addr) in top {
            out.push((score, searcher.doc::<TantivyDocument>(addr)?));
        }
        Ok(out)
    }

    /// Committed document count.
    pub fn docs_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Drop every document and commit.
    pub fn clear(&mut self) -> Result<()> {
        self.writer.delete_all_documents()?;
        self.commit()
    }
}
