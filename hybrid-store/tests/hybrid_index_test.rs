//! End-to-end tests against a small article corpus: index + fetch, the
//! three search modes, deletes, validation failures and reload behavior.

use hybrid_store::{
    Document, DslQuery, FieldDef, FieldKey, FieldRole, HybridError, HybridIndex,
    HybridIndexConfig, HybridSearchParams, HybridTextQuery, VectorSearchParams,
};
use serde::{Deserialize, Serialize};

const DIM: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Article {
    id: String,
    title: String,
    body: String,
    is_published: bool,
    views: u64,
}

#[derive(Clone, Copy)]
enum ArticleField {
    Id,
    Title,
    Body,
    IsPublished,
    Views,
}

impl FieldKey for ArticleField {
    fn name(self) -> &'static str {
        match self {
            ArticleField::Id => "id",
            ArticleField::Title => "title",
            ArticleField::Body => "body",
            ArticleField::IsPublished => "is_published",
            ArticleField::Views => "views",
        }
    }
}

impl Document for Article {
    type Field = ArticleField;
    const FIELDS: &'static [FieldDef] = &[
        FieldDef::new("id", FieldRole::Id),
        FieldDef::new("title", FieldRole::Text),
        FieldDef::new("body", FieldRole::Text),
        FieldDef::new("is_published", FieldRole::Bool),
        FieldDef::new("views", FieldRole::U64),
    ];
}

fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[i] = 1.0;
    v
}

fn article(id: &str, title: &str, body: &str, is_published: bool) -> Article {
    Article {
        id: id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        is_published,
        views: 100,
    }
}

/// Four articles on distinct embedding axes: swift-1 on axis 0, rust-1 on
/// axis 1, vector-1 (unpublished) on axis 2, tantivy-1 on axis 3.
fn corpus() -> Vec<(Article, Vec<f32>)> {
    vec![
        (
            article(
                "swift-1",
                "Swift Concurrency",
                "Actors isolate mutable state in Swift concurrency programs.",
                true,
            ),
            axis(0),
        ),
        (
            article(
                "rust-1",
                "Rust Ownership",
                "The Rust borrow checker enforces ownership at compile time.",
                true,
            ),
            axis(1),
        ),
        (
            article(
                "vector-1",
                "Vector Search Basics",
                "Approximate nearest neighbour search over dense embeddings.",
                false,
            ),
            axis(2),
        ),
        (
            article(
                "tantivy-1",
                "Full-Text Indexing",
                "Inverted indexes score keyword matches with BM25.",
                true,
            ),
            axis(3),
        ),
    ]
}

fn populated_index(dir: &std::path::Path) -> HybridIndex<Article> {
    let index = HybridIndex::<Article>::create(dir, HybridIndexConfig::new(DIM as u32), None)
        .expect("create index");
    let docs = corpus();
    let doc_ids = index.add_batch(&docs).expect("add corpus");
    assert_eq!(doc_ids, vec![0, 1, 2, 3]);
    index.commit().expect("commit corpus");
    index
}

#[test]
fn index_and_fetch_by_both_id_kinds() {
    let dir = tempfile::tempdir().unwrap();
    let index = populated_index(dir.path());

    assert_eq!(index.count(), 4);
    assert_eq!(index.primary_id_field(), "id");

    let by_external = index
        .get_by_id(ArticleField::Id, "swift-1")
        .unwrap()
        .expect("swift-1 present");
    assert_eq!(by_external.title, "Swift Concurrency");

    let by_doc_id = index.get(0).unwrap().expect("doc id 0 present");
    assert_eq!(by_doc_id.id, "swift-1");

    assert!(index.get(99).unwrap().is_none());
    assert!(index.get_by_id(ArticleField::Id, "missing").unwrap().is_none());
}

#[test]
fn text_search_ranks_keyword_match_first() {
    let dir = tempfile::tempdir().unwrap();
    let index = populated_index(dir.path());

    let query = HybridTextQuery::<Article>::new("swift actors")
        .default_fields(vec![ArticleField::Title, ArticleField::Body]);
    let hits = index.search_text(&query, None, 3, 0).unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].doc.id, "swift-1");
    assert!(hits[0].score > 0.0);
}

#[test]
fn filtered_vector_search_excludes_unpublished() {
    let dir = tempfile::tempdir().unwrap();
    let index = populated_index(dir.path());

    // Query along vector-1's axis: unfiltered it would win outright.
    let unfiltered = index
        .search_vector(&axis(2), None, &VectorSearchParams::default())
        .unwrap();
    assert_eq!(unfiltered[0].doc.id, "vector-1");

    let filter = DslQuery::term(ArticleField::IsPublished, true);
    let hits = index
        .search_vector(
            &axis(2),
            Some(&filter),
            &VectorSearchParams {
                limit: 3,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.doc.is_published));
    assert_ne!(hits[0].doc.id, "vector-1");
}

#[test]
fn vector_search_scores_decrease_and_ids_are_distinct() {
    let dir = tempfile::tempdir().unwrap();
    let index = populated_index(dir.path());

    let hits = index
        .search_vector(
            &axis(0),
            None,
            &VectorSearchParams {
                limit: 4,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(hits.len() <= 4);
    assert_eq!(hits[0].doc.id, "swift-1");
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    let mut ids: Vec<u64> = hits.iter().map(|h| h.doc_id).collect();
    ids.dedup();
    assert_eq!(ids.len(), hits.len());
}

#[test]
fn hybrid_search_fuses_text_and_vector_signals() {
    let dir = tempfile::tempdir().unwrap();
    let index = populated_index(dir.path());

    let query = HybridTextQuery::<Article>::new("swift concurrency actors")
        .default_fields(vec![ArticleField::Title, ArticleField::Body]);
    let hits = index
        .search_hybrid(
            &query,
            &axis(0),
            None,
            &HybridSearchParams {
                limit: 3,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].doc.id, "swift-1");
}

#[test]
fn hybrid_with_degenerate_weights_matches_single_mode_order() {
    let dir = tempfile::tempdir().unwrap();
    let index = populated_index(dir.path());

    let query = HybridTextQuery::<Article>::new("rust ownership")
        .default_fields(vec![ArticleField::Title, ArticleField::Body]);

    // Text-only weights reproduce the text ranking.
    let text_hits = index.search_text(&query, None, 2, 0).unwrap();
    let hybrid_text = index
        .search_hybrid(
            &query,
            &axis(3),
            None,
            &HybridSearchParams {
                limit: 2,
                text_weight: 1.0,
                vector_weight: 0.0,
                ..Default::default()
            },
        )
        .unwrap();
    let expected: Vec<u64> = text_hits.iter().map(|h| h.doc_id).collect();
    let got: Vec<u64> = hybrid_text
        .iter()
        .take(expected.len())
        .map(|h| h.doc_id)
        .collect();
    assert_eq!(got, expected);

    // Vector-only weights reproduce the vector ranking.
    let vector_hits = index
        .search_vector(
            &axis(1),
            None,
            &VectorSearchParams {
                limit: 2,
                ..Default::default()
            },
        )
        .unwrap();
    let hybrid_vector = index
        .search_hybrid(
            &query,
            &axis(1),
            None,
            &HybridSearchParams {
                limit: 2,
                text_weight: 0.0,
                vector_weight: 1.0,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(hybrid_vector[0].doc_id, vector_hits[0].doc_id);
}

#[test]
fn filtered_searches_only_return_matching_documents() {
    let dir = tempfile::tempdir().unwrap();
    let index = populated_index(dir.path());
    let filter = DslQuery::term(ArticleField::IsPublished, true);

    let query = HybridTextQuery::<Article>::new("search indexing embeddings")
        .default_fields(vec![ArticleField::Title, ArticleField::Body]);
    for hit in index.search_text(&query, Some(&filter), 10, 0).unwrap() {
        assert!(hit.doc.is_published);
    }
    let conjunction = DslQuery::must(vec![
        DslQuery::term(ArticleField::IsPublished, true),
        DslQuery::term(ArticleField::Views, 100u64),
    ]);
    for hit in index.search_text(&query, Some(&conjunction), 10, 0).unwrap() {
        assert!(hit.doc.is_published);
        assert_eq!(hit.doc.views, 100);
    }
    for hit in index
        .search_hybrid(
            &query,
            &axis(2),
            Some(&filter),
            &HybridSearchParams {
                limit: 10,
                ..Default::default()
            },
        )
        .unwrap()
    {
        assert!(hit.doc.is_published);
    }
}

#[test]
fn blank_query_with_filter_collapses_to_filter() {
    let dir = tempfile::tempdir().unwrap();
    let index = populated_index(dir.path());

    let filter = DslQuery::term(ArticleField::IsPublished, false);
    let query = HybridTextQuery::<Article>::new("   ");
    let hits = index.search_text(&query, Some(&filter), 10, 0).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc.id, "vector-1");
}

#[test]
fn delete_by_external_id_removes_from_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let index = populated_index(dir.path());

    index
        .delete_by_id(ArticleField::Id, "rust-1", true)
        .unwrap();

    assert!(index.get_by_id(ArticleField::Id, "rust-1").unwrap().is_none());
    assert_eq!(index.count(), 3);

    let query = HybridTextQuery::<Article>::new("Rust")
        .default_fields(vec![ArticleField::Title, ArticleField::Body]);
    let text_hits = index.search_text(&query, None, 5, 0).unwrap();
    assert!(text_hits.iter().all(|h| h.doc.id != "rust-1"));

    let vector_hits = index
        .search_vector(
            &axis(1),
            None,
            &VectorSearchParams {
                limit: 5,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(vector_hits.iter().all(|h| h.doc.id != "rust-1"));

    // Deleting an absent external id is a silent no-op.
    index
        .delete_by_id(ArticleField::Id, "rust-1", true)
        .unwrap();
}

#[test]
fn dimension_mismatch_is_rejected_before_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let index = populated_index(dir.path());

    let err = index
        .add(&article("late-1", "Late", "Never indexed.", true), &vec![0.0; 64])
        .unwrap_err();
    match err {
        HybridError::DimensionMismatch { expected, got } => {
            assert_eq!(expected, 128);
            assert_eq!(got, 64);
        }
        other => panic!("expected DimensionMismatch, got {other:?}"),
    }
    index.commit().unwrap();
    assert_eq!(index.count(), 4);

    let err = index
        .search_vector(&vec![0.0; 64], None, &VectorSearchParams::default())
        .unwrap_err();
    assert!(matches!(err, HybridError::DimensionMismatch { .. }));
}

#[test]
fn commit_then_reload_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    {
        let index = populated_index(dir.path());
        assert_eq!(index.count(), 4);
    }

    let reloaded = HybridIndex::<Article>::load(dir.path(), None).expect("reload");
    assert_eq!(reloaded.count(), 4);
    assert_eq!(reloaded.primary_id_field(), "id");

    let doc = reloaded.get(0).unwrap().expect("doc id 0 survives reload");
    assert_eq!(doc.id, "swift-1");

    // New allocations continue past the persisted watermark.
    let doc_id = reloaded
        .add(
            &article("new-1", "Fresh Doc", "Added after reload.", true),
            &axis(4),
        )
        .unwrap();
    assert_eq!(doc_id, 4);

    let hits = reloaded
        .search_vector(
            &axis(0),
            None,
            &VectorSearchParams {
                limit: 1,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(hits[0].doc.id, "swift-1");
}

#[test]
fn create_and_load_validation_ladder() {
    let dir = tempfile::tempdir().unwrap();
    let _index = populated_index(dir.path());

    // A second create at the same path refuses to clobber the sidecar.
    let err =
        HybridIndex::<Article>::create(dir.path(), HybridIndexConfig::new(DIM as u32), None)
            .unwrap_err();
    assert!(matches!(err, HybridError::IndexAlreadyExists(_)));

    // Loading as a different document shape trips the fingerprint check.
    #[derive(Debug, Serialize, Deserialize)]
    struct Renamed {
        ident: String,
        title: String,
    }
    impl Document for Renamed {
        type Field = ArticleField;
        const FIELDS: &'static [FieldDef] = &[
            FieldDef::new("ident", FieldRole::Id),
            FieldDef::new("title", FieldRole::Text),
        ];
    }
    let err = HybridIndex::<Renamed>::load(dir.path(), None).unwrap_err();
    assert!(matches!(err, HybridError::MetadataCorrupt(_)));

    // A primary-id override must name an id field.
    let err = HybridIndex::<Article>::load(dir.path(), Some("title")).unwrap_err();
    assert!(matches!(err, HybridError::InvalidPrimaryIdField(_)));

    // Loading an empty directory reports missing metadata.
    let empty = tempfile::tempdir().unwrap();
    let err = HybridIndex::<Article>::load(empty.path(), None).unwrap_err();
    assert!(matches!(err, HybridError::MetadataMissing(_)));
}

#[test]
fn id_field_declaration_errors() {
    #[derive(Debug, Serialize, Deserialize)]
    struct NoId {
        body: String,
    }
    impl Document for NoId {
        type Field = ArticleField;
        const FIELDS: &'static [FieldDef] = &[FieldDef::new("body", FieldRole::Text)];
    }
    let dir = tempfile::tempdir().unwrap();
    let err = HybridIndex::<NoId>::create(dir.path(), HybridIndexConfig::new(8), None).unwrap_err();
    assert!(matches!(err, HybridError::MissingIdField));

    #[derive(Debug, Serialize, Deserialize)]
    struct TwoIds {
        uuid: String,
        slug: String,
    }
    impl Document for TwoIds {
        type Field = ArticleField;
        const FIELDS: &'static [FieldDef] = &[
            FieldDef::new("uuid", FieldRole::Id),
            FieldDef::new("slug", FieldRole::Id),
        ];
    }
    let dir = tempfile::tempdir().unwrap();
    let err =
        HybridIndex::<TwoIds>::create(dir.path(), HybridIndexConfig::new(8), None).unwrap_err();
    match err {
        HybridError::AmbiguousIdField(fields) => assert_eq!(fields, vec!["uuid", "slug"]),
        other => panic!("expected AmbiguousIdField, got {other:?}"),
    }

    let dir = tempfile::tempdir().unwrap();
    let err = HybridIndex::<TwoIds>::create(dir.path(), HybridIndexConfig::new(8), Some("nope"))
        .unwrap_err();
    assert!(matches!(err, HybridError::InvalidPrimaryIdField(_)));

    // Designating one of the ids resolves the ambiguity.
    let dir = tempfile::tempdir().unwrap();
    let index = HybridIndex::<TwoIds>::create(dir.path(), HybridIndexConfig::new(8), Some("slug"))
        .unwrap();
    assert_eq!(index.primary_id_field(), "slug");
}

#[test]
fn batch_insert_allocates_contiguous_ids_and_empty_batch_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let index = HybridIndex::<Article>::create(dir.path(), HybridIndexConfig::new(DIM as u32), None)
        .unwrap();

    assert!(index.add_batch(&[]).unwrap().is_empty());

    let first = index.add_batch(&corpus()).unwrap();
    assert_eq!(first, vec![0, 1, 2, 3]);

    let second = index
        .add(&article("extra-1", "Extra", "One more.", true), &axis(5))
        .unwrap();
    assert_eq!(second, 4);
    index.commit().unwrap();
    assert_eq!(index.count(), 5);
}

#[test]
fn clear_resets_corpus_and_doc_id_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let index = populated_index(dir.path());

    index.clear().unwrap();
    assert_eq!(index.count(), 0);
    assert!(index.get_by_id(ArticleField::Id, "swift-1").unwrap().is_none());

    let doc_id = index
        .add(&article("again-1", "Again", "Fresh start.", true), &axis(0))
        .unwrap();
    assert_eq!(doc_id, 0);
    index.commit().unwrap();
    assert_eq!(index.count(), 1);
}

#[test]
fn compact_preserves_live_documents() {
    let dir = tempfile::tempdir().unwrap();
    let index = populated_index(dir.path());

    index.delete_by_id(ArticleField::Id, "tantivy-1", true).unwrap();
    index.compact().unwrap();

    let hits = index
        .search_vector(
            &axis(0),
            None,
            &VectorSearchParams {
                limit: 4,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(hits[0].doc.id, "swift-1");
    assert!(hits.iter().all(|h| h.doc.id != "tantivy-1"));
}

#[test]
fn text_search_supports_offset_paging() {
    let dir = tempfile::tempdir().unwrap();
    let index = populated_index(dir.path());

    // Match-all through a blank query; pages must not overlap.
    let query = HybridTextQuery::<Article>::new("");
    let first = index.search_text(&query, None, 2, 0).unwrap();
    let second = index.search_text(&query, None, 2, 2).unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    let first_ids: Vec<u64> = first.iter().map(|h| h.doc_id).collect();
    assert!(second.iter().all(|h| !first_ids.contains(&h.doc_id)));
}
