use ragsearch_core::health::HealthProbe;
use ragsearch_core::traits::LexicalStore;
use ragsearch_core::types::{DocumentChunk, Filters, SourceKind};
use ragsearch_text::TantivyLexicalStore;

fn chunk(tenant: &str, doc: &str, idx: u32, source: &str, text: &str) -> DocumentChunk {
    DocumentChunk {
        tenant_id: tenant.into(),
        doc_id: doc.into(),
        chunk_index: idx,
        text: text.into(),
        section_path: String::new(),
        heading_path: vec![],
        source: source.into(),
        source_id: format!("{doc}-src"),
        version: 1,
    }
}

fn seed(store: &TantivyLexicalStore) {
    store
        .index(&[
            chunk("t1", "doc1", 0, "manual", "firecraft basics: building a fire with flint and steel"),
            chunk("t1", "doc1", 1, "manual", "storing water safely for long periods"),
            chunk("t1", "doc2", 0, "git", "fire safety around the campsite, fire extinguisher usage"),
            chunk("t2", "doc9", 0, "manual", "fire fire fire everywhere"),
        ])
        .expect("index");
}

#[tokio::test]
async fn search_is_tenant_scoped_and_ordered() {
    let store = TantivyLexicalStore::in_memory().expect("store");
    seed(&store);
    let hits = store.bm25_search("fire", 10, "t1", &Filters::new()).await.expect("search");
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.source == SourceKind::Text));
    assert!(hits.iter().all(|h| h.chunk.doc_id != "doc9"), "other tenant's chunks never leak");
    assert!(hits[0].score >= hits[1].score);
    assert_eq!(hits[0].id, format!("{}:{}", hits[0].chunk.doc_id, hits[0].chunk.chunk_index));
}

#[tokio::test]
async fn filters_restrict_hits() {
    let store = TantivyLexicalStore::in_memory().expect("store");
    seed(&store);
    let mut filters = Filters::new();
    filters.insert("source".into(), "git".into());
    let hits = store.bm25_search("fire", 10, "t1", &filters).await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "doc2:0");
}

#[tokio::test]
async fn reindexing_replaces_chunk() {
    let store = TantivyLexicalStore::in_memory().expect("store");
    seed(&store);
    store.index(&[chunk("t1", "doc1", 1, "manual", "water and fire storage")]).expect("reindex");
    let hits = store.bm25_search("water", 10, "t1", &Filters::new()).await.expect("search");
    assert_eq!(hits.len(), 1, "old copy of doc1:1 was deleted");
}

#[tokio::test]
async fn natural_language_queries_do_not_error() {
    let store = TantivyLexicalStore::in_memory().expect("store");
    seed(&store);
    let hits = store.bm25_search("what's the fire \"safety\" (rule?", 5, "t1", &Filters::new()).await.expect("lenient parse");
    assert!(!hits.is_empty());
    assert!(store.bm25_search("   ", 5, "t1", &Filters::new()).await.expect("empty").is_empty());
}

#[tokio::test]
async fn on_disk_index_survives_reopen() {
    let tmp = tempfile::tempdir().expect("tmp");
    {
        let store = TantivyLexicalStore::open_or_create(tmp.path()).expect("create");
        seed(&store);
    }
    let store = TantivyLexicalStore::open_or_create(tmp.path()).expect("reopen");
    let hits = store.bm25_search("flint", 5, "t1", &Filters::new()).await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "doc1:0");
}

#[tokio::test]
async fn health_check_fails_once_index_directory_is_gone() {
    let tmp = tempfile::tempdir().expect("tmp");
    let dir = tmp.path().join("lexical");
    let store = TantivyLexicalStore::open_or_create(&dir).expect("create");
    seed(&store);
    assert!(store.probe().await.is_ok());

    std::fs::remove_dir_all(&dir).expect("remove index dir");
    assert!(store.probe().await.is_err());
}

#[tokio::test]
async fn unsupported_filter_field_is_an_error() {
    let store = TantivyLexicalStore::in_memory().expect("store");
    seed(&store);
    let mut filters = Filters::new();
    filters.insert("section_path".into(), "ops".into());
    assert!(store.bm25_search("fire", 10, "t1", &filters).await.is_err());
}
