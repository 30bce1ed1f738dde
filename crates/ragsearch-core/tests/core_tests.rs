use ragsearch_core::config::{Config, FusionMethod};
use ragsearch_core::types::{ChunkRef, DocumentChunk, ExpansionMode, SearchCandidate, SearchRequest, SearchResult};

#[test]
fn empty_config_yields_defaults() {
    let config = Config::from_toml_str("").expect("config");
    let settings = config.settings().expect("settings");
    assert_eq!(settings.search.rrf_k, 60);
    assert_eq!(settings.search.fusion, FusionMethod::Rrf);
    assert_eq!(settings.cache.l1_capacity, 1024);
    assert!(settings.search.cache_enabled);
}

#[test]
fn toml_overrides_and_priorities() {
    let config = Config::from_toml_str(
        r#"
        [search]
        fusion = "weighted"
        vector_weight = 0.7
        lexical_weight = 0.3

        [search.source_priority]
        manual = 10
        git = 3
        "#,
    )
    .expect("config");
    let settings = config.settings().expect("settings");
    assert_eq!(settings.search.fusion, FusionMethod::Weighted);
    assert_eq!(settings.search.source_priority.get("manual"), Some(&10));
    assert_eq!(settings.search.rerank_top_n, 20, "unset keys keep their default");
    let fusion: String = config.get("search.fusion").expect("raw key");
    assert_eq!(fusion, "weighted");
}

#[test]
fn invalid_settings_are_rejected() {
    assert!(Config::from_toml_str("[search]\nmax_top_k = 0").is_err());
    assert!(Config::from_toml_str("[cache]\nl1_capacity = 0").is_err());
}

#[test]
fn chunk_ref_parses_ids_with_colons() {
    let r = ChunkRef::parse("s3://bucket/a.txt:4").expect("parse");
    assert_eq!(r.doc_id, "s3://bucket/a.txt");
    assert_eq!(r.chunk_index, 4);
    assert_eq!(r.id(), "s3://bucket/a.txt:4");
    assert!(ChunkRef::parse("no-index").is_none());
    assert!(ChunkRef::parse(":3").is_none());
    assert!(ChunkRef::parse("doc:x").is_none());
}

#[test]
fn expansion_flags_pick_one_mode() {
    let base = SearchRequest::new("q", "t1");
    assert_eq!(base.expansion(), ExpansionMode::None);
    assert_eq!(base.clone().with_decomposition().expansion(), ExpansionMode::Decomposition);
    assert_eq!(base.with_hyde().with_decomposition().expansion(), ExpansionMode::Hyde);
}

#[test]
fn request_deserializes_with_defaults() {
    let req: SearchRequest = serde_json::from_str(r#"{"query":"hello","tenant_id":"t1"}"#).expect("json");
    assert_eq!(req.top_k, 10);
    assert!(req.use_cache);
    assert!(!req.use_hyde);
    assert!(req.filters.is_empty());
}

#[test]
fn result_carries_citation() {
    let chunk = DocumentChunk {
        tenant_id: "t1".into(),
        doc_id: "doc1".into(),
        chunk_index: 2,
        text: "body".into(),
        section_path: "Install/Linux".into(),
        heading_path: vec!["Install".into(), "Linux".into()],
        source: "manual".into(),
        source_id: "guide".into(),
        version: 3,
    };
    let result = SearchResult::from(SearchCandidate::from_chunk(chunk, 0.5));
    assert_eq!(result.citation.doc_id, "doc1");
    assert_eq!(result.citation.chunk_index, 2);
    assert_eq!(result.citation.heading_path, vec!["Install".to_string(), "Linux".to_string()]);
    assert!(result.citation.label.contains("Install/Linux"));
    assert!(result.citation.label.contains("v3"));
}
