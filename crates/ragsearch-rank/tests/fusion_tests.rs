use std::collections::HashMap;

use ragsearch_rank::fusion::{min_max_normalize, ranked_list};
use ragsearch_rank::{rrf_fusion, sorted_by_score, weighted_fusion, RankedList, DEFAULT_RRF_K};
use ragsearch_core::types::{ChunkRef, SearchHit, SourceKind};

const EPS: f64 = 1e-9;

fn list(items: &[(&str, f64)]) -> RankedList {
    items.iter().map(|(id, s)| (id.to_string(), *s)).collect()
}

fn scores(items: &[(&str, f64)]) -> HashMap<String, f64> {
    items.iter().map(|(id, s)| (id.to_string(), *s)).collect()
}

#[test]
fn rrf_same_item_first_in_two_lists() {
    let fused = rrf_fusion(&[list(&[("A", 0.9)]), list(&[("A", 0.1)])], 60);
    assert!((fused["A"] - 2.0 / 61.0).abs() < EPS);
    assert!((fused["A"] - 0.03279).abs() < 1e-5);
}

#[test]
fn rrf_is_deterministic_and_ignores_raw_scores() {
    let rankings = vec![list(&[("a", 100.0), ("b", 50.0), ("c", 1.0)]), list(&[("c", 0.3), ("a", 0.2)])];
    let first = rrf_fusion(&rankings, DEFAULT_RRF_K);
    let second = rrf_fusion(&rankings, DEFAULT_RRF_K);
    assert_eq!(first, second);
    let rescored = vec![list(&[("a", 1.0), ("b", 0.5), ("c", 0.1)]), list(&[("c", 9.0), ("a", 8.0)])];
    assert_eq!(first, rrf_fusion(&rescored, DEFAULT_RRF_K));
    assert!((first["a"] - (1.0 / 61.0 + 1.0 / 62.0)).abs() < EPS);
    assert!((first["b"] - 1.0 / 62.0).abs() < EPS);
}

#[test]
fn rrf_empty_inputs() {
    assert!(rrf_fusion(&[], 60).is_empty());
    assert!(rrf_fusion(&[Vec::new(), Vec::new()], 60).is_empty());
    let one = rrf_fusion(&[Vec::new(), list(&[("x", 1.0)])], 60);
    assert_eq!(one.len(), 1);
}

#[test]
fn end_to_end_fusion_scenario() {
    let vector = list(&[("doc1:0", 0.95)]);
    let lexical = list(&[("doc1:0", 0.85), ("doc2:1", 0.5)]);
    let fused = rrf_fusion(&[vector, lexical], 60);
    assert!((fused["doc1:0"] - 0.0328).abs() < 1e-4);
    assert!((fused["doc2:1"] - 0.0161).abs() < 1e-4);
    let order: Vec<String> = sorted_by_score(&fused).into_iter().map(|(id, _)| id).collect();
    assert_eq!(order, vec!["doc1:0".to_string(), "doc2:1".to_string()]);
}

#[test]
fn weighted_fusion_normalizes_each_side() {
    let fused = weighted_fusion(&scores(&[("A", 5.0), ("B", 10.0)]), &HashMap::new(), 0.6, 0.4);
    assert_eq!(fused.len(), 2);
    assert!(fused["A"].abs() < EPS);
    assert!((fused["B"] - 0.6).abs() < EPS);
}

#[test]
fn weighted_fusion_union_of_keys() {
    let fused = weighted_fusion(&scores(&[("A", 1.0), ("B", 3.0)]), &scores(&[("B", 2.0), ("C", 4.0)]), 0.5, 0.5);
    assert!(fused["A"].abs() < EPS);
    assert!((fused["B"] - 0.5).abs() < EPS);
    assert!((fused["C"] - 0.5).abs() < EPS);
}

#[test]
fn equal_scores_normalize_to_one() {
    let norm = min_max_normalize(&scores(&[("A", 3.0), ("B", 3.0)]));
    assert_eq!(norm["A"], 1.0);
    assert_eq!(norm["B"], 1.0);
    assert!(min_max_normalize(&HashMap::new()).is_empty());
}

#[test]
fn sorted_by_score_breaks_ties_by_id() {
    let order = sorted_by_score(&scores(&[("b", 1.0), ("a", 1.0), ("c", 2.0)]));
    let ids: Vec<&str> = order.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
}

#[test]
fn ranked_list_preserves_hit_order() {
    let hits = vec![
        SearchHit::new(ChunkRef::new("d", 1), 0.2, SourceKind::Text),
        SearchHit::new(ChunkRef::new("d", 0), 0.9, SourceKind::Text),
    ];
    let ranked = ranked_list(&hits);
    assert_eq!(ranked[0].0, "d:1");
    assert_eq!(ranked[1].0, "d:0");
}
