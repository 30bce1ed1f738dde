use std::time::Duration;

use ragsearch_core::config::EndpointSettings;
use ragsearch_core::traits::Embedder;
use ragsearch_core::BackendError;
use ragsearch_embed::{get_default_embedder, HashingEmbedder, HttpEmbedder};

#[tokio::test]
async fn hashing_embedder_shapes_and_determinism() {
    let embedder = HashingEmbedder::new(256);
    let texts = vec!["hello world".to_string(), "hello world".to_string(), "other text".to_string()];
    let embs = embedder.embed_batch(&texts).await.expect("embed_batch");
    assert_eq!(embs.len(), 3);
    assert_eq!(embs[0].len(), 256);

    let norm: f32 = embs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in embs[0].iter().zip(embs[1].iter()) { assert!((a - b).abs() <= 1e-6); }
    assert_ne!(embs[0], embs[2]);
}

#[tokio::test]
async fn hashing_embedder_single_text() {
    let embedder = HashingEmbedder::new(64);
    let v = embedder.embed("Rust ownership").await.expect("embed");
    assert_eq!(v.len(), embedder.dim());
}

#[tokio::test]
async fn unreachable_remote_embedder_reports_backend_error() {
    let embedder = HttpEmbedder::new("http://127.0.0.1:9", "m", 8, Duration::from_millis(200));
    let err = embedder.embed("x").await.expect_err("nothing listens on port 9");
    assert!(matches!(err, BackendError::Unavailable(_) | BackendError::Timeout(_)));
}

#[test]
fn default_embedder_without_endpoint_is_local() {
    let endpoints = EndpointSettings { embedding_dim: 32, ..EndpointSettings::default() };
    let embedder = get_default_embedder(&endpoints, Duration::from_secs(1));
    assert_eq!(embedder.dim(), 32);
}
