//! Integration tests for annserve
//!
//! These tests exercise the public API end to end: build, query, persist,
//! restore and serve.

use annserve::{
    config::ServerConfig,
    daemon::{http::AppState, HttpServer, QueryService},
    import::parse_upload,
    index::{HnswParams, IndexError, Metric, PersistenceCodec},
    types::{Vector, VectorId},
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn params(metric: Metric, seed: u64) -> HnswParams {
    HnswParams {
        metric,
        m: 16,
        ef_construction: 200,
        seed: Some(seed),
    }
}

/// Well-separated gaussian-ish clusters with ids starting at 1000
fn clustered_rows(clusters: usize, per_cluster: usize, dims: usize, seed: u64) -> Vec<(VectorId, Vector)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let centers: Vec<Vector> = (0..clusters)
        .map(|_| (0..dims).map(|_| rng.gen_range(-100.0..100.0)).collect())
        .collect();

    let mut rows = Vec::with_capacity(clusters * per_cluster);
    for i in 0..clusters * per_cluster {
        let center = &centers[i % clusters];
        let vector = center.iter().map(|c| c + rng.gen_range(-1.0..1.0)).collect();
        rows.push((1000 + i as VectorId, vector));
    }
    rows
}

fn brute_force(rows: &[(VectorId, Vector)], query: &[f32], k: usize, metric: Metric) -> Vec<VectorId> {
    let mut scored: Vec<(f32, VectorId)> = rows
        .iter()
        .map(|(id, v)| (metric.distance(query, v), *id))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.into_iter().take(k).map(|(_, id)| id).collect()
}

fn square_service() -> QueryService {
    let service = QueryService::new(params(Metric::L2, 7), 50).unwrap();
    service
        .rebuild(vec![
            (1, vec![0.0, 0.0]),
            (2, vec![1.0, 0.0]),
            (3, vec![0.0, 1.0]),
            (4, vec![5.0, 5.0]),
        ])
        .unwrap();
    service
}

#[test]
fn test_square_scenario() {
    let service = square_service();

    let hits = service.query(1, 2).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!((hits[0].id, hits[0].distance), (1, 0.0));
    // 2 and 3 are equidistant from 1; the earlier row wins
    assert_eq!((hits[1].id, hits[1].distance), (2, 1.0));

    let hits = service.query(4, 4).unwrap();
    let ids: Vec<VectorId> = hits.iter().map(|h| h.id).collect();
    assert_eq!(ids[0], 4);
    assert_eq!(ids[3], 1);
    assert_eq!(hits[3].distance, 50.0);
}

#[test]
fn test_every_vector_finds_itself_first() {
    let rows = clustered_rows(10, 30, 8, 11);
    let service = QueryService::new(params(Metric::L2, 3), 64).unwrap();
    service.rebuild(rows.clone()).unwrap();

    for (id, _) in &rows {
        let hits = service.query(*id, 1).unwrap();
        assert_eq!(hits[0].id, *id);
        assert_eq!(hits[0].distance, 0.0);
    }
}

#[test]
fn test_recall_on_clustered_data() {
    let rows = clustered_rows(20, 50, 16, 42);
    let service = QueryService::new(params(Metric::L2, 42), 100).unwrap();
    service.rebuild(rows.clone()).unwrap();

    let k = 10;
    let mut found = 0;
    let mut expected = 0;
    for (id, vector) in rows.iter().step_by(7) {
        let truth = brute_force(&rows, vector, k, Metric::L2);
        let hits = service.query(*id, k).unwrap();
        expected += truth.len();
        found += hits.iter().filter(|h| truth.contains(&h.id)).count();
    }

    let recall = found as f64 / expected as f64;
    assert!(recall >= 0.95, "recall {:.3} below 0.95", recall);
}

#[test]
fn test_repeated_rows_keep_self_match_and_recall() {
    // Same documents uploaded twice under different ids
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let unique: Vec<Vector> = (0..500)
        .map(|_| (0..8).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();
    let rows: Vec<(VectorId, Vector)> = (0..2u64)
        .flat_map(|copy| {
            unique
                .iter()
                .enumerate()
                .map(move |(i, v)| (copy * 500 + i as VectorId, v.clone()))
        })
        .collect();

    let service = QueryService::new(params(Metric::L2, 7), 100).unwrap();
    service.rebuild(rows.clone()).unwrap();

    for (id, _) in &rows {
        let hits = service.query(*id, 2).unwrap();
        assert_eq!(hits[0].distance, 0.0);
        assert!(hits.iter().any(|h| h.id == *id), "id {} missing from its own query", id);
    }

    let mut misses = 0;
    for (_, vector) in rows.iter().step_by(5) {
        let shifted: Vector = vector.iter().map(|x| x + 0.01).collect();
        let truth = brute_force(&rows, &shifted, 1, Metric::L2)[0];
        let hits = service.query_by_vector(&shifted, 10, None).unwrap();
        if !hits.iter().any(|h| h.id == truth) {
            misses += 1;
        }
    }
    assert!(misses * 20 <= 200, "{} of 200 queries missed the true neighbor", misses);
}

#[test]
fn test_cosine_metric_queries() {
    let rows = vec![
        (1, vec![1.0, 0.0]),
        (2, vec![10.0, 0.5]),
        (3, vec![0.0, 1.0]),
        (4, vec![-1.0, 0.0]),
    ];
    let service = QueryService::new(params(Metric::Cosine, 1), 16).unwrap();
    service.rebuild(rows).unwrap();

    let hits = service.query_by_vector(&[2.0, 0.0], 4, None).unwrap();
    let ids: Vec<VectorId> = hits.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert!(hits[0].distance.abs() < 1e-6);
}

#[test]
fn test_k_larger_than_index_returns_everything() {
    let service = square_service();
    let hits = service.query(3, 100).unwrap();
    assert_eq!(hits.len(), 4);
    for pair in hits.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[test]
fn test_same_seed_builds_identical_indexes() {
    let rows = clustered_rows(5, 40, 6, 9);

    let a = QueryService::new(params(Metric::L2, 123), 40).unwrap();
    let b = QueryService::new(params(Metric::L2, 123), 40).unwrap();
    a.rebuild(rows.clone()).unwrap();
    b.rebuild(rows.clone()).unwrap();

    let dir = TempDir::new().unwrap();
    a.persist(dir.path().join("a.bin")).unwrap();
    b.persist(dir.path().join("b.bin")).unwrap();
    let bytes_a = std::fs::read(dir.path().join("a.bin")).unwrap();
    let bytes_b = std::fs::read(dir.path().join("b.bin")).unwrap();
    assert_eq!(bytes_a, bytes_b);

    for (id, _) in rows.iter().take(20) {
        assert_eq!(a.query(*id, 5).unwrap(), b.query(*id, 5).unwrap());
    }
}

#[test]
fn test_save_and_load_answer_identically() {
    let rows = clustered_rows(8, 25, 12, 5);
    let built = QueryService::new(params(Metric::L2, 8), 64).unwrap();
    built.rebuild(rows.clone()).unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("index_optim.bin");
    built.persist(&path).unwrap();
    assert!(!dir.path().join("nested").join("index_optim.bin.tmp").exists());

    let header = PersistenceCodec::read_header(&path).unwrap();
    assert_eq!(header.count, 200);
    assert_eq!(header.dimensions, 12);

    let loaded = QueryService::new(params(Metric::L2, 99), 64).unwrap();
    let stats = loaded.restore(&path).unwrap();
    assert!(stats.loaded);
    assert_eq!(stats.vectors, 200);

    for (id, vector) in rows.iter().step_by(5) {
        assert_eq!(built.query(*id, 10).unwrap(), loaded.query(*id, 10).unwrap());
        assert_eq!(
            built.query_by_vector(vector, 3, Some(20)).unwrap(),
            loaded.query_by_vector(vector, 3, Some(20)).unwrap()
        );
    }
}

#[test]
fn test_failed_operations_keep_served_index() {
    let service = square_service();

    assert!(matches!(service.rebuild(Vec::new()), Err(IndexError::EmptyInput)));
    assert!(matches!(
        service.rebuild(vec![(1, vec![0.0, 0.0]), (1, vec![1.0, 1.0])]),
        Err(IndexError::DuplicateId(1))
    ));
    assert!(matches!(
        service.rebuild(vec![(1, vec![0.0, 0.0]), (2, vec![1.0])]),
        Err(IndexError::DimensionMismatch { .. })
    ));

    let dir = TempDir::new().unwrap();
    let broken = dir.path().join("broken.bin");
    std::fs::write(&broken, b"HNSW\x01\x00").unwrap();
    assert!(service.restore(&broken).is_err());

    assert_eq!(service.stats().vectors, 4);
    assert_eq!(service.query(4, 1).unwrap()[0].id, 4);
}

#[test]
fn test_query_errors() {
    let service = QueryService::new(params(Metric::L2, 1), 10).unwrap();
    assert!(matches!(service.query(1, 1), Err(IndexError::NoIndexLoaded)));
    assert!(matches!(
        service.query_by_vector(&[0.0, 0.0], 1, None),
        Err(IndexError::NoIndexLoaded)
    ));

    let service = square_service();
    assert!(matches!(service.query(42, 1), Err(IndexError::NotFound(_))));
    assert!(matches!(
        service.query_by_vector(&[0.0, 0.0, 0.0], 1, None),
        Err(IndexError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_queries_during_rebuild() {
    let service = Arc::new(square_service());
    let replacement = clustered_rows(4, 50, 2, 77);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let service = service.clone();
            scope.spawn(move || {
                for _ in 0..200 {
                    // Either the old or the new index answers, never a mix
                    match service.query(1, 1) {
                        Ok(hits) => assert_eq!(hits[0].id, 1),
                        Err(IndexError::NotFound(_)) => {
                            let hits = service.query(1000, 1).unwrap();
                            assert_eq!(hits[0].id, 1000);
                        }
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            });
        }

        for _ in 0..3 {
            service.rebuild(replacement.clone()).unwrap();
        }
    });

    assert_eq!(service.stats().vectors, 200);
}

#[test]
fn test_upload_parsing_feeds_rebuild() {
    let rows = parse_upload(b"0 0\n1 0\n\n0 1\n5 5\n", b"1\n2\n3\n4\n").unwrap();
    let service = QueryService::new(params(Metric::L2, 7), 50).unwrap();
    let summary = service.rebuild(rows).unwrap();
    assert_eq!(summary.vectors_indexed, 4);
    assert_eq!(summary.dimensions, 2);
    assert_eq!(service.query(3, 1).unwrap()[0].id, 3);
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_http_server_serves_queries() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(square_service());
    let state = AppState::new(service, dir.path().join("index.bin"), false);
    let server = HttpServer::new(ServerConfig::default(), state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        server
            .serve(listener, async move {
                let _ = stop_rx.await;
            })
            .await
    });

    let health = http_get(addr, "/health").await;
    assert!(health.starts_with("HTTP/1.1 200"));

    let neighbors = http_get(addr, "/vector/1?num=2").await;
    assert!(neighbors.starts_with("HTTP/1.1 200"));
    assert!(neighbors.contains(r#"{"id":1,"distance":0.0}"#));
    assert!(neighbors.contains(r#"{"id":2,"distance":1.0}"#));

    let missing = http_get(addr, "/vector/99").await;
    assert!(missing.starts_with("HTTP/1.1 404"));

    stop_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
