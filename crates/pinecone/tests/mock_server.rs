use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use prof_buzz_model::{
    Embedding, ErrorKind, IndexQuery, ProviderError, VectorIndex,
};
use prof_buzz_pinecone::{PineconeConfigBuilder, PineconeIndex};
use serde_json::{Value, json};
use tokio::net::TcpListener;

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn query() -> IndexQuery {
    IndexQuery {
        vector: Embedding(vec![0.1, 0.2, 0.3]),
        top_k: 3,
        include_metadata: true,
        namespace: Some("ns1".to_owned()),
    }
}

async fn query_handler(headers: HeaderMap, body: String) -> axum::Json<Value> {
    assert_eq!(headers.get("api-key").unwrap(), "pc-test");
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["topK"], 3);
    assert_eq!(body["namespace"], "ns1");
    assert_eq!(body["includeMetadata"], true);
    axum::Json(json!({
        "matches": [
            { "id": "P1", "score": 0.9, "metadata": { "subject": "Algorithms" } },
            { "id": "P2", "score": 0.8, "metadata": {} },
            { "id": "P3", "score": 0.7 },
        ],
        "namespace": "ns1",
    }))
}

#[tokio::test]
async fn test_query_with_host() {
    let router = Router::new().route("/query", post(query_handler));
    let host = serve(router).await;
    let index = PineconeIndex::new(
        PineconeConfigBuilder::with_api_key("pc-test")
            .with_host(host)
            .build(),
    );
    let matches = index.query(&query()).await.unwrap();
    let ids: Vec<_> = matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["P1", "P2", "P3"]);
    assert_eq!(matches[0].metadata["subject"], "Algorithms");
}

#[tokio::test]
async fn test_host_is_resolved_once() {
    let lookups = Arc::new(AtomicUsize::new(0));
    // The data plane and control plane share one mock server here, so the
    // host is filled in after binding.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new()
        .route(
            "/indexes/rag",
            get({
                let lookups = Arc::clone(&lookups);
                move || async move {
                    lookups.fetch_add(1, Ordering::SeqCst);
                    axum::Json(json!({
                        "name": "rag",
                        "host": format!("http://{addr}"),
                    }))
                }
            }),
        )
        .route("/query", post(query_handler));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let index = PineconeIndex::new(
        PineconeConfigBuilder::with_api_key("pc-test")
            .with_index_name("rag")
            .with_control_plane_url(format!("http://{addr}"))
            .build(),
    );
    for _ in 0..3 {
        let matches = index.clone().query(&query()).await.unwrap();
        assert_eq!(matches.len(), 3);
    }
    assert_eq!(lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_query_failure() {
    let router = Router::new().route(
        "/query",
        post(|| async { (StatusCode::FORBIDDEN, "bad key") }),
    );
    let host = serve(router).await;
    let index = PineconeIndex::new(
        PineconeConfigBuilder::with_api_key("pc-test")
            .with_host(host)
            .build(),
    );
    let err = index.query(&query()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}
