//! Vercel Blob and Edge Config contract tests against a mock server.

use api_lib::adapters::{EdgeConfigAdapter, VercelBlobAdapter};
use api_lib::config::EdgeConfigSettings;
use bytes::Bytes;
use serde_json::json;
use toy_stories_core::ports::{BlobStore, KeyValueStore, PortError, PutOptions};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn blob_adapter(server: &MockServer) -> VercelBlobAdapter {
    VercelBlobAdapter::new("blob-token".into(), server.uri())
}

#[tokio::test]
async fn put_sends_headers_and_returns_the_public_url() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/toy-1.bmp"))
        .and(header("authorization", "Bearer blob-token"))
        .and(header("x-api-version", "7"))
        .and(header("x-content-type", "image/bmp"))
        .and(header("x-add-random-suffix", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://store.public.blob.vercel-storage.com/toy-1.bmp",
            "pathname": "toy-1.bmp"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let url = blob_adapter(&server)
        .put("toy-1.bmp", Bytes::from_static(b"BM"), PutOptions::fixed("image/bmp"))
        .await
        .unwrap();

    assert_eq!(url, "https://store.public.blob.vercel-storage.com/toy-1.bmp");
}

#[tokio::test]
async fn json_snapshot_asks_for_a_random_suffix() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/stories-u1-1700000000000.json"))
        .and(header("x-content-type", "application/json"))
        .and(header("x-add-random-suffix", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://store.public.blob.vercel-storage.com/stories-u1-1700000000000-Xy12.json",
            "pathname": "stories-u1-1700000000000-Xy12.json"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let url = blob_adapter(&server)
        .put(
            "stories-u1-1700000000000.json",
            Bytes::from_static(b"[]"),
            PutOptions::json(),
        )
        .await
        .unwrap();

    assert!(url.ends_with("-Xy12.json"));
}

#[tokio::test]
async fn list_follows_the_cursor_until_no_more_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("prefix", "userData"))
        .and(query_param("cursor", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "blobs": [{ "url": "https://b/userData-2.json", "pathname": "userData-2.json", "size": 20 }],
            "hasMore": false
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("prefix", "userData"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "blobs": [{ "url": "https://b/userData-1.json", "pathname": "userData-1.json", "size": 10 }],
            "cursor": "page-2",
            "hasMore": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let blobs = blob_adapter(&server).list("userData").await.unwrap();

    let pathnames: Vec<_> = blobs.iter().map(|b| b.pathname.as_str()).collect();
    assert_eq!(pathnames, ["userData-1.json", "userData-2.json"]);
}

#[tokio::test]
async fn get_of_a_missing_blob_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stories-gone.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = blob_adapter(&server)
        .get(&format!("{}/stories-gone.json", server.uri()))
        .await;

    assert!(matches!(result, Err(PortError::NotFound(_))));
}

#[tokio::test]
async fn edge_config_set_upserts_one_item() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/v1/edge-config/ecfg_123/items"))
        .and(header("authorization", "Bearer vercel-token"))
        .and(body_json(json!({
            "items": [{
                "operation": "upsert",
                "key": "userData_demo",
                "value": { "language": "Spanish" }
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = EdgeConfigAdapter::new(EdgeConfigSettings {
        config_id: "ecfg_123".into(),
        api_token: "vercel-token".into(),
        api_base_url: server.uri(),
    });

    adapter
        .set("userData_demo", json!({ "language": "Spanish" }))
        .await
        .unwrap();
}

#[tokio::test]
async fn edge_config_rejection_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let adapter = EdgeConfigAdapter::new(EdgeConfigSettings {
        config_id: "ecfg_123".into(),
        api_token: "wrong".into(),
        api_base_url: server.uri(),
    });

    let result = adapter.set("userData_demo", json!({})).await;

    match result {
        Err(PortError::Unexpected(message)) => assert!(message.contains("403")),
        other => panic!("expected an error, got {other:?}"),
    }
}
