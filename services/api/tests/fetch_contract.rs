//! Image download contract tests against a mock server.

use api_lib::adapters::HttpImageFetcher;
use toy_stories_core::ports::{ImageFetcher, PortError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn fetch_returns_the_bytes_without_writing_a_copy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/f/k1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/webp; charset=binary")
                .set_body_bytes(b"RIFF".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let downloads = dir.path().join("downloads");
    let fetcher = HttpImageFetcher::new(downloads.clone());

    let image = fetcher
        .fetch(&format!("{}/f/k1", server.uri()))
        .await
        .unwrap();

    assert_eq!(&image.bytes[..], b"RIFF");
    assert_eq!(image.mime_type, "image/webp");
    assert!(!downloads.exists());
}

#[tokio::test]
async fn failed_download_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = HttpImageFetcher::new(dir.path().to_path_buf());

    let result = fetcher.fetch(&format!("{}/f/gone", server.uri())).await;

    assert!(matches!(result, Err(PortError::Unexpected(_))));
}
