use std::io::Write;

use mockito::Matcher;
use newsdesk::llm::remote::RemoteInferenceProvider;
use newsdesk::llm::{InferenceError, InferenceProvider, PartialSummary};
use serde_json::json;

#[tokio::test]
async fn test_remote_provider_returns_summary_text() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .match_header("authorization", "Bearer fake-api-key")
        .match_body(Matcher::Json(json!({ "inputs": "Summarize this." })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"summary_text": "A short summary."}]"#)
        .create_async()
        .await;

    let provider = RemoteInferenceProvider::new(server.url(), "fake-api-key");
    let result = provider.summarize("Summarize this.").await;

    assert_eq!(
        result.expect("summary"),
        PartialSummary::Summarized("A short summary.".to_string())
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_remote_provider_missing_summary_is_empty() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"generated_text": "wrong task"}]"#)
        .create_async()
        .await;

    let provider = RemoteInferenceProvider::new(server.url(), "fake-api-key");
    let result = provider.summarize("text").await.expect("parse");
    assert_eq!(result, PartialSummary::Empty);
}

#[tokio::test]
async fn test_remote_provider_error_field() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/")
        .with_status(503)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": "Model is currently loading", "estimated_time": 20.0}"#)
        .create_async()
        .await;

    let provider = RemoteInferenceProvider::new(server.url(), "fake-api-key");
    let err = provider.summarize("text").await.unwrap_err();

    match err {
        InferenceError::Upstream { detail } => {
            assert_eq!(detail, json!("Model is currently loading"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_remote_provider_http_error() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/")
        .with_status(500)
        .with_body("Internal Server Error")
        .create_async()
        .await;

    let provider = RemoteInferenceProvider::new(server.url(), "fake-api-key");
    let err = provider.summarize("text").await.unwrap_err();

    assert!(matches!(err, InferenceError::Status { status: 500, .. }));
}

#[tokio::test]
async fn test_remote_provider_timeout() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(std::time::Duration::from_millis(1500));
            w.write_all(br#"[{"summary_text": "too late"}]"#)
        })
        .create_async()
        .await;

    let provider = RemoteInferenceProvider::new(server.url(), "fake-api-key").with_defaults(1, 2);
    let err = provider.summarize("text").await.unwrap_err();

    assert!(matches!(err, InferenceError::Timeout));
}
