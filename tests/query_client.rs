use notebooklm::auth::{Cookie, CookieStore, TokenAuthority};
use notebooklm::config::{EndpointsConfig, TimeoutsConfig};
use notebooklm::security::MemoryKeyVault;
use notebooklm::{NotebookError, QueryClient, QueryRequest};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM_PATH: &str =
    "/_/NotebookLmFrontendUi/data/AssistantStreamService/GenerateFreeFormStreamed";
const LANDING_PAGE: &str = r#"<script>{"SNlM0e":"csrf-tok"}</script>"#;

fn stream_of(results: &[Value]) -> String {
    let mut text = String::from(")]}'\n");
    for result in results {
        let chunk = json!([["wrb.fr", null, result.to_string()]]).to_string();
        text.push_str(&format!("{}\n{}\n", chunk.len(), chunk));
    }
    text
}

async fn client(server: &MockServer, dir: &TempDir) -> QueryClient {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LANDING_PAGE))
        .mount(server)
        .await;

    let store = CookieStore::new(
        dir.path().join("cookies.json"),
        Arc::new(MemoryKeyVault::new()),
        vec!["127.0.0.1".to_string()],
    );
    store
        .save(vec![Cookie::new("SAPISID", "secret", "127.0.0.1")])
        .unwrap();
    let authority = TokenAuthority::new(
        Arc::new(store),
        EndpointsConfig::with_base_url(server.uri()),
        &TimeoutsConfig::default(),
    );
    QueryClient::new(Arc::new(authority), Duration::from_secs(5))
}

fn context() -> Value {
    json!([[null, "conv-1"], "a", "b", "c", "d"])
}

#[tokio::test]
async fn answer_sources_and_context() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir).await;

    let body = stream_of(&[
        json!([["Considering the sources in detail first", null, null, null, [0, 2]]]),
        json!([["The answer", null, null, null, [0, 1]]]),
        json!([
            ["The answer, complete.", null, null, null, [0, 1]],
            [["src-1", "Report.pdf"], ["src-2", "Notes"]],
            context()
        ]),
    ]);
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(query_param("rt", "c"))
        .and(body_string_contains("at=csrf-tok&"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let request = QueryRequest::new("nb-1", "What is it?").with_sources(["src-1"]);
    let result = client.query(&request).await.unwrap();

    assert_eq!(result.answer, "The answer, complete.");
    assert_eq!(result.sources, ["Report.pdf", "Notes"]);
    assert!(result.warnings.is_empty());
    assert_eq!(client.conversation("nb-1"), Some(context()));
}

#[tokio::test]
async fn follow_up_sends_cached_context() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir).await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(body_string_contains("conv-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(stream_of(&[json!([["Second"]])])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(stream_of(&[json!([["First"], context()])])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let first = client
        .query(&QueryRequest::new("nb-1", "Start"))
        .await
        .unwrap();
    assert_eq!(first.answer, "First");

    let second = client
        .query(&QueryRequest::new("nb-1", "And then?").follow_up(true))
        .await
        .unwrap();
    assert_eq!(second.answer, "Second");
}

#[tokio::test]
async fn conversations_can_be_cleared() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir).await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(stream_of(&[json!([["ok"], context()])])),
        )
        .mount(&server)
        .await;

    client.query(&QueryRequest::new("nb-1", "q")).await.unwrap();
    client.query(&QueryRequest::new("nb-2", "q")).await.unwrap();

    client.clear_conversation("nb-1");
    assert_eq!(client.conversation("nb-1"), None);
    assert!(client.conversation("nb-2").is_some());

    client.clear_all();
    assert_eq!(client.conversation("nb-2"), None);
}

#[tokio::test]
async fn conversations_keep_first_seen_order() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir).await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(stream_of(&[json!([["ok"], context()])])),
        )
        .mount(&server)
        .await;

    for notebook in ["nb-2", "nb-1", "nb-3", "nb-2"] {
        client.query(&QueryRequest::new(notebook, "q")).await.unwrap();
    }
    assert_eq!(client.conversation_ids(), ["nb-2", "nb-1", "nb-3"]);

    client.clear_conversation("nb-1");
    assert_eq!(client.conversation_ids(), ["nb-2", "nb-3"]);
}

#[tokio::test]
async fn empty_stream_yields_placeholder() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir).await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(")]}'\n"))
        .mount(&server)
        .await;

    let result = client.query(&QueryRequest::new("nb", "q")).await.unwrap();
    assert_eq!(result.answer, "No response received.");
    assert!(result.sources.is_empty());
    assert_eq!(client.conversation("nb"), None);
}

#[tokio::test]
async fn suspicious_answer_carries_warnings() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir).await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(stream_of(&[json!([["Hidden\u{200B}text"]])])),
        )
        .mount(&server)
        .await;

    let result = client.query(&QueryRequest::new("nb", "q")).await.unwrap();
    assert_eq!(result.answer, "Hiddentext");
    assert!(!result.warnings.is_empty());
}

#[tokio::test]
async fn forbidden_is_an_auth_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir).await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .query(&QueryRequest::new("nb", "q"))
        .await
        .unwrap_err();
    assert!(matches!(err, NotebookError::Authentication(_)), "{err:?}");
}
