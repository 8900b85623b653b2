use notebooklm::auth::{Cookie, CookieStore, TokenAuthority};
use notebooklm::config::{EndpointsConfig, TimeoutsConfig};
use notebooklm::security::MemoryKeyVault;
use notebooklm::{CallOptions, NotebookError, RpcClient};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{body_string_contains, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BATCH_PATH: &str = "/_/NotebookLmFrontendUi/data/batchexecute";
const LANDING_PAGE: &str = r#"<html><script>WIZ_global_data = {"SNlM0e":"csrf-tok"};</script></html>"#;

fn batch_response(call_id: &str, result: &serde_json::Value) -> String {
    let chunk = json!([["wrb.fr", call_id, result.to_string()]]).to_string();
    format!(")]}}'\n{}\n{}\n", chunk.len(), chunk)
}

fn authority(server: &MockServer, dir: &TempDir, timeouts: &TimeoutsConfig) -> Arc<TokenAuthority> {
    authority_at(server.uri(), dir, timeouts)
}

fn authority_at(base_url: String, dir: &TempDir, timeouts: &TimeoutsConfig) -> Arc<TokenAuthority> {
    let store = CookieStore::new(
        dir.path().join("cookies.json"),
        Arc::new(MemoryKeyVault::new()),
        vec!["127.0.0.1".to_string()],
    );
    store
        .save(vec![
            Cookie::new("SID", "sid-value", "127.0.0.1"),
            Cookie::new("SAPISID", "secret-value", "127.0.0.1"),
        ])
        .unwrap();
    Arc::new(TokenAuthority::new(
        Arc::new(store),
        EndpointsConfig::with_base_url(base_url),
        timeouts,
    ))
}

async fn mount_landing_page(server: &MockServer, times: u64) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LANDING_PAGE))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn call_sends_form_and_decodes_result() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_landing_page(&server, 1).await;

    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .and(query_param("rpcids", "wXbhsf"))
        .and(query_param("source-path", "/"))
        .and(query_param("rt", "c"))
        .and(query_param("hl", "en"))
        .and(query_param("_reqid", "100000"))
        .and(header("x-same-domain", "1"))
        .and(header_exists("authorization"))
        .and(body_string_contains("at=csrf-tok&"))
        .and(body_string_contains("f.req="))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(batch_response("wXbhsf", &json!([1, 2]))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = RpcClient::new(
        authority(&server, &dir, &TimeoutsConfig::default()),
        Duration::from_secs(5),
    );
    let result = client.call("wXbhsf", &json!([null, 1])).await.unwrap();
    assert_eq!(result, Some(json!([1, 2])));
}

#[tokio::test]
async fn missing_envelope_is_none() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_landing_page(&server, 1).await;

    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(batch_response("other", &json!(["x"]))),
        )
        .mount(&server)
        .await;

    let client = RpcClient::new(
        authority(&server, &dir, &TimeoutsConfig::default()),
        Duration::from_secs(5),
    );
    assert_eq!(client.call("wXbhsf", &json!([])).await.unwrap(), None);
}

#[tokio::test]
async fn source_path_override_is_sent() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_landing_page(&server, 1).await;

    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .and(query_param("source-path", "/notebook/nb-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(batch_response("rLM1Ne", &json!([]))))
        .expect(1)
        .mount(&server)
        .await;

    let client = RpcClient::new(
        authority(&server, &dir, &TimeoutsConfig::default()),
        Duration::from_secs(5),
    );
    let options = CallOptions::default().source_path("/notebook/nb-1");
    let result = client.call_with("rLM1Ne", &json!(["nb-1"]), &options).await.unwrap();
    assert_eq!(result, Some(json!([])));
}

#[tokio::test]
async fn csrf_token_is_cached_between_calls() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_landing_page(&server, 1).await;

    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(batch_response("a", &json!(1))))
        .expect(2)
        .mount(&server)
        .await;

    let client = RpcClient::new(
        authority(&server, &dir, &TimeoutsConfig::default()),
        Duration::from_secs(5),
    );
    client.call("a", &json!([])).await.unwrap();
    client.call("a", &json!([])).await.unwrap();
}

#[tokio::test]
async fn expired_csrf_token_is_refetched() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_landing_page(&server, 2).await;

    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(batch_response("a", &json!(1))))
        .expect(2)
        .mount(&server)
        .await;

    let timeouts = TimeoutsConfig {
        csrf_ttl_secs: 0,
        ..TimeoutsConfig::default()
    };
    let client = RpcClient::new(authority(&server, &dir, &timeouts), Duration::from_secs(5));
    client.call("a", &json!([])).await.unwrap();
    client.call("a", &json!([])).await.unwrap();
}

#[tokio::test]
async fn unauthorized_is_retried_then_reported() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    // Each failed attempt drops the token, so every attempt refetches it.
    mount_landing_page(&server, 3).await;

    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(3)
        .mount(&server)
        .await;

    let client = RpcClient::new(
        authority(&server, &dir, &TimeoutsConfig::default()),
        Duration::from_secs(5),
    );
    let err = client.call("a", &json!([])).await.unwrap_err();
    assert!(matches!(err, NotebookError::Authentication(_)), "{err:?}");
}

/// Read one request head; the body, if any, is ignored.
async fn read_request_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Serves the landing page and hangs up on every POST without answering.
async fn hang_up_server(posts: Arc<AtomicUsize>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let head = read_request_head(&mut stream).await;
            if head.starts_with("POST") {
                posts.fetch_add(1, Ordering::SeqCst);
                continue;
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                LANDING_PAGE.len(),
                LANDING_PAGE
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn dropped_connection_is_retried_then_unexpected() {
    let posts = Arc::new(AtomicUsize::new(0));
    let base_url = hang_up_server(Arc::clone(&posts)).await;
    let dir = TempDir::new().unwrap();

    let client = RpcClient::new(
        authority_at(base_url, &dir, &TimeoutsConfig::default()),
        Duration::from_secs(5),
    );
    let err = client.call("a", &json!([])).await.unwrap_err();

    assert!(matches!(err, NotebookError::Unexpected(_)), "{err:?}");
    assert_eq!(err.category(), "UNEXPECTED_ERROR");
    assert_eq!(posts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn rejection_envelope_is_an_auth_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_landing_page(&server, 3).await;

    let chunk = json!([["wrb.fr", "a", null, null, null, [16], "generic"]]).to_string();
    let body = format!(")]}}'\n{}\n{}\n", chunk.len(), chunk);
    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(3)
        .mount(&server)
        .await;

    let client = RpcClient::new(
        authority(&server, &dir, &TimeoutsConfig::default()),
        Duration::from_secs(5),
    );
    let err = client.call("a", &json!([])).await.unwrap_err();
    assert!(matches!(err, NotebookError::Authentication(_)), "{err:?}");
}

#[tokio::test]
async fn server_error_is_not_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_landing_page(&server, 1).await;

    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = RpcClient::new(
        authority(&server, &dir, &TimeoutsConfig::default()),
        Duration::from_secs(5),
    );
    let err = client.call("a", &json!([])).await.unwrap_err();
    assert!(matches!(err, NotebookError::Validation(_)), "{err:?}");
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_landing_page(&server, 1).await;

    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(batch_response("a", &json!(1)))
                .set_delay(Duration::from_secs(3)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = RpcClient::new(
        authority(&server, &dir, &TimeoutsConfig::default()),
        Duration::from_secs(30),
    );
    let options = CallOptions::default().timeout(Duration::from_millis(200));
    let err = client.call_with("a", &json!([]), &options).await.unwrap_err();
    assert!(matches!(err, NotebookError::Timeout(_)), "{err:?}");
}

#[tokio::test]
async fn redirected_landing_page_means_expired_cookies() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "https://accounts.example/login"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let authority = authority(&server, &dir, &TimeoutsConfig::default());
    let err = authority.get_csrf_token().await.unwrap_err();
    assert!(matches!(err, NotebookError::Authentication(_)));
    assert!(err.to_string().contains("Redirected"), "{err}");
}

#[tokio::test]
async fn missing_cookies_fail_before_any_request() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LANDING_PAGE))
        .expect(0)
        .mount(&server)
        .await;

    let store = CookieStore::new(
        dir.path().join("cookies.json"),
        Arc::new(MemoryKeyVault::new()),
        vec!["127.0.0.1".to_string()],
    );
    let authority = Arc::new(TokenAuthority::new(
        Arc::new(store),
        EndpointsConfig::with_base_url(server.uri()),
        &TimeoutsConfig::default(),
    ));
    let client = RpcClient::new(authority, Duration::from_secs(5));
    let err = client.call("a", &json!([])).await.unwrap_err();
    assert!(matches!(err, NotebookError::Authentication(_)));
}
