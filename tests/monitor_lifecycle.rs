use std::time::Duration;

use futures::StreamExt;
use http_monitor::interceptor::{IncomingResponse, OutgoingRequest};
use http_monitor::{
    CallFilter, ContentLength, ExportFormat, HttpMonitor, MonitorConfig, RetentionPeriod,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn config() -> MonitorConfig {
    MonitorConfig::builder()
        .sanitize_header(|name| name.eq_ignore_ascii_case("authorization"))
        .sanitize_header_with("[cookie]", |name| name.eq_ignore_ascii_case("cookie"))
        .max_content_length(ContentLength::Bytes(8))
        .retention_period(RetentionPeriod::OneDay)
        .build()
        .expect("valid config")
}

#[tokio::test]
async fn capture_export_and_reopen() {
    let storage_dir = tempfile::tempdir().unwrap();
    let monitor = HttpMonitor::install(config(), Some(storage_dir.path().to_path_buf()))
        .await
        .expect("monitor installs");
    let mut live = monitor.calls(CallFilter::default());
    assert!(live.next().await.unwrap().is_empty());

    let url = reqwest::Url::parse("https://api.example.com/v1/login").unwrap();
    let mut headers = http::HeaderMap::new();
    headers.insert("authorization", "Bearer secret".parse().unwrap());
    headers.insert("cookie", "sid=1".parse().unwrap());
    headers.insert("accept", "application/json".parse().unwrap());

    let interceptor = monitor.interceptor();
    let id = interceptor
        .on_request(&OutgoingRequest {
            method: "POST",
            url: &url,
            version: http::Version::HTTP_11,
            headers: &headers,
            body: Some(&b"user=alice&pass=hunter2"[..]),
        })
        .await
        .expect("tracked");

    let pending = tokio::time::timeout(Duration::from_secs(1), live.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].is_in_progress());
    assert!(pending[0].request_body.is_none(), "list view drops bodies");

    let response_headers = http::HeaderMap::new();
    interceptor
        .on_response(
            &id,
            &IncomingResponse {
                status: http::StatusCode::UNAUTHORIZED,
                version: http::Version::HTTP_2,
                headers: &response_headers,
                body: b"denied",
            },
        )
        .await;

    let call = monitor.call(&id).await.unwrap().expect("stored");
    assert!(call.is_terminal());
    assert!(call.is_failed());
    assert_eq!(call.request_body.as_deref(), Some(&b"user=ali"[..]));
    assert!(call.is_request_body_truncated);
    assert_eq!(call.request_content_length, 23);

    let text = monitor.export(&id, ExportFormat::Text).await.unwrap();
    assert_eq!(
        text,
        concat!(
            "POST https://api.example.com/v1/login HTTP/2.0\n",
            "authorization: ***\n",
            "cookie: [cookie]\n",
            "accept: application/json\n",
            "\n",
            "user=ali (truncated)\n",
            "\n",
            "HTTP/2.0 401\n",
            "\n",
            "denied\n",
            "\n",
        )
    );

    let share = monitor
        .export_to_dir(&id, ExportFormat::Curl, storage_dir.path().join("share"))
        .await
        .unwrap();
    assert!(std::fs::read_to_string(share)
        .unwrap()
        .starts_with("curl -X \"POST\""));

    drop(live);
    drop(monitor);

    let reopened = HttpMonitor::install(config(), Some(storage_dir.path().to_path_buf()))
        .await
        .expect("monitor reopens");
    let errors = reopened
        .list(&CallFilter {
            search_query: "LOGIN".into(),
            only_errors: true,
        })
        .await
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].id, id);
    assert_eq!(reopened.sweep().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn monitored_client_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n{}")
            .await;
    });

    let storage_dir = tempfile::tempdir().unwrap();
    let monitor = HttpMonitor::install(config(), Some(storage_dir.path().to_path_buf()))
        .await
        .unwrap();
    let client = monitor.client(reqwest::Client::new());

    let response = client
        .get(format!("http://{}/status", addr))
        .header("Authorization", "Bearer secret")
        .send()
        .await
        .expect("response");
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "{}");

    let calls = monitor.list(&CallFilter::default()).await.unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].response_code, Some(200));
    assert_eq!(
        calls[0].request_headers.get("authorization"),
        Some(&["***".to_string()][..])
    );
}
