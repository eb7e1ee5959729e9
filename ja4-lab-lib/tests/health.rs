mod helpers;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use helpers::{squid, FakeRuntime};
use ja4_lab_lib::config::{HealthCheck, ProxyDefinition};
use ja4_lab_lib::lifecycle::{check_health, wait_healthy};
use ja4_lab_lib::LabError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type TestResult = helpers::TestResult;

const ATTEMPT: Duration = Duration::from_millis(300);

fn proxy_on(port: u16, health: HealthCheck) -> ProxyDefinition {
    ProxyDefinition { port, health, ..squid(&["6.10"]) }
}

/// A port nothing listens on
async fn closed_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    listener.local_addr().map(|a| a.port())
}

/// Minimal HTTP server answering with `statuses` in turn (the last one repeats)
///
/// Returns the port and the request lines it received.
async fn http_server(statuses: Vec<u16>) -> std::io::Result<(u16, Arc<Mutex<Vec<String>>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    tokio::spawn(async move {
        let mut served = 0usize;
        while let Ok((mut stream, _)) = listener.accept().await {
            let request = read_head(&mut stream).await;
            if let Ok(mut log) = log.lock() {
                log.push(request.lines().next().unwrap_or_default().to_string());
            }
            let status = statuses.get(served).or(statuses.last()).copied().unwrap_or(200);
            served += 1;
            let response =
                format!("HTTP/1.1 {status} Test\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    Ok((port, seen))
}

async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Accepts connections and never answers
async fn silent_server() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    Ok(port)
}

#[tokio::test]
async fn tcp_check_follows_listener() -> TestResult {
    let runtime = FakeRuntime::new();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let open = proxy_on(listener.local_addr()?.port(), HealthCheck::Tcp);
    assert!(check_health(&runtime, &open, ATTEMPT).await);

    let closed = proxy_on(closed_port().await?, HealthCheck::Tcp);
    assert!(!check_health(&runtime, &closed, ATTEMPT).await);
    Ok(())
}

#[tokio::test]
async fn tcp_wait_times_out_on_closed_port() -> TestResult {
    let runtime = FakeRuntime::new();
    let proxy = proxy_on(closed_port().await?, HealthCheck::Tcp);

    let started = Instant::now();
    let result = wait_healthy(
        &runtime,
        &proxy,
        Duration::from_millis(250),
        Duration::from_millis(20),
        ATTEMPT,
    )
    .await;
    match result {
        Err(LabError::HealthCheckTimeout { proxy, .. }) => assert_eq!(proxy, "squid"),
        other => return Err(format!("expected HealthCheckTimeout, got {other:?}").into()),
    }
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}

#[tokio::test]
async fn http_check_treats_server_errors_as_unhealthy() -> TestResult {
    let runtime = FakeRuntime::new();

    let (ok_port, seen) = http_server(vec![200]).await?;
    let ok = proxy_on(ok_port, HealthCheck::Http { path: "/healthz".to_string() });
    assert!(check_health(&runtime, &ok, ATTEMPT).await);
    assert_eq!(
        seen.lock().map(|s| s.clone()).unwrap_or_default(),
        vec!["GET /healthz HTTP/1.1".to_string()]
    );

    let (missing_port, _) = http_server(vec![404]).await?;
    let missing = proxy_on(missing_port, HealthCheck::Http { path: "/".to_string() });
    assert!(check_health(&runtime, &missing, ATTEMPT).await);

    let (broken_port, _) = http_server(vec![503]).await?;
    let broken = proxy_on(broken_port, HealthCheck::Http { path: "/".to_string() });
    assert!(!check_health(&runtime, &broken, ATTEMPT).await);

    let down = proxy_on(closed_port().await?, HealthCheck::Http { path: "/".to_string() });
    assert!(!check_health(&runtime, &down, ATTEMPT).await);
    Ok(())
}

#[tokio::test]
async fn http_check_gives_up_on_silent_server() -> TestResult {
    let runtime = FakeRuntime::new();
    let proxy = proxy_on(silent_server().await?, HealthCheck::Http { path: "/".to_string() });

    let started = Instant::now();
    assert!(!check_health(&runtime, &proxy, ATTEMPT).await);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(250), "gave up after {waited:?}");
    assert!(waited < Duration::from_secs(3), "waited {waited:?}");
    Ok(())
}

#[tokio::test]
async fn http_wait_succeeds_once_server_recovers() -> TestResult {
    let runtime = FakeRuntime::new();
    let (port, seen) = http_server(vec![503, 502, 200]).await?;
    let proxy = proxy_on(port, HealthCheck::Http { path: "/".to_string() });

    wait_healthy(&runtime, &proxy, Duration::from_secs(5), Duration::from_millis(20), ATTEMPT).await?;
    assert_eq!(seen.lock().map(|s| s.len()).unwrap_or_default(), 3);
    Ok(())
}

#[tokio::test]
async fn http_wait_times_out_on_silent_server() -> TestResult {
    let runtime = FakeRuntime::new();
    let proxy = proxy_on(silent_server().await?, HealthCheck::Http { path: "/".to_string() });

    let result = wait_healthy(
        &runtime,
        &proxy,
        Duration::from_millis(500),
        Duration::from_millis(20),
        ATTEMPT,
    )
    .await;
    assert!(matches!(result, Err(LabError::HealthCheckTimeout { .. })));
    Ok(())
}

#[tokio::test]
async fn running_check_asks_the_runtime() -> TestResult {
    let proxy = squid(&["6.10"]);
    assert!(!check_health(&FakeRuntime::new(), &proxy, ATTEMPT).await);
    assert!(check_health(&FakeRuntime::new().with_running(&["squid"]), &proxy, ATTEMPT).await);
    Ok(())
}
