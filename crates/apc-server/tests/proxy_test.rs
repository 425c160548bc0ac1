//! Integration tests for the Unix socket authentication proxy client

use apc::{AuthProxy, ProxyCommand, ProxyDispatcher, ProxyStatus, RouterId};
use apc_server::proxy::{ProxyRequest, ProxyResponse, UnixSocketAuthProxy};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;

fn ids(list: &[&str]) -> Vec<RouterId> {
    list.iter().map(|s| s.parse().unwrap()).collect()
}

/// Fake controller: answers each request with `reply` and reports it
fn spawn_controller(
    path: &Path,
    reply: impl Fn(&ProxyRequest) -> ProxyResponse + Send + 'static,
) -> mpsc::UnboundedReceiver<ProxyRequest> {
    let listener = UnixListener::bind(path).expect("Failed to bind controller socket");
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                continue;
            }

            let request: ProxyRequest = serde_json::from_str(line.trim()).unwrap();
            let response = reply(&request);
            let _ = tx.send(request);

            let json = serde_json::to_string(&response).unwrap();
            writer.write_all(json.as_bytes()).await.unwrap();
            writer.write_all(b"\n").await.unwrap();
        }
    });

    rx
}

fn ok() -> ProxyResponse {
    ProxyResponse {
        ok: true,
        error: None,
        status: None,
    }
}

#[tokio::test]
async fn test_start_and_stop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proxy.sock");
    let mut requests = spawn_controller(&path, |_| ok());

    let proxy = UnixSocketAuthProxy::new(&path, Duration::from_secs(1));

    tokio_test::assert_ok!(proxy.start(ids(&["10.0.0.1", "10.0.0.2"])).await);
    assert_eq!(
        requests.recv().await,
        Some(ProxyRequest::Start {
            membership: ids(&["10.0.0.1", "10.0.0.2"])
        })
    );

    tokio_test::assert_ok!(proxy.stop().await);
    assert_eq!(requests.recv().await, Some(ProxyRequest::Stop));
}

#[tokio::test]
async fn test_status_query() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proxy.sock");
    let _requests = spawn_controller(&path, |_| ProxyResponse {
        ok: true,
        error: None,
        status: Some(ProxyStatus {
            running: true,
            membership: ids(&["10.0.0.3"]),
        }),
    });

    let proxy = UnixSocketAuthProxy::new(&path, Duration::from_secs(1));
    let status = proxy.status().await.unwrap();

    assert!(status.running);
    assert_eq!(status.membership, ids(&["10.0.0.3"]));
}

#[tokio::test]
async fn test_rejected_request_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proxy.sock");
    let _requests = spawn_controller(&path, |_| ProxyResponse {
        ok: false,
        error: Some("radius backend unreachable".to_string()),
        status: None,
    });

    let proxy = UnixSocketAuthProxy::new(&path, Duration::from_secs(1));
    let err = proxy.start(ids(&["10.0.0.1"])).await.unwrap_err();

    assert!(err.to_string().contains("radius backend unreachable"));
}

#[tokio::test]
async fn test_silent_controller_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proxy.sock");
    let listener = UnixListener::bind(&path).unwrap();

    // Accept and hold the connection without replying
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let proxy = UnixSocketAuthProxy::new(&path, Duration::from_millis(100));
    let result = tokio::time::timeout(Duration::from_secs(2), proxy.stop())
        .await
        .expect("Request should give up on its own");

    tokio_test::assert_err!(result);
}

#[tokio::test]
async fn test_dispatcher_drives_controller() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proxy.sock");
    let mut requests = spawn_controller(&path, |_| ok());

    let proxy = Arc::new(UnixSocketAuthProxy::new(&path, Duration::from_secs(1)));
    let (tx, dispatcher) = ProxyDispatcher::new(proxy, 4);
    let handle = dispatcher.spawn();

    tx.send(ProxyCommand::Enable {
        membership: ids(&["10.0.0.1"]),
    })
    .await
    .unwrap();
    tx.send(ProxyCommand::Disable).await.unwrap();
    drop(tx);

    handle.await.unwrap();

    assert_eq!(
        requests.recv().await,
        Some(ProxyRequest::Start {
            membership: ids(&["10.0.0.1"])
        })
    );
    assert_eq!(requests.recv().await, Some(ProxyRequest::Stop));
}

#[tokio::test]
async fn test_reconcile_recovers_rejected_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proxy.sock");

    // Rejects the first start, then behaves; reports what it runs
    let state = std::sync::Mutex::new((0u32, None::<Vec<RouterId>>));
    let mut requests = spawn_controller(&path, move |request| {
        let mut state = state.lock().unwrap();
        match request {
            ProxyRequest::Start { membership } => {
                state.0 += 1;
                if state.0 == 1 {
                    return ProxyResponse {
                        ok: false,
                        error: Some("busy".to_string()),
                        status: None,
                    };
                }
                state.1 = Some(membership.clone());
                ok()
            }
            ProxyRequest::Stop => {
                state.1 = None;
                ok()
            }
            ProxyRequest::Status => ProxyResponse {
                status: Some(ProxyStatus {
                    running: state.1.is_some(),
                    membership: state.1.clone().unwrap_or_default(),
                }),
                ..ok()
            },
        }
    });

    let proxy = Arc::new(UnixSocketAuthProxy::new(&path, Duration::from_secs(1)));
    let (tx, dispatcher) = ProxyDispatcher::new(proxy, 4);
    let handle = dispatcher.spawn();

    let members = ids(&["10.0.0.1", "10.0.0.2"]);
    tx.send(ProxyCommand::Enable {
        membership: members.clone(),
    })
    .await
    .unwrap();
    tx.send(ProxyCommand::Reconcile {
        membership: Some(members.clone()),
    })
    .await
    .unwrap();
    // Now in step: only the status query goes out
    tx.send(ProxyCommand::Reconcile {
        membership: Some(members.clone()),
    })
    .await
    .unwrap();
    drop(tx);
    handle.await.unwrap();

    let mut seen = Vec::new();
    while let Ok(request) = requests.try_recv() {
        seen.push(request);
    }
    assert_eq!(
        seen,
        vec![
            ProxyRequest::Start {
                membership: members.clone()
            },
            ProxyRequest::Status,
            ProxyRequest::Start {
                membership: members.clone()
            },
            ProxyRequest::Status,
        ]
    );
}
