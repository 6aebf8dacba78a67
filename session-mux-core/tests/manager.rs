use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use session_mux_core::testing::{InMemoryOrigin, InMemoryTransport};
use session_mux_core::{CloseReason, DefaultLogger, Manager, ManagerError};
use session_mux_proto::SessionId;
use tokio_util::sync::CancellationToken;

fn session_id(n: u8) -> SessionId {
    SessionId::from_bytes([n; 16])
}

#[tokio::test(flavor = "multi_thread")]
async fn happy_path_twenty_sessions_fifty_messages_each() {
    let (transport, edge) = InMemoryTransport::pair(1200);
    let manager = Arc::new(Manager::new(transport, Arc::new(DefaultLogger)));
    let cancel = CancellationToken::new();

    let serve_cancel = cancel.clone();
    let serve_manager = Arc::clone(&manager);
    let serve_handle = tokio::spawn(async move { serve_manager.serve(serve_cancel).await });

    let mut session_tasks = Vec::new();
    let mut origin_remotes = Vec::new();
    let ids: Vec<SessionId> = (0..20u8).map(session_id).collect();

    for &id in &ids {
        let (origin, remote) = InMemoryOrigin::pair();
        let session = manager
            .register(cancel.clone(), id, origin)
            .await
            .expect("registration succeeds while the loop is running");
        origin_remotes.push(remote);

        let session_cancel = cancel.clone();
        session_tasks.push(tokio::spawn(async move {
            session.serve(session_cancel, Duration::from_secs(60)).await
        }));
    }

    for (&id, remote) in ids.iter().zip(&origin_remotes) {
        for n in 0..50u32 {
            let request = format!("Message from {id} #{n}").into_bytes();
            edge.deliver(id, Bytes::from(request.clone()));

            let forwarded = remote.recv_sent().await.expect("origin sees the forwarded request");
            assert_eq!(forwarded.as_ref(), request.as_slice());

            let response = format!("Response to {}", String::from_utf8(request).unwrap()).into_bytes();
            remote.deliver(Bytes::from(response.clone()));

            let (resp_id, resp_payload) = edge.recv_sent().await.expect("edge sees the response");
            assert_eq!(resp_id, id);
            assert_eq!(resp_payload.as_ref(), response.as_slice());
        }
    }

    for &id in &ids {
        manager
            .unregister(cancel.clone(), id, "done".into(), false)
            .await
            .expect("unregister accepted while the loop is running");
    }

    for task in session_tasks {
        let (by_remote, reason) = task.await.unwrap();
        assert!(!by_remote);
        assert!(matches!(reason, CloseReason::LocalClose(_)));
    }

    cancel.cancel();
    serve_handle.await.unwrap().expect("serve exits cleanly on cancel");
}

#[tokio::test(flavor = "multi_thread")]
async fn idle_session_closes_without_by_remote() {
    let (transport, _edge) = InMemoryTransport::pair(1200);
    let manager = Arc::new(Manager::new(transport, Arc::new(DefaultLogger)));
    let cancel = CancellationToken::new();

    let serve_cancel = cancel.clone();
    let serve_manager = Arc::clone(&manager);
    let serve_handle = tokio::spawn(async move { serve_manager.serve(serve_cancel).await });

    let (origin, _remote) = InMemoryOrigin::pair();
    let id = session_id(1);
    let session = manager.register(cancel.clone(), id, origin).await.unwrap();

    let (by_remote, reason) = session.serve(cancel.clone(), Duration::from_millis(100)).await;
    assert!(!by_remote);
    assert!(matches!(reason, CloseReason::IdleTimeout(d) if d == Duration::from_millis(100)));

    cancel.cancel();
    serve_handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_graceful_close_cascades_to_every_session() {
    let (transport, edge) = InMemoryTransport::pair(1200);
    let manager = Arc::new(Manager::new(transport, Arc::new(DefaultLogger)));
    let cancel = CancellationToken::new();

    let serve_cancel = cancel.clone();
    let serve_manager = Arc::clone(&manager);
    let serve_handle = tokio::spawn(async move { serve_manager.serve(serve_cancel).await });

    let (origin, _remote) = InMemoryOrigin::pair();
    let id = session_id(2);
    let session = manager.register(cancel.clone(), id, origin).await.unwrap();
    let session_handle = tokio::spawn(async move { session.serve(CancellationToken::new(), Duration::from_secs(60)).await });

    edge.close_gracefully();

    let (by_remote, reason) = session_handle.await.unwrap();
    assert!(by_remote);
    assert!(matches!(reason, CloseReason::ManagerShutdown { by_remote: true }));

    let outcome = serve_handle.await.unwrap();
    assert!(outcome.is_ok(), "a graceful transport close is not an error");
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_datagram_is_dropped_but_session_survives() {
    let (transport, edge) = InMemoryTransport::pair(1204);
    let manager = Arc::new(Manager::new(transport, Arc::new(DefaultLogger)));
    let cancel = CancellationToken::new();

    let serve_cancel = cancel.clone();
    let serve_manager = Arc::clone(&manager);
    let serve_handle = tokio::spawn(async move { serve_manager.serve(serve_cancel).await });

    let (origin, remote) = InMemoryOrigin::pair();
    let id = session_id(3);
    let session = manager.register(cancel.clone(), id, origin).await.unwrap();
    let session_cancel = cancel.clone();
    let session_handle = tokio::spawn(async move { session.serve(session_cancel, Duration::from_secs(60)).await });

    let before = session_mux_core::metrics().packet_too_big_dropped();

    remote.deliver(Bytes::from(vec![0u8; 2000]));
    remote.deliver(Bytes::from_static(b"still alive"));

    let (resp_id, payload) = edge.recv_sent().await.expect("the in-mtu frame still gets through");
    assert_eq!(resp_id, id);
    assert_eq!(payload.as_ref(), b"still alive");
    assert!(session_mux_core::metrics().packet_too_big_dropped() >= before + 1);

    cancel.cancel();
    session_handle.await.unwrap();
    serve_handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn register_times_out_when_the_loop_never_runs() {
    let (transport, _edge) = InMemoryTransport::pair(1200);
    let manager = Manager::with_rpc_timeout(transport, Arc::new(DefaultLogger), Duration::from_millis(50));

    let (origin, _remote) = InMemoryOrigin::pair();
    let err = manager
        .register(CancellationToken::new(), session_id(4), origin)
        .await
        .unwrap_err();

    assert!(matches!(err, ManagerError::Timeout(d) if d == Duration::from_millis(50)));
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_byte_origin_read_reaches_the_edge_as_an_empty_frame() {
    let (transport, edge) = InMemoryTransport::pair(1200);
    let manager = Arc::new(Manager::new(transport, Arc::new(DefaultLogger)));
    let cancel = CancellationToken::new();

    let serve_cancel = cancel.clone();
    let serve_manager = Arc::clone(&manager);
    let serve_handle = tokio::spawn(async move { serve_manager.serve(serve_cancel).await });

    let (origin, remote) = InMemoryOrigin::pair();
    let id = session_id(5);
    let session = manager.register(cancel.clone(), id, origin).await.unwrap();
    let session_cancel = cancel.clone();
    let session_handle = tokio::spawn(async move { session.serve(session_cancel, Duration::from_secs(60)).await });

    remote.deliver(Bytes::new());

    let (resp_id, payload) = edge.recv_sent().await.expect("a zero-byte datagram is still forwarded");
    assert_eq!(resp_id, id);
    assert!(payload.is_empty());

    cancel.cancel();
    session_handle.await.unwrap();
    serve_handle.await.unwrap().unwrap();
}
