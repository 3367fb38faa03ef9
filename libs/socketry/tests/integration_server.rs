//! Integration tests for the accepting server
//!
//! Limits, registry bookkeeping, broadcast and shutdown with real clients.

mod common;

use common::*;
use futures::future::join_all;
use socketry::{Message, SessionState, SocketError, TransportKind};
use std::collections::HashSet;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connection_limit_rejects_extra_clients() {
    let kind = TransportKind::Ws;
    let (server, addr, mut server_rx) =
        start_server(server_config(kind).with_max_connections(2), Reply::Silent).await;

    let (first, _first_rx) = session(client_config(kind, addr));
    let (second, _second_rx) = session(client_config(kind, addr));
    first.connect().await.unwrap();
    second.connect().await.unwrap();

    // Registration happens after the handshake; wait for both
    for _ in 0..2 {
        wait_for(&mut server_rx, |e| matches!(e, ServerRecord::Connected(_))).await;
    }
    assert_eq!(server.connection_count(), 2);

    let (third, mut third_rx) = session(client_config(kind, addr));
    let err = third.connect().await.unwrap_err();
    verbose_println!("  rejected client saw: {}", err);
    assert_eq!(third.state(), SessionState::Disconnected);
    assert_quiet(&mut third_rx, Duration::from_millis(100)).await;

    match wait_for(&mut server_rx, |e| matches!(e, ServerRecord::Error(_))).await {
        ServerRecord::Error(SocketError::ConnectionLimitExceeded { limit, .. }) => {
            assert_eq!(limit, 2)
        }
        other => panic!("expected limit error, got {:?}", other),
    }
    assert_eq!(server.connection_count(), 2);

    // A slot frees up once a client leaves
    first.close().await;
    wait_for(&mut server_rx, |e| matches!(e, ServerRecord::Disconnected(..))).await;
    third.connect().await.unwrap();
    wait_for(&mut server_rx, |e| matches!(e, ServerRecord::Connected(_))).await;
    assert_eq!(server.connection_count(), 2);

    second.close().await;
    third.close().await;
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_registry_tracks_concurrent_clients() {
    const CLIENTS: usize = 10;
    let kind = TransportKind::Tcp;
    let (server, addr, mut server_rx) = start_server(server_config(kind), Reply::Silent).await;

    let sessions: Vec<_> = (0..CLIENTS)
        .map(|_| session(client_config(kind, addr)))
        .collect();
    let results = join_all(sessions.iter().map(|(client, _)| client.connect())).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let mut ids = HashSet::new();
    while ids.len() < CLIENTS {
        if let ServerRecord::Connected(id) =
            wait_for(&mut server_rx, |e| matches!(e, ServerRecord::Connected(_))).await
        {
            ids.insert(id);
        }
    }
    assert_eq!(server.connection_count(), CLIENTS);

    let registered: HashSet<String> = server.registry().ids().into_iter().collect();
    assert_eq!(registered, ids);

    join_all(sessions.iter().map(|(client, _)| client.close())).await;
    for _ in 0..CLIENTS {
        wait_for(&mut server_rx, |e| matches!(e, ServerRecord::Disconnected(..))).await;
    }
    assert_eq!(server.connection_count(), 0);
    assert!(server.registry().is_empty());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_broadcast_reaches_every_client() {
    const CLIENTS: usize = 3;
    let kind = TransportKind::Ws;
    let (server, addr, mut server_rx) = start_server(server_config(kind), Reply::Silent).await;

    let mut sessions: Vec<_> = (0..CLIENTS)
        .map(|_| session(client_config(kind, addr)))
        .collect();
    for (client, rx) in sessions.iter_mut() {
        client.connect().await.unwrap();
        assert_eq!(next_event(rx).await, ClientRecord::Connected);
    }
    for _ in 0..CLIENTS {
        wait_for(&mut server_rx, |e| matches!(e, ServerRecord::Connected(_))).await;
    }

    let delivered = server.broadcast_text("tick").await;
    assert_eq!(delivered, CLIENTS);

    let delivered = server
        .broadcast_json(&serde_json::json!({"type": "tick", "seq": 2}))
        .await
        .unwrap();
    assert_eq!(delivered, CLIENTS);

    for (_, rx) in sessions.iter_mut() {
        assert_eq!(
            next_event(rx).await,
            ClientRecord::Message(Message::Text("tick".to_string()))
        );
        match next_event(rx).await {
            ClientRecord::Message(message) => {
                let value: serde_json::Value = message.parse_json().unwrap();
                assert_eq!(value["seq"], 2);
            }
            other => panic!("expected json broadcast, got {:?}", other),
        }
    }

    for (client, _) in &sessions {
        client.close().await;
    }
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_send_to_one_connection() {
    let kind = TransportKind::Ws;
    let (server, addr, mut server_rx) = start_server(server_config(kind), Reply::Silent).await;

    let (alice, mut alice_rx) =
        session(client_config(kind, addr).with_header("User-Agent", "alice/1.0"));
    alice.connect().await.unwrap();
    let alice_id = match wait_for(&mut server_rx, |e| matches!(e, ServerRecord::Connected(_))).await {
        ServerRecord::Connected(id) => id,
        _ => unreachable!(),
    };

    let (bob, mut bob_rx) = session(client_config(kind, addr));
    bob.connect().await.unwrap();
    wait_for(&mut server_rx, |e| matches!(e, ServerRecord::Connected(_))).await;

    let connection = server.connection(&alice_id).expect("alice is registered");
    assert_eq!(connection.user_agent(), Some("alice/1.0"));
    assert!(connection.remote_addr().starts_with("127.0.0.1:"));

    server
        .send_to(&alice_id, Message::Text("only you".into()))
        .await
        .unwrap();

    assert_eq!(next_event(&mut alice_rx).await, ClientRecord::Connected);
    assert_eq!(
        next_event(&mut alice_rx).await,
        ClientRecord::Message(Message::Text("only you".into()))
    );
    assert_eq!(next_event(&mut bob_rx).await, ClientRecord::Connected);
    assert_quiet(&mut bob_rx, Duration::from_millis(200)).await;

    assert!(matches!(
        server.send_to("no-such-id", Message::Text("x".into())).await,
        Err(SocketError::ConnectionNotFound(_))
    ));

    alice.close().await;
    bob.close().await;
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_closes_clients_and_is_idempotent() {
    const CLIENTS: usize = 3;
    let kind = TransportKind::Tcp;
    let (server, addr, mut server_rx) = start_server(server_config(kind), Reply::Silent).await;

    let mut sessions: Vec<_> = (0..CLIENTS)
        .map(|_| {
            session(
                client_config(kind, addr)
                    .with_auto_reconnect(false),
            )
        })
        .collect();
    for (client, rx) in sessions.iter_mut() {
        client.connect().await.unwrap();
        assert_eq!(next_event(rx).await, ClientRecord::Connected);
    }
    for _ in 0..CLIENTS {
        wait_for(&mut server_rx, |e| matches!(e, ServerRecord::Connected(_))).await;
    }

    tokio::join!(server.stop(), server.stop());
    server.stop().await;
    assert!(!server.is_running());
    assert_eq!(server.connection_count(), 0);

    // Every connection got its disconnect callback before stop() returned
    let mut disconnected = 0;
    while let Ok(event) = server_rx.try_recv() {
        if matches!(event, ServerRecord::Disconnected(..)) {
            disconnected += 1;
        }
    }
    assert_eq!(disconnected, CLIENTS);

    for (client, rx) in sessions.iter_mut() {
        assert!(matches!(
            next_event(rx).await,
            ClientRecord::Disconnected(Some(_))
        ));
        assert_eq!(client.state(), SessionState::Disconnected);
        client.close().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_server_read_timeout_drops_idle_peer() {
    let kind = TransportKind::Tcp;
    let (server, addr, mut server_rx) = start_server(
        server_config(kind).with_read_timeout(Duration::from_millis(200)),
        Reply::Silent,
    )
    .await;

    let (client, mut client_rx) =
        session(client_config(kind, addr).with_auto_reconnect(false));
    client.connect().await.unwrap();
    assert_eq!(next_event(&mut client_rx).await, ClientRecord::Connected);

    match wait_for(&mut server_rx, |e| matches!(e, ServerRecord::Disconnected(..))).await {
        ServerRecord::Disconnected(_, Some(SocketError::TransportRead(reason))) => {
            verbose_println!("  server dropped peer: {}", reason);
        }
        other => panic!("expected read timeout, got {:?}", other),
    }
    assert_eq!(server.connection_count(), 0);

    assert!(matches!(
        next_event(&mut client_rx).await,
        ClientRecord::Disconnected(Some(_))
    ));

    client.close().await;
    server.stop().await;
}
