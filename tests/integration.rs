//! End-to-end loopback tests: transport-level properties over raw
//! [`Session`]/[`Stream`] pairs, and the full flight RPC scenarios over a
//! real [`Server`]/[`Client`] pair (spec.md §8).

use skyrpc::config::{ClientOptions, Semantics, ServerOptions};
use skyrpc::client::Client;
use skyrpc::server::Server;
use skyrpc::session::{Session, SessionOptions};
use std::time::Duration;
use tokio::time::Instant;

async fn loopback_pair() -> (Session, Session) {
    let server = Session::bind("127.0.0.1:0".parse().unwrap(), SessionOptions::default())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let client = Session::connect(addr, SessionOptions::default()).await.unwrap();
    (server, client)
}

// -- Transport-level properties (spec.md §8 invariants 2, 4, 5) --

#[tokio::test]
async fn message_integrity_across_frame_splitting() {
    let (server, client) = loopback_pair().await;
    let addr = server.local_addr().unwrap();

    let client_stream = client.open(addr).await.unwrap();
    let accept = tokio::spawn(async move { server.accept().await.unwrap() });

    // Larger than one frame's payload capacity, forcing Stream::write to split.
    let payload = vec![0x5Au8; 4000];
    let write_task = {
        let payload = payload.clone();
        tokio::spawn(async move { client_stream.write(&payload).await })
    };

    let server_stream = accept.await.unwrap();
    let mut buf = vec![0u8; 8192];
    let n = server_stream.read(&mut buf).await.unwrap();

    write_task.await.unwrap().unwrap();
    assert_eq!(&buf[..n], payload.as_slice());
}

#[tokio::test]
async fn fin_drain_then_eof() {
    let (server, client) = loopback_pair().await;
    let addr = server.local_addr().unwrap();

    let client_stream = client.open(addr).await.unwrap();
    let accept = tokio::spawn(async move { server.accept().await.unwrap() });

    client_stream.write(b"hello").await.unwrap();
    let server_stream = accept.await.unwrap();

    let mut buf = vec![0u8; 64];
    let n = server_stream.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"hello");

    client_stream.close().await.unwrap();

    // A Read after the peer has FIN'd and nothing is pending returns EOF.
    let n = server_stream.read(&mut buf).await.unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn read_deadline_in_the_past_times_out_promptly() {
    let (server, client) = loopback_pair().await;
    let addr = server.local_addr().unwrap();

    let client_stream = client.open(addr).await.unwrap();
    let accept = tokio::spawn(async move { server.accept().await.unwrap() });
    let server_stream = accept.await.unwrap();
    drop(client_stream);

    server_stream.set_read_deadline(Some(Instant::now() - Duration::from_millis(10)));
    let started = Instant::now();
    let mut buf = vec![0u8; 64];
    let err = server_stream.read(&mut buf).await.unwrap_err();
    assert!(matches!(err, skyrpc::ProtocolError::Timeout));
    assert!(started.elapsed() < Duration::from_millis(50));
}

// -- Full RPC scenarios (spec.md §8) --

async fn spawn_server(options: ServerOptions) -> std::net::SocketAddr {
    let server = Server::bind(options).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.serve().await;
    });
    addr
}

#[tokio::test]
async fn s1_reserve_then_cancel_restores_seats() {
    let addr = spawn_server(ServerOptions::new().with_semantics(Semantics::AtMostOnce)).await;
    let client = Client::connect(addr, ClientOptions::new()).await.unwrap();

    let flight = client.find_flight(5653).await.unwrap();
    let seats_before = flight.seat_availability;

    let reservation = client.reserve_flight(5653, 1).await.unwrap();
    assert_eq!(reservation.seat_reserved, 1);

    let after_reserve = client.find_flight(5653).await.unwrap();
    assert_eq!(after_reserve.seat_availability, seats_before - 1);

    let cancelled = client.cancel_flight(&reservation.id).await.unwrap();
    assert!(cancelled.cancelled);

    let after_cancel = client.find_flight(5653).await.unwrap();
    assert_eq!(after_cancel.seat_availability, seats_before);
}

#[tokio::test]
async fn s3_over_booking_returns_error_and_leaves_flight_unchanged() {
    let addr = spawn_server(ServerOptions::new()).await;
    let client = Client::connect(addr, ClientOptions::new()).await.unwrap();

    let before = client.find_flight(5655).await.unwrap(); // seeded with 0 seats
    let err = client.reserve_flight(5655, 1).await.unwrap_err();
    match err {
        skyrpc::ClientError::Domain { kind, .. } => assert_eq!(kind, "FailToReserve"),
        other => panic!("expected a domain error, got {other:?}"),
    }

    let after = client.find_flight(5655).await.unwrap();
    assert_eq!(after.seat_availability, before.seat_availability);
}

#[tokio::test]
async fn s4_monitor_updates_observes_concurrent_reservation() {
    let addr = spawn_server(ServerOptions::new()).await;
    let monitor = Client::connect(addr, ClientOptions::new()).await.unwrap();
    let actor = Client::connect(addr, ClientOptions::new()).await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let monitor_task = tokio::spawn(async move {
        monitor
            .monitor_updates(Duration::from_secs(2), move |flight| {
                let _ = tx.send(flight);
            })
            .await
    });

    // Give the subscription a moment to register before the mutating call.
    tokio::time::sleep(Duration::from_millis(50)).await;
    actor.reserve_flight(5654, 2).await.unwrap();

    let update = tokio::time::timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("update should arrive within 500ms")
        .expect("channel should not close before an update arrives");
    assert_eq!(update.id, 5654);

    monitor_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn s6_lossy_retry_reserves_exactly_once() {
    let addr = spawn_server(
        ServerOptions::new()
            .with_semantics(Semantics::AtMostOnce)
            .with_loss_rate_percent(50),
    )
    .await;
    let client = Client::connect(addr, ClientOptions::new().with_max_retries(10))
        .await
        .unwrap();

    let before = client.find_flight(5653).await.unwrap();
    let reservation = client.reserve_flight(5653, 1).await.unwrap();
    assert_eq!(reservation.seat_reserved, 1);

    let after = client.find_flight(5653).await.unwrap();
    assert_eq!(after.seat_availability, before.seat_availability - 1);
}

#[tokio::test]
async fn get_meals_and_add_meals_round_trip() {
    let addr = spawn_server(ServerOptions::new()).await;
    let client = Client::connect(addr, ClientOptions::new()).await.unwrap();

    let meals = client.get_meals().await.unwrap();
    assert!(!meals.is_empty());

    let reservation = client.reserve_flight(5656, 1).await.unwrap();
    let updated = client.add_meals(&reservation.id, meals[0].id).await.unwrap();
    assert_eq!(updated.meals.len(), 1);
    assert_eq!(updated.meals[0].id, meals[0].id);
}
