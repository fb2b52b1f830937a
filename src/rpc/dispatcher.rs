//! Routes one decoded envelope per accepted stream to a handler, and runs
//! the `MonitorUpdates` fan-out registry (§4.9).
//!
//! Grounded on `router.go`'s `router`/`ok`/`error` helpers and
//! `broadcastFlights`. The original fans updates out over a single
//! `[]chan *Flight` slice shared by every subscriber; here each subscriber
//! gets its own registered channel so that more than one concurrent
//! `MonitorUpdates` caller actually receives every update, matching the
//! spec's "every active subscriber's channel" wording.

use crate::config::Semantics;
use crate::error::ProtocolResult;
use crate::middleware::{LossInjector, ReplyCache};
use crate::rpc::envelope::Envelope;
use crate::rpc::flight::{Flight, SEED_CSV};
use crate::rpc::repo::{FlightRepo, ReservationRepo};
use crate::rpc::{handlers, value, RpcError};
use crate::stream::Stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Read buffer for one incoming envelope. Generous relative to the
/// ~8 KB "large body" scenario so a single request never needs a second
/// `Stream::read` call.
const REQUEST_BUFFER_SIZE: usize = 64 * 1024;

/// Bounded per-subscriber channel capacity; a slow `MonitorUpdates`
/// subscriber drops updates rather than applying backpressure (§4.9:
/// "non-blocking send; slow subscribers lose updates").
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 32;

/// Shared server-wide state: repositories, the reservation compound-update
/// lock (Open Question #3's fix), and the `MonitorUpdates` subscriber
/// registry.
pub struct RpcContext {
    pub flights: FlightRepo,
    pub reservations: ReservationRepo,
    pub(crate) reserve_lock: Mutex<()>,
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Flight>>>,
    next_subscriber_id: AtomicU64,
}

impl RpcContext {
    pub fn new() -> Self {
        let flights = SEED_CSV
            .lines()
            .filter(|l| !l.is_empty())
            .filter_map(|l| match crate::rpc::flight::Flight::parse_csv_row(l) {
                Ok(f) => Some(f),
                Err(e) => {
                    warn!(error = %e, row = l, "skipping malformed seed flight row");
                    None
                }
            })
            .collect();
        RpcContext {
            flights: FlightRepo::new(flights),
            reservations: ReservationRepo::new(),
            reserve_lock: Mutex::new(()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(0),
        }
    }

    /// An `RpcContext` with no seeded flights, for tests that seed their own.
    pub fn new_empty() -> Self {
        RpcContext {
            flights: FlightRepo::new(Vec::new()),
            reservations: ReservationRepo::new(),
            reserve_lock: Mutex::new(()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn publish_update(&self, flight: Flight) {
        let subscribers = self.subscribers.lock().unwrap();
        for tx in subscribers.values() {
            let _ = tx.try_send(flight.clone());
        }
    }

    fn subscribe(&self) -> (u64, mpsc::Receiver<Flight>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().unwrap().insert(id, tx);
        (id, rx)
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().unwrap().remove(&id);
    }
}

impl Default for RpcContext {
    fn default() -> Self {
        Self::new()
    }
}

fn is_idempotent(rpc: &str) -> bool {
    matches!(
        rpc,
        "FindFlights" | "FindFlight" | "CheckInFlight" | "CancelFlight" | "GetMeals"
    )
}

fn route(ctx: &RpcContext, envelope: &Envelope) -> Envelope {
    let rpc = envelope.rpc.as_str();
    let result = match rpc {
        "FindFlights" => handlers::find_flights(ctx, &envelope.query).map(|v| value::marshal(&v)),
        "FindFlight" => handlers::find_flight(ctx, &envelope.query).map(|v| value::marshal(&v)),
        "ReserveFlight" => handlers::reserve_flight(ctx, &envelope.query).map(|v| value::marshal(&v)),
        "CheckInFlight" => handlers::check_in_flight(ctx, &envelope.query).map(|v| value::marshal(&v)),
        "CancelFlight" => handlers::cancel_flight(ctx, &envelope.query).map(|v| value::marshal(&v)),
        "GetMeals" => handlers::get_meals(ctx, &envelope.query).map(|v| value::marshal(&v)),
        "AddMeals" => handlers::add_meals(ctx, &envelope.query).map(|v| value::marshal(&v)),
        _ => Err(RpcError::NotFound),
    };

    match result {
        Ok(body) => Envelope::ok(rpc, body),
        Err(e) => Envelope::error(rpc, e.kind(), e.to_string()),
    }
}

async fn send_through_middleware(
    stream: &Stream,
    loss: &LossInjector,
    body: &[u8],
    lossy: bool,
) -> ProtocolResult<()> {
    if loss.should_drop(lossy).await {
        return Ok(());
    }
    stream.write(body).await.map(|_| ())
}

/// Handle exactly one accepted stream: read one request, consult the
/// at-most-once cache, route, and write the response (§4.9).
pub async fn dispatch(
    ctx: &RpcContext,
    stream: &Stream,
    cache: &ReplyCache,
    loss: &LossInjector,
    semantics: Semantics,
    request_deadline: Duration,
) -> ProtocolResult<()> {
    stream.set_read_deadline(Some(Instant::now() + request_deadline));

    let mut buf = vec![0u8; REQUEST_BUFFER_SIZE];
    let n = stream.read(&mut buf).await?;

    let envelope: Envelope = match value::unmarshal(&buf[..n]) {
        Ok(e) => e,
        Err(e) => {
            let body = value::marshal(&Envelope::error("", "EncodingError", e.to_string()));
            return send_through_middleware(stream, loss, &body, false).await;
        }
    };

    info!(rpc = %envelope.rpc, sid = %stream.sid(), "handling RPC");

    let sid = stream.sid();
    if semantics == Semantics::AtMostOnce {
        if let Some(cached) = cache.get(sid) {
            return stream.write(&cached).await.map(|_| ());
        }
    }

    if envelope.rpc == "MonitorUpdates" {
        return monitor_updates(ctx, stream, &envelope).await;
    }

    let response = route(ctx, &envelope);
    let body = value::marshal(&response);

    if semantics == Semantics::AtMostOnce {
        cache.store(sid, body.clone());
    }

    let lossy = is_idempotent(&envelope.rpc) && !response.is_error();
    send_through_middleware(stream, loss, &body, lossy).await
}

/// Streams `Flight` updates to the caller until the `timestamp` deadline it
/// requested (§4.9: "stream of Flight until deadline", no server-imposed
/// cap on the requested window).
async fn monitor_updates(ctx: &RpcContext, stream: &Stream, envelope: &Envelope) -> ProtocolResult<()> {
    let timestamp_ms: Result<u64, RpcError> = envelope
        .query
        .get("timestamp")
        .filter(|s| !s.is_empty())
        .ok_or(RpcError::InvalidParams)
        .and_then(|s| s.parse().map_err(|_| RpcError::InvalidParams));

    let timestamp_ms = match timestamp_ms {
        Ok(t) => t,
        Err(e) => {
            let body = value::marshal(&Envelope::error("MonitorUpdates", e.kind(), e.to_string()));
            return stream.write(&body).await.map(|_| ());
        }
    };

    let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
    let remaining = if timestamp_ms > now_ms {
        Duration::from_millis(timestamp_ms - now_ms)
    } else {
        Duration::ZERO
    };
    let deadline = Instant::now() + remaining;

    let (id, mut rx) = ctx.subscribe();
    let result = async {
        loop {
            tokio::select! {
                flight = rx.recv() => {
                    match flight {
                        Some(flight) => {
                            let body = value::marshal(&Envelope::ok("MonitorUpdates", value::marshal(&flight)));
                            stream.write(&body).await?;
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }
        let closing = value::marshal(&Envelope::ok("MonitorUpdates", bytes::Bytes::new()));
        stream.write(&closing).await.map(|_| ())
    }
    .await;

    ctx.unsubscribe(id);
    result
}
