//! One connected [`Session`] plus a typed method per RPC call. Retries
//! reopen the stream with the same sid (via [`Session::open_with_sid`]) so a
//! retried call still lands on the same at-most-once identity server-side
//! (§4.8).
//!
//! Grounded on `client.go`'s per-method request/response shape; the retry
//! loop is new (the original has no client-side retry at all).

use crate::config::ClientOptions;
use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::Sid;
use crate::rpc::envelope::Envelope;
use crate::rpc::flight::{Flight, Food, ReserveFlight};
use crate::rpc::value::{self, Decode};
use crate::session::{Session, SessionOptions};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

const RESPONSE_BUFFER_SIZE: usize = 64 * 1024;

/// Errors surfaced by the client facade (§7): transport failures (socket,
/// framing, timeouts — anything that already latches or tears down the
/// session) kept distinct from handler-level domain failures reported back
/// in an envelope's `error` field (e.g. "no more seats", "flight not
/// found"), which never touch the transport at all.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] ProtocolError),

    #[error("{rpc} failed: {kind}: {message}")]
    Domain { rpc: String, kind: String, message: String },
}

pub type ClientResult<T> = Result<T, ClientError>;

pub struct Client {
    session: Session,
    peer: SocketAddr,
    options: ClientOptions,
}

impl Client {
    pub async fn connect(peer: SocketAddr, options: ClientOptions) -> ClientResult<Self> {
        let session_options = SessionOptions {
            max_frame_size: options.max_frame_size,
            ..SessionOptions::default()
        };
        let session = Session::connect(peer, session_options).await?;
        Ok(Client { session, peer, options })
    }

    fn query(pairs: &[(&str, String)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    /// Opens a fresh stream, writes the request envelope, reads exactly one
    /// response envelope, and closes the stream. Retries (same sid, new rid)
    /// up to `max_retries` times on a write or read failure, since a lost
    /// UDP datagram in either direction looks identical to the caller.
    async fn call(&self, rpc: &str, query: HashMap<String, String>) -> ProtocolResult<Envelope> {
        let sid = Sid::new();
        let request = Envelope::request(rpc, query);
        let body = value::marshal(&request);

        let mut attempt = 0u32;
        loop {
            match self.try_call_once(sid, &body).await {
                Ok(envelope) => return Ok(envelope),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.options.max_retries {
                        return Err(e);
                    }
                    warn!(rpc, attempt, error = %e, "retrying RPC call");
                }
            }
        }
    }

    async fn try_call_once(&self, sid: Sid, body: &bytes::Bytes) -> ProtocolResult<Envelope> {
        let stream = self.session.open_with_sid(sid, self.peer).await?;
        stream.set_write_deadline(Some(Instant::now() + self.options.call_deadline));
        stream.write(body).await?;

        stream.set_read_deadline(Some(Instant::now() + self.options.call_deadline));
        let mut buf = vec![0u8; RESPONSE_BUFFER_SIZE];
        let result = stream.read(&mut buf).await;
        let _ = stream.close().await;

        let n = result?;
        value::unmarshal(&buf[..n]).map_err(|e| ProtocolError::EncodingError(e.to_string()))
    }

    /// Turns a response envelope into its decoded body, or a
    /// [`ClientError::Domain`] if the handler reported a failure — kept
    /// distinct from [`ClientError::Transport`], which only ever wraps a
    /// [`ProtocolError`] from the session/stream layer.
    fn decode_ok<T: Decode>(envelope: Envelope) -> ClientResult<T> {
        if let Some(err) = envelope.error {
            return Err(ClientError::Domain {
                rpc: envelope.rpc,
                kind: err.error,
                message: err.body,
            });
        }
        value::unmarshal(&envelope.body)
            .map_err(|e| ClientError::Transport(ProtocolError::EncodingError(e.to_string())))
    }

    pub async fn find_flights(&self, source: &str, destination: &str) -> ClientResult<Vec<Flight>> {
        let query = Self::query(&[("source", source.to_string()), ("destination", destination.to_string())]);
        Self::decode_ok(self.call("FindFlights", query).await?)
    }

    pub async fn find_flight(&self, id: i32) -> ClientResult<Flight> {
        let query = Self::query(&[("id", id.to_string())]);
        Self::decode_ok(self.call("FindFlight", query).await?)
    }

    pub async fn reserve_flight(&self, id: i32, seats: i32) -> ClientResult<ReserveFlight> {
        let query = Self::query(&[("id", id.to_string()), ("seats", seats.to_string())]);
        Self::decode_ok(self.call("ReserveFlight", query).await?)
    }

    pub async fn check_in_flight(&self, reservation_id: &str) -> ClientResult<ReserveFlight> {
        let query = Self::query(&[("id", reservation_id.to_string())]);
        Self::decode_ok(self.call("CheckInFlight", query).await?)
    }

    pub async fn cancel_flight(&self, reservation_id: &str) -> ClientResult<ReserveFlight> {
        let query = Self::query(&[("id", reservation_id.to_string())]);
        Self::decode_ok(self.call("CancelFlight", query).await?)
    }

    pub async fn get_meals(&self) -> ClientResult<Vec<Food>> {
        Self::decode_ok(self.call("GetMeals", HashMap::new()).await?)
    }

    pub async fn add_meals(&self, reservation_id: &str, meal_id: i64) -> ClientResult<ReserveFlight> {
        let query = Self::query(&[("id", reservation_id.to_string()), ("meal_id", meal_id.to_string())]);
        Self::decode_ok(self.call("AddMeals", query).await?)
    }

    /// Subscribes to flight updates until `duration` from now, invoking
    /// `on_update` for every `Flight` the server pushes until it sends the
    /// closing envelope at subscription expiry (§4.9, §8 scenario S4).
    pub async fn monitor_updates(&self, duration: Duration, mut on_update: impl FnMut(Flight)) -> ClientResult<()> {
        let deadline_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
            + duration.as_millis() as u64;

        let sid = Sid::new();
        let query = Self::query(&[("timestamp", deadline_ms.to_string())]);
        let request = Envelope::request("MonitorUpdates", query);
        let body = value::marshal(&request);

        let stream = self.session.open_with_sid(sid, self.peer).await?;
        stream.write(&body).await?;

        loop {
            let mut buf = vec![0u8; RESPONSE_BUFFER_SIZE];
            let n = stream.read(&mut buf).await?;
            let envelope: Envelope = value::unmarshal(&buf[..n])
                .map_err(|e| ClientError::Transport(ProtocolError::EncodingError(e.to_string())))?;
            if let Some(err) = envelope.error {
                let _ = stream.close().await;
                return Err(ClientError::Domain {
                    rpc: envelope.rpc,
                    kind: err.error,
                    message: err.body,
                });
            }
            if envelope.body.is_empty() {
                break;
            }
            let flight: Flight = value::unmarshal(&envelope.body)
                .map_err(|e| ClientError::Transport(ProtocolError::EncodingError(e.to_string())))?;
            on_update(flight);
        }

        stream.close().await.map_err(ClientError::Transport)
    }
}
