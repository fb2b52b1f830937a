//! A single multiplexed stream within a [`crate::session::Session`].
//!
//! Modeled on `stream.go`'s `read`/`waitRead`/`Write`/`pushBytes`, extended
//! with the `seq`-sort spec adds on top of the original (which carries no
//! sequence number at all and has no reordering story).

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::{Flag, Frame, Sid};
use crate::latch::Latch;
use crate::session::Session;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

/// How long `Open`/`Close`/the trailing ACK of `Write` wait before giving up.
pub const OPEN_CLOSE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Shared mutable state for one stream, owned jointly by the session's
/// stream map and every outstanding [`Stream`] handle. Carries no reference
/// back to the session or to `Stream`, so there is no reference cycle.
pub(crate) struct StreamState {
    pub sid: Sid,
    pub rid: u32,
    pub peer: SocketAddr,
    pub max_payload: usize,
    pending: Mutex<Vec<(u16, Bytes)>>,
    read_deadline: Mutex<Option<Instant>>,
    write_deadline: Mutex<Option<Instant>>,
    read_ready: Notify,
    ack_ready: Notify,
    pub fin: Latch<()>,
    pub die: Latch<()>,
}

impl StreamState {
    pub(crate) fn new(sid: Sid, rid: u32, peer: SocketAddr, max_payload: usize) -> Self {
        StreamState {
            sid,
            rid,
            peer,
            max_payload,
            pending: Mutex::new(Vec::new()),
            read_deadline: Mutex::new(None),
            write_deadline: Mutex::new(None),
            read_ready: Notify::new(),
            ack_ready: Notify::new(),
            fin: Latch::new(),
            die: Latch::new(),
        }
    }

    pub(crate) fn push_payload(&self, seq: u16, payload: Bytes) {
        if payload.is_empty() {
            return;
        }
        self.pending.lock().unwrap().push((seq, payload));
        self.read_ready.notify_one();
    }

    pub(crate) fn signal_ack(&self) {
        self.ack_ready.notify_one();
    }

    pub(crate) fn signal_fin(&self) {
        self.fin.set(());
        self.read_ready.notify_one();
    }

    fn drain_pending(&self, into: &mut Vec<(u16, Bytes)>) {
        let mut guard = self.pending.lock().unwrap();
        into.append(&mut guard);
    }

    fn pending_is_empty(&self) -> bool {
        self.pending.lock().unwrap().is_empty()
    }
}

/// A handle to one multiplexed byte stream. Cheap to clone: the expensive
/// state lives in the shared [`StreamState`].
#[derive(Clone)]
pub struct Stream {
    pub(crate) session: Session,
    pub(crate) sid: Sid,
    pub(crate) rid: u32,
    pub(crate) state: std::sync::Arc<StreamState>,
}

impl Stream {
    pub(crate) fn new(session: Session, state: std::sync::Arc<StreamState>) -> Self {
        Stream {
            session,
            sid: state.sid,
            rid: state.rid,
            state,
        }
    }

    pub fn sid(&self) -> Sid {
        self.sid
    }

    pub fn rid(&self) -> u32 {
        self.rid
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.state.peer
    }

    pub fn is_closed(&self) -> bool {
        self.state.die.is_set()
    }

    pub fn set_read_deadline(&self, deadline: Option<Instant>) {
        *self.state.read_deadline.lock().unwrap() = deadline;
        self.state.read_ready.notify_one();
    }

    pub fn set_write_deadline(&self, deadline: Option<Instant>) {
        *self.state.write_deadline.lock().unwrap() = deadline;
    }

    /// Fill `buf` with the payload of one logical message (§4.5). Returns
    /// `Ok(0)` at end-of-stream once a FIN has drained with nothing left to
    /// deliver.
    pub async fn read(&self, buf: &mut [u8]) -> ProtocolResult<usize> {
        let mut collected: Vec<(u16, Bytes)> = Vec::new();

        loop {
            let deadline = *self.state.read_deadline.lock().unwrap();
            let sleep = sleep_until_opt(deadline);

            tokio::select! {
                _ = self.state.read_ready.notified() => {
                    self.state.drain_pending(&mut collected);
                    continue;
                }
                _ = self.state.ack_ready.notified() => {
                    if !self.state.pending_is_empty() {
                        self.state.signal_ack();
                        continue;
                    }
                    return Ok(finish_message(&mut collected, buf));
                }
                _ = self.state.fin.wait() => {
                    self.state.drain_pending(&mut collected);
                    if collected.is_empty() {
                        return Ok(0);
                    }
                    return Ok(finish_message(&mut collected, buf));
                }
                _ = sleep => {
                    return Err(ProtocolError::Timeout);
                }
                _ = self.state.die.wait() => {
                    return Err(ProtocolError::ClosedPipe);
                }
                e = self.session.wait_read_error() => {
                    return Err(e);
                }
                e = self.session.wait_proto_error() => {
                    return Err(e);
                }
            }
        }
    }

    /// Send `data` as one logical message: one PSH frame per chunk of at
    /// most `max_frame_size - HEADER_SIZE` bytes, followed by a terminating
    /// ACK frame (§4.6). Not safe to call concurrently on the same stream.
    pub async fn write(&self, data: &[u8]) -> ProtocolResult<usize> {
        let chunk_size = self.state.max_payload.max(1);
        let mut total = 0usize;
        let mut seq: u16 = 0;

        for chunk in data.chunks(chunk_size) {
            let deadline = *self.state.write_deadline.lock().unwrap();
            let frame = Frame::new(Flag::Psh, self.rid, self.sid, seq, Bytes::copy_from_slice(chunk));
            let n = self.session.write_frame(frame, deadline).await?;
            total += n;
            seq = seq.wrapping_add(1);
        }

        let ack = Frame::new(Flag::Ack, self.rid, self.sid, 0, Bytes::new());
        let ack_deadline = Some(Instant::now() + OPEN_CLOSE_TIMEOUT);
        self.session.write_frame(ack, ack_deadline).await?;

        Ok(total)
    }

    /// Idempotent: closes the die-latch, best-effort transmits FIN, and asks
    /// the session to forget this stream.
    pub async fn close(&self) -> ProtocolResult<()> {
        if !self.state.die.set(()) {
            return Ok(());
        }
        let fin = Frame::new(Flag::Fin, self.rid, self.sid, 0, Bytes::new());
        let deadline = Some(Instant::now() + OPEN_CLOSE_TIMEOUT);
        let result = self.session.write_frame(fin, deadline).await;
        self.session.remove_stream(self.sid, self.rid);
        result.map(|_| ())
    }
}

fn finish_message(collected: &mut Vec<(u16, Bytes)>, buf: &mut [u8]) -> usize {
    collected.sort_by_key(|(seq, _)| *seq);
    let mut written = 0;
    for (_, payload) in collected.drain(..) {
        let n = payload.len().min(buf.len() - written);
        buf[written..written + n].copy_from_slice(&payload[..n]);
        written += n;
    }
    written
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(instant) => tokio::time::sleep_until(instant).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_message_sorts_by_seq_before_concatenating() {
        let mut collected = vec![
            (1u16, Bytes::from_static(b"world")),
            (0u16, Bytes::from_static(b"hello ")),
        ];
        let mut buf = [0u8; 32];
        let n = finish_message(&mut collected, &mut buf);
        assert_eq!(&buf[..n], b"hello world");
    }
}
