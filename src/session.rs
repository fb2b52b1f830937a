//! The session layer: one UDP socket multiplexed into many [`Stream`]s.
//!
//! Grounded on `session.go`'s receive-loop/send-loop/stream-map shape, and
//! on the teacher's `connection.rs` pattern of a single task owning all I/O
//! on a socket. `session.go`'s `Close` guards itself with a `var once bool`
//! that is declared but never flipped to `true` — so repeated calls redo
//! the teardown. `Close` here is made genuinely idempotent via [`Latch`].

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::{Flag, Frame, Sid, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
use crate::latch::Latch;
use crate::stream::{Stream, StreamState, OPEN_CLOSE_TIMEOUT};
use bytes::BytesMut;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Whether this session plays the client or server role; determines how the
/// send loop addresses outgoing datagrams.
#[derive(Clone)]
enum Role {
    Client { peer: SocketAddr },
    Server,
}

/// Tunables for a [`Session`]; mirrors the teacher's `client/builder.rs`
/// fluent-options shape at the transport layer (RPC-level options live in
/// [`crate::config`]).
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub max_frame_size: usize,
    pub accept_backlog: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            accept_backlog: 128,
        }
    }
}

struct WriteRequest {
    frame: Frame,
    deadline: Option<Instant>,
    result: oneshot::Sender<ProtocolResult<usize>>,
}

struct Inner {
    socket: UdpSocket,
    role: Role,
    max_frame_size: usize,
    streams: Mutex<HashMap<(Sid, u32), Arc<StreamState>>>,
    accept_tx: mpsc::Sender<Stream>,
    accept_rx: tokio::sync::Mutex<mpsc::Receiver<Stream>>,
    next_rid: AtomicU32,
    write_tx: mpsc::UnboundedSender<WriteRequest>,
    die: Latch<()>,
    socket_read_error: Latch<ProtocolError>,
    socket_write_error: Latch<ProtocolError>,
    proto_error: Latch<ProtocolError>,
}

/// A multiplexed UDP session. Cheap to clone (wraps an `Arc`); every clone
/// refers to the same socket, stream map, and latches.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    async fn new(socket: UdpSocket, role: Role, options: SessionOptions) -> Self {
        let (accept_tx, accept_rx) = mpsc::channel(options.accept_backlog.max(1));
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            socket,
            role,
            max_frame_size: options.max_frame_size,
            streams: Mutex::new(HashMap::new()),
            accept_tx,
            accept_rx: tokio::sync::Mutex::new(accept_rx),
            next_rid: AtomicU32::new(0),
            write_tx,
            die: Latch::new(),
            socket_read_error: Latch::new(),
            socket_write_error: Latch::new(),
            proto_error: Latch::new(),
        });

        let session = Session { inner };
        tokio::spawn(recv_loop(session.clone()));
        tokio::spawn(send_loop(session.clone(), write_rx));
        session
    }

    /// Bind a session in the server role, able to `Accept` connections from
    /// any peer.
    pub async fn bind(addr: SocketAddr, options: SessionOptions) -> ProtocolResult<Session> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| ProtocolError::SocketReadError(Arc::new(e)))?;
        Ok(Session::new(socket, Role::Server, options).await)
    }

    /// Open a session in the client role, talking to exactly one peer.
    pub async fn connect(peer: SocketAddr, options: SessionOptions) -> ProtocolResult<Session> {
        let local: SocketAddr = if peer.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| ProtocolError::SocketReadError(Arc::new(e)))?;
        socket
            .connect(peer)
            .await
            .map_err(|e| ProtocolError::SocketReadError(Arc::new(e)))?;
        Ok(Session::new(socket, Role::Client { peer }, options).await)
    }

    pub fn max_payload(&self) -> usize {
        self.inner.max_frame_size.saturating_sub(HEADER_SIZE)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.socket.local_addr()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.die.is_set()
    }

    pub(crate) async fn wait_read_error(&self) -> ProtocolError {
        self.inner.socket_read_error.wait().await
    }

    pub(crate) async fn wait_proto_error(&self) -> ProtocolError {
        self.inner.proto_error.wait().await
    }

    pub(crate) fn remove_stream(&self, sid: Sid, rid: u32) {
        self.inner.streams.lock().unwrap().remove(&(sid, rid));
    }

    fn insert_stream(&self, state: Arc<StreamState>) {
        self.inner
            .streams
            .lock()
            .unwrap()
            .insert((state.sid, state.rid), state);
    }

    /// Enqueue `frame` on the send loop and wait for its result, or for
    /// `deadline`/session death/a latched socket-write error, whichever
    /// comes first.
    pub(crate) async fn write_frame(&self, frame: Frame, deadline: Option<Instant>) -> ProtocolResult<usize> {
        let (tx, rx) = oneshot::channel();
        if self
            .inner
            .write_tx
            .send(WriteRequest {
                frame,
                deadline,
                result: tx,
            })
            .is_err()
        {
            return Err(ProtocolError::ClosedPipe);
        }

        let sleep = sleep_until_opt(deadline);
        tokio::select! {
            res = rx => res.map_err(|_| ProtocolError::ClosedPipe)?,
            _ = sleep => Err(ProtocolError::Timeout),
            _ = self.inner.die.wait() => Err(ProtocolError::ClosedPipe),
            e = self.inner.socket_write_error.wait() => Err(e),
        }
    }

    /// Open a fresh stream (new sid, next rid) to `addr`, per §4.4.
    pub async fn open(&self, addr: SocketAddr) -> ProtocolResult<Stream> {
        self.open_with_sid(Sid::new(), addr).await
    }

    /// Open a stream reusing an existing sid (used by the RPC client layer
    /// to retry a call with a fresh rid but the same at-most-once identity).
    pub async fn open_with_sid(&self, sid: Sid, addr: SocketAddr) -> ProtocolResult<Stream> {
        if self.is_closed() {
            return Err(ProtocolError::ClosedPipe);
        }
        let rid = self.inner.next_rid.fetch_add(1, Ordering::SeqCst);
        let deadline = Some(Instant::now() + OPEN_CLOSE_TIMEOUT);
        let syn = Frame::new(Flag::Syn, rid, sid, 0, bytes::Bytes::new());
        self.write_frame(syn, deadline).await?;

        if self.is_closed() {
            return Err(ProtocolError::ClosedPipe);
        }
        if let Some(e) = self.inner.socket_read_error.get() {
            return Err(e);
        }
        if let Some(e) = self.inner.proto_error.get() {
            return Err(e);
        }

        let state = Arc::new(StreamState::new(sid, rid, addr, self.max_payload()));
        self.insert_stream(state.clone());
        Ok(Stream::new(self.clone(), state))
    }

    /// Block until a passive stream arrives, or any session-level error
    /// latches.
    pub async fn accept(&self) -> ProtocolResult<Stream> {
        let mut rx = self.inner.accept_rx.lock().await;
        tokio::select! {
            maybe = rx.recv() => maybe.ok_or(ProtocolError::ClosedPipe),
            _ = self.inner.die.wait() => Err(ProtocolError::ClosedPipe),
            e = self.inner.socket_read_error.wait() => Err(e),
            e = self.inner.proto_error.wait() => Err(e),
        }
    }

    /// Idempotent: closes the die-latch, cascades closure to every tracked
    /// stream, and lets the socket drop once the loop tasks exit.
    pub fn close(&self) {
        if self.inner.die.set(()) {
            let mut streams = self.inner.streams.lock().unwrap();
            for (_, state) in streams.drain() {
                state.die.set(());
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(instant) => tokio::time::sleep_until(instant).await,
        None => std::future::pending::<()>().await,
    }
}

async fn recv_loop(session: Session) {
    let buf_size = session.inner.max_frame_size.max(HEADER_SIZE) + 64;
    let mut buf = vec![0u8; buf_size];

    loop {
        tokio::select! {
            _ = session.inner.die.wait() => return,
            res = session.inner.socket.recv_from(&mut buf) => {
                match res {
                    Err(e) => {
                        warn!(error = %e, "session socket read error");
                        session.inner.socket_read_error.set(ProtocolError::SocketReadError(Arc::new(e)));
                        return;
                    }
                    Ok((n, addr)) => {
                        match Frame::decode(&buf[..n]) {
                            Err(e) => {
                                warn!(error = %e, "dropping session: invalid frame");
                                session.inner.proto_error.set(ProtocolError::InvalidProtocol(e.to_string()));
                                return;
                            }
                            Ok(frame) => dispatch_incoming(&session, frame, addr).await,
                        }
                    }
                }
            }
        }
    }
}

async fn dispatch_incoming(session: &Session, frame: Frame, addr: SocketAddr) {
    let key = (frame.sid, frame.rid);

    match frame.flag {
        Flag::Syn => {
            let already_known = session.inner.streams.lock().unwrap().contains_key(&key);
            if !already_known {
                let state = Arc::new(StreamState::new(frame.sid, frame.rid, addr, session.max_payload()));
                session.insert_stream(state.clone());
                let stream = Stream::new(session.clone(), state);
                // §4.2: only the accept-channel offer is dropped when the
                // backlog is full. The stream stays in the map so a client's
                // SYN retry recognizes it as already-known and any PSH/ACK/FIN
                // racing ahead of that retry still has somewhere to land.
                if session.inner.accept_tx.try_send(stream).is_err() {
                    debug!("accept backlog full, dropping SYN offer");
                }
            }
        }
        Flag::Psh => {
            if let Some(state) = session.inner.streams.lock().unwrap().get(&key) {
                state.push_payload(frame.seq, frame.payload);
            }
        }
        Flag::Ack => {
            if let Some(state) = session.inner.streams.lock().unwrap().get(&key) {
                state.signal_ack();
            }
        }
        Flag::Fin => {
            if let Some(state) = session.inner.streams.lock().unwrap().get(&key) {
                state.signal_fin();
            }
        }
        Flag::Nop => {}
    }
}

async fn send_loop(session: Session, mut write_rx: mpsc::UnboundedReceiver<WriteRequest>) {
    let mut buf = BytesMut::with_capacity(session.inner.max_frame_size);

    loop {
        tokio::select! {
            _ = session.inner.die.wait() => return,
            maybe = write_rx.recv() => {
                let Some(req) = maybe else { return };
                buf.clear();
                req.frame.encode(&mut buf);

                let peer = match &session.inner.role {
                    Role::Client { peer } => Some(*peer),
                    Role::Server => session
                        .inner
                        .streams
                        .lock()
                        .unwrap()
                        .get(&(req.frame.sid, req.frame.rid))
                        .map(|s| s.peer),
                };

                let Some(peer) = peer else {
                    // §4.9: "Stream-not-found on server-side send ... returns
                    // StreamNotFound to the enqueuer and latches a write error."
                    let err = ProtocolError::StreamNotFound;
                    session.inner.socket_write_error.set(err.clone());
                    let _ = req.result.send(Err(err));
                    continue;
                };

                let io_result = match &session.inner.role {
                    Role::Client { .. } => session.inner.socket.send(&buf).await,
                    Role::Server => session.inner.socket.send_to(&buf, peer).await,
                };

                match io_result {
                    Ok(n) => {
                        let _ = req.result.send(Ok(n.saturating_sub(HEADER_SIZE)));
                    }
                    Err(e) => {
                        warn!(error = %e, "session socket write error");
                        let err = ProtocolError::SocketWriteError(Arc::new(e));
                        session.inner.socket_write_error.set(err.clone());
                        let _ = req.result.send(Err(err));
                        return;
                    }
                }
            }
        }
    }
}
