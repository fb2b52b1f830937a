//! The server: binds a listening [`Session`], accepts one [`Stream`] per RPC
//! invocation, and runs it through the dispatcher with invocation-semantics
//! middleware wired in from [`ServerOptions`].
//!
//! Grounded on `server.go`'s `Listen`/accept-loop shape, with the
//! closure-chained middleware of `router.go` replaced by explicit
//! [`LossInjector`]/[`ReplyCache`] fields threaded through
//! [`dispatcher::dispatch`].

use crate::config::ServerOptions;
use crate::error::ProtocolResult;
use crate::middleware::{LossInjector, ReplyCache};
use crate::rpc::dispatcher::{self, RpcContext};
use crate::session::{Session, SessionOptions};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Server {
    session: Session,
    ctx: Arc<RpcContext>,
    cache: Arc<ReplyCache>,
    loss: Arc<LossInjector>,
    options: ServerOptions,
}

impl Server {
    pub async fn bind(options: ServerOptions) -> ProtocolResult<Self> {
        let addr: SocketAddr = format!("0.0.0.0:{}", options.port)
            .parse()
            .expect("0.0.0.0:<port> is always a valid socket address");
        let session_options = SessionOptions {
            max_frame_size: options.max_frame_size,
            accept_backlog: options.accept_backlog,
        };
        let session = Session::bind(addr, session_options).await?;
        Ok(Server {
            session,
            ctx: Arc::new(RpcContext::new()),
            cache: Arc::new(ReplyCache::new()),
            loss: Arc::new(LossInjector::new(options.loss_rate_percent)),
            options,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.session.local_addr()
    }

    /// Accept streams forever, spawning one dispatch task per stream. Returns
    /// only if the underlying session dies.
    pub async fn serve(self) -> ProtocolResult<()> {
        info!(
            port = self.options.port,
            semantics = ?self.options.semantics,
            loss_rate_percent = self.options.loss_rate_percent,
            "skyrpc server listening"
        );

        loop {
            let stream = match self.session.accept().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "session accept failed, server shutting down");
                    return Err(e);
                }
            };

            let ctx = self.ctx.clone();
            let cache = self.cache.clone();
            let loss = self.loss.clone();
            let semantics = self.options.semantics;
            let request_deadline = self.options.request_deadline;

            tokio::spawn(async move {
                let sid = stream.sid();
                if let Err(e) = dispatcher::dispatch(&ctx, &stream, &cache, &loss, semantics, request_deadline).await
                {
                    warn!(error = %e, %sid, "stream dispatch ended with error");
                }
                let _ = stream.close().await;
            });
        }
    }

    pub fn shutdown(&self) {
        self.session.close();
    }
}
