//! Fluent option builders for the server and client, in the shape of the
//! teacher's `client::builder::ClientOptions` (`new()` + chained `with_*`
//! setters consumed by a `build_*` call). Knob set follows `options.go`.

use std::time::Duration;

/// At-least-once bypasses the reply cache entirely; at-most-once stores and
/// replays cached responses keyed by sid (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantics {
    AtLeastOnce,
    AtMostOnce,
}

impl Default for Semantics {
    fn default() -> Self {
        Semantics::AtMostOnce
    }
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub port: u16,
    pub semantics: Semantics,
    pub request_deadline: Duration,
    pub loss_rate_percent: u8,
    pub max_frame_size: usize,
    pub accept_backlog: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            port: 0,
            semantics: Semantics::AtMostOnce,
            request_deadline: Duration::from_secs(30),
            loss_rate_percent: 0,
            max_frame_size: crate::frame::DEFAULT_MAX_FRAME_SIZE,
            accept_backlog: 128,
        }
    }
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_semantics(mut self, semantics: Semantics) -> Self {
        self.semantics = semantics;
        self
    }

    pub fn with_request_deadline(mut self, deadline: Duration) -> Self {
        self.request_deadline = deadline;
        self
    }

    /// Sets the fraction (0-100) of lossy writes the server silently drops
    /// to exercise client retry paths.
    pub fn with_loss_rate_percent(mut self, percent: u8) -> Self {
        self.loss_rate_percent = percent.min(100);
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_accept_backlog(mut self, backlog: usize) -> Self {
        self.accept_backlog = backlog;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub call_deadline: Duration,
    pub max_frame_size: usize,
    pub max_retries: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            call_deadline: Duration::from_secs(10),
            max_frame_size: crate::frame::DEFAULT_MAX_FRAME_SIZE,
            max_retries: 3,
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_deadline(mut self, deadline: Duration) -> Self {
        self.call_deadline = deadline;
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}
