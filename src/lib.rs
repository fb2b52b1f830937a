//! A multiplexed UDP session/stream transport, carrying a small flight
//! reservation RPC service with configurable invocation semantics.
//!
//! ## Layers
//!
//! - [`frame`]: the wire format — one 25-byte header plus opaque payload per
//!   UDP datagram.
//! - [`session`] / [`stream`]: a single socket multiplexed into many
//!   independent byte streams, each addressed by a stream id.
//! - [`middleware`]: artificial loss injection and the at-most-once reply
//!   cache that sit between the dispatcher and the wire.
//! - [`rpc`]: the envelope/value codec, the flight domain model, and the
//!   handlers and dispatcher that implement the RPC surface.
//! - [`server`] / [`client`]: the two processes that actually talk to each
//!   other over a [`session::Session`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use skyrpc::client::Client;
//! use skyrpc::config::ClientOptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect("127.0.0.1:9090".parse()?, ClientOptions::new()).await?;
//!     let flights = client.find_flights("Singapore", "Tokyo").await?;
//!     println!("{flights:#?}");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod latch;
pub mod middleware;
pub mod rpc;
pub mod server;
pub mod session;
pub mod stream;

pub use client::{Client, ClientError, ClientResult};
pub use error::{Error, ProtocolError, ProtocolResult, Result};
pub use frame::{Flag, Frame, Sid};
pub use server::Server;
pub use session::Session;
pub use stream::Stream;
