//! CLI entry point for the flight-reservation RPC server.
//!
//! Grounded on the teacher's `examples/send_sms.rs`: `argh`-derived flags,
//! `tracing_subscriber::FmtSubscriber` wired up before anything else runs.

use argh::FromArgs;
use skyrpc::config::{Semantics, ServerOptions};
use skyrpc::server::Server;
use std::error::Error;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Flight-reservation RPC server over a multiplexed UDP session.
#[derive(FromArgs)]
struct CliArgs {
    /// port to listen on (default: 9090)
    #[argh(option, short = 'p', default = "9090")]
    port: u16,

    /// invocation semantics: 0 = at-least-once, 1 = at-most-once (default: 1)
    #[argh(option, default = "1")]
    semantics: u8,

    /// per-request read deadline, in seconds (default: 30)
    #[argh(option, default = "30")]
    request_deadline_secs: u64,

    /// percentage (0-100) of lossy writes to silently drop, to exercise
    /// client retry paths (default: 0)
    #[argh(option, default = "0")]
    loss_rate_percent: u8,

    /// enable verbose (debug-level) logging
    #[argh(switch, short = 'd')]
    debugging: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let semantics = match cli_args.semantics {
        0 => Semantics::AtLeastOnce,
        _ => Semantics::AtMostOnce,
    };

    let options = ServerOptions::new()
        .with_port(cli_args.port)
        .with_semantics(semantics)
        .with_request_deadline(Duration::from_secs(cli_args.request_deadline_secs))
        .with_loss_rate_percent(cli_args.loss_rate_percent);

    let server = Server::bind(options).await.map_err(|e| {
        eprintln!("failed to bind server: {e}");
        Box::<dyn Error>::from(e.to_string())
    })?;

    info!(addr = ?server.local_addr(), "server bound");
    server.serve().await.map_err(|e| Box::<dyn Error>::from(e.to_string()))?;
    Ok(())
}
