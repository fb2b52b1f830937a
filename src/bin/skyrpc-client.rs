//! CLI entry point for the flight-reservation RPC client: one subcommand per
//! RPC method (§6).
//!
//! Grounded on the teacher's `examples/send_sms.rs` CLI shape, extended to
//! `argh`'s subcommand derive since this client exposes more than one call.

use argh::FromArgs;
use skyrpc::client::Client;
use skyrpc::config::ClientOptions;
use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Flight-reservation RPC client.
#[derive(FromArgs)]
struct CliArgs {
    /// server host (default: 127.0.0.1)
    #[argh(option, default = "String::from(\"127.0.0.1\")")]
    host: String,

    /// server port (default: 9090)
    #[argh(option, short = 'p', default = "9090")]
    port: u16,

    /// per-call deadline, in seconds (default: 10)
    #[argh(option, default = "10")]
    call_deadline_secs: u64,

    /// maximum retry attempts per call (default: 3)
    #[argh(option, default = "3")]
    max_retries: u32,

    /// enable verbose (debug-level) logging
    #[argh(switch, short = 'd')]
    debugging: bool,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    FindFlights(FindFlights),
    FindFlight(FindFlight),
    ReserveFlight(ReserveFlight),
    CheckInFlight(CheckInFlight),
    CancelFlight(CancelFlight),
    GetMeals(GetMeals),
    AddMeals(AddMeals),
    MonitorUpdates(MonitorUpdates),
}

/// Search flights by source and destination (substring, case-insensitive).
#[derive(FromArgs)]
#[argh(subcommand, name = "find-flights")]
struct FindFlights {
    #[argh(option)]
    source: String,
    #[argh(option)]
    destination: String,
}

/// Look up a single flight by id.
#[derive(FromArgs)]
#[argh(subcommand, name = "find-flight")]
struct FindFlight {
    #[argh(option)]
    id: i32,
}

/// Reserve seats on a flight.
#[derive(FromArgs)]
#[argh(subcommand, name = "reserve-flight")]
struct ReserveFlight {
    #[argh(option)]
    id: i32,
    #[argh(option)]
    seats: i32,
}

/// Check in an existing reservation.
#[derive(FromArgs)]
#[argh(subcommand, name = "check-in-flight")]
struct CheckInFlight {
    #[argh(option)]
    reservation_id: String,
}

/// Cancel an existing reservation.
#[derive(FromArgs)]
#[argh(subcommand, name = "cancel-flight")]
struct CancelFlight {
    #[argh(option)]
    reservation_id: String,
}

/// List the available meal catalogue.
#[derive(FromArgs)]
#[argh(subcommand, name = "get-meals")]
struct GetMeals {}

/// Add a meal to an existing reservation.
#[derive(FromArgs)]
#[argh(subcommand, name = "add-meals")]
struct AddMeals {
    #[argh(option)]
    reservation_id: String,
    #[argh(option)]
    meal_id: i64,
}

/// Subscribe to flight updates for a given duration.
#[derive(FromArgs)]
#[argh(subcommand, name = "monitor-updates")]
struct MonitorUpdates {
    /// how long to stay subscribed, in seconds (default: 30)
    #[argh(option, default = "30")]
    duration_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let peer: SocketAddr = format!("{}:{}", cli_args.host, cli_args.port)
        .parse()
        .map_err(|e| Box::<dyn Error>::from(format!("invalid host/port: {e}")))?;

    let options = ClientOptions::new()
        .with_call_deadline(Duration::from_secs(cli_args.call_deadline_secs))
        .with_max_retries(cli_args.max_retries);

    let client = Client::connect(peer, options).await.map_err(|e| {
        eprintln!("failed to connect: {e}");
        Box::<dyn Error>::from(e.to_string())
    })?;

    match cli_args.command {
        Command::FindFlights(args) => {
            let flights = client.find_flights(&args.source, &args.destination).await?;
            println!("{flights:#?}");
        }
        Command::FindFlight(args) => {
            let flight = client.find_flight(args.id).await?;
            println!("{flight:#?}");
        }
        Command::ReserveFlight(args) => {
            let reservation = client.reserve_flight(args.id, args.seats).await?;
            println!("{reservation:#?}");
        }
        Command::CheckInFlight(args) => {
            let reservation = client.check_in_flight(&args.reservation_id).await?;
            println!("{reservation:#?}");
        }
        Command::CancelFlight(args) => {
            let reservation = client.cancel_flight(&args.reservation_id).await?;
            println!("{reservation:#?}");
        }
        Command::GetMeals(_) => {
            let meals = client.get_meals().await?;
            println!("{meals:#?}");
        }
        Command::AddMeals(args) => {
            let reservation = client.add_meals(&args.reservation_id, args.meal_id).await?;
            println!("{reservation:#?}");
        }
        Command::MonitorUpdates(args) => {
            client
                .monitor_updates(Duration::from_secs(args.duration_secs), |flight| {
                    println!("update: {flight:#?}");
                })
                .await?;
        }
    }

    Ok(())
}
