use std::time::Duration;

use clap::Parser;
use lunaguard_relay::{AppState, Faults, serve};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "lunaguard-relay")]
struct RelayArgs {
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind_address: String,
    /// Artificial delay added to every response.
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = RelayArgs::parse();
    let listener = match tokio::net::TcpListener::bind(&args.bind_address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {}: {}", args.bind_address, err);
            std::process::exit(1);
        }
    };

    let state = AppState::new();
    if args.latency_ms > 0 {
        state
            .set_faults(Faults {
                latency: Duration::from_millis(args.latency_ms),
                ..Faults::default()
            })
            .await;
    }

    info!("relay starting on {}", args.bind_address);
    if let Err(err) = serve(listener, state).await {
        warn!("relay server exited: {}", err);
    }
}
