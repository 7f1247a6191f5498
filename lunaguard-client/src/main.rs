use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand, builder::BoolishValueParser};
use lunaguard_client::{
    CommandDispatcher, RelayTimeouts, StatusPoller,
    collaborators::{Collaborators, SessionTerminator, TracingEventLog, TracingNotifier},
    control::ControlKind,
    error::CollaboratorError,
    events::ClientEvent,
    runtime::{ClientConfig, ClientRuntime},
    settings::{SettingsPatch, SettingsStore, default_settings_path},
    sync::SyncConfig,
};
use lunaguard_core::{Command, DEFAULT_RELAY_URL, format_time_since, is_device_online};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "lunaguard", about = "Remote lock and power control for a LunaGuard device")]
struct ClientArgs {
    #[arg(long, default_value = DEFAULT_RELAY_URL)]
    relay_url: String,
    #[arg(long)]
    settings_path: Option<PathBuf>,
    /// Vehicle the audit entries are attached to.
    #[arg(long)]
    vehicle_id: Option<String>,
    /// Wait between an accepted command and the confirming status poll.
    #[arg(long, default_value_t = 1000)]
    settle_ms: u64,
    /// Overrides the per-call relay timeouts (10s health/status, 15s command).
    #[arg(long)]
    request_timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Relay health check.
    Health,
    /// Current device snapshot.
    Status,
    /// Send one raw command (lock, unlock, disconnect, reconnect, panic, no-panic).
    Send { command: Command },
    /// Flip a control and wait for the device to confirm.
    Toggle { control: ControlKind },
    /// Keep the device view in sync until Ctrl-C.
    Watch {
        #[arg(long, default_value_t = 3600)]
        interval_secs: u64,
    },
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    Set {
        /// on/off, yes/no or true/false.
        #[arg(long, value_parser = BoolishValueParser::new())]
        auto_logout: Option<bool>,
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    Reset,
}

/// The CLI has no session of its own; sign-out only needs to be visible.
struct CliSignOut;

#[async_trait]
impl SessionTerminator for CliSignOut {
    async fn sign_out(&self) -> Result<(), CollaboratorError> {
        info!("session signed out");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = ClientArgs::parse();
    if let Err(err) = run(args).await {
        error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(args: ClientArgs) -> Result<(), String> {
    let settings_path = args
        .settings_path
        .clone()
        .unwrap_or_else(default_settings_path);

    if let CliCommand::Settings { action } = args.command {
        return run_settings(settings_path, action);
    }

    let timeouts = match args.request_timeout_secs {
        Some(secs) => RelayTimeouts {
            health: Duration::from_secs(secs),
            status: Duration::from_secs(secs),
            command: Duration::from_secs(secs),
        },
        None => RelayTimeouts::default(),
    };
    let mut config = ClientConfig {
        relay_url: args.relay_url.clone(),
        timeouts,
        settle_delay: Duration::from_millis(args.settle_ms),
        settings_path,
        vehicle_id: args.vehicle_id.clone(),
        ..ClientConfig::default()
    };
    if let CliCommand::Watch { interval_secs } = args.command {
        config.sync = SyncConfig {
            interval: Duration::from_secs(interval_secs),
            pull_to_refresh: false,
        };
    }

    let runtime = ClientRuntime::build(
        config,
        Collaborators {
            event_log: Arc::new(TracingEventLog),
            terminator: Arc::new(CliSignOut),
            notifier: Arc::new(TracingNotifier),
        },
    )
    .map_err(|err| err.to_string())?;

    match args.command {
        CliCommand::Health => {
            let healthy = runtime.relay.check_server_health().await;
            println!("{}", if healthy { "Conectado" } else { "Desconectado" });
        }
        CliCommand::Status => {
            let view = runtime.controller.refresh_status().await;
            print_view(&view);
        }
        CliCommand::Send { command } => {
            let accepted = runtime.relay.send_command(command).await;
            println!("{command}: {}", if accepted { "sent" } else { "not accepted" });
        }
        CliCommand::Toggle { control } => {
            runtime.controller.refresh_status().await;
            let outcome = runtime.controller.toggle(control).await;
            println!("{control}: {outcome:?}");
            print_view(&runtime.controller.view());
        }
        CliCommand::Watch { .. } => watch(&runtime).await,
        CliCommand::Settings { .. } => {}
    }
    Ok(())
}

fn run_settings(path: PathBuf, action: SettingsAction) -> Result<(), String> {
    let mut store = SettingsStore::open(path);
    match action {
        SettingsAction::Show => {}
        SettingsAction::Set {
            auto_logout,
            timeout_secs,
        } => {
            store
                .update(SettingsPatch {
                    auto_logout_enabled: auto_logout,
                    auto_logout_timeout_seconds: timeout_secs,
                })
                .map_err(|err| format!("saving {}: {err}", store.path().display()))?;
        }
        SettingsAction::Reset => {
            store
                .reset()
                .map_err(|err| format!("resetting {}: {err}", store.path().display()))?;
        }
    }
    let rendered =
        serde_json::to_string_pretty(&store.settings()).map_err(|err| err.to_string())?;
    println!("{rendered}");
    Ok(())
}

async fn watch(runtime: &ClientRuntime) {
    let mut events = runtime.bus.subscribe();
    runtime.start_session();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ClientEvent::SyncFinished { ok }) => {
                    info!(ok, last_sync = %runtime.sync.time_since_last_sync(), "sync finished");
                    print_view(&runtime.controller.view());
                }
                Ok(ClientEvent::RefreshRequested(topic)) => {
                    info!(topic = topic.as_str(), "refresh requested");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    runtime.end_session();
    info!("watch stopped");
}

fn print_view(view: &lunaguard_client::DeviceView) {
    let now = Utc::now();
    let online = is_device_online(view.snapshot.as_ref(), now);
    println!(
        "servidor: {} | dispositivo: {}",
        if view.server_reachable { "Conectado" } else { "Desconectado" },
        if online { "en línea" } else { "sin conexión" }
    );
    match &view.snapshot {
        Some(snapshot) => {
            let age = (now - snapshot.last_update_time).to_std().ok();
            println!(
                "bloqueado: {} | energía: {} | pánico: {} | última actualización: {} ({})",
                snapshot.is_locked,
                snapshot.has_power,
                snapshot.panic,
                snapshot.last_update_time.to_rfc3339(),
                format_time_since(age)
            );
            if let Some(last) = &snapshot.last_command {
                println!("último comando: {last}");
            }
        }
        None => println!("Sin datos"),
    }
}
