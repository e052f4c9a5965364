//! Pulseboard Binary Entry Point
//!
//! `serve` runs the JSON API; `watch` polls the overview summary and follows
//! the live alert list in the terminal.
//! Core functionality is provided by the `pulseboard` library crate.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pulseboard::{
    Actor, AppConfig, MetricScope, SmartRefresh, StorageBuilder, StorageHandles,
    config::parse_duration,
    dashboard::{self, Dataset, PerformanceSummary, SummarySource},
    realtime::{AlertFeed, AlertFeedState},
    refresh::RefreshState,
    server::{AppState, create_router},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pulseboard - Performance Monitoring Dashboard
#[derive(Parser, Debug)]
#[command(name = "pulseboard", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        default_value = "configs/config.yaml",
        env = "PULSEBOARD_CONFIG"
    )]
    config: String,

    /// Database URL (overrides config file)
    #[arg(long, global = true, env = "PULSEBOARD_DB_URL")]
    db_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Server bind address (overrides config file)
        #[arg(long, env = "PULSEBOARD_SERVER_BIND")]
        server_bind: Option<String>,

        /// Server port (overrides config file)
        #[arg(long, env = "PULSEBOARD_SERVER_PORT")]
        server_port: Option<u16>,

        /// Dataset JSON to import before serving
        #[arg(long)]
        import: Option<PathBuf>,
    },

    /// Follow the summary and alert list in the terminal
    ///
    /// Commands on stdin: `r` refresh, `a <id>` acknowledge, `x <id>` resolve,
    /// `q` quit. Any other line counts as interaction and pauses polling.
    Watch {
        /// Polling interval (overrides config file)
        #[arg(long, value_parser = parse_duration)]
        interval: Option<Duration>,

        /// Look-back window: 1h, 6h, 12h, 24h, 7d, 30d or 90d
        #[arg(long)]
        range: Option<String>,

        /// Actor id used for alert transitions
        #[arg(long, env = "PULSEBOARD_ACTOR")]
        actor: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pulseboard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(url) = cli.db_url {
        config.database.url = url;
    }

    match cli.command {
        Command::Serve {
            server_bind,
            server_port,
            import,
        } => {
            // CLI > ENV > config file
            if let Some(bind) = server_bind {
                config.server.bind = bind;
            }
            if let Some(port) = server_port {
                config.server.port = port;
            }
            config.validate()?;
            let handles = open_storage(&config).await?;
            serve(config, handles, import).await
        }
        Command::Watch {
            interval,
            range,
            actor,
        } => {
            if let Some(interval) = interval {
                config.refresh.interval = Some(interval);
            }
            config.validate()?;
            let scope = match range.as_deref() {
                None => MetricScope::default(),
                Some(r) => {
                    let start = dashboard::range_start(r, chrono::Utc::now()).ok_or_else(|| {
                        format!(
                            "unsupported range '{r}', expected one of {}",
                            dashboard::RANGES.join(", ")
                        )
                    })?;
                    MetricScope::since(start)
                }
            };
            let handles = open_storage(&config).await?;
            let actor = Actor::from_raw(actor.as_deref());
            let result = watch(&config, handles.clone(), scope, actor).await;
            handles.shutdown().await;
            result
        }
    }
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_config(path: &str) -> Result<AppConfig, Box<dyn std::error::Error>> {
    if Path::new(path).exists() {
        tracing::info!("Loading configuration from: {}", path);
        Ok(AppConfig::load(path)?)
    } else {
        tracing::warn!("Config file {} not found, using defaults", path);
        Ok(AppConfig::default())
    }
}

async fn open_storage(config: &AppConfig) -> Result<StorageHandles, Box<dyn std::error::Error>> {
    tracing::info!("Initializing storage at: {}", config.database.url);
    let handles = StorageBuilder::new(&config.database.url)
        .max_connections(config.database.max_connections)
        .feed_capacity(config.database.feed_capacity)
        .build()
        .await?;
    tracing::info!("Storage initialized");
    Ok(handles)
}

async fn serve(
    config: AppConfig,
    handles: StorageHandles,
    import: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = import {
        tracing::info!("Importing dataset from: {}", path.display());
        let dataset = Dataset::from_json(&std::fs::read_to_string(&path)?)?;
        let summary = dashboard::import_dataset(&handles, &dataset).await?;
        tracing::info!(
            sessions = summary.sessions,
            metrics = summary.metrics,
            alert_configs = summary.alert_configs,
            alerts = summary.alerts,
            feedback = summary.feedback,
            "Dataset imported"
        );
    }

    let app = create_router(AppState::new(
        handles.clone(),
        (&config.live_metrics).into(),
    ));

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down storage...");
    handles.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn watch(
    config: &AppConfig,
    handles: StorageHandles,
    scope: MetricScope,
    actor: Option<Actor>,
) -> Result<(), Box<dyn std::error::Error>> {
    let refresh = SmartRefresh::spawn(
        SummarySource::new(handles.clone(), scope),
        config.refresh.to_refresh_config("summary"),
        None,
    );
    let alerts = AlertFeed::spawn(Arc::new(handles.feed.clone()), handles.alert_store.clone());

    let mut summary_rx = refresh.subscribe();
    let mut alerts_rx = alerts.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = summary_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = summary_rx.borrow_and_update().clone();
                print_summary(&state);
            }
            changed = alerts_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = alerts_rx.borrow_and_update().clone();
                print_alerts(&state);
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some("q"), _) => break,
                    (Some("r"), _) => refresh.refresh().await,
                    (Some("a"), Some(id)) => {
                        match alerts.acknowledge(id, actor.clone()).await {
                            Ok(alert) => println!("acknowledged {}", alert.id),
                            Err(e) => println!("error: {e}"),
                        }
                    }
                    (Some("x"), Some(id)) => {
                        match alerts.resolve(id, actor.clone()).await {
                            Ok(alert) => println!("resolved {}", alert.id),
                            Err(e) => println!("error: {e}"),
                        }
                    }
                    _ => refresh.notify_interaction().await,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C signal");
                break;
            }
        }
    }

    Ok(())
}

fn print_summary(state: &RefreshState<PerformanceSummary>) {
    if let Some(error) = &state.error {
        println!("summary: fetch failed: {}", error.message);
    }
    let Some(summary) = &state.data else {
        if state.is_refreshing {
            println!("summary: loading...");
        }
        return;
    };
    if state.is_refreshing {
        return;
    }
    let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
    println!(
        "health {} ({}) | sessions {} devices {} samples {} | fps {} mem {} cpu {} load {}{}",
        summary.health.overall,
        summary.health.grade,
        summary.total_sessions,
        summary.unique_devices,
        summary.total_samples,
        fmt(summary.avg_fps),
        fmt(summary.avg_memory),
        fmt(summary.avg_cpu),
        fmt(summary.avg_load_time),
        if state.is_paused { " [paused]" } else { "" },
    );
}

fn print_alerts(state: &AlertFeedState) {
    if let Some(error) = state.fetch_error.as_deref().or(state.mutation_error.as_deref()) {
        println!("alerts: {error}");
    }
    let open: Vec<_> = state
        .alerts
        .iter()
        .filter(|a| a.status != pulseboard::AlertStatus::Resolved)
        .collect();
    println!("alerts ({}): {} open", state.connection, open.len());
    for alert in open {
        println!(
            "  [{}] {} {} {}",
            alert.severity, alert.status, alert.id, alert.message
        );
    }
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
