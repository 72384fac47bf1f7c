// Framework bootstrap for the party server runtime.

use crate::domain::PlayerId;
use crate::frameworks::config;
use crate::interface_adapters::engine::{LoopbackSceneDirector, MonotonicClock, RemotePlayerControl};
use crate::interface_adapters::hub::{ConnectionHub, HubOutbox};
use crate::interface_adapters::net::{
    abort_handler, gate_handler, health_handler, revive_handler, scene_handler, scores_handler,
    ws_handler,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{Session, SessionPorts, SessionSettings, session_task};

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::{
    io::Result,
    sync::{Arc, atomic::AtomicU64},
    time::Duration,
};
use tokio::sync::{Notify, mpsc};
use tracing_subscriber::EnvFilter;

fn init_runtime() {
    let _ = dotenvy::dotenv();
    init_tracing(json_logs());
    install_panic_hook();
}

fn json_logs() -> bool {
    std::env::var("LOG_FORMAT").is_ok_and(|format| is_json_format(&format))
}

fn is_json_format(format: &str) -> bool {
    format.trim().eq_ignore_ascii_case("json")
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("party_server=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if json {
        builder
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .init();
    } else {
        builder.compact().init();
    }
}

// Route panics through tracing.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|at| format!("{}:{}", at.file(), at.line()))
            .unwrap_or_default();
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%location, payload = %info, ?backtrace, "party server panicked");
    }));
}

/// Serves with defaults; settings are still read from the environment.
pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    run_session(
        listener,
        config::session_settings(),
        config::tick_interval(),
        config::external_scene_acks(),
    )
    .await
}

pub async fn run_session(
    listener: tokio::net::TcpListener,
    settings: SessionSettings,
    tick_interval: Duration,
    external_acks: bool,
) -> Result<()> {
    let address = listener.local_addr()?;
    let shutdown = Arc::new(Notify::new());
    let state = build_state(settings, tick_interval, external_acks, shutdown.clone());

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/scores", get(scores_handler))
        .route("/internal/gates", post(gate_handler))
        .route("/internal/scenes", post(scene_handler))
        .route("/internal/rounds/abort", post(abort_handler))
        .route("/internal/revive", post(revive_handler))
        .with_state(state);

    tracing::info!(%address, "listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, "server error");
        });
    // Stop the session loop once the listener is gone.
    shutdown.notify_one();
    served
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

fn build_state(
    settings: SessionSettings,
    tick_interval: Duration,
    external_acks: bool,
    shutdown: Arc<Notify>,
) -> Arc<AppState> {
    let (events_tx, events_rx) = mpsc::channel(config::SESSION_EVENT_CAPACITY);
    let hub = Arc::new(ConnectionHub::new(
        config::CLIENT_BROADCAST_CAPACITY,
        config::PLAYER_QUEUE_CAPACITY,
    ));

    let ports = SessionPorts {
        clock: Box::new(MonotonicClock::new()),
        scenes: Box::new(LoopbackSceneDirector::new(
            hub.clone(),
            events_tx.clone(),
            external_acks,
        )),
        control: Box::new(RemotePlayerControl::new(hub.clone())),
        outbox: Box::new(HubOutbox::new(hub.clone())),
    };
    tracing::debug!(
        minigames = settings.round.minigames.len(),
        tick_ms = tick_interval.as_millis(),
        external_acks,
        seeded = settings.seed.is_some(),
        "session configured"
    );

    let session = Session::new(settings, ports);
    let view = session.view();

    // The session task is the only writer of round state.
    tokio::spawn(session_task(session, events_rx, tick_interval, shutdown));

    Arc::new(AppState {
        events_tx,
        hub,
        view,
        // Socket ids start after the id reserved for server requests.
        next_player_id: AtomicU64::new(PlayerId::SERVER.0 + 1),
    })
}
