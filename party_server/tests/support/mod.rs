// Shared primitives for one-time server bootstrapping across integration tests.
use std::{
    // `Arc` shares data between threads; `OnceLock` writes a value only once.
    sync::{Arc, OnceLock},
    // Sleep durations are used in readiness polling loops.
    time::Duration,
};

use party_server::domain::{MinigameVariant, SpawnPoint};
use party_server::use_cases::{MinigameEntry, RoundSettings, SessionSettings};

// Base URL of the server that only ever hosts the lobby, so joins are always approved.
static LOBBY_SERVER_URL: OnceLock<String> = OnceLock::new();

// Ensure the lobby-only test server is running and return its base URL.
pub fn ensure_server() -> &'static str {
    // Run initialization exactly once even if multiple tests call this function.
    LOBBY_SERVER_URL
        .get_or_init(|| spawn_server(lobby_only_settings(), false))
        .as_str()
}

// Base URL of the server whose scene completions are posted by the tests themselves.
static ROUND_SERVER_URL: OnceLock<String> = OnceLock::new();

// Ensure the test server that can start a minigame is running and return its base URL.
pub fn ensure_round_server() -> &'static str {
    ROUND_SERVER_URL
        .get_or_init(|| spawn_server(lobby_and_minigame_settings(), true))
        .as_str()
}

fn lobby_entry() -> MinigameEntry {
    MinigameEntry {
        variant: MinigameVariant::Blank,
        scene: "lobby".to_string(),
        positions: vec![SpawnPoint::new(0.0, 1.0, 0.0, 0.0)],
        countdown: Duration::from_secs(5),
        play: Duration::from_secs(60),
    }
}

// Lobby plus a single minigame; scenes only advance when a test acks them.
fn lobby_and_minigame_settings() -> SessionSettings {
    SessionSettings {
        round: RoundSettings {
            settle_delay: Duration::from_millis(20),
            minigames: vec![
                lobby_entry(),
                MinigameEntry {
                    variant: MinigameVariant::Ascend,
                    scene: "ascend".to_string(),
                    positions: vec![SpawnPoint::new(5.0, 1.0, 0.0, 0.0)],
                    countdown: Duration::from_secs(5),
                    play: Duration::from_secs(60),
                },
            ],
            ..RoundSettings::default()
        },
        seed: Some(7),
        ..SessionSettings::default()
    }
}

// A catalog with just the lobby scene: selection finds nothing and the session idles in Lobby.
fn lobby_only_settings() -> SessionSettings {
    SessionSettings {
        round: RoundSettings {
            settle_delay: Duration::from_millis(20),
            minigames: vec![lobby_entry()],
            ..RoundSettings::default()
        },
        seed: Some(7),
        ..SessionSettings::default()
    }
}

// Boot a server on its own OS thread and block until it accepts connections.
fn spawn_server(settings: SessionSettings, external_acks: bool) -> String {
    // The server thread writes its bound URL here once the listener exists.
    let published_url = Arc::new(OnceLock::<String>::new());
    let published_url_thread = Arc::clone(&published_url);
    // A dedicated OS thread keeps the server alive across per-test runtimes.
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().expect("test runtime");
        runtime.block_on(async move {
            // Ephemeral port, so parallel test binaries never collide.
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("bind ephemeral test port");
            let addr = listener.local_addr().expect("get local addr");
            let _ = published_url_thread.set(format!("http://{}", addr));
            // A fast tick keeps the tests quick.
            party_server::run_session(listener, settings, Duration::from_millis(10), external_acks)
                .await
                .expect("server failed");
        });
    });
    wait_for_server_url_and_readiness(published_url)
}

// Waits for the published URL, then for the listener to accept TCP connections.
fn wait_for_server_url_and_readiness(published_url: Arc<OnceLock<String>>) -> String {
    // Poll until the server thread publishes the base URL.
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    // Raw TCP connects need host:port only.
    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");

    // Retry for a short period to avoid racing server bind/accept.
    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return base_url;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    panic!("server did not become ready in time");
}

// WebSocket URL for the same server.
pub fn ws_url(base_url: &str) -> String {
    format!("{}/ws", base_url.replacen("http://", "ws://", 1))
}
