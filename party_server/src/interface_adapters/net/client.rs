use crate::domain::ports::ClientCommand;
use crate::domain::replicated::Versioned;
use crate::domain::{PlayerId, RoundState};
use crate::interface_adapters::protocol::{ClientMessage, RoundStatusDto, ServerMessage};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{ConnectOutcome, SessionEvent};

use axum::{
    Error,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::SinkExt;
use std::{
    sync::{Arc, atomic::Ordering},
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Why a player connection ended before or during the session loop.
#[derive(Debug)]
enum NetError {
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    SessionClosed,
    BroadcastClosed,
    RoundStateClosed,
    JoinRequired,
    JoinTimeout,
    InvalidDisplayName,
    Denied,
    ClosedBeforeJoin,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const MAX_DISPLAY_NAME_LEN: usize = 32;
const JOIN_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const APPROVAL_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        // Ids are handed out per socket and never reused within a process.
        let player_id = PlayerId(state.next_player_id.fetch_add(1, Ordering::Relaxed));
        let span = info_span!("conn", player_id = player_id.0);
        handle_socket(socket, state, player_id).instrument(span)
    })
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, player_id: PlayerId) {
    let mut conn = match bootstrap_connection(&mut socket, &state, player_id).await {
        Ok(conn) => conn,
        Err(NetError::ClosedBeforeJoin) => {
            info!("client left before joining");
            return;
        }
        Err(NetError::Denied) => return,
        Err(e) => {
            error!(error = ?e, "player bootstrap failed");
            let _ = send_close_with_reason(&mut socket, close_code::POLICY, "bootstrap failed").await;
            return;
        }
    };

    info!(display_name = %conn.display_name, "player joined");

    if let Err(e) = run_client_loop(&mut socket, &mut conn).await {
        warn!(error = ?e, "player connection ended with error");
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket.send(Message::Text(txt.into())).await?;
    Ok(bytes)
}

async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &str,
) -> Result<(), NetError> {
    socket.send(Message::Close(Some(close_frame(code, reason)))).await?;
    Ok(socket.close().await?)
}

fn close_frame(code: u16, reason: &str) -> CloseFrame {
    CloseFrame {
        code,
        reason: reason.to_string().into(),
    }
}

// Closes the socket with `reason` and fails the handshake with `err`.
async fn reject<T>(
    socket: &mut WebSocket,
    code: u16,
    reason: &str,
    err: NetError,
) -> Result<T, NetError> {
    let _ = send_close_with_reason(socket, code, reason).await;
    Err(err)
}

/// Rate limit for one kind of warning.
struct Throttle(Instant);

impl Throttle {
    fn new() -> Self {
        Self(Instant::now() - LOG_THROTTLE)
    }

    fn ready(&mut self) -> bool {
        if self.0.elapsed() < LOG_THROTTLE {
            return false;
        }
        self.0 = Instant::now();
        true
    }
}

#[derive(Debug, Default)]
struct ConnStats {
    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,
    invalid_json: u32,
    lagged: u64,
}

impl ConnStats {
    fn received(&mut self, bytes: usize) {
        self.msgs_in += 1;
        self.bytes_in += bytes as u64;
    }

    fn sent(&mut self, bytes: usize) {
        self.msgs_out += 1;
        self.bytes_out += bytes as u64;
    }
}

struct Throttles {
    session_full: Throttle,
    broadcast_lag: Throttle,
    invalid_input: Throttle,
}

impl Throttles {
    fn new() -> Self {
        Self {
            session_full: Throttle::new(),
            broadcast_lag: Throttle::new(),
            invalid_input: Throttle::new(),
        }
    }
}

/// A joined player's socket-side state.
struct PlayerConn {
    player_id: PlayerId,
    display_name: String,
    state: Arc<AppState>,
    personal_rx: mpsc::Receiver<ClientCommand>,
    everyone_rx: broadcast::Receiver<ClientCommand>,
    round_state_rx: watch::Receiver<Versioned<RoundState>>,
    stats: ConnStats,
    throttles: Throttles,
}

#[derive(Debug)]
struct JoinRequest {
    display_name: String,
    account_id: u64,
    bytes: usize,
}

async fn bootstrap_connection(
    socket: &mut WebSocket,
    state: &Arc<AppState>,
    player_id: PlayerId,
) -> Result<PlayerConn, NetError> {
    let join = match timeout(JOIN_HANDSHAKE_TIMEOUT, read_join(socket)).await {
        Ok(result) => result?,
        Err(_) => return reject(socket, close_code::POLICY, "join timeout", NetError::JoinTimeout).await,
    };

    // Register queues before the session can address this player.
    let (personal_rx, everyone_rx) = state.hub.register(player_id);
    let round_state_rx = state.view.round_state.clone();

    let outcome = match request_approval(state, player_id, &join).await {
        Ok(outcome) => outcome,
        Err(err) => {
            state.hub.unregister(player_id);
            return Err(err);
        }
    };

    if let ConnectOutcome::Denied { reason } = outcome {
        state.hub.unregister(player_id);
        info!(%reason, "join denied");
        let denied = ServerMessage::Denied {
            reason: reason.clone(),
        };
        let _ = send_message(socket, &denied).await;
        return reject(socket, close_code::POLICY, &reason, NetError::Denied).await;
    }

    let mut stats = ConnStats::default();
    stats.received(join.bytes);

    // From here on the session knows the player; failures must report a disconnect.
    let greeting = [
        ServerMessage::Identity {
            player_id: player_id.to_string(),
        },
        ServerMessage::RoundStatus(RoundStatusDto::from(&state.view)),
    ];
    for msg in &greeting {
        match send_message(socket, msg).await {
            Ok(bytes) => stats.sent(bytes),
            Err(err) => {
                release_player(state, player_id).await;
                return Err(err);
            }
        }
    }

    Ok(PlayerConn {
        player_id,
        display_name: join.display_name,
        state: state.clone(),
        personal_rx,
        everyone_rx,
        round_state_rx,
        stats,
        throttles: Throttles::new(),
    })
}

async fn request_approval(
    state: &AppState,
    player_id: PlayerId,
    join: &JoinRequest,
) -> Result<ConnectOutcome, NetError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .events_tx
        .send(SessionEvent::Connect {
            player_id,
            display_name: join.display_name.clone(),
            account_id: join.account_id,
            reply: Some(reply_tx),
        })
        .await
        .map_err(|_| NetError::SessionClosed)?;

    match timeout(APPROVAL_TIMEOUT, reply_rx).await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(_)) => Err(NetError::SessionClosed),
        Err(_) => {
            // The session may still admit the player; make sure it forgets them.
            release_player(state, player_id).await;
            Err(NetError::SessionClosed)
        }
    }
}

/// Trimmed display name, or `None` when it is empty or too long.
fn valid_display_name(raw: &str) -> Option<&str> {
    let name = raw.trim();
    (!name.is_empty() && name.chars().count() <= MAX_DISPLAY_NAME_LEN).then_some(name)
}

async fn read_join(socket: &mut WebSocket) -> Result<JoinRequest, NetError> {
    while let Some(incoming) = socket.recv().await {
        let text = match incoming? {
            Message::Text(text) => text,
            Message::Binary(_) => {
                return reject(
                    socket,
                    close_code::UNSUPPORTED,
                    "binary messages not supported",
                    NetError::JoinRequired,
                )
                .await;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => break,
        };

        let payload = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Join(payload)) => payload,
            Ok(ClientMessage::Spectate { .. }) => {
                return reject(socket, close_code::POLICY, "join required", NetError::JoinRequired)
                    .await;
            }
            Err(_) => {
                return reject(
                    socket,
                    close_code::POLICY,
                    "invalid join payload",
                    NetError::JoinRequired,
                )
                .await;
            }
        };

        let Some(display_name) = valid_display_name(&payload.display_name) else {
            return reject(
                socket,
                close_code::POLICY,
                "invalid display name",
                NetError::InvalidDisplayName,
            )
            .await;
        };

        return Ok(JoinRequest {
            display_name: display_name.to_string(),
            account_id: payload.account_id,
            bytes: text.len(),
        });
    }
    Err(NetError::ClosedBeforeJoin)
}

/// What the session loop does after one event.
enum Step {
    Continue,
    Close(Option<CloseFrame>),
    Fail(NetError),
}

async fn run_client_loop(socket: &mut WebSocket, conn: &mut PlayerConn) -> Result<(), NetError> {
    let player_id = conn.player_id;

    // Split borrows so `tokio::select!` can hold them concurrently.
    let PlayerConn {
        state,
        personal_rx,
        everyone_rx,
        round_state_rx,
        stats,
        throttles,
        ..
    } = conn;

    let outcome = loop {
        let step = tokio::select! {
            incoming = socket.recv() => {
                handle_incoming(incoming, player_id, &state.events_tx, stats, throttles)
            }

            // Calls addressed to this player only.
            personal = personal_rx.recv() => match personal {
                Some(command) => send_counted(socket, &ServerMessage::from(command), stats).await,
                // The hub dropped our queue; a newer registration replaced it.
                None => Step::Close(Some(close_frame(close_code::POLICY, "connection replaced"))),
            },

            everyone = everyone_rx.recv() => match everyone {
                Ok(command) => send_counted(socket, &ServerMessage::from(command), stats).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    stats.lagged += n;
                    if throttles.broadcast_lag.ready() {
                        warn!(missed = n, "broadcast lagged; resending round status");
                    }
                    send_round_status(socket, state, stats).await
                }
                Err(broadcast::error::RecvError::Closed) => Step::Fail(NetError::BroadcastClosed),
            },

            changed = round_state_rx.changed() => match changed {
                Ok(()) => send_round_status(socket, state, stats).await,
                Err(_) => Step::Fail(NetError::RoundStateClosed),
            },
        };

        match step {
            Step::Continue => continue,
            Step::Close(frame) => break (frame, None),
            Step::Fail(err) => break (None, Some(err)),
        }
    };

    let (frame, fatal) = outcome;
    if let Some(frame) = frame {
        let _ = socket.send(Message::Close(Some(frame))).await;
    }
    if let Err(err) = socket.close().await {
        debug!(error = ?err, "socket close error");
    }

    release_player(state, player_id).await;
    debug!(?stats, "connection stats");
    info!("player left");

    fatal.map_or(Ok(()), Err)
}

async fn release_player(state: &AppState, player_id: PlayerId) {
    state.hub.unregister(player_id);
    let disconnect = SessionEvent::Disconnect { player_id };
    if state.events_tx.send(disconnect).await.is_err() {
        debug!("session closed before disconnect was delivered");
    }
}

fn handle_incoming(
    incoming: Option<Result<Message, Error>>,
    player_id: PlayerId,
    events_tx: &mpsc::Sender<SessionEvent>,
    stats: &mut ConnStats,
    throttles: &mut Throttles,
) -> Step {
    let text = match incoming {
        Some(Ok(Message::Text(text))) => text,
        Some(Ok(Message::Binary(_))) => {
            return Step::Close(Some(close_frame(
                close_code::UNSUPPORTED,
                "binary messages not supported",
            )));
        }
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => return Step::Continue,
        Some(Ok(Message::Close(_))) | None => return Step::Close(None),
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            return Step::Close(None);
        }
    };
    stats.received(text.len());

    match serde_json::from_str::<ClientMessage>(&text) {
        Ok(ClientMessage::Join(_)) => {
            if throttles.invalid_input.ready() {
                warn!("duplicate join ignored");
            }
            Step::Continue
        }
        Ok(ClientMessage::Spectate { direction }) => {
            let event = SessionEvent::Spectate {
                player_id,
                direction: direction.into(),
            };
            match events_tx.try_send(event) {
                Ok(()) => Step::Continue,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if throttles.session_full.ready() {
                        warn!("session channel full; dropping spectate request");
                    }
                    Step::Continue
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Step::Fail(NetError::SessionClosed),
            }
        }
        Err(parse_err) => {
            stats.invalid_json += 1;
            if throttles.invalid_input.ready() {
                warn!(bytes = text.len(), error = %parse_err, "unparseable client message");
            }
            if stats.invalid_json > MAX_INVALID_JSON {
                return Step::Close(Some(close_frame(
                    close_code::POLICY,
                    "too many invalid messages",
                )));
            }
            Step::Continue
        }
    }
}

async fn send_round_status(socket: &mut WebSocket, state: &AppState, stats: &mut ConnStats) -> Step {
    let msg = ServerMessage::RoundStatus(RoundStatusDto::from(&state.view));
    send_counted(socket, &msg, stats).await
}

async fn send_counted(socket: &mut WebSocket, msg: &ServerMessage, stats: &mut ConnStats) -> Step {
    match send_message(socket, msg).await {
        Ok(bytes) => {
            stats.sent(bytes);
            Step::Continue
        }
        Err(err) => {
            warn!(error = ?err, "failed to send server message");
            Step::Close(None)
        }
    }
}
