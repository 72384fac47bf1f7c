use std::{env, f32::consts::TAU, str::FromStr, time::Duration};

use crate::domain::scoring::ScoringRules;
use crate::domain::{MinigameVariant, SpawnPoint};
use crate::use_cases::{MinigameEntry, RoundSettings, SessionSettings};

// Runtime/server constants and round tuning read from the environment.

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    matches!(
        env::var(key).as_deref().map(str::trim),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

pub fn http_port() -> u16 {
    env_or("PARTY_SERVER_PORT", 3001)
}

pub fn tick_interval() -> Duration {
    tick_period(env_or("TICK_RATE_HZ", 30))
}

const MAX_TICK_RATE_HZ: u64 = 1000;

// `tokio::time::interval` panics on a zero period, so the rate is clamped.
fn tick_period(hz: u64) -> Duration {
    Duration::from_millis(1000 / hz.clamp(1, MAX_TICK_RATE_HZ))
}

/// Engine posts scene completions to `/internal/scenes` instead of the loopback ack.
pub fn external_scene_acks() -> bool {
    env_flag("EXTERNAL_SCENE_ACKS")
}

pub const SESSION_EVENT_CAPACITY: usize = 1024;
pub const CLIENT_BROADCAST_CAPACITY: usize = 256;
pub const PLAYER_QUEUE_CAPACITY: usize = 64;

const LOBBY_SCENE: &str = "lobby";
const SPAWN_RING_SLOTS: usize = 8;
const SPAWN_RING_RADIUS: f32 = 6.0;

// Evenly spaced points facing the arena centre.
fn spawn_ring(slots: usize, radius: f32, height: f32) -> Vec<SpawnPoint> {
    (0..slots)
        .map(|slot| {
            let angle = TAU * slot as f32 / slots as f32;
            let yaw = (angle + std::f32::consts::PI).to_degrees() % 360.0;
            SpawnPoint::new(radius * angle.cos(), height, radius * angle.sin(), yaw)
        })
        .collect()
}

/// Default minigame table: one scene per variant.
pub fn minigame_catalog(countdown: Duration, play: Duration) -> Vec<MinigameEntry> {
    MinigameVariant::ALL
        .iter()
        .map(|&variant| {
            let scene = if variant.is_lobby() {
                LOBBY_SCENE.to_string()
            } else {
                variant.as_str().to_string()
            };
            MinigameEntry {
                variant,
                scene,
                positions: spawn_ring(SPAWN_RING_SLOTS, SPAWN_RING_RADIUS, 1.0),
                countdown,
                play,
            }
        })
        .collect()
}

pub fn session_settings() -> SessionSettings {
    let countdown = Duration::from_secs(env_or("COUNTDOWN_SECS", 5));
    let play = Duration::from_secs(env_or("PLAY_SECS", 60));
    let defaults = ScoringRules::default();

    SessionSettings {
        round: RoundSettings {
            settle_delay: Duration::from_millis(env_or("SCENE_SETTLE_MS", 1000)),
            grace_period: Duration::from_secs(env_or("GRACE_SECS", 5)),
            always_run: env_flag("ALWAYS_RUN"),
            freeze_camera: env_flag("FREEZE_CAMERA"),
            minigames: minigame_catalog(countdown, play),
        },
        scoring: ScoringRules {
            max_points: env_or("MAX_POINTS", defaults.max_points),
            min_points: env_or("MIN_POINTS", defaults.min_points),
            survival_bonus: env_or("SURVIVAL_BONUS", defaults.survival_bonus),
        },
        starting_lives: env_or("STARTING_LIVES", 3),
        seed: env::var("MATCH_SEED").ok().and_then(|v| v.trim().parse().ok()),
    }
}
