// Network adapter modules split by player sockets vs internal engine routes.

pub mod client;
pub mod internal;

pub use client::ws_handler;
pub use internal::{
    abort_handler, gate_handler, health_handler, revive_handler, scene_handler, scores_handler,
};
