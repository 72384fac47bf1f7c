// Interface adapters: wire protocol, socket routing, and engine-side ports.

pub mod engine;
pub mod http;
pub mod hub;
pub mod net;
pub mod protocol;
pub mod state;
