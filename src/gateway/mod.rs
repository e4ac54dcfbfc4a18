//! HTTP gateway
//!
//! Validates inbound requests, maps them onto the bridge and maps results and
//! errors back to JSON responses.

pub mod dto;
mod extract;
pub mod routes;
mod server;
mod state;

pub use server::{create_app, spawn_cleanup, start_server};
pub use state::AppState;
