//! Parley API Library Crate
//!
//! The trusted intermediary for realtime voice clients: it mints ephemeral
//! session credentials, runs image analyses, and serves the static client.
//! The `api` binary is a thin wrapper around this library.

pub mod analysis;
pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod upstream;
