//! HTTP front door for the brain chain.
//!
//! # Endpoints
//!
//! - `GET  /health`                       — Liveness probe
//! - `POST /v1/process`                   — Run one request through the chain
//! - `GET  /v1/users/:user_id/mental-model` — Current per-user model
//! - `GET  /metrics`                      — Counter snapshot

pub mod routes;

pub use routes::{app_router, AppState};
