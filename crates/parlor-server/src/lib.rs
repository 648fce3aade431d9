//! # parlor-server
//!
//! Axum HTTP + `WebSocket` chat gateway.
//!
//! - One-time credentials: [`otp::RetentionMap`] issues, redeems and sweeps
//!   single-use admission tokens
//! - Admission and the live-set: [`websocket::SessionManager`]
//! - Per-connection duplex pumps with heartbeat and bounded outbound queues
//! - Envelope routing through [`dispatch::EventRegistry`] and the built-in
//!   chat handlers
//! - HTTP surface: `/ws`, `/login`, `/debug`, `/health`, `/metrics`, static
//!   assets
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod otp;
pub mod server;
pub mod shutdown;
pub mod websocket;
