//! # Walletgate Core
//!
//! Core library for the walletgate JSON-RPC proxy, which sits in front of a pool of wallet
//! SDK daemons.
//!
//! This crate provides the foundational components for:
//!
//! - **[`backend`]**: The backend pool, sticky user-to-backend bindings and the shared HTTP
//!   client used to reach the daemons.
//!
//! - **[`cache`]**: A TTL response cache with per-method rules and single-flight computation,
//!   so concurrent identical queries reach a backend once.
//!
//! - **[`hooks`]**: Ordered preflight and postflight interceptors around every backend call.
//!
//! - **[`auth`]**: Method classification and the auth gate in front of wallet-scoped methods.
//!
//! - **[`proxy`]**: The request pipeline tying it all together, plus the error taxonomy.
//!
//! - **[`metrics`]**: Prometheus metrics collection.
//!
//! - **[`audit`]**: Audit records for wallet-affecting calls.
//!
//! ## Request Flow
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌──────────────┐
//! │    Decode    │ ─── Unreadable ──► 400 Parse Error
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │  Auth Gate   │ ─── Wallet required, no user ──► Auth Error
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │   Registry   │  user ──► bound backend, anonymous ──► random backend
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │  Preflight   │ ─── Respond / Fail ──┐
//! └──────┬───────┘                      │
//!        ▼                              │
//! ┌──────────────┐                      │
//! │ Cache/Backend│                      │
//! └──────┬───────┘                      │
//!        ▼                              ▼
//! ┌──────────────────────────────────────┐
//! │              Postflight              │
//! └──────────────────┬───────────────────┘
//!                    ▼
//!           Response to Client
//! ```

pub mod audit;
pub mod auth;
pub mod backend;
pub mod cache;
pub mod config;
pub mod hooks;
pub mod metrics;
pub mod proxy;
pub mod types;
