//! HTTP-level helpers for the proxy server.
//!
//! Request ids are tower layers; client identity extraction is plain functions over the
//! request headers, called by the RPC handler.

pub mod client;
pub mod request_id;

pub use client::{auth_token, remote_ip};
pub use request_id::{request_id_layers, request_id_of, UuidRequestId, X_REQUEST_ID};
