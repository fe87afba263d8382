//! Thin wrapper around the Cloudflare v4 REST API.
pub mod client;
pub mod types;

pub use client::{CloudflareClient, ClientError, RequestFailure, Verb};
