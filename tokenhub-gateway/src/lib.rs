//! Reference binary crate for the TokenHub routing engine.
//!
//! This crate is deliberately thin: it loads a [`config::GatewayConfig`],
//! registers one [`adapter::OpenAiCompatibleProvider`] per configured
//! provider into a `tokenhub_router::engine::TokenHubRouter`, and routes one
//! request from the command line. It exists to show how a caller wires the
//! router crate up, not to be a production HTTP gateway.

pub mod adapter;
pub mod config;
