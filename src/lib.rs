//! steelauth: authentication and session management for the storefront.
//! Server side issues signed one-hour session tokens against a durable
//! credential store; client side owns session state, persistence, role
//! policy and post-login routing.

pub mod client;
pub mod config;
pub mod error;
pub mod policy;
pub mod server;
pub mod service;
pub mod store;
pub mod token;
