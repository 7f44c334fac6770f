//! # Configuration
//!
//! Environment-driven configuration for the socket server and the client
//! messaging context, with optional file overrides on the server side.

pub mod client;
pub mod server;

pub use client::ClientConfig;
pub use server::{Config, ConfigError, LogFormat};
