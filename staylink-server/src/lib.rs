#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod app_state;
pub mod db;
pub mod handlers;
pub mod registry;
pub mod router;
pub mod routes;
pub mod server;
pub mod store;
