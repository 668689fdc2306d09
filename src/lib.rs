pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod relay;
pub mod server;
pub mod store;
pub mod telegram;
pub mod webhook;
