pub mod config;
pub mod fixtures;
pub mod fixtures_fetch;
pub mod health;
pub mod http_client;
pub mod logging;
pub mod persist;
pub mod tracker;
pub mod week;
