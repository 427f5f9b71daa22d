pub mod apps;
pub mod config;
pub mod download_client;
pub mod error;
pub mod github;
pub mod installer;
pub mod logging;
pub mod models;
pub mod package_monitor;
pub mod platform;
pub mod repository;
pub mod state;
pub mod version;

#[cfg(test)]
pub mod test_helpers;
