pub mod mock_app_repository;
pub mod mock_downloader;
pub mod mock_installer;
pub mod mock_package_monitor;
pub mod mock_release_client;

use std::time::Duration;

/// Simulated latency of every mocked I/O call. With a paused test clock this
/// costs nothing but lets observers see each intermediate state.
pub const MOCK_LATENCY: Duration = Duration::from_millis(10);
