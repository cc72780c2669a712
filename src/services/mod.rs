pub mod data_service;
pub mod diagnostics;
pub mod live_buffer;
#[cfg(feature = "api")]
pub mod api_service;
#[cfg(feature = "websocket")]
pub mod socket_server;

pub use data_service::DataService;
pub use diagnostics::{check_permissions, test_file_write, PathStatus, PermissionReport};
pub use live_buffer::{LiveBuffer, SharedBuffer};
#[cfg(feature = "api")]
pub use api_service::{ApiService, ApiServiceState};
#[cfg(feature = "websocket")]
pub use socket_server::LiveFeedServer;
