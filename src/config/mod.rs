pub mod config_commands;
pub mod paths;
pub mod settings;

pub use paths::{default_settings_path, fallback_log_dirs};
pub use settings::{
    DeviceSettings,
    DisplaySettings,
    LoggingSettings,
    SerialSettings,
    ServerSettings,
    Settings,
    StorageSettings,
    Theme,
};
