pub mod config;
pub mod mode;

pub use config::{
    default_config_path, default_log_dir, AppConfig, ConfigError, ConfigStore, PageConfig,
    SingleInstanceScope,
};
pub use mode::{RunMode, MODE_ENV_VAR};
