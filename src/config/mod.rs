pub mod config_manager;
pub mod source;

pub use config_manager::ConfigManager;
