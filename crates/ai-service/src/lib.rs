pub mod config;
pub mod plugin;

pub use config::DetectorConfig;
pub use plugin::registry::PluginRegistry;
pub use plugin::AiPlugin;
