use crate::plugin::{
    mock_detector::MockDetectorPlugin,
    registry::{PluginRegistry, SharedPlugin},
    yolov8_detector::YoloV8DetectorPlugin,
};
use anyhow::{bail, Context, Result};
use std::env;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const YOLOV8_PERSON_DETECTOR: &str = "yolov8_person_detector";
pub const MOCK_PERSON_DETECTOR: &str = "mock_person_detector";

/// Which detector plugin to run and how to initialize it
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Plugin id (`yolov8_person_detector` or `mock_person_detector`)
    pub plugin_id: String,

    /// Plugin-specific configuration handed to `init`
    pub plugin_config: serde_json::Value,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            plugin_id: YOLOV8_PERSON_DETECTOR.to_string(),
            plugin_config: serde_json::Value::Null,
        }
    }
}

impl DetectorConfig {
    pub fn from_env() -> Result<Self> {
        let plugin_id =
            env::var("DETECTOR_PLUGIN").unwrap_or_else(|_| YOLOV8_PERSON_DETECTOR.to_string());

        let plugin_config = env::var("DETECTOR_CONFIG")
            .ok()
            .map(|raw| serde_json::from_str(&raw).context("Invalid DETECTOR_CONFIG JSON"))
            .transpose()?
            .unwrap_or(serde_json::Value::Null);

        Ok(Self {
            plugin_id,
            plugin_config,
        })
    }

    pub fn mock(plugin_config: serde_json::Value) -> Self {
        Self {
            plugin_id: MOCK_PERSON_DETECTOR.to_string(),
            plugin_config,
        }
    }

    /// Instantiate, initialize and register the configured detector
    pub async fn build_registry(&self) -> Result<PluginRegistry> {
        let plugin: SharedPlugin = match self.plugin_id.as_str() {
            YOLOV8_PERSON_DETECTOR => Arc::new(RwLock::new(YoloV8DetectorPlugin::new())),
            MOCK_PERSON_DETECTOR => Arc::new(RwLock::new(MockDetectorPlugin::new())),
            other => bail!("Unknown detector plugin '{}'", other),
        };

        plugin
            .write()
            .await
            .init(self.plugin_config.clone())
            .await
            .with_context(|| format!("Failed to initialize detector '{}'", self.plugin_id))?;

        let registry = PluginRegistry::new();
        registry.register(plugin).await?;
        Ok(registry)
    }
}
