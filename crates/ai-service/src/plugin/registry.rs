use super::AiPlugin;
use anyhow::{anyhow, Result};
use common::ai_tasks::PluginInfo;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedPlugin = Arc<RwLock<dyn AiPlugin>>;

/// Registry of detector plugins, keyed by plugin id
#[derive(Clone)]
pub struct PluginRegistry {
    plugins: Arc<RwLock<HashMap<String, SharedPlugin>>>,
}

impl PluginRegistry {
    /// Create a new empty plugin registry
    pub fn new() -> Self {
        Self {
            plugins: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a plugin
    pub async fn register(&self, plugin: SharedPlugin) -> Result<()> {
        let mut plugins = self.plugins.write().await;
        let id = plugin.read().await.id().to_string();

        if plugins.contains_key(&id) {
            return Err(anyhow!("Plugin '{}' is already registered", id));
        }

        plugins.insert(id.clone(), plugin);
        tracing::info!(plugin = %id, "registered detector plugin");
        Ok(())
    }

    /// Get a plugin by ID
    pub async fn get(&self, plugin_id: &str) -> Result<SharedPlugin> {
        let plugins = self.plugins.read().await;
        plugins
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| anyhow!("Plugin '{}' not found", plugin_id))
    }

    /// List all registered plugins, sorted by id
    pub async fn list(&self) -> Vec<PluginInfo> {
        let plugins = self.plugins.read().await;
        let mut infos = Vec::with_capacity(plugins.len());

        for plugin in plugins.values() {
            infos.push(plugin.read().await.info());
        }

        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Check if a plugin is registered
    pub async fn has_plugin(&self, plugin_id: &str) -> bool {
        self.plugins.read().await.contains_key(plugin_id)
    }

    /// Get the number of registered plugins
    pub async fn count(&self) -> usize {
        self.plugins.read().await.len()
    }

    /// Health check all plugins
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let plugins = self.plugins.read().await;
        let mut results = HashMap::new();

        for (id, plugin) in plugins.iter() {
            let healthy = plugin.read().await.health_check().await.unwrap_or(false);
            telemetry::metrics::DETECTOR_PLUGIN_HEALTH
                .with_label_values(&[id.as_str()])
                .set(healthy as i64);
            results.insert(id.clone(), healthy);
        }

        results
    }

    /// Shutdown all plugins
    pub async fn shutdown_all(&self) -> Result<()> {
        let plugins = self.plugins.read().await;

        for (id, plugin) in plugins.iter() {
            let mut plugin_write = plugin.write().await;
            if let Err(e) = plugin_write.shutdown().await {
                tracing::error!(plugin = %id, error = %e, "error shutting down plugin");
            }
        }

        Ok(())
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
