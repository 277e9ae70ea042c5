// packages/sdk/src/runtime/plugin.rs
//! Plugin registry
//!
//! A plugin is a named record with an install hook invoked exactly once
//! per name. Duplicate installation is a warning and a no-op; `uninstall`
//! runs on explicit removal and on core shutdown.

use crate::runtime::monitor::Monitor;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// A named extension installed into the core.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Invoked exactly once per name.
    fn install(&self, core: &Monitor);

    /// Invoked on explicit removal and on core shutdown.
    fn uninstall(&self) {}
}

/// Registry of installed plugins.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Mutex<Vec<Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `plugin` into `core`; duplicates by name are rejected.
    pub fn install(&self, core: &Monitor, plugin: Arc<dyn Plugin>) -> bool {
        {
            let mut plugins = self.plugins.lock();
            if plugins.iter().any(|p| p.name() == plugin.name()) {
                warn!(name = plugin.name(), "plugin already installed");
                return false;
            }
            plugins.push(Arc::clone(&plugin));
        }

        debug!(name = plugin.name(), version = plugin.version(), "plugin installed");
        plugin.install(core);
        true
    }

    /// Remove the plugin named `name`, running its uninstall hook.
    pub fn remove(&self, name: &str) -> bool {
        let removed = {
            let mut plugins = self.plugins.lock();
            match plugins.iter().position(|p| p.name() == name) {
                Some(at) => Some(plugins.remove(at)),
                None => None,
            }
        };

        match removed {
            Some(plugin) => {
                plugin.uninstall();
                debug!(name, "plugin removed");
                true
            }
            None => {
                warn!(name, "plugin not installed");
                false
            }
        }
    }

    /// Uninstall everything, newest first (core shutdown).
    pub fn shutdown(&self) {
        let drained: Vec<Arc<dyn Plugin>> = {
            let mut plugins = self.plugins.lock();
            plugins.drain(..).collect()
        };
        for plugin in drained.into_iter().rev() {
            plugin.uninstall();
        }
    }

    pub fn installed_names(&self) -> Vec<String> {
        self.plugins.lock().iter().map(|p| p.name().to_string()).collect()
    }

    pub fn count(&self) -> usize {
        self.plugins.lock().len()
    }
}
