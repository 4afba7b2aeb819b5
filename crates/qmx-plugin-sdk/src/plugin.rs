//! The plugin capability trait.

use std::collections::BTreeMap;

use semver::Version;

use crate::error::PluginResult;

/// Free-form key/value metadata a plugin reports about itself.
pub type PluginMeta = BTreeMap<String, String>;

/// Lifecycle and identity hooks implemented by every plugin.
///
/// The host calls `install` right after the library constructs the plugin,
/// `initialize` once the plugin system is initialized (immediately if it
/// already is), and `shutdown` then `uninstall` before the library destroys
/// the plugin. Hooks default to no-ops.
pub trait Plugin: Send + Sync {
    /// Identifier, unique within the plugin's module.
    fn id(&self) -> &str;

    fn version(&self) -> Version;

    fn meta(&self) -> PluginMeta {
        PluginMeta::new()
    }

    fn install(&mut self) -> PluginResult<()> {
        Ok(())
    }

    fn uninstall(&mut self) -> PluginResult<()> {
        Ok(())
    }

    fn initialize(&mut self) -> PluginResult<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> PluginResult<()> {
        Ok(())
    }
}
