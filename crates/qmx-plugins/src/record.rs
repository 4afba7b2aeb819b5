//! Bookkeeping for one loaded plugin library.

use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use qmx_plugin_sdk::{EntryPoints, Plugin, PluginObject, PluginResult};

use crate::error::RegistryError;
use crate::library::LibraryHandle;

/// Lifecycle state of an installed plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    /// Installed, waiting for the system to initialize.
    Installed,
    /// Installed and initialized.
    Initialized,
}

/// A plugin lifecycle hook, used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleHook {
    Install,
    Initialize,
    Shutdown,
    Uninstall,
}

impl fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleHook::Install => "install",
            LifecycleHook::Initialize => "initialize",
            LifecycleHook::Shutdown => "shutdown",
            LifecycleHook::Uninstall => "uninstall",
        };
        f.write_str(name)
    }
}

/// One loaded plugin: its library, entry points and live plugin object.
///
/// Dropping the record calls `PluginStop` and then unloads the library.
pub(crate) struct PluginRecord {
    instance: NonNull<PluginObject>,
    entry: EntryPoints,
    state: PluginState,
    path: PathBuf,
    // Declared last so the library outlives the stop call in `drop`.
    library: Box<dyn LibraryHandle>,
}

// SAFETY: the plugin object is `Send + Sync` through the `Plugin` bound and
// is only mutated while the registry's write lock is held.
unsafe impl Send for PluginRecord {}
unsafe impl Sync for PluginRecord {}

impl PluginRecord {
    /// Call `PluginStart` and wrap the object it produces.
    ///
    /// # Safety
    /// `entry` must have been resolved from `library`.
    pub(crate) unsafe fn start(
        library: Box<dyn LibraryHandle>,
        entry: EntryPoints,
        path: PathBuf,
    ) -> Result<Self, RegistryError> {
        let mut object: *mut PluginObject = std::ptr::null_mut();
        (entry.start)(&mut object);

        let instance = NonNull::new(object).ok_or_else(|| RegistryError::StartFailed(path.clone()))?;
        Ok(Self {
            instance,
            entry,
            state: PluginState::Installed,
            path,
            library,
        })
    }

    pub(crate) fn plugin(&self) -> &dyn Plugin {
        // SAFETY: the object stays alive until `PluginStop` runs in `drop`.
        unsafe { self.instance.as_ref() }.plugin()
    }

    fn plugin_mut(&mut self) -> &mut dyn Plugin {
        // SAFETY: as above; `&mut self` guarantees exclusive access.
        unsafe { self.instance.as_mut() }.plugin_mut()
    }

    pub(crate) fn id(&self) -> &str {
        self.plugin().id()
    }

    pub(crate) fn state(&self) -> PluginState {
        self.state
    }

    /// Canonical path of the library file.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Run `install`, then `initialize` when the system is already up.
    ///
    /// A plugin that installed but failed to initialize is uninstalled again;
    /// the initialize failure is returned.
    pub(crate) fn install(&mut self, system_initialized: bool) -> Result<(), RegistryError> {
        self.run(LifecycleHook::Install, |p| p.install())?;
        if system_initialized {
            if let Err(e) = self.initialize() {
                if let Err(undo) = self.uninstall() {
                    tracing::warn!(
                        plugin = %self.id(),
                        error = %undo,
                        "Uninstall after failed initialize"
                    );
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run `initialize` unless it already succeeded.
    pub(crate) fn initialize(&mut self) -> Result<(), RegistryError> {
        if self.state == PluginState::Initialized {
            return Ok(());
        }
        self.run(LifecycleHook::Initialize, |p| p.initialize())?;
        self.state = PluginState::Initialized;
        Ok(())
    }

    /// Run `shutdown` (if initialized) and `uninstall`.
    ///
    /// Both hooks run even if the first fails; the first failure is returned.
    pub(crate) fn uninstall(&mut self) -> Result<(), RegistryError> {
        let shutdown = if self.state == PluginState::Initialized {
            let result = self.run(LifecycleHook::Shutdown, |p| p.shutdown());
            self.state = PluginState::Installed;
            result
        } else {
            Ok(())
        };
        let uninstall = self.run(LifecycleHook::Uninstall, |p| p.uninstall());
        shutdown.and(uninstall)
    }

    fn run<F>(&mut self, hook: LifecycleHook, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut dyn Plugin) -> PluginResult<()>,
    {
        let plugin = self.plugin_mut();
        f(&mut *plugin).map_err(|source| RegistryError::Hook {
            plugin: plugin.id().to_string(),
            hook,
            source,
        })
    }
}

impl Drop for PluginRecord {
    fn drop(&mut self) {
        // SAFETY: `stop` was resolved from `self.library`, which is still
        // loaded; it frees the object created by `start` exactly once.
        unsafe { (self.entry.stop)() };
        tracing::trace!(path = %self.library.path().display(), "Plugin stopped");
    }
}
