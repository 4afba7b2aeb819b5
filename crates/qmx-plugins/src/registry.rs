//! Plugin registry.
//!
//! Plugins are grouped by the module they declare through `PluginGetModule`.
//! The registry drives every lifecycle hook itself: `install` (and
//! `initialize` once the system is up) right after `PluginStart`, and
//! `shutdown`/`uninstall` right before `PluginStop`. Plugin libraries never
//! call back into the registry.
//!
//! The whole state sits behind one reader/writer lock, held for writing for
//! the full duration of every mutating call.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use qmx_plugin_sdk::abi::{GetModuleFn, StartFn, StopFn};
use qmx_plugin_sdk::{EntryPoints, PluginMeta, GET_MODULE_SYMBOL, START_SYMBOL, STOP_SYMBOL};
use semver::Version;

use crate::discovery::library_files;
use crate::error::{LibraryError, RegistryError, Result};
use crate::library::{with_platform_extension, LibraryHandle, LibraryLoader, NativeLoader};
use crate::record::{PluginRecord, PluginState};

#[derive(Default)]
struct RegistryState {
    modules: BTreeMap<String, Vec<PluginRecord>>,
    initialized: bool,
}

impl RegistryState {
    fn module(&self, module: &str) -> Result<&Vec<PluginRecord>> {
        self.modules
            .get(module)
            .ok_or_else(|| RegistryError::ModuleNotFound(module.to_string()))
    }

    fn record(&self, module: &str, plugin: &str) -> Result<&PluginRecord> {
        self.module(module)?
            .iter()
            .find(|r| r.id() == plugin)
            .ok_or_else(|| RegistryError::PluginNotFound {
                module: module.to_string(),
                plugin: plugin.to_string(),
            })
    }

    fn is_loaded(&self, path: &Path) -> bool {
        self.modules.values().flatten().any(|r| r.path() == path)
    }
}

/// Registry of dynamically loaded plugins grouped by module.
pub struct PluginRegistry {
    loader: Box<dyn LibraryLoader>,
    state: RwLock<RegistryState>,
}

impl PluginRegistry {
    /// Create a registry loading libraries through the OS dynamic linker.
    pub fn new() -> Self {
        Self::with_loader(NativeLoader)
    }

    /// Create a registry with a custom library loader.
    pub fn with_loader<L: LibraryLoader + 'static>(loader: L) -> Self {
        Self {
            loader: Box::new(loader),
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Register a module plugins can join.
    pub fn register_module(&self, module: &str) -> Result<()> {
        let mut state = self.state.write();
        if state.modules.contains_key(module) {
            return Err(RegistryError::ModuleExists(module.to_string()));
        }
        state.modules.insert(module.to_string(), Vec::new());
        tracing::info!(module, "Plugin module registered");
        Ok(())
    }

    /// Stop every plugin of a module, in load order, and remove the module.
    ///
    /// All plugins are stopped and erased even when a hook fails; the first
    /// hook failure is returned afterwards.
    pub fn unregister_module(&self, module: &str) -> Result<()> {
        let mut state = self.state.write();
        let records = state
            .modules
            .remove(module)
            .ok_or_else(|| RegistryError::ModuleNotFound(module.to_string()))?;

        let mut first_error = None;
        for record in records {
            if let Err(e) = stop_record(module, record) {
                first_error.get_or_insert(e);
            }
        }
        tracing::info!(module, "Plugin module unregistered");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Registered module names, sorted.
    pub fn module_ids(&self) -> Vec<String> {
        self.state.read().modules.keys().cloned().collect()
    }

    /// Load a plugin library and install its plugin.
    ///
    /// The platform library extension is appended when `path` has none.
    /// Returns the plugin's self-reported ID. On failure nothing is registered
    /// and a plugin that was already started is stopped again.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = with_platform_extension(path.as_ref());
        let canonical = std::fs::canonicalize(&path).map_err(|source| LibraryError::Path {
            path: path.clone(),
            source,
        })?;

        let mut state = self.state.write();
        if state.is_loaded(&canonical) {
            return Err(RegistryError::AlreadyLoaded(canonical));
        }

        let library = self.loader.open(&canonical)?;
        let entry = resolve_entry_points(library.as_ref())?;

        // SAFETY: `get_module` comes from the library loaded above, which
        // stays alive until the record drops.
        let module = unsafe { entry.module() }
            .ok_or_else(|| RegistryError::MissingModuleName(canonical.clone()))?;
        if !state.modules.contains_key(&module) {
            return Err(RegistryError::ModuleNotRegistered {
                module,
                path: canonical,
            });
        }

        // SAFETY: `entry` was resolved from `library`.
        let mut record = unsafe { PluginRecord::start(library, entry, canonical.clone())? };
        record.install(state.initialized)?;

        let id = record.id().to_string();
        tracing::info!(
            module = %module,
            plugin = %id,
            version = %record.plugin().version(),
            path = %canonical.display(),
            "Plugin loaded"
        );
        state.modules.entry(module).or_default().push(record);
        Ok(id)
    }

    /// Load every plugin library directly inside `dir`, in file name order.
    ///
    /// The first failure is returned; plugins loaded before it stay loaded.
    pub fn auto_load(&self, dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(RegistryError::NotADirectory(dir.to_path_buf()));
        }

        let files = library_files(dir).map_err(|source| RegistryError::Discovery {
            path: dir.to_path_buf(),
            source,
        })?;
        if files.is_empty() {
            return Err(RegistryError::NoLibraries(dir.to_path_buf()));
        }

        tracing::debug!(path = %dir.display(), count = files.len(), "Auto-loading plugins");
        files.iter().map(|file| self.load(file)).collect()
    }

    /// Shut down, uninstall and stop one plugin.
    ///
    /// The plugin is always erased; a failing hook is reported afterwards.
    pub fn unload(&self, module: &str, plugin: &str) -> Result<()> {
        let mut state = self.state.write();
        let records = state
            .modules
            .get_mut(module)
            .ok_or_else(|| RegistryError::ModuleNotFound(module.to_string()))?;
        let index = records
            .iter()
            .position(|r| r.id() == plugin)
            .ok_or_else(|| RegistryError::PluginNotFound {
                module: module.to_string(),
                plugin: plugin.to_string(),
            })?;

        let record = records.remove(index);
        stop_record(module, record)
    }

    /// Initialize every installed plugin, in module order then load order.
    ///
    /// The system flag is only set once every plugin initialized. A failed
    /// call may be retried; plugins that already initialized are skipped.
    pub fn initialize(&self) -> Result<()> {
        let mut state = self.state.write();
        if state.initialized {
            return Err(RegistryError::AlreadyInitialized);
        }

        for record in state.modules.values_mut().flatten() {
            record.initialize()?;
        }
        state.initialized = true;
        tracing::info!("Plugin system initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// Plugin IDs of a module mapped to their versions.
    pub fn plugin_list(&self, module: &str) -> Result<BTreeMap<String, Version>> {
        let state = self.state.read();
        Ok(state
            .module(module)?
            .iter()
            .map(|r| (r.id().to_string(), r.plugin().version()))
            .collect())
    }

    /// Metadata of one plugin.
    pub fn plugin_meta(&self, module: &str, plugin: &str) -> Result<PluginMeta> {
        let state = self.state.read();
        Ok(state.record(module, plugin)?.plugin().meta())
    }

    /// Lifecycle state of one plugin.
    pub fn plugin_state(&self, module: &str, plugin: &str) -> Result<PluginState> {
        let state = self.state.read();
        Ok(state.record(module, plugin)?.state())
    }

    /// Canonical library path of one plugin.
    pub fn plugin_path(&self, module: &str, plugin: &str) -> Result<PathBuf> {
        let state = self.state.read();
        Ok(state.record(module, plugin)?.path().to_path_buf())
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for (module, records) in std::mem::take(&mut state.modules) {
            for record in records {
                if let Err(e) = stop_record(&module, record) {
                    tracing::warn!(module = %module, error = %e, "Plugin teardown hook failed");
                }
            }
        }
        state.initialized = false;
    }
}

/// Run the teardown hooks, then drop the record, which calls `PluginStop`.
fn stop_record(module: &str, mut record: PluginRecord) -> Result<()> {
    let result = record.uninstall();
    tracing::info!(module, plugin = %record.id(), "Plugin unloaded");
    drop(record);
    result
}

fn resolve_entry_points(library: &dyn LibraryHandle) -> Result<EntryPoints> {
    let get_module = resolve(library, GET_MODULE_SYMBOL)?;
    let start = resolve(library, START_SYMBOL)?;
    let stop = resolve(library, STOP_SYMBOL)?;

    // SAFETY: the symbols are non-null addresses of functions exported under
    // the plugin ABI names, which fixes their signatures.
    unsafe {
        Ok(EntryPoints {
            get_module: std::mem::transmute::<*const std::ffi::c_void, GetModuleFn>(get_module),
            start: std::mem::transmute::<*const std::ffi::c_void, StartFn>(start),
            stop: std::mem::transmute::<*const std::ffi::c_void, StopFn>(stop),
        })
    }
}

fn resolve(library: &dyn LibraryHandle, symbol: &'static str) -> Result<*const std::ffi::c_void> {
    let missing = || RegistryError::MissingEntryPoint {
        symbol,
        path: library.path().to_path_buf(),
    };
    match library.get_symbol(symbol) {
        Ok(address) if address.is_null() => Err(missing()),
        Ok(address) => Ok(address),
        Err(LibraryError::SymbolNotFound { .. }) => Err(missing()),
        Err(e) => Err(e.into()),
    }
}
