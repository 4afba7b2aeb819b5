//! Binary contract between a plugin library and the host.

use std::ffi::{c_char, CStr};

use crate::plugin::Plugin;

/// Symbol returning the NUL-terminated module name the plugin joins.
pub const GET_MODULE_SYMBOL: &str = "PluginGetModule";
/// Symbol constructing the plugin object.
pub const START_SYMBOL: &str = "PluginStart";
/// Symbol destroying the plugin object.
pub const STOP_SYMBOL: &str = "PluginStop";

/// Every symbol a plugin library must export, in resolution order.
pub const ENTRY_POINTS: [&str; 3] = [GET_MODULE_SYMBOL, START_SYMBOL, STOP_SYMBOL];

pub type GetModuleFn = unsafe extern "C" fn() -> *const c_char;
#[allow(improper_ctypes_definitions)]
pub type StartFn = unsafe extern "C" fn(*mut *mut PluginObject);
pub type StopFn = unsafe extern "C" fn();

/// Heap cell handed across the library boundary by `PluginStart`.
///
/// The library owns the allocation: it is created by `PluginStart` and freed
/// by `PluginStop`. The host only borrows it in between.
///
/// The object holds a Rust trait object, whose layout and vtable have no
/// stable ABI. Host and plugin must be built with the same `rustc` and the
/// same `qmx-plugin-sdk` version; anything else is undefined behavior.
pub struct PluginObject {
    plugin: Box<dyn Plugin>,
}

impl PluginObject {
    pub fn new<P: Plugin + 'static>(plugin: P) -> Self {
        Self {
            plugin: Box::new(plugin),
        }
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }

    pub fn plugin_mut(&mut self) -> &mut dyn Plugin {
        self.plugin.as_mut()
    }
}

/// The three resolved entry points of one plugin library.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoints {
    pub get_module: GetModuleFn,
    pub start: StartFn,
    pub stop: StopFn,
}

impl EntryPoints {
    /// Read the module name.
    ///
    /// # Safety
    /// `get_module` must return null or a pointer to a NUL-terminated string
    /// that lives as long as the library is loaded.
    pub unsafe fn module(&self) -> Option<String> {
        let ptr = (self.get_module)();
        if ptr.is_null() {
            return None;
        }
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}
