//! Declarative macros generating plugin entry points.

/// Generate the three plugin entry points inside a module, without exporting
/// them as C symbols.
///
/// The generated module contains `get_module`, `start`, `stop` and
/// `entry_points()`. The plugin expression is evaluated on every start.
/// At most one instance is alive per expansion: a second start while the
/// first object is alive yields a null object.
///
/// [`export_plugin!`] builds on this; use it directly to embed several
/// plugins in one binary, e.g. in tests.
///
/// # Example
///
/// ```rust,ignore
/// plugin_entry_points!(pub mod greeter_entry {
///     module: "demo",
///     plugin: Greeter::default(),
/// });
///
/// let entry = greeter_entry::entry_points();
/// ```
#[macro_export]
macro_rules! plugin_entry_points {
    ($vis:vis mod $name:ident { module: $module:literal, plugin: $plugin:expr $(,)? }) => {
        $vis mod $name {
            #[allow(unused_imports)]
            use super::*;

            static INSTANCE: ::std::sync::atomic::AtomicPtr<$crate::PluginObject> =
                ::std::sync::atomic::AtomicPtr::new(::std::ptr::null_mut());

            static MODULE: &str = concat!($module, "\0");

            pub unsafe extern "C" fn get_module() -> *const ::std::ffi::c_char {
                MODULE.as_ptr().cast()
            }

            #[allow(improper_ctypes_definitions)]
            pub unsafe extern "C" fn start(out: *mut *mut $crate::PluginObject) {
                if out.is_null() {
                    return;
                }
                let object = ::std::boxed::Box::into_raw(::std::boxed::Box::new(
                    $crate::PluginObject::new($plugin),
                ));
                let installed = INSTANCE.compare_exchange(
                    ::std::ptr::null_mut(),
                    object,
                    ::std::sync::atomic::Ordering::AcqRel,
                    ::std::sync::atomic::Ordering::Acquire,
                );
                match installed {
                    Ok(_) => unsafe { *out = object },
                    Err(_) => unsafe {
                        drop(::std::boxed::Box::from_raw(object));
                        *out = ::std::ptr::null_mut();
                    },
                }
            }

            pub unsafe extern "C" fn stop() {
                let object = INSTANCE.swap(
                    ::std::ptr::null_mut(),
                    ::std::sync::atomic::Ordering::AcqRel,
                );
                if !object.is_null() {
                    drop(unsafe { ::std::boxed::Box::from_raw(object) });
                }
            }

            pub fn entry_points() -> $crate::EntryPoints {
                $crate::EntryPoints {
                    get_module,
                    start,
                    stop,
                }
            }
        }
    };
}

/// Export a plugin from a `cdylib`.
///
/// Emits the `PluginGetModule`, `PluginStart` and `PluginStop` C symbols.
/// Use once per library.
///
/// # Example
///
/// ```rust,ignore
/// use qmx_plugin_sdk::prelude::*;
///
/// export_plugin!(module: "demo", plugin: Greeter::default());
/// ```
#[macro_export]
macro_rules! export_plugin {
    (module: $module:literal, plugin: $plugin:expr $(,)?) => {
        $crate::plugin_entry_points!(mod __qmx_plugin_entry {
            module: $module,
            plugin: $plugin,
        });

        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn PluginGetModule() -> *const ::std::ffi::c_char {
            unsafe { __qmx_plugin_entry::get_module() }
        }

        #[no_mangle]
        #[allow(non_snake_case, improper_ctypes_definitions)]
        pub unsafe extern "C" fn PluginStart(out: *mut *mut $crate::PluginObject) {
            unsafe { __qmx_plugin_entry::start(out) }
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn PluginStop() {
            unsafe { __qmx_plugin_entry::stop() }
        }
    };
}
