//! Dynamic library loading using libloading.
//!
//! [`DynamicLibrary`] wraps one OS library handle. The registry reaches
//! libraries through the [`LibraryLoader`] seam so the loading strategy can be
//! swapped; [`NativeLoader`] is the libloading-backed default.

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::discovery::{is_library_file, platform_extension};
use crate::error::LibraryError;

/// An opened library the registry can resolve symbols from.
pub trait LibraryHandle: Send + Sync {
    /// Path the library was loaded from.
    fn path(&self) -> &Path;

    /// Address of an exported symbol.
    fn get_symbol(&self, name: &str) -> Result<*const c_void, LibraryError>;
}

/// Opens libraries for the registry.
pub trait LibraryLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, LibraryError>;
}

/// Loader backed by the OS dynamic linker.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl LibraryLoader for NativeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, LibraryError> {
        Ok(Box::new(DynamicLibrary::open(path)?))
    }
}

/// A single dynamically loaded library. Dropping it unloads the library.
#[derive(Debug, Default)]
pub struct DynamicLibrary {
    library: Option<Library>,
    path: PathBuf,
}

impl DynamicLibrary {
    /// Create an empty handle with nothing loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle and load `path` into it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let mut library = Self::new();
        library.load(path)?;
        Ok(library)
    }

    /// Load a library, replacing the one currently held.
    ///
    /// The platform extension is appended when `path` has none. Any other
    /// extension is rejected.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), LibraryError> {
        let path = with_platform_extension(path.as_ref());
        if !is_library_file(&path) {
            return Err(LibraryError::InvalidExtension {
                path,
                expected: platform_extension(),
            });
        }

        // SAFETY: loading a library runs its initializers; plugin libraries
        // are trusted by whoever put them on the search path.
        let library = unsafe { Library::new(&path) }.map_err(|source| LibraryError::Open {
            path: path.clone(),
            source,
        })?;

        if let Some(previous) = self.library.replace(library) {
            if let Err(e) = previous.close() {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to unload replaced library");
            }
        }
        tracing::debug!(path = %path.display(), "Library loaded");
        self.path = path;
        Ok(())
    }

    /// Unload the current library.
    pub fn unload(&mut self) -> Result<(), LibraryError> {
        let library = self.library.take().ok_or(LibraryError::NotLoaded)?;
        let path = std::mem::take(&mut self.path);
        library
            .close()
            .map_err(|source| LibraryError::Close { path: path.clone(), source })?;
        tracing::debug!(path = %path.display(), "Library unloaded");
        Ok(())
    }

    /// Address of an exported symbol.
    pub fn get_symbol(&self, name: &str) -> Result<*const c_void, LibraryError> {
        let library = self.library.as_ref().ok_or(LibraryError::NotLoaded)?;

        // SAFETY: the symbol is only read as an address; callers cast it to
        // the type the plugin ABI declares.
        let symbol: Symbol<*const c_void> = unsafe { library.get(name.as_bytes()) }.map_err(
            |_| LibraryError::SymbolNotFound {
                symbol: name.to_string(),
                path: self.path.clone(),
            },
        )?;
        Ok(*symbol)
    }

    /// Path of the loaded library, empty when nothing is loaded.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.library.is_some()
    }
}

impl LibraryHandle for DynamicLibrary {
    fn path(&self) -> &Path {
        DynamicLibrary::path(self)
    }

    fn get_symbol(&self, name: &str) -> Result<*const c_void, LibraryError> {
        DynamicLibrary::get_symbol(self, name)
    }
}

/// Append the platform library extension when `path` has none.
pub(crate) fn with_platform_extension(path: &Path) -> PathBuf {
    if path.extension().is_none() {
        path.with_extension(platform_extension())
    } else {
        path.to_path_buf()
    }
}
