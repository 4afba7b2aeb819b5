//! Plugin library discovery.

use std::path::{Path, PathBuf};

/// Extension of dynamic libraries on this platform, without the dot.
pub fn platform_extension() -> &'static str {
    std::env::consts::DLL_EXTENSION
}

/// Check if a path names a file with the platform library extension.
pub fn is_library_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| ext == platform_extension())
        .unwrap_or(false)
}

/// Regular files with the platform library extension directly inside `dir`,
/// sorted by path. Subdirectories are not searched.
pub fn library_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut libraries = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && is_library_file(&path) {
            libraries.push(path);
        }
    }

    libraries.sort();
    Ok(libraries)
}
