//! Hardware concurrency figures.

/// Number of logical cores (hardware threads) available to the process.
///
/// Always at least 1; falls back to 1 when the count cannot be determined.
pub fn logical_core_count() -> usize {
    num_cpus::get()
}

/// Number of physical cores. Always at least 1.
pub fn physical_core_count() -> usize {
    num_cpus::get_physical()
}
