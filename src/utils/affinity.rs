// ============================================================================
// CPU Affinity
// Keeps an engine's consumer thread on one core so the book stays cache-hot
// ============================================================================

/// Pin the current thread to `core_id`.
///
/// Returns `false` when the core does not exist or the OS refused.
#[cfg(feature = "numa")]
pub fn pin_current_thread_to_core(core_id: usize) -> bool {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();

    core_ids
        .into_iter()
        .find(|id| id.id == core_id)
        .map(core_affinity::set_for_current)
        .unwrap_or(false)
}

/// Pin the current thread to `core_id`.
///
/// **Note:** This is a no-op stub. Enable the `numa` feature for actual CPU pinning.
#[cfg(not(feature = "numa"))]
pub fn pin_current_thread_to_core(_core_id: usize) -> bool {
    false
}

/// Core ids a consumer thread can be pinned to
#[cfg(feature = "numa")]
pub fn available_cores() -> Vec<usize> {
    core_affinity::get_core_ids()
        .unwrap_or_default()
        .into_iter()
        .map(|id| id.id)
        .collect()
}

/// Core ids a consumer thread can be pinned to
#[cfg(not(feature = "numa"))]
pub fn available_cores() -> Vec<usize> {
    let num_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    (0..num_cpus).collect()
}
