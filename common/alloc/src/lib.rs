pub use tikv_jemallocator::Jemalloc as DefaultAllocator;

/// Installs jemalloc as the global allocator. Heap statistics are only
/// meaningful in a binary that calls this.
#[macro_export]
macro_rules! used {
    () => {
        #[global_allocator]
        static GLOBAL: $crate::DefaultAllocator = $crate::DefaultAllocator;
    };
}

/// Heap figures reported by jemalloc.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes handed out to the application.
    pub allocated: u64,
    /// Bytes the allocator has mapped from the OS to serve them.
    pub mapped: u64,
}

/// Reads fresh heap statistics. jemalloc caches them per epoch, so the epoch
/// is advanced first.
pub fn heap_stats() -> Result<HeapStats, tikv_jemalloc_ctl::Error> {
    tikv_jemalloc_ctl::epoch::advance()?;
    Ok(HeapStats {
        allocated: tikv_jemalloc_ctl::stats::allocated::read()? as u64,
        mapped: tikv_jemalloc_ctl::stats::mapped::read()? as u64,
    })
}
