//! Worker sizing for parallel scans.
//!
//! Resource calculation (CPU cores, configured limits) is separated from the
//! domain adaptation the scanner applies on top of it (file counts). Files are
//! independent work items, so parallelism is keyed by file; traversal itself
//! stays sequential.

/// Maximum workers justified by system resources and configuration.
///
/// `max_threads` of 0 means no hard limit; `thread_percentage` scales the
/// available CPU cores.
pub fn calculate_optimal_workers(max_threads: usize, thread_percentage: u8) -> usize {
    let cpu_cores = num_cpus::get();
    let max_by_percentage = std::cmp::max(1, (cpu_cores * thread_percentage as usize) / 100);
    if max_threads > 0 {
        std::cmp::min(max_threads, max_by_percentage)
    } else {
        max_by_percentage
    }
}

/// Adapt worker count to the workload: small file counts have coordination
/// overhead that outweighs parallel benefits.
pub fn adapt_workers_for_file_count(file_count: usize, max_workers: usize) -> usize {
    let adapted = if file_count <= 10 {
        std::cmp::min(2, max_workers)
    } else if file_count <= 50 {
        max_workers / 2
    } else if file_count <= 100 {
        (max_workers * 3) / 4
    } else {
        max_workers
    };
    adapted.clamp(1, file_count.max(1))
}
