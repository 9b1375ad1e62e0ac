//! Worker pool selection for the passes.

use anyhow::{anyhow, Result};

/// Run `op` on a dedicated pool of `threads` workers, or on the global rayon
/// pool when no count is given.
pub fn run_in_pool<T, F>(threads: Option<usize>, op: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    match threads {
        None => Ok(op()),
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("privacy-hook-{}", i))
                .build()
                .map_err(|e| anyhow!("Failed to build a {}-thread pool: {}", threads, e))?;
            Ok(pool.install(op))
        }
    }
}
