use rayon::prelude::*;
use thiserror::Error;

/// Errors that can occur during parallel execution.
#[derive(Error, Debug, PartialEq)]
pub enum ParallelError {
    /// The thread pool failed to build.
    #[error("failed to build thread pool: {0}")]
    BuildError(String),

    /// The requested thread count is invalid.
    #[error("thread count must be > 0, got {0}")]
    InvalidThreadCount(usize),
}

/// Controls how the chunks of a warp operation are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// Run the chunks one after another on the current thread.
    #[default]
    Serial,

    /// Use the global Rayon thread pool to warp chunks in parallel.
    ParallelChunks,

    /// Run on a local thread pool with `n` threads.
    ///
    /// # Warning
    /// Creates a new thread pool on every call.
    Fixed(usize),
}

/// Run `f` on every item with its index, stopping at the first error.
///
/// With a parallel strategy the items may be processed in any order and more
/// than one item may fail; one of the errors is returned.
pub fn try_for_each_indexed<T, E, F>(
    strategy: ExecutionStrategy,
    items: &[T],
    f: F,
) -> Result<(), E>
where
    T: Sync,
    E: From<ParallelError> + Send,
    F: Fn(usize, &T) -> Result<(), E> + Send + Sync,
{
    match strategy {
        ExecutionStrategy::Serial => items.iter().enumerate().try_for_each(|(i, item)| f(i, item)),
        ExecutionStrategy::ParallelChunks => items
            .par_iter()
            .enumerate()
            .try_for_each(|(i, item)| f(i, item)),
        ExecutionStrategy::Fixed(n) => {
            if n == 0 {
                return Err(ParallelError::InvalidThreadCount(n).into());
            }
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| ParallelError::BuildError(e.to_string()))?;

            pool.install(|| {
                items
                    .par_iter()
                    .enumerate()
                    .try_for_each(|(i, item)| f(i, item))
            })
        }
    }
}
