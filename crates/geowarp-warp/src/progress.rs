use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Progress callback: receives the completed fraction in `[0, 1]` and a message.
///
/// Returning `false` requests cancellation.
pub type ProgressFn = dyn Fn(f64, &str) -> bool + Send + Sync;

/// Progress callback mapped onto the `[base, base + scale]` sub-range of its parent.
#[derive(Clone, Default)]
pub struct ScaledProgress {
    callback: Option<Arc<ProgressFn>>,
    base: f64,
    scale: f64,
}

impl ScaledProgress {
    /// Report through `callback` over the sub-range starting at `base` with width `scale`.
    pub fn new(callback: Option<Arc<ProgressFn>>, base: f64, scale: f64) -> Self {
        Self {
            callback,
            base,
            scale,
        }
    }

    /// Report through `callback` over the whole `[0, 1]` range.
    pub fn full(callback: Option<Arc<ProgressFn>>) -> Self {
        Self::new(callback, 0.0, 1.0)
    }

    /// Report `fraction` of this sub-range. Returns `false` if the callback asked to stop.
    pub fn report(&self, fraction: f64) -> bool {
        match &self.callback {
            Some(callback) => callback(self.base + self.scale * fraction, ""),
            None => true,
        }
    }

    /// Lower bound of the sub-range.
    pub fn base(&self) -> f64 {
        self.base
    }

    /// Width of the sub-range.
    pub fn scale(&self) -> f64 {
        self.scale
    }
}

struct ProgressState {
    fractions: Vec<f64>,
    reported: f64,
}

/// Aggregates the progress of chunks that may run concurrently.
///
/// Each chunk reports its own fraction; the accumulator forwards the weighted
/// sum to the user callback under a lock, never reporting a smaller value than
/// before. Once the callback asks to stop every later update fails.
pub(crate) struct ChunkProgress {
    callback: Option<Arc<ProgressFn>>,
    weights: Vec<f64>,
    state: Mutex<ProgressState>,
    cancelled: AtomicBool,
}

impl ChunkProgress {
    /// `weights` holds one non-negative weight per chunk, summing to 1.
    pub(crate) fn new(callback: Option<Arc<ProgressFn>>, weights: Vec<f64>) -> Self {
        let n = weights.len();
        Self {
            callback,
            weights,
            state: Mutex::new(ProgressState {
                fractions: vec![0.0; n],
                reported: 0.0,
            }),
            cancelled: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Record that `chunk` reached `fraction` of its own work.
    pub(crate) fn update(&self, chunk: usize, fraction: f64) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(f) = state.fractions.get_mut(chunk) {
            *f = fraction.clamp(0.0, 1.0);
        }
        let total: f64 = self
            .weights
            .iter()
            .zip(state.fractions.iter())
            .map(|(w, f)| w * f)
            .sum();
        let total = total.min(1.0);
        if total < state.reported {
            return true;
        }
        state.reported = total;
        self.notify(total)
    }

    /// Report completion of the whole operation.
    pub(crate) fn finish(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.reported = 1.0;
        self.notify(1.0)
    }

    fn notify(&self, total: f64) -> bool {
        let keep_going = match &self.callback {
            Some(callback) => callback(total, ""),
            None => true,
        };
        if !keep_going {
            self.cancelled.store(true, Ordering::Release);
        }
        keep_going
    }

    /// A callback that feeds the progress of chunk `index` into this accumulator.
    pub(crate) fn chunk_callback(self: &Arc<Self>, index: usize) -> Arc<ProgressFn> {
        let accumulator = Arc::clone(self);
        Arc::new(move |fraction: f64, _message: &str| accumulator.update(index, fraction))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{ChunkProgress, ProgressFn, ScaledProgress};

    fn recorder() -> (Arc<ProgressFn>, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: Arc<ProgressFn> = Arc::new(move |f: f64, _: &str| {
            sink.lock().map(|mut s| s.push(f)).is_ok()
        });
        (callback, seen)
    }

    #[test]
    fn scaled_progress() {
        let (callback, seen) = recorder();
        let progress = ScaledProgress::new(Some(callback), 0.25, 0.5);
        assert!(progress.report(0.0));
        assert!(progress.report(1.0));
        assert_eq!(*seen.lock().unwrap(), vec![0.25, 0.75]);
        assert!(ScaledProgress::default().report(0.5));
    }

    #[test]
    fn chunk_progress_is_weighted_and_monotonic() {
        let (callback, seen) = recorder();
        let acc = Arc::new(ChunkProgress::new(Some(callback), vec![0.75, 0.25]));
        assert!(acc.update(1, 1.0));
        assert!(acc.update(0, 0.5));
        // a chunk restarting from zero must not move progress backwards
        assert!(acc.update(1, 0.0));
        assert!(acc.chunk_callback(0)(1.0, ""));
        assert!(acc.finish());
        assert_eq!(*seen.lock().unwrap(), vec![0.25, 0.625, 0.75, 1.0]);
    }

    #[test]
    fn chunk_progress_cancels() {
        let callback: Arc<ProgressFn> = Arc::new(|f: f64, _: &str| f < 0.5);
        let acc = ChunkProgress::new(Some(callback), vec![0.5, 0.5]);
        assert!(acc.update(0, 0.5));
        assert!(!acc.update(0, 1.0));
        assert!(acc.is_cancelled());
        assert!(!acc.update(1, 0.1));
        assert!(!acc.finish());
    }
}
