// progress.rs — Progress reporting for whole-image sweeps
//
// The sweep calls its listener inline on the calling thread. A listener
// chooses how often it wants updates; the final update is always exactly 1.0.

/// Receives progress notifications from a sweep.
pub trait ProgressListener {
    /// Number of pixels the sweep will visit. Called before `start`.
    fn set_task_size(&mut self, _size: u64) {}

    /// Pixels between updates; 0 asks for an update every 1%.
    fn update_interval(&self) -> u64 {
        0
    }

    fn start(&mut self) {}

    /// Fraction of pixels done, in (0, 1].
    fn update(&mut self, _fraction: f64) {}

    fn finish(&mut self) {}
}

/// Ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressListener;

impl ProgressListener for NullProgressListener {}

/// Drives a listener over `size` units of work.
pub(crate) struct ProgressTracker<'l> {
    listener: &'l mut dyn ProgressListener,
    size: u64,
    interval: u64,
    done: u64,
    last_reported: u64,
}

impl<'l> ProgressTracker<'l> {
    pub(crate) fn start(listener: &'l mut dyn ProgressListener, size: u64) -> Self {
        listener.set_task_size(size);
        let interval = match listener.update_interval() {
            0 => (size / 100).max(1),
            n => n,
        };
        listener.start();
        ProgressTracker {
            listener,
            size,
            interval,
            done: 0,
            last_reported: 0,
        }
    }

    pub(crate) fn step(&mut self) {
        self.done += 1;
        if self.done % self.interval == 0 && self.done < self.size {
            self.report();
        }
    }

    fn report(&mut self) {
        self.last_reported = self.done;
        self.listener.update(self.done as f64 / self.size as f64);
    }

    pub(crate) fn finish(mut self) {
        if self.size == 0 || self.last_reported != self.size {
            self.last_reported = self.size;
            self.listener.update(1.0);
        }
        self.listener.finish();
    }
}
