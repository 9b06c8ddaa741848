//! Run progress callbacks.

use std::time::Duration;

/// Progress callback for pipeline runs.
pub trait RunObserver: Send + Sync {
    /// Called before a component runs; `position` is 1-based.
    fn component_started(&self, name: &str, position: usize, total: usize);
    /// Called after a component returned successfully.
    fn component_finished(&self, name: &str, elapsed: Duration);
    /// Called once every component has run.
    fn run_finished(&self, elapsed: Duration);
}

/// No-op observer for headless and test usage.
pub struct SilentRun;

impl RunObserver for SilentRun {
    fn component_started(&self, _name: &str, _position: usize, _total: usize) {}
    fn component_finished(&self, _name: &str, _elapsed: Duration) {}
    fn run_finished(&self, _elapsed: Duration) {}
}
