//! Live snapshot consumers.

use std::sync::Arc;

use crate::error::Result;
use crate::types::GraphSnapshot;

/// Receives a full graph snapshot at every processing transition.
///
/// Called inline from the engine; errors are logged and ignored.
pub trait SnapshotObserver: Send + Sync {
    fn on_snapshot(&self, snapshot: &GraphSnapshot) -> Result<()>;
}

impl<F> SnapshotObserver for F
where
    F: Fn(&GraphSnapshot) -> Result<()> + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &GraphSnapshot) -> Result<()> {
        self(snapshot)
    }
}

/// Fan a snapshot out to several observers.
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn SnapshotObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observer: Arc<dyn SnapshotObserver>) {
        self.observers.push(observer);
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl SnapshotObserver for ObserverSet {
    /// Every observer is called even if an earlier one fails; the first error is returned.
    fn on_snapshot(&self, snapshot: &GraphSnapshot) -> Result<()> {
        let mut first_err = None;
        for observer in &self.observers {
            if let Err(e) = observer.on_snapshot(snapshot) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
