//! Compensation chains for multi-step cloud mutations
//!
//! Each completed step registers how to undo itself. On failure the caller
//! unwinds the chain newest-first; on success it commits and the undo steps
//! are dropped unrun.

use crate::error::Result;
use futures_util::future::BoxFuture;
use std::future::Future;

type Undo = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

#[derive(Default)]
pub struct Compensations {
    steps: Vec<(String, Undo)>,
}

impl Compensations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the undo action of a step that just succeeded
    pub fn push<F, Fut>(&mut self, description: impl Into<String>, undo: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.steps
            .push((description.into(), Box::new(move || Box::pin(undo()))));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Keeps every completed step
    pub fn commit(self) {
        tracing::trace!(steps = self.steps.len(), "Committed compensation chain");
    }

    /// Undoes completed steps newest-first and returns how many succeeded
    ///
    /// A failing undo step is logged and the remaining steps still run.
    pub async fn unwind(self) -> usize {
        let mut undone = 0;
        for (description, undo) in self.steps.into_iter().rev() {
            match undo().await {
                Ok(()) => {
                    tracing::info!(step = %description, "Rolled back");
                    undone += 1;
                }
                Err(e) => {
                    tracing::warn!(step = %description, error = %e, "Rollback step failed");
                }
            }
        }
        undone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::{Arc, Mutex};

    fn recorder() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn test_unwind_runs_newest_first() {
        let log = recorder();
        let mut chain = Compensations::new();
        for step in ["first", "second", "third"] {
            let log = log.clone();
            chain.push(step, move || async move {
                log.lock().unwrap().push(step);
                Ok(())
            });
        }

        assert_eq!(chain.len(), 3);
        assert_eq!(chain.unwind().await, 3);
        assert_eq!(*log.lock().unwrap(), ["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_failed_undo_does_not_stop_unwind() {
        let log = recorder();
        let mut chain = Compensations::new();
        {
            let log = log.clone();
            chain.push("kept", move || async move {
                log.lock().unwrap().push("kept");
                Ok(())
            });
        }
        chain.push("broken", || async { Err(Error::Collaborator("gone".into())) });

        assert_eq!(chain.unwind().await, 1);
        assert_eq!(*log.lock().unwrap(), ["kept"]);
    }

    #[tokio::test]
    async fn test_commit_skips_undo() {
        let log = recorder();
        let mut chain = Compensations::new();
        {
            let log = log.clone();
            chain.push("step", move || async move {
                log.lock().unwrap().push("step");
                Ok(())
            });
        }
        chain.commit();
        assert!(log.lock().unwrap().is_empty());
    }
}
