//! Cancellable in-flight requests.

use std::future::Future;

use tokio::{sync::mpsc, task::JoinHandle};

use super::actor::Completion;

/// Monotonic id of a spawned request. A completion is applied only while
/// its id still occupies the slot it was spawned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RequestId(u64);

/// One in-flight request. Dropping it cancels the request: the task is
/// aborted and its completion, if already queued, no longer matches.
pub(crate) struct Pending {
    id: RequestId,
    task: JoinHandle<()>,
}

impl Pending {
    pub(crate) const fn id(&self) -> RequestId {
        self.id
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Clear `slot` if it holds request `id`. Returns whether it did.
pub(crate) fn settle(slot: &mut Option<Pending>, id: RequestId) -> bool {
    if slot.as_ref().is_some_and(|pending| pending.id == id) {
        *slot = None;
        true
    } else {
        false
    }
}

/// Spawns remote calls and routes their results back to the orchestrator.
pub(crate) struct Tasks {
    next: u64,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Tasks {
    pub(crate) const fn new(completions: mpsc::UnboundedSender<Completion>) -> Self {
        Self {
            next: 1,
            completions,
        }
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<Completion> {
        self.completions.clone()
    }

    /// Spawn a tracked request.
    pub(crate) fn spawn<F, D>(&mut self, future: F, done: D) -> Pending
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
        D: FnOnce(RequestId, F::Output) -> Completion + Send + 'static,
    {
        let id = self.next_id();
        let completions = self.completions.clone();
        let task = tokio::spawn(async move {
            let output = future.await;
            let _ = completions.send(done(id, output));
        });
        Pending { id, task }
    }

    /// Spawn a request that outlives session cancellation.
    pub(crate) fn detach<F, D>(&self, future: F, done: D)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
        D: FnOnce(F::Output) -> Completion + Send + 'static,
    {
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let output = future.await;
            let _ = completions.send(done(output));
        });
    }

    const fn next_id(&mut self) -> RequestId {
        let id = RequestId(self.next);
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_request_never_completes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = Tasks::new(tx);

        let pending = tasks.spawn(std::future::pending::<()>(), |_, ()| Completion::DataSent(Ok(())));
        let first = pending.id();
        drop(pending);

        let mut slot = Some(tasks.spawn(async {}, |_, ()| Completion::DataSent(Ok(()))));
        assert_ne!(slot.as_ref().unwrap().id(), first);
        assert!(!settle(&mut slot, first));
        assert!(slot.is_some());

        assert!(matches!(rx.recv().await, Some(Completion::DataSent(Ok(())))));
        let id = slot.as_ref().unwrap().id();
        assert!(settle(&mut slot, id));
        assert!(slot.is_none());
        assert!(rx.try_recv().is_err());
    }
}
