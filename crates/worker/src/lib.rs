//! Standalone scheduler: runs the queue processor and the digest aggregator
//! on their intervals, without the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use courier_events::Engine;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Background loops started by [`Scheduler::start`].
pub struct Scheduler {
    shutdown: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    /// Spawn the queue processor and digest loops. Both stop when `shutdown`
    /// (or [`Scheduler::stop`]) cancels them.
    pub fn start(engine: &Engine, shutdown: CancellationToken) -> Self {
        let mut tasks = Vec::new();

        let processor = Arc::clone(&engine.processor);
        let token = shutdown.child_token();
        tasks.push((
            "queue processor",
            tokio::spawn(async move { processor.run(token).await }),
        ));

        let digests = Arc::clone(&engine.digests);
        let token = shutdown.child_token();
        tasks.push((
            "digest aggregator",
            tokio::spawn(async move { digests.run(token).await }),
        ));

        Self { shutdown, tasks }
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Cancel every loop and wait up to `grace` for each one to finish its
    /// current pass. Returns the names of loops that did not stop in time.
    pub async fn stop(self, grace: Duration) -> Vec<&'static str> {
        self.shutdown.cancel();
        let mut stragglers = Vec::new();
        for (name, handle) in self.tasks {
            if tokio::time::timeout(grace, handle).await.is_err() {
                tracing::warn!(task = name, "Scheduler task did not stop in time");
                stragglers.push(name);
            }
        }
        stragglers
    }
}
