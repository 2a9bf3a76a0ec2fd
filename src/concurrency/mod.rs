//! Bounded scheduling of package and version work
//!
//! Two counting pools bound the run: one for packages in flight and one,
//! shared by every package, for version transfers in flight. A permit is
//! acquired before a task is spawned and moves into the task, so it is
//! released when the task finishes whether it succeeded, failed or panicked.

use crate::config::ConcurrencyConfig;
use crate::logging::Logger;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct ConcurrencyController {
    packages: Arc<Semaphore>,
    versions: Arc<Semaphore>,
    output: Logger,
}

impl ConcurrencyController {
    pub fn new(limits: ConcurrencyConfig, output: Logger) -> Self {
        Self {
            packages: Arc::new(Semaphore::new(limits.packages.max(1))),
            versions: Arc::new(Semaphore::new(limits.versions.max(1))),
            output,
        }
    }

    /// Run `worker` for every `(key, item)` pair with at most
    /// the package limit in flight, returning once every worker has finished.
    ///
    /// Returns the key and panic message of every worker that aborted.
    pub async fn run_packages<K, T, I, F, Fut>(&self, items: I, worker: F) -> Vec<(K, String)>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut set = JoinSet::new();
        for (key, item) in items {
            let Ok(permit) = self.packages.clone().acquire_owned().await else {
                break;
            };
            let task = worker(item);
            set.spawn(async move {
                let _permit = permit;
                let outcome = AssertUnwindSafe(task).catch_unwind().await;
                (key, outcome.map_err(|payload| panic_message(payload.as_ref())))
            });
        }

        let mut aborted = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((key, Err(message))) => {
                    self.output.error(&format!("Package worker aborted: {}", message));
                    aborted.push((key, message));
                }
                Err(e) => self.output.error(&format!("Package worker lost: {}", e)),
            }
        }
        aborted
    }

    /// Run `worker` for every item under the shared version pool and collect
    /// the outputs in completion order. A panicked task yields `Err` with
    /// the panic description.
    pub async fn run_versions<I, F, Fut, T>(&self, items: I, worker: F) -> Vec<Result<T, String>>
    where
        I: IntoIterator,
        F: Fn(I::Item) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut set = JoinSet::new();
        for item in items {
            let Ok(permit) = self.versions.clone().acquire_owned().await else {
                break;
            };
            let task = worker(item);
            set.spawn(async move {
                let _permit = permit;
                task.await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            results.push(joined.map_err(|e| format!("version task aborted: {}", e)));
        }
        results
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
