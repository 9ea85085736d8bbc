//! Close tasks run when the host process shuts down.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use tokio::task::JoinHandle;

type CloseTask = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Registration point for shutdown work, drained once by `run`.
#[derive(Default)]
pub struct ShutdownHooks {
    tasks: Mutex<Vec<CloseTask>>,
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_close_task<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: CloseTask = Box::new(move || Box::pin(task()));
        match self.tasks.lock() {
            Ok(mut tasks) => tasks.push(boxed),
            Err(poisoned) => poisoned.into_inner().push(boxed),
        }
    }

    /// Number of tasks waiting to run.
    pub fn len(&self) -> usize {
        match self.tasks.lock() {
            Ok(tasks) => tasks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every registered task, most recent first.
    pub async fn run(&self) {
        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if !tasks.is_empty() {
            tracing::info!("Running {} shutdown task(s)", tasks.len());
        }
        for task in tasks.into_iter().rev() {
            task().await;
        }
    }
}

/// Background work that may call back into the manager, such as the
/// configuration reload loop or the status API.
#[derive(Default)]
pub struct BackgroundTasks {
    tasks: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(tokio::spawn(task));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Abort every task and wait for it to finish, then run `hooks`.
    /// Nothing can start a dev service after its hook has run.
    pub async fn shutdown(self, hooks: &ShutdownHooks) {
        for task in self.tasks {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!("Background task failed: {}", e);
                }
            }
        }
        hooks.run().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_tasks_run_once() {
        let hooks = ShutdownHooks::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        hooks.add_close_task(move || async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hooks.len(), 1);

        hooks.run().await;
        hooks.run().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(hooks.is_empty());
    }

    #[tokio::test]
    async fn test_tasks_run_in_reverse_order() {
        let hooks = ShutdownHooks::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            hooks.add_close_task(move || async move {
                order.lock().unwrap().push(i);
            });
        }
        hooks.run().await;
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn test_background_tasks_end_before_hooks_run() {
        let hooks = ShutdownHooks::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        hooks.add_close_task(move || async move {
            o.lock().unwrap().push("hook");
        });

        let mut tasks = BackgroundTasks::new();
        let o = order.clone();
        tasks.spawn(async move {
            loop {
                o.lock().unwrap().push("tick");
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        });
        assert_eq!(tasks.len(), 1);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        tasks.shutdown(&hooks).await;
        let seen = order.lock().unwrap().len();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let order = order.lock().unwrap();
        assert_eq!(order.len(), seen);
        assert_eq!(order.last(), Some(&"hook"));
    }
}
