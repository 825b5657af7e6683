use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A restartable one-shot timer. Scheduling again aborts the pending
/// callback, so only the last call in a burst ever fires.
#[derive(Debug, Default)]
pub struct Debounce {
    task: Option<JoinHandle<()>>,
}

impl Debounce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F, Fut>(&mut self, after: Duration, fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            fire().await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Debounce {
    fn drop(&mut self) {
        self.cancel();
    }
}
