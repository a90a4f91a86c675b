use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

/// Side effects that run after a response has been produced.
///
/// Each task is labelled; a failing task is logged under its label and its
/// error goes nowhere else. `drain` waits for everything still outstanding.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    set: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F, E>(&self, label: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let wrapped = async move {
            if let Err(e) = task.await {
                tracing::error!(task = label, "Background task failed: {}", e);
            }
        };

        let mut set = match self.set.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Reap finished entries so the set does not grow without bound.
        while set.try_join_next().is_some() {}
        set.spawn(wrapped);
    }

    pub async fn drain(&self) {
        loop {
            let mut pending = {
                let mut set = match self.set.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                std::mem::take(&mut *set)
            };
            if pending.is_empty() {
                return;
            }
            while let Some(joined) = pending.join_next().await {
                if let Err(e) = joined {
                    tracing::error!("Background task panicked: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn drain_waits_for_success_and_failure() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));

        let counter = done.clone();
        tasks.spawn("ok", async move {
            tokio::task::yield_now().await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), String>(())
        });
        let counter = done.clone();
        tasks.spawn("fails", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), String>("boom".to_string())
        });

        tasks.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }
}
