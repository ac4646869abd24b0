//! Background workers pulling jobs off the shared pool queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use super::queue_item::QueueItem;
use crate::translator::Translator;

/// How long an idle worker sleeps before re-checking the queue and the
/// running flag, in case a notification was missed.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Owns the pool's worker tasks and their shared shutdown state.
///
/// Each worker task wraps one [`Translator`] copy; all workers pull from
/// one queue, so a job is observed by exactly one worker. Dropping the
/// crew initiates a graceful shutdown: workers finish their in-flight job
/// and exit.
pub(crate) struct WorkerCrew {
    running: Arc<AtomicBool>,
    notifier: Arc<Notify>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerCrew {
    /// Spawns one worker task per translator on the ambient tokio runtime.
    pub(crate) fn spawn(
        translators: Vec<Translator>,
        waiting: Arc<Mutex<Vec<QueueItem>>>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let notifier = Arc::new(Notify::new());
        let handles = translators
            .into_iter()
            .enumerate()
            .map(|(worker, translator)| {
                tokio::spawn(translation_loop(
                    worker,
                    translator,
                    running.clone(),
                    notifier.clone(),
                    waiting.clone(),
                ))
            })
            .collect();
        Self {
            running,
            notifier,
            handles,
        }
    }

    /// Wakes one idle worker to check the queue.
    pub(crate) fn notify(&self) {
        self.notifier.notify_one();
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.handles.len()
    }

    /// Signals every worker to stop and detaches their join handles.
    pub(crate) fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.notifier.notify_waiters();
        for handle in self.handles.drain(..) {
            tokio::spawn(async move {
                let _ = handle.await;
            });
        }
    }
}

impl Drop for WorkerCrew {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One worker's pull loop: take a job, run it, fulfill its channel.
async fn translation_loop(
    worker: usize,
    mut translator: Translator,
    running: Arc<AtomicBool>,
    notifier: Arc<Notify>,
    waiting: Arc<Mutex<Vec<QueueItem>>>,
) {
    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let job = {
            let mut queue = waiting.lock().await;
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        };
        match job {
            Some(item) => {
                let (id, source, target_prefix, options, sender) = item.into_parts();
                log::debug!(
                    "worker {} picked up job {} ({} example(s))",
                    worker,
                    id,
                    source.len()
                );
                let result = translator
                    .run_batch_translation(&source, &target_prefix, options)
                    .await;
                if let Err(error) = &result {
                    log::debug!("worker {}: job {} failed: {}", worker, id, error);
                }
                if sender.send(result).is_err() {
                    log::warn!(
                        "worker {}: requester of job {} went away before its result was ready",
                        worker,
                        id
                    );
                }
            }
            None => {
                // Wait for new work, with a timeout so the running flag is
                // observed even if a notification slips by.
                let _ = tokio::time::timeout(IDLE_POLL, notifier.notified()).await;
            }
        }
    }
    log::debug!("worker {} stopped", worker);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mock::MockModel;
    use crate::options::TranslationOptions;
    use tokio::sync::oneshot;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn worker_fulfills_a_queued_job() {
        let translator = Translator::from_model(Arc::new(MockModel::new()));
        let waiting = Arc::new(Mutex::new(Vec::new()));
        let crew = WorkerCrew::spawn(vec![translator], waiting.clone());

        let (tx, rx) = oneshot::channel();
        let options = TranslationOptions {
            beam_size: 1,
            ..Default::default()
        };
        {
            let mut queue = waiting.lock().await;
            queue.push(QueueItem::new(
                vec![vec!["a".to_string(), "b".to_string()]],
                vec![],
                options,
                tx,
            ));
        }
        crew.notify();

        let results = rx.await.unwrap().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].output(),
            ["b".to_string(), "a".to_string()].as_slice()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_stops_idle_workers() {
        let translator = Translator::from_model(Arc::new(MockModel::new()));
        let waiting: Arc<Mutex<Vec<QueueItem>>> = Arc::new(Mutex::new(Vec::new()));
        let mut crew = WorkerCrew::spawn(vec![translator], waiting);
        assert!(crew.is_running());
        crew.shutdown();
        assert!(!crew.is_running());
        // Shutting down twice is harmless.
        crew.shutdown();
    }
}
