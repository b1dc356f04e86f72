use scanbot_core::models::PushJob;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue is at capacity; the job was not accepted.
    #[error("job queue is full ({capacity} jobs)")]
    Full { capacity: usize },
    #[error("job queue is closed")]
    Closed,
}

/// Producer side of the in-memory push job queue. Cheap to clone.
///
/// Jobs are lost on restart.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<PushJob>,
}

/// Consumer side, owned by the single worker.
#[derive(Debug)]
pub struct JobReceiver {
    rx: mpsc::Receiver<PushJob>,
}

impl JobQueue {
    pub fn bounded(capacity: usize) -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, JobReceiver { rx })
    }

    /// Enqueue without waiting. A full queue rejects the job.
    pub fn try_enqueue(&self, job: PushJob) -> Result<(), QueueError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                QueueError::Full { capacity: self.tx.max_capacity() }
            }
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Number of jobs waiting to be picked up.
    pub fn len(&self) -> usize { self.tx.max_capacity() - self.tx.capacity() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl JobReceiver {
    /// Wait for the next job. `None` once every [`JobQueue`] has been dropped and the queue is
    /// drained.
    pub async fn recv(&mut self) -> Option<PushJob> { self.rx.recv().await }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str) -> PushJob {
        PushJob {
            repository: name.to_string(),
            clone_url: format!("https://github.com/{name}.git"),
            commits: vec![],
        }
    }

    #[tokio::test]
    async fn fifo_order() {
        let (queue, mut rx) = JobQueue::bounded(4);
        queue.try_enqueue(job("a/one")).unwrap();
        queue.try_enqueue(job("a/two")).unwrap();
        queue.try_enqueue(job("a/three")).unwrap();
        assert_eq!(queue.len(), 3);
        assert_eq!(rx.recv().await.unwrap().repository, "a/one");
        assert_eq!(rx.recv().await.unwrap().repository, "a/two");
        assert_eq!(rx.recv().await.unwrap().repository, "a/three");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn full_queue_rejects() {
        let (queue, mut rx) = JobQueue::bounded(1);
        queue.try_enqueue(job("a/one")).unwrap();
        assert!(matches!(queue.try_enqueue(job("a/two")), Err(QueueError::Full { capacity: 1 })));
        assert_eq!(queue.len(), 1);
        rx.recv().await.unwrap();
        queue.try_enqueue(job("a/three")).unwrap();
    }

    #[tokio::test]
    async fn closed_queue() {
        let (queue, rx) = JobQueue::bounded(1);
        drop(rx);
        assert!(matches!(queue.try_enqueue(job("a/one")), Err(QueueError::Closed)));
    }

    #[tokio::test]
    async fn receiver_ends_when_producers_drop() {
        let (queue, mut rx) = JobQueue::bounded(2);
        queue.try_enqueue(job("a/one")).unwrap();
        drop(queue);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
