pub mod notify;
pub mod queue;
pub mod worker;

use std::sync::Arc;

use scanbot_scan::{Materializer, Scanner};
use tokio::task::JoinHandle;

pub use notify::{Notification, Notifier, SlackNotifier};
pub use queue::{JobQueue, JobReceiver, QueueError};
pub use worker::{JobSummary, Worker};

/// Start the single background worker draining `jobs`.
pub fn spawn_worker<M: Materializer, N: Notifier>(
    materializer: M,
    scanner: Scanner,
    notifier: N,
    jobs: JobReceiver,
) -> JoinHandle<()> {
    let worker = Arc::new(Worker::new(materializer, scanner, notifier));
    tokio::spawn(worker.run(jobs))
}
