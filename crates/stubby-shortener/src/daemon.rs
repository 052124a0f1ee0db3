use crate::config::DeletionConfig;
use std::sync::Arc;
use stubby_core::{DeleteRequest, UserLinkRepository};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Running,
    Stopped,
}

/// Producer side of the deletion queue.
///
/// Cheap to clone and safe to share between request handlers. Posting never
/// waits on the consumer.
#[derive(Debug, Clone)]
pub struct DeletionQueue {
    sender: mpsc::UnboundedSender<DeleteRequest>,
}

impl DeletionQueue {
    /// Posts a request for the next flush.
    ///
    /// Returns `false` when the request was discarded, either because it names
    /// no short ids or because the daemon has stopped.
    pub fn enqueue(&self, request: DeleteRequest) -> bool {
        if request.is_empty() {
            return false;
        }

        match self.sender.send(request) {
            Ok(()) => true,
            Err(mpsc::error::SendError(request)) => {
                warn!(
                    user_id = %request.user_id,
                    short_ids = request.short_ids.len(),
                    "deletion daemon stopped, discarding request"
                );
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Single consumer that applies queued deletions in small batches.
///
/// Construct once at startup with [`DeletionDaemon::new`], hand the returned
/// [`DeletionQueue`] to whoever accepts deletions, and drive the daemon with
/// [`DeletionDaemon::run`] on its own task.
pub struct DeletionDaemon<R> {
    repository: Arc<R>,
    receiver: mpsc::UnboundedReceiver<DeleteRequest>,
    config: DeletionConfig,
    state: DaemonState,
}

impl<R: UserLinkRepository> DeletionDaemon<R> {
    pub fn new(repository: Arc<R>, config: DeletionConfig) -> (Self, DeletionQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let daemon = Self {
            repository,
            receiver,
            config,
            state: DaemonState::Running,
        };
        (daemon, DeletionQueue { sender })
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Drains up to `max_batch_size` queued requests without waiting and
    /// applies them in one `delete_links` call.
    ///
    /// A storage failure drops the batch. Returns how many requests were
    /// drained.
    pub async fn flush(&mut self) -> usize {
        let mut batch = Vec::with_capacity(self.config.max_batch_size);
        while batch.len() < self.config.max_batch_size {
            match self.receiver.try_recv() {
                Ok(request) => batch.push(request),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        if batch.is_empty() {
            return 0;
        }

        let drained = batch.len();
        match self.repository.delete_links(&batch).await {
            Ok(updated) => debug!(requests = drained, updated, "applied deletion batch"),
            Err(err) => error!(
                requests = drained,
                error = %err,
                "failed to apply deletion batch, dropping it"
            ),
        }
        drained
    }

    /// Flushes on every tick of `flush_interval` until `cancel` fires.
    ///
    /// A flush in progress finishes before cancellation is observed. Once
    /// stopped the queue is closed and whatever it still holds is discarded.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let period = self.config.flush_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            flush_interval_ms = period.as_millis() as u64,
            max_batch_size = self.config.max_batch_size,
            "starting deletion daemon"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.flush().await;
                }
            }
        }

        self.stop();
    }

    fn stop(&mut self) {
        self.receiver.close();
        let mut discarded = 0usize;
        while self.receiver.try_recv().is_ok() {
            discarded += 1;
        }
        self.state = DaemonState::Stopped;
        info!(discarded, "stopped deletion daemon");
    }
}
