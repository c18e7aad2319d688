use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::controller::FeedController;

/// Default refresh period for an open feed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Owns the background refresh task of one feed.
///
/// Dropping the handle aborts the task, including any load still in flight.
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn stop(self) {
        drop(self);
    }

    /// True once the task ended on its own after the feed was closed.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Load `feed` now and then every `every` until stopped.
///
/// Failed loads, including rejected sessions, keep the loop going; the
/// error is left in the feed's `last_error`. Only closing the feed ends it.
pub fn spawn_poller(feed: Arc<FeedController>, every: Duration) -> PollHandle {
    spawn_from(feed, Instant::now(), every)
}

/// Like [`spawn_poller`], for a feed that was just loaded: the first
/// refresh comes one interval from now.
pub fn resume_poller(feed: Arc<FeedController>, every: Duration) -> PollHandle {
    spawn_from(feed, Instant::now() + every, every)
}

fn spawn_from(feed: Arc<FeedController>, start: Instant, every: Duration) -> PollHandle {
    let task = tokio::spawn(async move {
        let mut ticker = time::interval_at(start, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(group_id = %feed.group_id(), ?every, "poller started");
        loop {
            ticker.tick().await;
            if feed.is_closed() {
                break;
            }
            // Failures land in the feed's last_error; the next tick retries.
            if let Err(e) = feed.load_messages().await {
                if e.is_unauthorized() {
                    warn!(group_id = %feed.group_id(), "poll rejected: {e}");
                }
            }
        }
    });
    PollHandle { task }
}
