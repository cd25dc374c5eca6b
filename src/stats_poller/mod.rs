//! StatsPoller - per-slot stats polling task
//!
//! One task per running slot, fixed period. Each tick fetches the slot's
//! stats and replaces its snapshot. The task ends on its own only when the
//! slot it was started for is gone (stopped or re-allocated); otherwise it
//! runs until its [`PollerHandle`] is dropped.

use crate::inference_client::{StatsError, StreamBackend};
use crate::slot_pool::{PollOutcome, PollerHandle, SlotPool, SlotTicket};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Default polling period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Spawn the poller for a slot that is becoming Running
///
/// The first fetch happens one period after spawn.
pub fn spawn(
    pool: Arc<SlotPool>,
    backend: Arc<dyn StreamBackend>,
    ticket: SlotTicket,
    period: Duration,
) -> PollerHandle {
    let handle = tokio::spawn(async move {
        run(pool, backend, ticket, period).await;
    });

    PollerHandle::new(ticket.sid, handle)
}

async fn run(
    pool: Arc<SlotPool>,
    backend: Arc<dyn StreamBackend>,
    ticket: SlotTicket,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(
        sid = ticket.sid,
        epoch = ticket.epoch,
        period_ms = period.as_millis() as u64,
        "Stats poller started"
    );

    loop {
        ticker.tick().await;

        let outcome = match backend.fetch_stats(ticket.sid).await {
            Ok(snapshot) => pool.apply_snapshot(ticket, snapshot).await,
            Err(StatsError::NotFound) => {
                tracing::debug!(sid = ticket.sid, "Stats not found, backend has no session");
                pool.record_missed_poll(ticket).await
            }
            Err(StatsError::Transient(e)) => {
                tracing::trace!(sid = ticket.sid, error = %e, "Stats poll skipped");
                continue;
            }
        };

        if outcome == PollOutcome::Stale {
            tracing::debug!(sid = ticket.sid, epoch = ticket.epoch, "Slot moved on, poller exiting");
            break;
        }
    }
}
