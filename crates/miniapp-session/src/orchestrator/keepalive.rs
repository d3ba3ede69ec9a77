//! Keepalive ticker for live sessions.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use super::{live::LiveSession, pending::Pending};

/// Periodic prolong requests for a session with a server-side query id.
pub(crate) struct Keepalive {
    pub(crate) query_id: u64,
    interval: Interval,
    /// The one prolong request allowed in flight.
    pub(crate) pending: Option<Pending>,
}

impl Keepalive {
    /// First tick fires one full `period` after start.
    pub(crate) fn new(query_id: u64, period: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            query_id,
            interval,
            pending: None,
        }
    }
}

/// Resolves on the next keepalive tick of the live session, or never when
/// there is no session to prolong.
pub(crate) async fn next_tick(live: &mut Option<LiveSession>) {
    match live.as_mut().and_then(|live| live.keepalive.as_mut()) {
        Some(keepalive) => {
            keepalive.interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
