use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::status::NextShow;
use crate::CinemaError;

/// Only shows starting within this many hours are reported as "next".
pub const NEXT_SHOW_HORIZON_HOURS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledShow {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Where upcoming shows come from (booking system, static file, ...).
pub trait ScheduleSource: Send + Sync {
    fn upcoming_shows(&self) -> BoxFuture<'_, Result<Vec<ScheduledShow>, CinemaError>>;
}

/// Earliest show starting in `(now, now + horizon]`.
pub fn next_show_within(shows: &[ScheduledShow], now: DateTime<Utc>) -> Option<NextShow> {
    let horizon = now + ChronoDuration::hours(NEXT_SHOW_HORIZON_HOURS);
    shows
        .iter()
        .filter(|s| s.start > now && s.start <= horizon)
        .min_by_key(|s| s.start)
        .map(|s| NextShow {
            title: s.title.clone(),
            start: s.start,
            end: s.end,
        })
}

/// Caches a [`ScheduleSource`] for a fixed TTL. Failed fetches are not cached.
pub(crate) struct ScheduleCache {
    source: Arc<dyn ScheduleSource>,
    ttl: Duration,
    cached: Mutex<Option<(Instant, Vec<ScheduledShow>)>>,
}

impl ScheduleCache {
    pub(crate) fn new(source: Arc<dyn ScheduleSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: Mutex::new(None),
        }
    }

    pub(crate) async fn shows(&self) -> Result<Vec<ScheduledShow>, CinemaError> {
        let mut cached = self.cached.lock().await;
        if let Some((fetched_at, shows)) = cached.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                return Ok(shows.clone());
            }
        }
        let shows = self.source.upcoming_shows().await?;
        debug!("Schedule refreshed: {} shows", shows.len());
        *cached = Some((Instant::now(), shows.clone()));
        Ok(shows)
    }

    pub(crate) async fn next_show(&self, now: DateTime<Utc>) -> Result<Option<NextShow>, CinemaError> {
        Ok(next_show_within(&self.shows().await?, now))
    }
}
