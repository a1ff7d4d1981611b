//! Playlist-editor scraping: fetch the richest editor markup, turn it into a
//! sorted timeline and cache it per show title.

mod fetch;
mod parse;

pub use fetch::score_editor_html;
pub use parse::{parse_playlist, parse_sec, parse_sec_value};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::AuthEngine;
use crate::session::CookieSession;
use crate::CinemaError;

/// Cue attached to a playlist element (lights, rails, masking...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub id: String,
    pub time_text: String,
    pub start_seconds: Option<u64>,
    pub title: String,
    pub kind: String,
    pub frame_offset: Option<f64>,
}

/// One row of the show playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub id: String,
    pub classes: Vec<String>,
    pub time_text: String,
    /// Offset from the start of the show.
    pub start_seconds: Option<u64>,
    pub title: String,
    pub cpl_name: String,
    pub cpl_id: String,
    pub duration: Option<f64>,
    pub automations: Vec<Automation>,
}

impl PlaylistItem {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c.eq_ignore_ascii_case(class))
    }
}

/// Stable sort by start time; entries without one go last in document order.
pub(crate) fn sort_by_start<T>(entries: &mut [T], start: impl Fn(&T) -> Option<u64>) {
    entries.sort_by_key(|e| match start(e) {
        Some(s) => (0u8, s),
        None => (1u8, 0),
    });
}

#[derive(Debug, Clone)]
pub struct PlaylistCacheEntry {
    pub show_title: String,
    pub items: Vec<PlaylistItem>,
    pub fetched_at: Instant,
}

impl PlaylistCacheEntry {
    pub fn is_fresh(&self, show_title: &str, now: Instant, ttl: Duration) -> bool {
        self.show_title == show_title && now.saturating_duration_since(self.fetched_at) < ttl
    }
}

/// Scrape cycles tried when the session dies mid-scrape.
const MAX_SCRAPE_ATTEMPTS: usize = 2;

/// Per-theater scraper with a single-entry cache.
pub(crate) struct PlaylistScraper {
    session: Arc<CookieSession>,
    auth: Arc<AuthEngine>,
    ttl: Duration,
    // held across a refresh so concurrent callers share one scrape
    cache: Mutex<Option<PlaylistCacheEntry>>,
}

impl PlaylistScraper {
    pub(crate) fn new(session: Arc<CookieSession>, auth: Arc<AuthEngine>, ttl: Duration) -> Self {
        Self {
            session,
            auth,
            ttl,
            cache: Mutex::new(None),
        }
    }

    /// Cached items for `show_title`, scraping when the title changed or the entry expired.
    pub(crate) async fn get_or_fetch(&self, show_title: &str) -> Result<Vec<PlaylistItem>, CinemaError> {
        let theater = self.session.theater();
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.as_ref() {
            if entry.is_fresh(show_title, Instant::now(), self.ttl) {
                debug!(theater = %theater, "Playlist cache hit for {:?}", show_title);
                return Ok(entry.items.clone());
            }
        }

        let items = self.scrape().await?;
        info!(theater = %theater, "Scraped {} playlist items for {:?}", items.len(), show_title);
        *cache = Some(PlaylistCacheEntry {
            show_title: show_title.to_string(),
            items: items.clone(),
            fetched_at: Instant::now(),
        });
        Ok(items)
    }

    pub(crate) fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    /// One prime + fetch + parse cycle. A cycle that saw the login page is
    /// thrown away and retried once on a fresh login.
    async fn scrape(&self) -> Result<Vec<PlaylistItem>, CinemaError> {
        let theater = self.session.theater();
        for attempt in 1..=MAX_SCRAPE_ATTEMPTS {
            if !self.auth.ensure_logged_in().await {
                return Err(CinemaError::AuthRejected);
            }
            fetch::prime_editor(&self.session).await;
            let html = fetch::fetch_best_editor_html(&self.session).await?;
            if self.session.is_authenticated().await {
                return Ok(parse_playlist(&html));
            }
            warn!(
                theater = %theater,
                "Session expired during playlist scrape (attempt {}/{})", attempt, MAX_SCRAPE_ATTEMPTS
            );
        }
        Err(CinemaError::SessionExpired)
    }

    pub(crate) async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }
}
