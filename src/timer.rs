use chrono::{DateTime, Duration as ChronoDuration, Local};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::playlist::PlaylistItem;

/// Events further away than this (15 minutes) never produce a timer.
pub const PRESHOW_WINDOW_SECS: i64 = 900;

lazy_static! {
    static ref SHR_FTR_RE: Regex =
        Regex::new(r"(?i)(?:^|[^A-Za-z0-9])(SHR|FTR)(?:[^A-Za-z0-9]|$)").unwrap();
    static ref RAIL_RE: Regex = Regex::new(r"(?i)rail").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerKind {
    #[serde(rename = "rails")]
    Rail,
    #[serde(rename = "film")]
    Film,
}

impl TimerKind {
    pub fn label(self) -> &'static str {
        match self {
            TimerKind::Rail => "Rails dans",
            TimerKind::Film => "Film dans",
        }
    }
}

/// Time until the next operator-relevant event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerDescriptor {
    #[serde(rename = "type")]
    pub kind: TimerKind,
    pub label: String,
    pub seconds_remaining: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_time: Option<String>,
}

impl TimerDescriptor {
    fn new(kind: TimerKind, seconds_remaining: u64) -> Self {
        Self {
            kind,
            label: kind.label().to_string(),
            seconds_remaining,
            target: None,
            target_time: None,
        }
    }

    /// Absolute wall-clock target, counted from `now`.
    pub fn with_target(mut self, now: DateTime<Local>) -> Self {
        let target = now + ChronoDuration::seconds(self.seconds_remaining as i64);
        self.target_time = Some(target.format("%H:%M").to_string());
        self.target = Some(target);
        self
    }
}

/// Feature or short, by class or by an `SHR`/`FTR` token in cpl name or title.
pub fn is_presentation_item(item: &PlaylistItem) -> bool {
    if item.has_class("feature") || item.has_class("short") {
        return true;
    }
    let haystack = format!("{} {}", item.cpl_name, item.title);
    SHR_FTR_RE.is_match(&haystack)
}

fn in_window(delta: i64) -> bool {
    delta > 0 && delta <= PRESHOW_WINDOW_SECS
}

/// Pick the timer to show for `position` (seconds into the show).
///
/// The rail cue wins over the film start whenever both fall inside the
/// window. The rail cue is the latest rail automation on the last
/// presentation item.
pub fn compute_timer(items: &[PlaylistItem], position: Option<u64>) -> Option<TimerDescriptor> {
    let position = position? as i64;
    if items.is_empty() {
        return None;
    }

    let mut candidates: Vec<(u64, &PlaylistItem)> = items
        .iter()
        .filter(|it| is_presentation_item(it))
        .filter_map(|it| it.start_seconds.map(|s| (s, it)))
        .collect();
    if candidates.is_empty() {
        return None;
    }
    candidates.sort_by_key(|(start, _)| *start);

    let film_delta = candidates[0].0 as i64 - position;

    let rail_delta = candidates.last().and_then(|(_, last)| {
        let mut rails: Vec<u64> = last
            .automations
            .iter()
            .filter(|a| RAIL_RE.is_match(&a.title))
            .filter_map(|a| a.start_seconds)
            .collect();
        rails.sort_unstable();
        rails.last().map(|offset| *offset as i64 - position)
    });

    if let Some(delta) = rail_delta.filter(|d| in_window(*d)) {
        return Some(TimerDescriptor::new(TimerKind::Rail, delta as u64));
    }
    if in_window(film_delta) {
        return Some(TimerDescriptor::new(TimerKind::Film, film_delta as u64));
    }
    None
}
