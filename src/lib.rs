mod auth;
mod config;
pub use config::{FleetConfig, TheaterConfig};
mod error;
pub use error::CinemaError;
mod health;
pub use health::{probe_system_status, HealthOutcome};
pub mod playlist;
pub use playlist::{Automation, PlaylistItem};
mod schedule;
pub use schedule::{next_show_within, ScheduleSource, ScheduledShow, NEXT_SHOW_HORIZON_HOURS};
mod session;
pub use session::{is_login_page, CookieSession, HttpResponse};
mod settings;
pub use settings::{Settings, SETTINGS};
pub mod soap;
mod state;
pub use state::{AuthState, SESSION_COOKIE};
mod status;
pub use status::{NextShow, PlaybackState, ShowStatus};
mod timer;
pub use timer::{compute_timer, is_presentation_item, TimerDescriptor, TimerKind, PRESHOW_WINDOW_SECS};
pub mod utils;
mod vendor;
pub use vendor::{BodyConfirmation, MacroAck, Vendor, VendorProfile};

use chrono::{Local, Utc};
use futures::future::join_all;
use reqwest::Method;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use auth::{AuthEngine, Credentials};
use health::HealthMonitor;
use playlist::PlaylistScraper;
use schedule::ScheduleCache;
use session::ACCEPT_HTML;
use status::DeviceStatusClient;

const MACRO_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Client for one theater's playback server (IMS3000 or DCP2000 web UI).
///
/// Owns the cookie session, the login flows, the keep-alive monitor, the
/// cached SOAP session id and the playlist cache. Theaters never share state,
/// so several clients can run side by side.
///
/// # Logging
///
/// This library uses the `tracing` crate and never installs a subscriber.
/// Every event carries a `theater` field.
///
/// ```no_run
/// use tracing::Level;
/// use tracing_subscriber::FmtSubscriber;
///
/// let subscriber = FmtSubscriber::builder()
///     .with_max_level(Level::DEBUG)
///     .finish();
/// tracing::subscriber::set_global_default(subscriber)
///     .expect("Failed to set tracing subscriber");
/// ```
pub struct TheaterClient {
    name: String,
    slug: String,
    vendor_hint: Option<Vendor>,
    session: Arc<CookieSession>,
    auth: Arc<AuthEngine>,
    status: DeviceStatusClient,
    playlist: PlaylistScraper,
    health: HealthMonitor,
    health_interval: Duration,
    schedule: Option<ScheduleCache>,
}

impl TheaterClient {
    pub fn new(config: TheaterConfig) -> Result<Self, CinemaError> {
        config.validate()?;
        let session = Arc::new(CookieSession::new(&config.name, &config.url)?);
        let credentials = Credentials {
            username: config.username,
            password: config.password,
        };
        let auth = Arc::new(AuthEngine::new(
            session.clone(),
            credentials,
            config.vendor_hint,
        ));
        let status = DeviceStatusClient::new(session.clone(), auth.clone(), config.vendor_hint);
        let playlist =
            PlaylistScraper::new(session.clone(), auth.clone(), SETTINGS.playlist_cache_ttl);

        info!(theater = %config.name, "Theater client created for {}", session.origin());
        Ok(Self {
            slug: utils::slugify(&config.name),
            name: config.name,
            vendor_hint: config.vendor_hint,
            session,
            auth,
            status,
            playlist,
            health: HealthMonitor::new(),
            health_interval: SETTINGS.health_check_interval,
            schedule: None,
        })
    }

    /// Attach a schedule so stopped screens report their next show.
    pub fn with_schedule_source(mut self, source: Arc<dyn ScheduleSource>) -> Self {
        self.schedule = Some(ScheduleCache::new(source, SETTINGS.schedule_cache_ttl));
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Maximum age of a cached playlist, even when the show title is unchanged.
    pub fn with_playlist_ttl(mut self, ttl: Duration) -> Self {
        self.playlist.set_ttl(ttl);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn session(&self) -> &CookieSession {
        &self.session
    }

    pub fn auth_state(&self) -> AuthState {
        self.session.auth_state()
    }

    pub fn auth_state_receiver(&self) -> watch::Receiver<AuthState> {
        self.session.subscribe_auth_state()
    }

    async fn start_health_monitor(&self) {
        self.health
            .start(self.session.clone(), self.auth.clone(), self.health_interval)
            .await;
    }

    /// Run a fresh login sequence. Starts the keep-alive monitor on success.
    pub async fn login(&self) -> bool {
        let ok = self.auth.login().await;
        if ok {
            self.start_health_monitor().await;
        }
        ok
    }

    /// Log in only if not already authenticated.
    pub async fn ensure_logged_in(&self) -> bool {
        let ok = self.auth.ensure_logged_in().await;
        if ok {
            self.start_health_monitor().await;
        }
        ok
    }

    pub async fn logout(&self) {
        self.health.stop().await;
        self.auth.logout().await;
    }

    pub async fn is_health_monitor_running(&self) -> bool {
        self.health.is_running().await
    }

    /// One keep-alive tick, on demand.
    pub async fn perform_health_check(&self) -> HealthOutcome {
        health::run_health_check(&self.session, &self.auth).await
    }

    /// Reachability: a healthy status probe, or else any 200/301/302 from the index page.
    pub async fn check_connection(&self) -> bool {
        match probe_system_status(&self.session).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => debug!(theater = %self.name, error = %e, "Status probe failed"),
        }
        match self
            .session
            .request(Method::GET, "/web/index.php", None, &[("Accept", ACCEPT_HTML.to_string())])
            .await
        {
            Ok(res) => matches!(res.status, 200 | 301 | 302),
            Err(e) => {
                warn!(theater = %self.name, error = %e, "Connection check failed");
                false
            }
        }
    }

    /// Current show status, with the next scheduled show attached when idle.
    pub async fn playback_status(&self) -> Result<ShowStatus, CinemaError> {
        if !self.ensure_logged_in().await {
            return Err(CinemaError::AuthRejected);
        }
        let mut status = self.status.show_status().await?;

        if !status.state().is_active() {
            if let Some(schedule) = &self.schedule {
                match schedule.next_show(Utc::now()).await {
                    Ok(next) => status.next_show = next,
                    Err(e) => {
                        warn!(theater = %self.name, error = %e, "Failed to enhance status with schedule")
                    }
                }
            }
        }
        Ok(status)
    }

    /// Playlist timeline for `show_title`, from cache when the title is unchanged.
    pub async fn playlist_items(&self, show_title: &str) -> Result<Vec<PlaylistItem>, CinemaError> {
        if !self.ensure_logged_in().await {
            return Err(CinemaError::AuthRejected);
        }
        self.playlist.get_or_fetch(show_title).await
    }

    pub async fn invalidate_playlist(&self) {
        self.playlist.invalidate().await;
    }

    /// Pre-show countdown for the loaded show, or `None` when nothing is due
    /// within the window.
    pub async fn current_timer(&self) -> Result<Option<TimerDescriptor>, CinemaError> {
        let status = self.playback_status().await?;
        let (Some(title), Some(position)) = (status.title(), status.spl_position) else {
            return Ok(None);
        };
        let items = self.playlist_items(title).await?;
        Ok(compute_timer(&items, Some(position)).map(|timer| timer.with_target(Local::now())))
    }

    /// Run a named server macro. The loaded show may change, so the playlist
    /// cache is dropped on success.
    pub async fn execute_macro(&self, macro_name: &str) -> Result<bool, CinemaError> {
        if !self.ensure_logged_in().await {
            return Err(CinemaError::AuthRejected);
        }
        let vendor = self
            .session
            .detected_vendor()
            .await
            .or(self.vendor_hint)
            .unwrap_or(Vendor::Ims3000);
        let profile = vendor.profile();
        let body = serde_urlencoded::to_string([
            ("request", "EXECUTE_MACRO"),
            ("macro_name", macro_name),
        ])?;

        info!(theater = %self.name, "Executing macro: {}", macro_name);
        let origin = self.session.origin().to_string();
        let res = self
            .session
            .request(
                Method::POST,
                profile.macro_path,
                Some(body),
                &[
                    ("Content-Type", MACRO_CONTENT_TYPE.to_string()),
                    ("Referer", format!("{}/web/index.php", origin)),
                    ("Origin", origin),
                ],
            )
            .await?;

        let ok = profile.is_macro_success(res.status, &res.body);
        if ok {
            info!(theater = %self.name, "Macro executed: {}", macro_name);
            self.playlist.invalidate().await;
        } else {
            error!(
                theater = %self.name,
                "Macro failed - status: {} response: {}",
                res.status,
                utils::truncate(&res.body, 50)
            );
        }
        Ok(ok)
    }

    /// Stop the keep-alive monitor and log out. Never fails.
    pub async fn destroy(&self) {
        info!(theater = %self.name, "Destroying theater client");
        self.health.stop().await;
        self.auth.logout().await;
    }
}

impl std::fmt::Debug for TheaterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TheaterClient")
            .field("name", &self.name)
            .field("url", &self.session.origin())
            .field("vendor_hint", &self.vendor_hint)
            .finish()
    }
}

impl Drop for TheaterClient {
    fn drop(&mut self) {
        debug!(theater = %self.name, "Dropping TheaterClient, signaling health monitor to stop.");
        self.health.signal_stop();
    }
}

/// All theaters managed by one process.
#[derive(Debug, Default)]
pub struct TheaterFleet {
    theaters: Vec<Arc<TheaterClient>>,
}

impl TheaterFleet {
    pub fn from_config(config: FleetConfig) -> Result<Self, CinemaError> {
        let theaters = config
            .theaters
            .into_iter()
            .map(|theater| TheaterClient::new(theater).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { theaters })
    }

    pub fn from_json_str(json: &str) -> Result<Self, CinemaError> {
        Self::from_config(FleetConfig::from_json_str(json)?)
    }

    pub fn len(&self) -> usize {
        self.theaters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.theaters.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.theaters.iter().map(|t| t.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TheaterClient>> {
        self.theaters.iter()
    }

    /// Look up by exact name, then by slug (`"Salle 1"` or `"salle-1"`).
    pub fn get(&self, name_or_slug: &str) -> Result<Arc<TheaterClient>, CinemaError> {
        let slug = utils::slugify(name_or_slug.trim());
        self.theaters
            .iter()
            .find(|t| t.name() == name_or_slug)
            .or_else(|| self.theaters.iter().find(|t| t.slug() == slug))
            .cloned()
            .ok_or_else(|| CinemaError::UnknownTheater(name_or_slug.to_string()))
    }

    /// Destroy every theater concurrently. One theater failing to log out
    /// does not hold up the others.
    pub async fn shutdown(&self) {
        info!("Shutting down {} theater clients", self.theaters.len());
        join_all(self.theaters.iter().map(|t| t.destroy())).await;
    }
}
