use reqwest::Method;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::session::{CookieSession, HttpResponse, ACCEPT_HTML};
use crate::state::AuthState;
use crate::vendor::BodyConfirmation;
use crate::{CinemaError, Vendor};

#[derive(Clone)]
pub(crate) struct Credentials {
    pub(crate) username: String,
    pub(crate) password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Drives the two vendor login flows on top of a [`CookieSession`].
pub(crate) struct AuthEngine {
    session: Arc<CookieSession>,
    credentials: Credentials,
    vendor_hint: Option<Vendor>,
    // one login sequence at a time per theater
    login_lock: Mutex<()>,
}

fn looks_like_login_path(location: &str) -> bool {
    location.to_ascii_lowercase().contains("login")
}

impl AuthEngine {
    pub(crate) fn new(
        session: Arc<CookieSession>,
        credentials: Credentials,
        vendor_hint: Option<Vendor>,
    ) -> Self {
        Self {
            session,
            credentials,
            vendor_hint,
            login_lock: Mutex::new(()),
        }
    }

    /// No-op when already authenticated; otherwise runs [`AuthEngine::login`].
    /// Concurrent callers share a single login sequence.
    pub(crate) async fn ensure_logged_in(&self) -> bool {
        if self.session.is_authenticated().await {
            return true;
        }
        let _guard = self.login_lock.lock().await;
        // someone else may have finished logging in while we waited
        if self.session.is_authenticated().await {
            return true;
        }
        info!(theater = %self.session.theater(), "Session expired or missing, re-authenticating...");
        self.login_locked().await
    }

    pub(crate) async fn login(&self) -> bool {
        let _guard = self.login_lock.lock().await;
        self.login_locked().await
    }

    async fn login_locked(&self) -> bool {
        let theater = self.session.theater();

        // avoid piling up server-side sessions
        if self.session.has_session_cookie().await {
            self.logout().await;
        }

        self.session.set_auth_state(AuthState::Authenticating);
        for vendor in Vendor::login_order(self.vendor_hint) {
            match self.attempt_login(vendor).await {
                Ok(true) => {
                    if self.session.mark_authenticated(vendor).await {
                        info!(theater = %theater, vendor = %vendor, "Authentication established");
                        return true;
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(theater = %theater, vendor = %vendor, error = %e, "Login attempt failed");
                }
            }
        }

        error!(theater = %theater, "Authentication failed");
        self.session.clear().await;
        false
    }

    /// Run one vendor's flow. `Ok(false)` means the server rejected us.
    async fn attempt_login(&self, vendor: Vendor) -> Result<bool, CinemaError> {
        let profile = vendor.profile();
        let theater = self.session.theater();

        let mut fields: Vec<(&str, &str)> = vec![
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
        ];
        fields.extend_from_slice(profile.login_extra_fields);
        let form = serde_urlencoded::to_string(&fields)?;

        debug!(theater = %theater, "{} login attempt...", vendor);
        let origin = self.session.origin().to_string();
        let res = self
            .session
            .navigate(
                Method::POST,
                profile.login_path,
                Some(form),
                &[
                    ("Origin", origin.clone()),
                    ("Referer", format!("{}{}", origin, profile.login_referer_path)),
                    ("Accept", ACCEPT_HTML.to_string()),
                ],
            )
            .await?;

        if res.is_redirect() {
            let location = res.location().unwrap_or_default().to_string();
            if looks_like_login_path(&location) {
                warn!(theater = %theater, "{} login rejected (redirected to {})", vendor, location);
                return Ok(false);
            }
            info!(theater = %theater, "{} login credentials accepted (Redirect)", vendor);
            // the real session cookie is only issued after this follow-up GET
            self.follow_redirect(profile.login_path, &location).await;
            return Ok(true);
        }

        if res.status != 200 {
            warn!(theater = %theater, "{} login unexpected status: {}", vendor, res.status);
            return Ok(false);
        }
        if res.is_login_page() {
            warn!(theater = %theater, "{} login rejected (Login page returned)", vendor);
            return Ok(false);
        }

        match profile.body_confirmation {
            BodyConfirmation::Direct => {
                info!(theater = %theater, "{} login success (Index content)", vendor);
                Ok(true)
            }
            BodyConfirmation::IndexProbe => {
                let probe = self
                    .session
                    .request(Method::GET, "/web/index.php", None, &[("Accept", ACCEPT_HTML.to_string())])
                    .await?;
                if probe.status == 200 && !probe.is_login_page() {
                    info!(theater = %theater, "{} login confirmed (Index probe)", vendor);
                    Ok(true)
                } else {
                    error!(theater = %theater, "{} login probe failed ({})", vendor, probe.status);
                    Ok(false)
                }
            }
        }
    }

    async fn follow_redirect(&self, from_path: &str, location: &str) {
        let theater = self.session.theater();
        let target = match self
            .session
            .url_for(from_path)
            .and_then(|from| from.join(location).map_err(CinemaError::from))
        {
            Ok(url) => url,
            Err(e) => {
                warn!(theater = %theater, error = %e, "Bad login redirect target {:?}", location);
                return;
            }
        };
        debug!(theater = %theater, "Following login redirect to: {}", target);
        let followed: Result<HttpResponse, CinemaError> = self
            .session
            .navigate(Method::GET, target.as_str(), None, &[("Accept", ACCEPT_HTML.to_string())])
            .await;
        if let Err(e) = followed {
            warn!(theater = %theater, error = %e, "Failed to follow redirect, continuing anyway");
        }
    }

    /// Best-effort logout. State is cleared whatever the server says.
    pub(crate) async fn logout(&self) {
        let theater = self.session.theater();
        if !self.session.has_session_cookie().await {
            self.session.clear().await;
            return;
        }

        let vendor = self.session.detected_vendor().await.unwrap_or(Vendor::Ims3000);
        let profile = vendor.profile();
        info!(theater = %theater, "Logging out previous session (Type: {})...", vendor);

        let referer = format!("{}{}", self.session.origin(), profile.logout_referer_path);
        match self
            .session
            .navigate(
                Method::GET,
                profile.logout_path,
                None,
                &[
                    ("Referer", referer),
                    ("Accept", ACCEPT_HTML.to_string()),
                    ("Upgrade-Insecure-Requests", "1".to_string()),
                ],
            )
            .await
        {
            Ok(_) => debug!(theater = %theater, "Logout request completed"),
            Err(e) => warn!(
                theater = %theater,
                error = %e,
                "Logout request failed (network or already expired)"
            ),
        }
        self.session.clear().await;
    }
}
