use reqwest::header::{HeaderMap, COOKIE, LOCATION, SET_COOKIE};
use reqwest::{redirect, Client, Method, Url};
use tokio::sync::{watch, RwLock};
use tokio::time::Duration;
use tracing::{debug, error, warn};

use crate::settings::SETTINGS;
use crate::state::{AuthState, SessionState, SESSION_COOKIE};
use crate::utils::{parse_set_cookie, truncate};
use crate::{CinemaError, Vendor};

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Browser-style Accept header for full page loads.
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Returns true if the HTML is the vendor login page (or a script bouncing to it).
/// Any single marker is enough.
pub fn is_login_page(html: &str) -> bool {
    if html.is_empty() {
        return false;
    }
    html.contains(r#"attr-page="login""#)
        || html.contains(r#"name="loginForm""#)
        || html.to_lowercase().contains("authentication failure")
        || html.contains("window.location.href = '/web/login.php'")
}

/// A fully buffered response. Redirects are never followed automatically.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    pub fn is_login_page(&self) -> bool {
        is_login_page(&self.body)
    }
}

/// One theater's HTTP client plus its cookie jar and authenticated flag.
pub struct CookieSession {
    theater: String,
    base_url: Url,
    client: Client,
    state: RwLock<SessionState>,
    auth_state_tx: watch::Sender<AuthState>,
}

impl CookieSession {
    pub fn new(theater: &str, base_url: &str) -> Result<Self, CinemaError> {
        let base_url = Url::parse(base_url)?;
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .pool_idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .timeout(SETTINGS.request_timeout)
            .connect_timeout(SETTINGS.request_timeout)
            .build()?;
        let (auth_state_tx, _) = watch::channel(AuthState::LoggedOut);

        debug!(theater = %theater, "Cookie session initialized for {}", base_url);
        Ok(Self {
            theater: theater.to_string(),
            base_url,
            client,
            state: RwLock::new(SessionState::new()),
            auth_state_tx,
        })
    }

    pub fn theater(&self) -> &str {
        &self.theater
    }

    /// Base URL without trailing slash, as used in Origin/Referer headers.
    pub fn origin(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Resolve a path (or absolute URL) against the base URL.
    pub fn url_for(&self, target: &str) -> Result<Url, CinemaError> {
        Ok(self.base_url.join(target)?)
    }

    /// Perform a single XHR-style HTTP call with the session cookies attached.
    ///
    /// Caller headers override the defaults. Every `Set-Cookie` on the response
    /// is captured. A 200 that renders the login page flips the authenticated
    /// flag off so the next call re-authenticates, but the response is still
    /// returned. Transport errors are propagated and leave auth state alone.
    pub async fn request(
        &self,
        method: Method,
        target: &str,
        body: Option<String>,
        headers: &[(&str, String)],
    ) -> Result<HttpResponse, CinemaError> {
        self.send(method, target, body, headers, true).await
    }

    /// Same as [`request`](Self::request) but sent as a plain browser
    /// navigation, without `X-Requested-With`. Used for login, logout and
    /// redirect follows.
    pub async fn navigate(
        &self,
        method: Method,
        target: &str,
        body: Option<String>,
        headers: &[(&str, String)],
    ) -> Result<HttpResponse, CinemaError> {
        self.send(method, target, body, headers, false).await
    }

    async fn send(
        &self,
        method: Method,
        target: &str,
        body: Option<String>,
        headers: &[(&str, String)],
        xhr: bool,
    ) -> Result<HttpResponse, CinemaError> {
        let url = self.url_for(target)?;
        let cookie_header = self.cookie_header().await;

        let mut merged: Vec<(&str, String)> = vec![("User-Agent", SETTINGS.user_agent.clone())];
        if xhr {
            merged.push(("X-Requested-With", "XMLHttpRequest".to_string()));
        }
        for &(name, ref value) in headers {
            merged.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            merged.push((name, value.clone()));
        }
        if body.is_some()
            && !merged
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("Content-Type"))
        {
            merged.push(("Content-Type", FORM_CONTENT_TYPE.to_string()));
        }

        let mut builder = self.client.request(method.clone(), url);
        for (name, value) in &merged {
            builder = builder.header(*name, value.as_str());
        }
        if !cookie_header.is_empty() {
            builder = builder.header(COOKIE, cookie_header);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        debug!(theater = %self.theater, "HTTP {} {}", method, target);
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(theater = %self.theater, error = %e, "Request failed [{} {}]", method, target);
                return Err(e.into());
            }
        };

        let status = response.status().as_u16();
        let response_headers = response.headers().clone();
        self.capture_cookies(&response_headers).await;
        let body = response.text().await?;

        if status == 200 && is_login_page(&body) && self.is_authenticated().await {
            warn!(theater = %self.theater, "Session invalidated: Login page detected in response");
            self.mark_logged_out().await;
        }

        Ok(HttpResponse {
            status,
            headers: response_headers,
            body,
        })
    }

    async fn capture_cookies(&self, headers: &HeaderMap) {
        let parsed: Vec<(String, String)> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();
        if parsed.is_empty() {
            return;
        }
        let mut state = self.state.write().await;
        for (name, value) in parsed {
            debug!(theater = %self.theater, "Cookie updated: {}={}", name, truncate(&value, 10));
            state.store_cookie(&name, &value);
        }
    }

    pub async fn cookie_header(&self) -> String {
        self.state.read().await.cookie_header()
    }

    pub async fn cookie(&self, name: &str) -> Option<String> {
        let state = self.state.read().await;
        state
            .cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    pub async fn set_cookie_if_absent(&self, name: &str, value: &str) {
        let mut state = self.state.write().await;
        if !state.has_cookie(name) {
            state.store_cookie(name, value);
        }
    }

    /// Current value of the primary (`PHPSESSID`) session cookie.
    pub async fn session_id(&self) -> Option<String> {
        self.state.read().await.session_id.clone()
    }

    pub async fn has_session_cookie(&self) -> bool {
        self.state.read().await.has_session_cookie()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated()
    }

    pub async fn detected_vendor(&self) -> Option<Vendor> {
        self.state.read().await.detected_vendor
    }

    pub(crate) async fn mark_authenticated(&self, vendor: Vendor) -> bool {
        let ok = self.state.write().await.mark_authenticated(vendor);
        if ok {
            self.set_auth_state(AuthState::Authenticated);
        } else {
            warn!(
                theater = %self.theater,
                "{} login looked successful but no {} cookie was issued", vendor, SESSION_COOKIE
            );
        }
        ok
    }

    pub(crate) async fn mark_logged_out(&self) {
        self.state.write().await.authenticated = false;
        self.set_auth_state(AuthState::LoggedOut);
    }

    /// Drop cookies, vendor detection and cached ids.
    pub(crate) async fn clear(&self) {
        self.state.write().await.clear();
        self.set_auth_state(AuthState::LoggedOut);
    }

    pub(crate) async fn soap_session_id(&self) -> Option<String> {
        self.state.read().await.soap_session_id.clone()
    }

    pub(crate) async fn set_soap_session_id(&self, id: Option<String>) {
        self.state.write().await.soap_session_id = id;
    }

    pub fn auth_state(&self) -> AuthState {
        *self.auth_state_tx.borrow()
    }

    pub fn subscribe_auth_state(&self) -> watch::Receiver<AuthState> {
        self.auth_state_tx.subscribe()
    }

    pub(crate) fn set_auth_state(&self, next: AuthState) {
        let _ = self.auth_state_tx.send_if_modified(|prev| {
            if *prev != next {
                *prev = next;
                true
            } else {
                false
            }
        });
    }
}
