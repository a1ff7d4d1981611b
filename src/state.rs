use crate::Vendor;

/// Cookie carrying the server-side session identity.
pub const SESSION_COOKIE: &str = "PHPSESSID";

/// Observable authentication phase of one theater session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    Authenticating,
    Authenticated,
}

/// Mutable per-theater session data. Only touched under the session lock,
/// never across network I/O.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionState {
    // insertion-ordered, like a browser jar
    pub(crate) cookies: Vec<(String, String)>,
    pub(crate) session_id: Option<String>,
    pub(crate) authenticated: bool,
    pub(crate) detected_vendor: Option<Vendor>,
    pub(crate) soap_session_id: Option<String>,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn store_cookie(&mut self, name: &str, value: &str) {
        match self.cookies.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.cookies.push((name.to_string(), value.to_string())),
        }
        if name == SESSION_COOKIE {
            self.session_id = Some(value.to_string());
        }
    }

    pub(crate) fn has_cookie(&self, name: &str) -> bool {
        self.cookies.iter().any(|(k, _)| k == name)
    }

    pub(crate) fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub(crate) fn has_session_cookie(&self) -> bool {
        self.session_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Authenticated only counts while a session cookie is held.
    pub(crate) fn is_authenticated(&self) -> bool {
        self.authenticated && self.has_session_cookie()
    }

    /// Returns false (and stays logged out) when no session cookie was issued.
    pub(crate) fn mark_authenticated(&mut self, vendor: Vendor) -> bool {
        if !self.has_session_cookie() {
            return false;
        }
        self.authenticated = true;
        self.detected_vendor = Some(vendor);
        true
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::new();
    }
}
