use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::AuthEngine;
use crate::playlist::parse_sec_value;
use crate::session::{CookieSession, ACCEPT_HTML};
use crate::soap::{self, SoapOperation, SoapReply, NOT_AUTHENTICATED_FAULT};
use crate::utils::extract_uuid;
use crate::{CinemaError, Vendor};

// one retry after a stale SOAP session id, never more
const MAX_STATUS_ATTEMPTS: usize = 2;

/// Playback state as reported in `stateInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Play,
    Pause,
    Stop,
    Other(String),
}

impl PlaybackState {
    pub fn from_state_info(raw: &str) -> Self {
        match raw.trim() {
            "Play" => PlaybackState::Play,
            "Pause" => PlaybackState::Pause,
            "Stop" | "Stopped" => PlaybackState::Stop,
            other => PlaybackState::Other(other.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackState::Play | PlaybackState::Pause)
    }
}

/// Next scheduled show, attached when nothing is playing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextShow {
    pub title: String,
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: chrono::DateTime<chrono::Utc>,
}

fn de_opt_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_sec_value))
}

/// `GetShowStatusResponse.showStatus`, with times normalised to seconds.
/// Fields we don't model are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowStatus {
    #[serde(default)]
    pub spl_title: Option<String>,
    #[serde(default)]
    pub cpl_title: Option<String>,
    #[serde(default, deserialize_with = "de_opt_seconds")]
    pub spl_position: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_seconds")]
    pub spl_duration: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_seconds")]
    pub element_position: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_seconds")]
    pub element_duration: Option<u64>,
    #[serde(default)]
    pub state_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_show: Option<NextShow>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ShowStatus {
    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_state_info(self.state_info.as_deref().unwrap_or_default())
    }

    /// Show title, if the server reported a non-empty one.
    pub fn title(&self) -> Option<&str> {
        self.spl_title.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Fetches `GetShowStatus` through the authenticated session.
pub(crate) struct DeviceStatusClient {
    session: Arc<CookieSession>,
    auth: Arc<AuthEngine>,
    vendor_hint: Option<Vendor>,
}

impl DeviceStatusClient {
    pub(crate) fn new(
        session: Arc<CookieSession>,
        auth: Arc<AuthEngine>,
        vendor_hint: Option<Vendor>,
    ) -> Self {
        Self {
            session,
            auth,
            vendor_hint,
        }
    }

    async fn vendor(&self) -> Vendor {
        self.session
            .detected_vendor()
            .await
            .or(self.vendor_hint)
            .unwrap_or(Vendor::Ims3000)
    }

    /// GET the playback page and pull the UUID embedded in its markup.
    pub(crate) async fn extract_soap_session_id(&self) -> Result<String, CinemaError> {
        let page = self.vendor().await.profile().playback_page_path;
        let res = self
            .session
            .request(Method::GET, page, None, &[("Accept", ACCEPT_HTML.to_string())])
            .await?;
        extract_uuid(&res.body).ok_or(CinemaError::MissingSoapSessionId)
    }

    async fn request_show_status(&self, soap_session_id: &str) -> Result<SoapReply, CinemaError> {
        let origin = self.session.origin().to_string();
        let referer = format!("{}{}", origin, self.vendor().await.profile().playback_page_path);
        let body = soap::build_envelope(SoapOperation::GetShowStatus, soap_session_id);
        let res = self
            .session
            .request(
                Method::POST,
                soap::SHOW_CONTROL_PATH,
                Some(body),
                &[
                    ("Content-Type", "text/xml".to_string()),
                    ("Accept", "*/*".to_string()),
                    ("Accept-Language", "en-US,en;q=0.9,fr;q=0.8".to_string()),
                    ("Origin", origin),
                    ("Referer", referer),
                ],
            )
            .await?;
        Ok(soap::decode_reply(SoapOperation::GetShowStatus, res.status, &res.body))
    }

    pub(crate) async fn show_status(&self) -> Result<ShowStatus, CinemaError> {
        let theater = self.session.theater();
        let mut attempt = 0;
        loop {
            attempt += 1;
            if !self.auth.ensure_logged_in().await {
                return Err(CinemaError::AuthRejected);
            }

            let soap_session_id = match self.session.soap_session_id().await {
                Some(id) => id,
                None => {
                    let id = self.extract_soap_session_id().await?;
                    debug!(theater = %theater, "Extracted SOAP session id {}", id);
                    self.session.set_soap_session_id(Some(id.clone())).await;
                    id
                }
            };

            match self.request_show_status(&soap_session_id).await? {
                SoapReply::Payload(payload) => {
                    let status = payload.get("showStatus").cloned().ok_or_else(|| {
                        CinemaError::UnexpectedResponse("missing showStatus".to_string())
                    })?;
                    return Ok(serde_json::from_value(status)?);
                }
                SoapReply::Fault(message) => {
                    let cached = self.session.soap_session_id().await.is_some();
                    if message == NOT_AUTHENTICATED_FAULT && cached && attempt < MAX_STATUS_ATTEMPTS {
                        info!(theater = %theater, "SOAP session id rejected, extracting a fresh one");
                        self.session.set_soap_session_id(None).await;
                        continue;
                    }
                    warn!(theater = %theater, "SOAP Fault: {}", message);
                    return Err(CinemaError::SoapFault(message));
                }
                SoapReply::Malformed => {
                    return Err(CinemaError::UnexpectedResponse(
                        "show status reply is neither a status nor a fault".to_string(),
                    ));
                }
            }
        }
    }
}
