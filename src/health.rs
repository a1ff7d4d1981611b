use futures::FutureExt;
use reqwest::Method;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::auth::AuthEngine;
use crate::session::CookieSession;
use crate::soap::{self, SoapOperation, SoapReply};
use crate::CinemaError;

/// What a single health-check tick concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    /// Not authenticated, nothing to check.
    Skipped,
    Healthy,
    /// Probe failed and the re-login succeeded.
    Recovered,
    /// Probe failed and so did the re-login.
    Failed,
}

/// Lightweight `GetSystemStatus` call, sent straight through the cookie session
/// so it never recurses into the login gate.
pub async fn probe_system_status(session: &CookieSession) -> Result<bool, CinemaError> {
    if !session.has_session_cookie().await {
        return Ok(false);
    }
    let body = soap::build_envelope(
        SoapOperation::GetSystemStatus,
        &soap::generate_correlation_id(),
    );
    let res = session
        .request(
            Method::POST,
            soap::SYSTEM_OVERVIEW_PATH,
            Some(body),
            &[
                ("Content-Type", "text/xml".to_string()),
                ("Accept", "*/*".to_string()),
            ],
        )
        .await?;

    match soap::decode_reply(SoapOperation::GetSystemStatus, res.status, &res.body) {
        SoapReply::Payload(_) => Ok(true),
        other => {
            debug!(
                theater = %session.theater(),
                "System status check returned {} (likely session invalid): {:?}",
                res.status,
                other
            );
            Ok(false)
        }
    }
}

pub(crate) async fn run_health_check(session: &CookieSession, auth: &AuthEngine) -> HealthOutcome {
    if !session.is_authenticated().await {
        return HealthOutcome::Skipped;
    }

    let alive = match probe_system_status(session).await {
        Ok(alive) => alive,
        Err(e) => {
            warn!(theater = %session.theater(), error = %e, "System status check error");
            false
        }
    };
    if alive {
        return HealthOutcome::Healthy;
    }

    warn!(theater = %session.theater(), "Health check failed (Session lost). Attempting auto-reconnect...");
    session.mark_logged_out().await;
    if auth.login().await {
        HealthOutcome::Recovered
    } else {
        HealthOutcome::Failed
    }
}

/// Periodic keep-alive task for one theater.
pub(crate) struct HealthMonitor {
    stop_signal: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub(crate) fn new() -> Self {
        Self {
            stop_signal: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
            task: Mutex::new(None),
        }
    }

    pub(crate) async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Start polling. Does nothing if the task is already running.
    pub(crate) async fn start(
        &self,
        session: Arc<CookieSession>,
        auth: Arc<AuthEngine>,
        interval: Duration,
    ) {
        let mut task_guard = self.task.lock().await;
        if task_guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        self.stop_signal.store(false, Ordering::SeqCst);
        // drop any stale permit left by a previous stop()
        while self.shutdown_notify.notified().now_or_never().is_some() {}

        let stop_signal = self.stop_signal.clone();
        let shutdown_notify = self.shutdown_notify.clone();
        let span = info_span!("health_monitor", theater = %session.theater());

        let handle = tokio::spawn(
            async move {
                info!("Starting keep-alive polling every {:?}", interval);
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_notify.notified() => break,
                        _ = sleep(interval) => {}
                    }
                    if stop_signal.load(Ordering::Relaxed) {
                        break;
                    }
                    let outcome = run_health_check(&session, &auth).await;
                    debug!(?outcome, "Health check tick");
                }
                info!("Keep-alive polling stopped");
            }
            .instrument(span),
        );
        *task_guard = Some(handle);
    }

    /// Stop polling and wait for the task to exit.
    pub(crate) async fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_one();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Health monitor task ended abnormally");
            }
        }
    }

    /// Non-blocking stop request, for use from `Drop`.
    pub(crate) fn signal_stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_one();
    }
}
