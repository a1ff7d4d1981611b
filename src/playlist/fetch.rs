use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Method;
use tracing::debug;

use crate::session::{CookieSession, ACCEPT_HTML};
use crate::CinemaError;

/// Editor pages, used both to prime the server-side context and as Referers.
pub const EDITOR_PATHS: [&str; 2] = [
    "/web/index.php?page=sys_control/cinelister/editor.php",
    "/web/sys_control/cinelister/editor.php",
];

pub const AJAX_PATHS: [&str; 2] = [
    "/web/sys_control/cinelister/ajax.php",
    "/web/index.php?page=sys_control/cinelister/ajax.php",
];

pub const LOAD_PAYLOADS: [&str; 3] = [
    "request=LOAD_SPL_ITEMS&style=editor",
    "request=LOAD_SPL_ITEMS&style=editor&full=1",
    "request=LOAD_SPL_ITEMS",
];

const AJAX_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

lazy_static! {
    static ref CPLNAME_INPUT_RE: Regex = Regex::new(r#"(?i)name\s*=\s*["']cplname["']"#).unwrap();
    static ref CPL_ELEMENT_RE: Regex = Regex::new(r#"(?i)\belement\b[^"]*\bcpl\b"#).unwrap();
    static ref EVENT_DIV_RE: Regex = Regex::new(r"(?i)\beventDiv\b").unwrap();
}

/// Rank a candidate editor response. Higher means more playlist markup.
pub fn score_editor_html(html: &str) -> u64 {
    if html.is_empty() {
        return 0;
    }
    let size_score = ((html.len() / 1000) as u64).min(50);
    let cpl_inputs = CPLNAME_INPUT_RE.find_iter(html).count() as u64;
    let cpl_elements = CPL_ELEMENT_RE.find_iter(html).count() as u64;
    let event_divs = EVENT_DIV_RE.find_iter(html).count() as u64;
    size_score + cpl_inputs * 10 + cpl_elements * 5 + event_divs
}

/// Load both editor pages so the ajax endpoint has a context, and pin the
/// `interfaceSize` cookie the editor expects.
pub(crate) async fn prime_editor(session: &CookieSession) {
    for path in EDITOR_PATHS {
        if let Err(e) = session
            .request(Method::GET, path, None, &[("Accept", ACCEPT_HTML.to_string())])
            .await
        {
            debug!(theater = %session.theater(), error = %e, "Editor prime {} failed", path);
        }
    }
    session.set_cookie_if_absent("interfaceSize", "auto").await;
}

/// Try every endpoint/referer/payload combination and keep the best-scoring body.
/// Errors only when not a single request produced a response.
pub(crate) async fn fetch_best_editor_html(session: &CookieSession) -> Result<String, CinemaError> {
    let theater = session.theater();
    let origin = session.origin().to_string();
    let mut best: Option<(u64, String)> = None;

    for path in AJAX_PATHS {
        for referer_path in EDITOR_PATHS {
            let referer = format!("{}{}", origin, referer_path);
            for payload in LOAD_PAYLOADS {
                let res = session
                    .request(
                        Method::POST,
                        path,
                        Some(payload.to_string()),
                        &[
                            ("Content-Type", AJAX_CONTENT_TYPE.to_string()),
                            ("Referer", referer.clone()),
                            ("Origin", origin.clone()),
                        ],
                    )
                    .await;
                match res {
                    Ok(res) => {
                        let score = score_editor_html(&res.body);
                        debug!(theater = %theater, "Editor candidate {} [{}] scored {}", path, payload, score);
                        if best.as_ref().map_or(true, |(top, _)| score > *top) {
                            best = Some((score, res.body));
                        }
                    }
                    Err(e) => {
                        debug!(theater = %theater, error = %e, "Editor candidate {} [{}] failed", path, payload);
                    }
                }
            }
        }
    }

    best.map(|(_, html)| html).ok_or(CinemaError::PlaylistUnavailable)
}
