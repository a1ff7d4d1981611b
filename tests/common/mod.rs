#![allow(dead_code)]

use cinema_link_rs::{TheaterClient, TheaterConfig, Vendor};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const IMS_SESSION: &str = "sess-ims-123";
pub const DCP_SESSION: &str = "sess-dcp-456";
pub const SOAP_UUID: &str = "1b4e28ba-2fa1-11d2-883f-0016d3cca427";

pub fn client_for(server: &MockServer) -> TheaterClient {
    TheaterClient::new(TheaterConfig::new("Salle 1", &server.uri(), "admin", "secret")).unwrap()
}

pub fn dcp_client_for(server: &MockServer) -> TheaterClient {
    TheaterClient::new(
        TheaterConfig::new("Salle 2", &server.uri(), "admin", "secret")
            .with_vendor_hint(Vendor::Dcp2000),
    )
    .unwrap()
}

/// IMS3000 login: 302 to the index page, session cookie on the POST, dashboard on the follow-up.
pub async fn mount_ims_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/web/login.php"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/web/index.php")
                .append_header("Set-Cookie", format!("PHPSESSID={}; path=/", IMS_SESSION).as_str()),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/web/index.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Dashboard</body></html>"))
        .mount(server)
        .await;
}

pub async fn mount_playback_page(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/web/index.php"))
        .and(query_param("page", "sys_control/cinelister/playback.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .with_priority(1)
        .mount(server)
        .await;
}

pub fn playback_page_html() -> String {
    format!(
        "<html><script>var soapSession = '{}';</script><div id=\"player\"></div></html>",
        SOAP_UUID
    )
}

pub fn show_status_json(title: &str, position: &str, state: &str) -> Value {
    json!({
        "GetShowStatusResponse": {
            "showStatus": {
                "splTitle": title,
                "cplTitle": "MOVIE_FTR_2K",
                "splPosition": position,
                "splDuration": 7200,
                "elementPosition": 12.4,
                "stateInfo": state,
                "splId": "urn:uuid:spl-1"
            }
        }
    })
}

pub fn soap_fault_json(message: &str) -> Value {
    json!({ "Fault": { "faultcode": "soap:Server", "faultstring": message } })
}

pub async fn count_requests(server: &MockServer, http_method: &str, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path() == request_path)
        .count()
}

pub async fn count_requests_with_query(
    server: &MockServer,
    http_method: &str,
    request_path: &str,
    query_fragment: &str,
) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| {
            r.method.as_str() == http_method
                && r.url.path() == request_path
                && r.url.query().unwrap_or_default().contains(query_fragment)
        })
        .count()
}
