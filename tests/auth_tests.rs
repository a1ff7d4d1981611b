mod common;

use cinema_link_rs::{is_login_page, AuthState, HealthOutcome, Vendor};
use common::*;
use reqwest::Method;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn test_login_page_markers() {
    assert!(is_login_page(r#"<body attr-page="login"><form></form></body>"#));
    assert!(is_login_page(r#"<form name="loginForm" method="post">"#));
    assert!(is_login_page("<p>Authentication Failure</p>"));
    assert!(is_login_page(
        "<script>window.location.href = '/web/login.php';</script>"
    ));
    assert!(!is_login_page("<html><body>Dashboard</body></html>"));
    assert!(!is_login_page(""));
}

#[tokio::test]
async fn test_ims_login_follows_redirect_and_stores_cookie() {
    let server = MockServer::start().await;
    mount_ims_login(&server).await;
    let client = client_for(&server);

    assert!(client.login().await);
    assert!(client.session().is_authenticated().await);
    assert_eq!(client.session().session_id().await.as_deref(), Some(IMS_SESSION));
    assert_eq!(client.session().detected_vendor().await, Some(Vendor::Ims3000));
    assert_eq!(client.auth_state(), AuthState::Authenticated);

    // the redirect target must have been fetched with the new cookie
    let requests = server.received_requests().await.unwrap();
    let follow_up = requests
        .iter()
        .find(|r| r.method.as_str() == "GET" && r.url.path() == "/web/index.php")
        .expect("redirect was not followed");
    let cookie = follow_up.headers.get("cookie").unwrap().to_str().unwrap();
    assert!(cookie.contains(&format!("PHPSESSID={}", IMS_SESSION)));
}

#[tokio::test]
async fn test_ims_login_form_fields() {
    let server = MockServer::start().await;
    mount_ims_login(&server).await;
    let client = client_for(&server);
    assert!(client.login().await);

    let requests = server.received_requests().await.unwrap();
    let login = requests
        .iter()
        .find(|r| r.method.as_str() == "POST" && r.url.path() == "/web/login.php")
        .unwrap();
    let body = String::from_utf8(login.body.clone()).unwrap();
    assert_eq!(body, "username=admin&password=secret&from=&screen=false");
}

#[tokio::test]
async fn test_dcp_fallback_when_ims_flow_fails() {
    let server = MockServer::start().await;
    // no IMS login endpoint: the POST gets a 404
    Mock::given(method("POST"))
        .and(path("/web/index.php"))
        .and(body_string_contains("screen=auto"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("Set-Cookie", format!("PHPSESSID={}; path=/", DCP_SESSION).as_str())
                .set_body_string("<html><div id=\"overview\">Overview</div></html>"),
        )
        .mount(&server)
        .await;
    let client = client_for(&server);

    assert!(client.login().await);
    assert_eq!(client.session().detected_vendor().await, Some(Vendor::Dcp2000));
    assert_eq!(client.session().session_id().await.as_deref(), Some(DCP_SESSION));
    assert_eq!(count_requests(&server, "POST", "/web/login.php").await, 1);
}

#[tokio::test]
async fn test_dcp_hint_is_tried_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/web/index.php"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/web/overview/")
                .append_header("Set-Cookie", format!("PHPSESSID={}", DCP_SESSION).as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/web/overview/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Overview</html>"))
        .mount(&server)
        .await;
    let client = dcp_client_for(&server);

    assert!(client.login().await);
    assert_eq!(client.session().detected_vendor().await, Some(Vendor::Dcp2000));
    assert_eq!(count_requests(&server, "POST", "/web/login.php").await, 0);
    assert_eq!(count_requests(&server, "GET", "/web/overview/").await, 1);
}

#[tokio::test]
async fn test_login_rejected_by_both_vendors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/web/login.php"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/web/login.php?error=1")
                .append_header("Set-Cookie", "PHPSESSID=rejected; path=/"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/web/index.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<form name="loginForm"></form>"#))
        .mount(&server)
        .await;
    let client = client_for(&server);

    assert!(!client.login().await);
    assert!(!client.session().is_authenticated().await);
    assert_eq!(client.session().cookie_header().await, "");
    assert_eq!(client.auth_state(), AuthState::LoggedOut);
    assert!(!client.is_health_monitor_running().await);
}

#[tokio::test]
async fn test_session_cookie_required_for_authentication() {
    let server = MockServer::start().await;
    // IMS redirect without any cookie, DCP endpoint missing
    Mock::given(method("POST"))
        .and(path("/web/login.php"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/web/index.php"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/web/index.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Dashboard</html>"))
        .mount(&server)
        .await;
    let client = client_for(&server);

    assert!(!client.login().await);
    assert!(!client.session().is_authenticated().await);
}

#[tokio::test]
async fn test_ensure_logged_in_is_idempotent() {
    let server = MockServer::start().await;
    mount_ims_login(&server).await;
    let client = client_for(&server);

    assert!(client.ensure_logged_in().await);
    assert!(client.ensure_logged_in().await);
    assert_eq!(count_requests(&server, "POST", "/web/login.php").await, 1);
    assert!(client.is_health_monitor_running().await);
}

#[tokio::test]
async fn test_concurrent_ensure_logged_in_shares_one_login() {
    let server = MockServer::start().await;
    mount_ims_login(&server).await;
    let client = client_for(&server);

    let (a, b, c) = tokio::join!(
        client.ensure_logged_in(),
        client.ensure_logged_in(),
        client.ensure_logged_in()
    );
    assert!(a && b && c);
    assert_eq!(count_requests(&server, "POST", "/web/login.php").await, 1);
}

#[tokio::test]
async fn test_logout_clears_state_and_hits_vendor_path() {
    let server = MockServer::start().await;
    mount_ims_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/web/logout/"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/web/login.php"))
        .mount(&server)
        .await;
    let client = client_for(&server);
    assert!(client.login().await);

    client.logout().await;
    assert_eq!(count_requests(&server, "GET", "/web/logout/").await, 1);
    assert!(!client.session().is_authenticated().await);
    assert_eq!(client.session().session_id().await, None);
    assert_eq!(client.auth_state(), AuthState::LoggedOut);
    assert!(!client.is_health_monitor_running().await);
}

#[tokio::test]
async fn test_navigations_omit_xhr_header() {
    let server = MockServer::start().await;
    mount_ims_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/web/logout/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/web/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let client = client_for(&server);
    assert!(client.login().await);
    client
        .session()
        .request(Method::GET, "/web/ping", None, &[])
        .await
        .unwrap();
    client.logout().await;

    let requests = server.received_requests().await.unwrap();
    let xhr = |request_path: &str| {
        requests
            .iter()
            .filter(|r| r.url.path() == request_path)
            .map(|r| r.headers.get("x-requested-with").is_some())
            .collect::<Vec<_>>()
    };
    // login POST and the redirect follow to the index page
    assert_eq!(xhr("/web/login.php"), vec![false]);
    assert_eq!(xhr("/web/index.php"), vec![false]);
    assert_eq!(xhr("/web/logout/"), vec![false]);
    assert_eq!(xhr("/web/ping"), vec![true]);
}

#[tokio::test]
async fn test_logout_clears_state_even_when_server_errors() {
    let server = MockServer::start().await;
    mount_ims_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/web/logout/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let client = client_for(&server);
    assert!(client.login().await);

    client.logout().await;
    assert_eq!(client.session().cookie_header().await, "");
    assert!(!client.session().is_authenticated().await);
}

#[tokio::test]
async fn test_relogin_logs_out_previous_session_first() {
    let server = MockServer::start().await;
    mount_ims_login(&server).await;
    let client = client_for(&server);

    assert!(client.login().await);
    assert!(client.login().await);
    assert_eq!(count_requests(&server, "GET", "/web/logout/").await, 1);
    assert_eq!(count_requests(&server, "POST", "/web/login.php").await, 2);
}

#[tokio::test]
async fn test_soft_invalidation_flips_auth_but_returns_response() {
    let server = MockServer::start().await;
    mount_ims_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/web/overview.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<body attr-page="login"></body>"#))
        .mount(&server)
        .await;
    let client = client_for(&server);
    assert!(client.login().await);

    let res = client
        .session()
        .request(Method::GET, "/web/overview.php", None, &[])
        .await
        .unwrap();
    assert_eq!(res.status, 200);
    assert!(res.is_login_page());
    assert!(!client.session().is_authenticated().await);
    assert_eq!(client.auth_state(), AuthState::LoggedOut);

    // the next gated call logs in again
    assert!(client.ensure_logged_in().await);
    assert_eq!(count_requests(&server, "POST", "/web/login.php").await, 2);
}

#[tokio::test]
async fn test_set_cookie_updates_jar_on_any_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/web/ping"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("Set-Cookie", "PHPSESSID=first; path=/; HttpOnly")
                .append_header("Set-Cookie", "lang=fr"),
        )
        .mount(&server)
        .await;
    let client = client_for(&server);

    client
        .session()
        .request(Method::GET, "/web/ping", None, &[])
        .await
        .unwrap();
    assert_eq!(client.session().session_id().await.as_deref(), Some("first"));
    assert_eq!(client.session().cookie("lang").await.as_deref(), Some("fr"));
    assert_eq!(client.session().cookie_header().await, "PHPSESSID=first; lang=fr");
    // a cookie alone is not a login
    assert!(!client.session().is_authenticated().await);
}

#[tokio::test]
async fn test_transport_error_does_not_touch_auth_state() {
    let server = MockServer::start().await;
    mount_ims_login(&server).await;
    let client = client_for(&server);
    assert!(client.login().await);

    let err = client
        .session()
        .request(Method::GET, "http://127.0.0.1:1/web/index.php", None, &[])
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert!(client.session().is_authenticated().await);
}

#[tokio::test]
async fn test_health_check_skipped_when_logged_out() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    assert_eq!(client.perform_health_check().await, HealthOutcome::Skipped);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_health_check_healthy() {
    let server = MockServer::start().await;
    mount_ims_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/dc/dcp/json/v1/SystemOverview"))
        .and(body_string_contains("<v1:GetSystemStatus>"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "GetSystemStatusResponse": { "status": "OK" } })),
        )
        .mount(&server)
        .await;
    let client = client_for(&server);
    assert!(client.login().await);

    assert_eq!(client.perform_health_check().await, HealthOutcome::Healthy);
    assert_eq!(count_requests(&server, "POST", "/web/login.php").await, 1);
}

#[tokio::test]
async fn test_health_check_failure_triggers_relogin() {
    let server = MockServer::start().await;
    mount_ims_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/dc/dcp/json/v1/SystemOverview"))
        .respond_with(ResponseTemplate::new(500).set_body_json(soap_fault_json("not authenticated")))
        .mount(&server)
        .await;
    let client = client_for(&server);
    assert!(client.login().await);

    assert_eq!(client.perform_health_check().await, HealthOutcome::Recovered);
    assert_eq!(count_requests(&server, "POST", "/web/login.php").await, 2);
    assert!(client.session().is_authenticated().await);
}

#[tokio::test]
async fn test_health_monitor_polls_and_stops() {
    let server = MockServer::start().await;
    mount_ims_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/dc/dcp/json/v1/SystemOverview"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "GetSystemStatusResponse": {} })),
        )
        .mount(&server)
        .await;
    let client = client_for(&server).with_health_interval(std::time::Duration::from_millis(50));
    assert!(client.login().await);
    assert!(client.is_health_monitor_running().await);

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    client.destroy().await;
    assert!(!client.is_health_monitor_running().await);

    let probes = count_requests(&server, "POST", "/dc/dcp/json/v1/SystemOverview").await;
    assert!(probes >= 2, "expected several probes, got {}", probes);
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(
        count_requests(&server, "POST", "/dc/dcp/json/v1/SystemOverview").await,
        probes
    );
}

#[tokio::test]
async fn test_auth_state_receiver_observes_login() {
    let server = MockServer::start().await;
    mount_ims_login(&server).await;
    let client = client_for(&server);
    let mut rx = client.auth_state_receiver();
    assert_eq!(*rx.borrow(), AuthState::LoggedOut);

    assert!(client.login().await);
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), AuthState::Authenticated);
}

#[tokio::test]
async fn test_check_connection_falls_back_to_index() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/web/index.php"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/web/login.php"))
        .mount(&server)
        .await;
    let client = client_for(&server);
    assert!(client.check_connection().await);

    let unreachable = cinema_link_rs::TheaterClient::new(cinema_link_rs::TheaterConfig::new(
        "Offline",
        "http://127.0.0.1:1",
        "admin",
        "secret",
    ))
    .unwrap();
    assert!(!unreachable.check_connection().await);
}
