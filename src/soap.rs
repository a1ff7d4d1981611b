// SOAP-over-HTTP with JSON replies, as spoken by the playback servers.

use serde_json::Value;
use uuid::Uuid;

pub const SOAP_NAMESPACE: &str = "http://www.doremilabs.com/dc/dcp/json/v1_0";
pub const SHOW_CONTROL_PATH: &str = "/dc/dcp/json/v1/ShowControl";
pub const SYSTEM_OVERVIEW_PATH: &str = "/dc/dcp/json/v1/SystemOverview";

/// Fault string returned when the SOAP session id is stale. Matched verbatim.
pub const NOT_AUTHENTICATED_FAULT: &str = "not authenticated";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoapOperation {
    GetShowStatus,
    GetSystemStatus,
}

impl SoapOperation {
    pub fn name(self) -> &'static str {
        match self {
            SoapOperation::GetShowStatus => "GetShowStatus",
            SoapOperation::GetSystemStatus => "GetSystemStatus",
        }
    }

    pub fn response_key(self) -> &'static str {
        match self {
            SoapOperation::GetShowStatus => "GetShowStatusResponse",
            SoapOperation::GetSystemStatus => "GetSystemStatusResponse",
        }
    }
}

/// Build the fixed request envelope around one `<sessionId>`.
pub fn build_envelope(operation: SoapOperation, session_id: &str) -> String {
    format!(
        concat!(
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:v1="{ns}">"#,
            "<soapenv:Header/><soapenv:Body>",
            "<v1:{op}><sessionId>{sid}</sessionId></v1:{op}>",
            "</soapenv:Body></soapenv:Envelope>"
        ),
        ns = SOAP_NAMESPACE,
        op = operation.name(),
        sid = session_id,
    )
}

/// Fresh 8-4-4-4-12 correlation id.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Decoded shape of a SOAP reply body.
#[derive(Debug, Clone, PartialEq)]
pub enum SoapReply {
    /// The operation's payload object (`<Op>Response`).
    Payload(Value),
    Fault(String),
    Malformed,
}

/// Classify a reply body. Only a 200 with the expected response key is a payload;
/// a `Fault` object is recognised whatever the status.
pub fn decode_reply(operation: SoapOperation, status: u16, body: &str) -> SoapReply {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return SoapReply::Malformed;
    };
    if status == 200 {
        if let Some(payload) = json.get(operation.response_key()) {
            return SoapReply::Payload(payload.clone());
        }
    }
    match json.get("Fault") {
        Some(fault) => {
            let message = fault
                .get("faultstring")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            SoapReply::Fault(message)
        }
        None => SoapReply::Malformed,
    }
}
