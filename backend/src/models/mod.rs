//! Data models shared across database access and API handlers.

use serde::{Deserialize, Serialize};

pub mod dispense;
pub mod dispense_session;
pub mod patient;
pub mod prescription;

/// How a patient identified themselves: a scanned QR code or a national
/// id card (cedula) read by the capture client. The same value doubles as
/// the lookup key kind when resolving the patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Qr,
    Cedula,
}

impl AuthMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "qr" => Some(AuthMethod::Qr),
            "cedula" => Some(AuthMethod::Cedula),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::Qr => write!(f, "qr"),
            AuthMethod::Cedula => write!(f, "cedula"),
        }
    }
}

/// Request metadata captured for the audit trail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub notes: Option<String>,
}

impl RequestMeta {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let header_str = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        Self {
            ip_address: header_str("x-forwarded-for")
                .map(|v| v.split(',').next().unwrap_or(&v).trim().to_string()),
            user_agent: header_str("user-agent"),
            notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn auth_method_serde_lowercase() {
        let m: AuthMethod = serde_json::from_str("\"cedula\"").unwrap();
        assert_eq!(m, AuthMethod::Cedula);
        assert_eq!(serde_json::to_value(AuthMethod::Qr).unwrap(), "qr");
    }

    #[test]
    fn auth_method_parse_rejects_unknown() {
        assert_eq!(AuthMethod::parse("qr"), Some(AuthMethod::Qr));
        assert_eq!(AuthMethod::parse("fingerprint"), None);
    }

    #[test]
    fn request_meta_takes_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1, 10.0.0.2".parse().unwrap());
        headers.insert("user-agent", "esp32-dispenser/1.2".parse().unwrap());
        let meta = RequestMeta::from_headers(&headers);
        assert_eq!(meta.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(meta.user_agent.as_deref(), Some("esp32-dispenser/1.2"));
    }
}
