use serde::{Deserialize, Serialize};

use crate::errors::ErrorKind;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    /// Human-readable reason, shown verbatim by the console.
    pub message: String,
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiErrorResponse {
    pub fn new(code: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            message: message.clone(),
            error: ApiErrorDetail {
                code: code.into(),
                kind,
                message,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<HealthCheck>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthResponse {
    pub fn healthy(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            service: service.into(),
            version: version.into(),
            checks: None,
        }
    }

    pub fn with_checks(mut self, checks: Vec<HealthCheck>) -> Self {
        self.status = if checks.iter().any(|c| c.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };
        self.checks = Some(checks);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_omits_missing_message() {
        let value = serde_json::to_value(ApiResponse::ok(3)).unwrap();
        assert_eq!(value, serde_json::json!({ "success": true, "data": 3 }));
    }

    #[test]
    fn ok_with_message_carries_it() {
        let value = serde_json::to_value(ApiResponse::ok_with_message((), "post submitted for review")).unwrap();
        assert_eq!(value["message"], "post submitted for review");
    }

    #[test]
    fn health_fails_with_failing_check() {
        let health = HealthResponse::healthy("svc", "0.1.0").with_checks(vec![HealthCheck {
            name: "storage".into(),
            status: HealthStatus::Unhealthy,
            message: Some("connection refused".into()),
        }]);
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }
}
