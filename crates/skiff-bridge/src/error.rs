// SPDX-License-Identifier: MIT
//
// Bridge call failure taxonomy.
//
// The wire codes are part of the UI contract: scripts on the other side of
// the webview switch on them, so they are stable strings rather than enum
// discriminants.

use serde_json::Value;
use thiserror::Error;

/// Outcome of a single bridge function invocation.
pub type BridgeResult = std::result::Result<Value, BridgeError>;

/// Errors surfaced to the UI as a structured JSON payload.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no registered function named '{0}'")]
    FunctionNotFound(String),

    #[error("parameter payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The capability needs a runtime permission the user has not granted
    /// yet. The permission identifier rides along as the payload data so the
    /// UI can start the grant flow.
    #[error("permission required: {permission}")]
    PermissionRequired { permission: String },

    #[error("{0}")]
    Unknown(String),
}

impl BridgeError {
    /// Stable wire code for this error.
    pub fn wire_code(&self) -> &'static str {
        match self {
            BridgeError::FunctionNotFound(_) => "FUNCTION_NOT_FOUND",
            BridgeError::InvalidJson(_) => "INVALID_JSON",
            BridgeError::InvalidParameters(_) => "INVALID_PARAMETERS",
            BridgeError::ExecutionFailed(_) => "EXECUTION_FAILED",
            BridgeError::PermissionDenied(_) => "PERMISSION_DENIED",
            BridgeError::PermissionRequired { .. } => "PERMISSION_REQUIRED",
            BridgeError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Extra machine-readable context, null for most variants.
    pub fn wire_data(&self) -> Value {
        match self {
            BridgeError::PermissionRequired { permission } => Value::String(permission.clone()),
            _ => Value::Null,
        }
    }

    /// Serialize to the `{status, code, message, data}` envelope the UI
    /// expects for failed calls.
    pub fn to_payload(&self) -> String {
        let envelope = serde_json::json!({
            "status": "error",
            "code": self.wire_code(),
            "message": self.to_string(),
            "data": self.wire_data(),
        });
        envelope.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_code_and_message() {
        let err = BridgeError::ExecutionFailed("keychain locked".into());
        let payload: Value = serde_json::from_str(&err.to_payload()).unwrap();
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["code"], "EXECUTION_FAILED");
        assert_eq!(payload["message"], "execution failed: keychain locked");
        assert!(payload["data"].is_null());
    }

    #[test]
    fn permission_required_carries_permission_as_data() {
        let err = BridgeError::PermissionRequired {
            permission: "camera".into(),
        };
        let payload: Value = serde_json::from_str(&err.to_payload()).unwrap();
        assert_eq!(payload["code"], "PERMISSION_REQUIRED");
        assert_eq!(payload["data"], "camera");
    }
}
