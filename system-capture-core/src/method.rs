//! JSON method-call adapter for hosts that speak a name + argument-map
//! protocol (`isSupported`, `requestPermissions`, `startCapture`,
//! `stopCapture`).

use serde::Deserialize;
use serde_json::Value;

use crate::models::config::CaptureConfiguration;
use crate::plugin::SystemCapture;
use crate::traits::capture_backend::CaptureBackend;

#[derive(Debug, Clone, PartialEq)]
pub enum MethodCall {
    IsSupported,
    RequestPermissions,
    StartCapture(Option<CaptureConfiguration>),
    StopCapture,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MethodResult {
    Success(Value),
    Error { code: String, message: String },
    NotImplemented,
}

#[derive(Deserialize)]
struct RawCall {
    method: String,
    #[serde(default)]
    arguments: Value,
}

impl MethodCall {
    /// Parse `{"method": "...", "arguments": {...}}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: RawCall = serde_json::from_str(json)?;
        Self::from_parts(&raw.method, raw.arguments)
    }

    /// Build a call from a method name and its argument value. A non-object
    /// argument to `startCapture` means "use the defaults".
    pub fn from_parts(method: &str, arguments: Value) -> Result<Self, serde_json::Error> {
        Ok(match method {
            "isSupported" => Self::IsSupported,
            "requestPermissions" => Self::RequestPermissions,
            "startCapture" => match arguments {
                Value::Object(_) => Self::StartCapture(Some(serde_json::from_value(arguments)?)),
                _ => Self::StartCapture(None),
            },
            "stopCapture" => Self::StopCapture,
            other => Self::Unknown(other.to_string()),
        })
    }
}

/// Run `call` against `capture` and produce the host-facing result.
pub fn handle<B: CaptureBackend>(capture: &SystemCapture<B>, call: MethodCall) -> MethodResult {
    match call {
        MethodCall::IsSupported => MethodResult::Success(Value::Bool(capture.is_supported())),
        MethodCall::RequestPermissions => MethodResult::Success(Value::Bool(capture.request_permission())),
        MethodCall::StartCapture(config) => MethodResult::Success(Value::Bool(capture.start_capture(config))),
        MethodCall::StopCapture => MethodResult::Success(Value::Bool(capture.stop_capture())),
        MethodCall::Unknown(name) => {
            log::debug!("Method not implemented: {}", name);
            MethodResult::NotImplemented
        }
    }
}

/// Parse and run a raw JSON call. Malformed input becomes an error result.
pub fn handle_json<B: CaptureBackend>(capture: &SystemCapture<B>, json: &str) -> MethodResult {
    match MethodCall::from_json(json) {
        Ok(call) => handle(capture, call),
        Err(error) => MethodResult::Error {
            code: "INVALID_ARGUMENTS".into(),
            message: error.to_string(),
        },
    }
}
