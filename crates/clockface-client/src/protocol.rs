//! Wire types for the attendance server's JSON-RPC endpoints.

use clockface_core::{AttendanceAction, NoMatchReport, SuccessReport};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const VERIFY_PATH: &str = "/face_recognition/verify";
pub const REGISTER_PATH: &str = "/face_recognition/register";

const UNKNOWN_ERROR: &str = "Unknown error";

/// Payload describing one captured face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceData {
    /// base64 of the JSON-encoded descriptor.
    pub encoding: String,
    /// JPEG snapshot as a data URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RpcRequest<P> {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub id: u64,
    pub params: P,
}

impl<P: Serialize> RpcRequest<P> {
    pub fn call(id: u64, params: P) -> Self {
        Self {
            jsonrpc: "2.0",
            method: "call",
            id,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyParams<'a> {
    pub face_data: &'a FaceData,
}

#[derive(Debug, Serialize)]
pub struct RegisterParams<'a> {
    pub employee_id: i64,
    pub face_data: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    /// Most specific message available; servers put the exception text in
    /// `data.message`.
    pub fn describe(&self) -> String {
        self.data
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.message.clone())
    }
}

/// Raw verification reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyResponse {
    pub success: bool,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub employee_id: Option<i64>,
}

/// Terminal business outcome of a verification.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    Success(SuccessReport),
    NoMatch(NoMatchReport),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("success reply without a valid action: {0:?}")]
    InvalidAction(Option<String>),
    #[error("success reply without an employee name")]
    MissingName,
}

impl VerifyResponse {
    pub fn classify(self) -> Result<VerificationOutcome, ProtocolError> {
        if !self.success {
            return Ok(VerificationOutcome::NoMatch(NoMatchReport {
                message: self.message.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
                confidence: self.confidence,
            }));
        }
        let action = self
            .action
            .as_deref()
            .and_then(AttendanceAction::from_wire)
            .ok_or_else(|| ProtocolError::InvalidAction(self.action.clone()))?;
        let employee_name = self.name.ok_or(ProtocolError::MissingName)?;
        Ok(VerificationOutcome::Success(SuccessReport {
            employee_name,
            action,
            confidence: self.confidence,
            processing_time_secs: self.processing_time,
            employee_id: self.employee_id,
        }))
    }
}

/// Registration reply.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}
