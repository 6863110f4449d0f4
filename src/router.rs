//! Request validation, dispatch and the uniform response envelope.
//!
//! Every call, whatever happens, comes back as
//! `{"success": bool, "data": ..., "error"?: {"code", "message", "details"?}}`.

use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, warn};

use review_core::StoreError;

use crate::review::{ReviewService, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    ReviewInProgress,
    NoFilesToReview,
    NotInitialized,
    UpstreamError,
    InternalError,
}

impl ServiceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyInProgress(_) => ErrorCode::ReviewInProgress,
            Self::NoFilesToReview(_) => ErrorCode::NoFilesToReview,
            Self::Upstream(_) => ErrorCode::UpstreamError,
            Self::Store(StoreError::NotInitialized) => ErrorCode::NotInitialized,
            Self::Store(_) => ErrorCode::InternalError,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Envelope {
    pub success: bool,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn fail(code: ErrorCode, message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(ErrorBody {
                code,
                message: message.into(),
                details,
            }),
        }
    }

    pub fn from_result<T: Serialize>(result: Result<T, ServiceError>) -> Self {
        match result {
            Ok(data) => match serde_json::to_value(data) {
                Ok(data) => Self::ok(data),
                Err(e) => Self::fail(
                    ErrorCode::InternalError,
                    "Failed to encode response",
                    Some(json!(e.to_string())),
                ),
            },
            Err(err) => Self::from(&err),
        }
    }
}

impl From<&ServiceError> for Envelope {
    fn from(err: &ServiceError) -> Self {
        let details = match err {
            ServiceError::Upstream(crate::bitbucket::BitbucketError::Status { status, body }) => {
                Some(json!({ "status": status.as_u16(), "body": body }))
            }
            _ => None,
        };
        Self::fail(err.code(), err.to_string(), details)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    StartReview,
    NextReviewItem,
    ResetReview,
}

/// A pull-request id as callers send it: a string or a non-negative integer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PrNumber {
    Number(u64),
    Text(String),
}

impl PrNumber {
    /// The store key for this id. Blank strings are rejected.
    pub fn into_pr_id(self) -> Result<String, String> {
        match self {
            Self::Number(n) => Ok(n.to_string()),
            Self::Text(s) if s.trim().is_empty() => {
                Err("`prNumber` must not be empty".to_string())
            }
            Self::Text(s) => Ok(s.trim().to_string()),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PrNumberParams {
    #[schemars(description = "Pull request number, as a string or integer")]
    #[serde(rename = "prNumber", alias = "pr_number")]
    pub pr_number: PrNumber,
}

/// Wire shape of `{"method": ..., "params": {"prNumber": ...}}`.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: Method,
    pub params: PrNumberParams,
}

/// A validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub pr_id: String,
}

impl Request {
    pub fn new(method: Method, pr_id: impl Into<String>) -> Self {
        Self {
            method,
            pr_id: pr_id.into(),
        }
    }

    /// Deserializes and validates a raw request. The error is the reason
    /// reported in `INVALID_REQUEST` details.
    pub fn parse(value: Value) -> Result<Self, String> {
        let raw: RpcRequest = serde_json::from_value(value).map_err(|e| e.to_string())?;
        Ok(Self::new(raw.method, raw.params.pr_number.into_pr_id()?))
    }
}

#[derive(Clone)]
pub struct RequestRouter {
    service: ReviewService,
}

impl RequestRouter {
    pub fn new(service: ReviewService) -> Self {
        Self { service }
    }

    /// Validates raw JSON and dispatches it. Malformed input never reaches
    /// the review service.
    pub async fn handle(&self, request: Value) -> Envelope {
        match Request::parse(request) {
            Ok(request) => self.dispatch(request).await,
            Err(reason) => {
                warn!("Rejected request: {}", reason);
                Envelope::fail(
                    ErrorCode::InvalidRequest,
                    "Invalid request format",
                    Some(Value::String(reason)),
                )
            }
        }
    }

    pub async fn dispatch(&self, request: Request) -> Envelope {
        let pr_id = request.pr_id.as_str();
        let envelope = match request.method {
            Method::StartReview => Envelope::from_result(self.service.start_review(pr_id).await),
            Method::NextReviewItem => {
                Envelope::from_result(self.service.next_review_item(pr_id).await)
            }
            Method::ResetReview => Envelope::from_result(
                self.service
                    .reset_review(pr_id)
                    .await
                    .map(|()| json!({ "success": true })),
            ),
        };

        if let Some(err) = &envelope.error {
            error!(
                "{:?} for PR {} failed: {} ({:?})",
                request.method,
                pr_id,
                err.message,
                err.code
            );
        }
        envelope
    }
}
