//! HTTP error responses of the send endpoints.
//!
//! Shapes:
//! - field validation: `422 {"status":false,"message":{"number":"Invalid value"}}`
//! - unregistered destination: `422 {"status":false,"message":"The number is not registered"}`
//! - everything else: `{"status":false,"response":{"kind","message","cause"}}`
//!   with 503 for a session that is not ready and 500 otherwise.

use std::{collections::BTreeMap, error::Error as _};

use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde_json::{Value, json},
    tracing::warn,
    walink_whatsapp::{DispatchError, SendError},
};

pub const INVALID_VALUE: &str = "Invalid value";

#[derive(Debug)]
pub enum ApiError {
    /// Per-field validation messages.
    Invalid(BTreeMap<String, String>),
    /// Body could not be parsed at all.
    Malformed(String),
    Dispatch(DispatchError),
}

impl ApiError {
    /// Mark each of `fields` as missing or empty.
    #[must_use]
    pub fn invalid_fields(fields: &[&str]) -> Self {
        Self::Invalid(
            fields
                .iter()
                .map(|f| ((*f).to_string(), INVALID_VALUE.to_string()))
                .collect(),
        )
    }

    #[must_use]
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        Self::Invalid(BTreeMap::from([(field.to_string(), message.into())]))
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        Self::Dispatch(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Invalid(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "status": false, "message": fields })),
            )
                .into_response(),
            Self::Malformed(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": false, "message": message })),
            )
                .into_response(),
            Self::Dispatch(e) => dispatch_response(e),
        }
    }
}

fn dispatch_response(e: DispatchError) -> Response {
    match e {
        DispatchError::Send(SendError::InvalidAddress(_)) => {
            ApiError::invalid_fields(&["number"]).into_response()
        },
        DispatchError::Send(inner @ SendError::UnregisteredDestination { .. }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "status": false, "message": inner.to_string() })),
        )
            .into_response(),
        DispatchError::Validation(message) => {
            ApiError::invalid_field("file", message).into_response()
        },
        e @ DispatchError::Send(SendError::NotReady { .. }) => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(failure_body(&e))).into_response()
        },
        e => {
            warn!(kind = e.kind(), error = %e, "send request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(failure_body(&e))).into_response()
        },
    }
}

/// `{"status":false,"response":{"kind","message","cause"}}`
pub fn failure_body(e: &DispatchError) -> Value {
    json!({
        "status": false,
        "response": {
            "kind": e.kind(),
            "message": e.to_string(),
            "cause": e.source().map(ToString::to_string),
        },
    })
}
