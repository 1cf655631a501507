//! Uniform success body for mutating endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// `{"success": true, "data": ...}` with a chosen status code.
///
/// Failures go through [`crate::AppError`], which renders the same shape
/// with `success: false`.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult<T> {
    #[serde(skip)]
    status: StatusCode,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T> ActionResult<T> {
    /// 200 OK with `data`.
    #[must_use]
    pub const fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            success: true,
            data: Some(data),
        }
    }

    /// 201 Created with `data`.
    #[must_use]
    pub const fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            success: true,
            data: Some(data),
        }
    }

    /// The payload, if any.
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }
}

impl ActionResult<()> {
    /// 200 OK without a payload.
    #[must_use]
    pub const fn done() -> Self {
        Self {
            status: StatusCode::OK,
            success: true,
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ActionResult<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
