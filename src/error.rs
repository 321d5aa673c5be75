use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Accumulated validation failures: per-field messages plus a `base` bucket
/// for errors that belong to the record as a whole.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub base: Vec<String>,
    pub fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn add_base(&mut self, message: impl Into<String>) {
        self.base.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.fields.is_empty()
    }

    /// Ok when nothing was recorded, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn field_messages(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    State(String),
    #[error("authentication required")]
    Unauthorized,
    #[error("admin access required")]
    Forbidden,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

/// Postgres unique-index violation, the final arbiter for token collisions.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_code(err, "23505")
}

pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    has_code(err, "23503")
}

fn has_code(err: &sqlx::Error, code: &str) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|c| c == code)
        .unwrap_or(false)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "errors": errors })),
            )
                .into_response(),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("{what} not found") })),
            )
                .into_response(),
            ApiError::Conflict(message) => {
                (StatusCode::CONFLICT, Json(json!({ "error": message }))).into_response()
            }
            ApiError::State(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": message })),
            )
                .into_response(),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "authentication required" })),
            )
                .into_response(),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "admin access required" })),
            )
                .into_response(),
            ApiError::Internal(err) => {
                error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_errors_are_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn field_and_base_errors_accumulate() {
        let mut errors = ValidationErrors::new();
        errors.add("price", "must be greater than or equal to 0.01");
        errors.add("price", "is required");
        errors.add_base("cannot modify a live or expired deal");

        let errors = errors.into_result().unwrap_err();
        assert_eq!(errors.field_messages("price").len(), 2);
        assert_eq!(errors.base.len(), 1);
        assert!(errors.field_messages("title").is_empty());
    }

    #[test]
    fn errors_serialize_with_field_and_base_buckets() {
        let mut errors = ValidationErrors::new();
        errors.add("start_at", "must be in the future");
        errors.add_base("at least one image is required to publish");

        let value = serde_json::to_value(&errors).unwrap();
        assert_eq!(value["fields"]["start_at"][0], "must be in the future");
        assert_eq!(value["base"][0], "at least one image is required to publish");
    }
}
