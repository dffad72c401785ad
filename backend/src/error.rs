use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

use crate::{
    assembler::AssemblyError,
    models::ApiError,
    network::NetworkError,
    synthesis::SynthesisError,
    validation::ValidationError,
};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    #[error("no route found: {0}")]
    NoRouteFound(String),
    #[error("{0}")]
    Unroutable(String),
    #[error("too many concurrent route requests, retry in {retry_after_s} s")]
    Overloaded { retry_after_s: u64 },
    #[error("route data unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("route computation timed out")]
    TimedOut,
    #[error("internal error: {0}")]
    Internal(String),
}

impl RouteError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Self::NoRouteFound(_) => StatusCode::NOT_FOUND,
            Self::Unroutable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Overloaded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ProviderUnavailable(_) | Self::TimedOut => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::MalformedBody(_) => "malformed_request",
            Self::NoRouteFound(_) => "no_route_found",
            Self::Unroutable(_) => "unroutable",
            Self::Overloaded { .. } => "overloaded",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::TimedOut => "timed_out",
            Self::Internal(_) => "internal_error",
        }
    }

    fn body(&self) -> ApiError {
        match self {
            Self::Validation(err) => ApiError {
                code: self.code().into(),
                message: err.message.clone(),
                field: Some(err.field.clone()),
            },
            Self::Internal(_) => ApiError {
                code: self.code().into(),
                message: "internal server error".into(),
                field: None,
            },
            _ => ApiError {
                code: self.code().into(),
                message: self.to_string(),
                field: None,
            },
        }
    }
}

impl From<SynthesisError> for RouteError {
    fn from(err: SynthesisError) -> Self {
        match err {
            SynthesisError::NoRouteFound { .. } => Self::NoRouteFound(err.to_string()),
            SynthesisError::Cancelled => Self::TimedOut,
            SynthesisError::Network(NetworkError::Unroutable { .. }) => {
                Self::Unroutable(err.to_string())
            }
            SynthesisError::Network(NetworkError::Unavailable(reason)) => {
                Self::ProviderUnavailable(reason)
            }
            SynthesisError::Network(other) => Self::Internal(other.to_string()),
        }
    }
}

impl From<AssemblyError> for RouteError {
    fn from(err: AssemblyError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<JsonRejection> for RouteError {
    fn from(rejection: JsonRejection) -> Self {
        Self::MalformedBody(rejection.body_text())
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal(details) => error!("route request failed: {details}"),
            Self::ProviderUnavailable(_) | Self::TimedOut | Self::Overloaded { .. } => {
                warn!("route request not served: {self}")
            }
            _ => {}
        }

        let mut response = (status, Json(self.body())).into_response();
        if let Self::Overloaded { retry_after_s } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_s));
        }
        response
    }
}
