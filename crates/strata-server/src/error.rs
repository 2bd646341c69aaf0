use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use strata_core::{CoreError, ErrorKind};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("missing {0} header")]
    MissingIdentity(&'static str),

    #[error("invalid {header} header: {reason}")]
    InvalidIdentity { header: &'static str, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl From<strata_store::StoreError> for ServerError {
    fn from(e: strata_store::StoreError) -> Self {
        Self::Core(e.into())
    }
}

/// JSON body of every error response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Core(e) => match e.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
                ErrorKind::Invalid => StatusCode::BAD_REQUEST,
            },
            Self::MissingIdentity(_) | Self::InvalidIdentity { .. } => StatusCode::UNAUTHORIZED,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Core(e) => e.kind().as_str(),
            Self::MissingIdentity(_) | Self::InvalidIdentity { .. } => "unauthenticated",
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = if status.is_server_error() {
            // The cause stays in the log; clients get an ID to quote.
            let correlation_id = Uuid::now_v7().to_string();
            error!(%correlation_id, status = status.as_u16(), error = %self, "request failed");
            ErrorBody {
                error: self.code().into(),
                message: "the server could not complete the request".into(),
                correlation_id: Some(correlation_id),
            }
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
            ErrorBody {
                error: self.code().into(),
                message: self.to_string(),
                correlation_id: None,
            }
        };
        (status, Json(body)).into_response()
    }
}
